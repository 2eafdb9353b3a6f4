use std::sync::Arc;
use std::time::Duration;

use teloxide::{prelude::*, utils::command::BotCommands};
use tokio::time;

use vpn_provision_bot::config::{read_api_key, Config};
use vpn_provision_bot::conversation::{ConversationMachine, MachineSettings};
use vpn_provision_bot::handlers::{callback_handler, command_handler, message_handler, Command, TelegramChat};
use vpn_provision_bot::maintenance::Maintenance;
use vpn_provision_bot::payment::PakasirClient;
use vpn_provision_bot::provisioning::{fetch_server_location, ProvisioningClient};
use vpn_provision_bot::trial::TrialLedger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();
    log::info!("Starting VPN provisioning bot...");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            log::error!("❌ Config error: {:#}", e);
            return Err(e);
        }
    };

    let api_key = read_api_key(&config.api.key_file);
    if api_key.is_none() {
        log::warn!("⚠️ No API key loaded, provisioning calls go out unauthenticated");
    }

    let ledger = Arc::new(TrialLedger::load(&config.trial_db_file).await?);
    log::info!("✅ Trial ledger loaded ({} users)", ledger.len().await);

    let location = fetch_server_location().await;
    log::info!("📍 Server location: {} ({})", location.city, location.isp);

    let provisioning = Arc::new(ProvisioningClient::new(&config.api.base_url, api_key)?);
    let payments = Arc::new(PakasirClient::new(&config.payment)?);

    let bot = Bot::new(config.bot_token.clone());
    let chat = Arc::new(TelegramChat::new(bot.clone()));

    let machine = Arc::new(ConversationMachine::new(
        MachineSettings::from_config(&config, location),
        ledger,
        payments,
        provisioning,
        chat,
    ));

    if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
        log::warn!("Error registering bot commands: {}", e);
    }

    spawn_sweep(machine.maintenance(), config.maintenance.sweep_interval);
    spawn_backup(machine.maintenance(), config.maintenance.backup_interval);

    let handler = dptree::entry()
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(command_handler),
        )
        .branch(Update::filter_callback_query().endpoint(callback_handler))
        .branch(Update::filter_message().endpoint(message_handler));

    log::info!("🚀 Starting dispatcher...");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![machine.clone()])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    machine.shutdown().await;
    log::info!("Bot stopped");
    Ok(())
}

fn spawn_sweep(maintenance: Arc<Maintenance>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        loop {
            interval.tick().await;
            if let Err(e) = maintenance.run_expiry_sweep().await {
                log::error!("Expiry sweep failed: {}", e);
            }
        }
    });
}

fn spawn_backup(maintenance: Arc<Maintenance>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = time::interval(every);
        // the first tick fires immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = maintenance.run_backup().await {
                log::error!("Scheduled backup failed: {}", e);
            }
        }
    });
}
