//! The per-user conversation: menus, the trial path and the paid path.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration as ChronoDuration, Utc};

use crate::chat::{
    BotCommand, ChatSink, Formatting, InboundEvent, MenuButton, PhotoSource, BUTTON_CANCEL,
    BUTTON_CREATE_PAID, BUTTON_SYSTEM_INFO, BUTTON_TRIAL,
};
use crate::config::{Config, PollSettings, Pricing};
use crate::error::BotError;
use crate::maintenance::Maintenance;
use crate::models::order::make_order_id;
use crate::models::session::{FIELD_DAYS, FIELD_PASSWORD};
use crate::models::{ConversationState, Flow, PendingOrder};
use crate::orders::{provisioning_message, OrderRegistry, PollWorker};
use crate::payment::{PaymentCode, PaymentGateway};
use crate::provisioning::{ProvisioningApi, ServerLocation};
use crate::replies;
use crate::session_store::SessionStore;
use crate::trial::TrialLedger;

#[derive(Debug, Clone)]
pub struct MachineSettings {
    pub admin_id: i64,
    pub pricing: Pricing,
    pub polling: PollSettings,
    pub payment_method: String,
    pub order_prefix: String,
    pub backup_dir: PathBuf,
    pub location: ServerLocation,
}

impl MachineSettings {
    pub fn from_config(config: &Config, location: ServerLocation) -> Self {
        Self {
            admin_id: config.admin_id,
            pricing: config.pricing,
            polling: config.polling,
            payment_method: config.payment.method.clone(),
            order_prefix: config.order_prefix.clone(),
            backup_dir: config.backup_dir.clone(),
            location,
        }
    }
}

/// What a plain text turn means in the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextStep {
    RepeatPasswordPrompt,
    RedeemTrial { password: String },
    StorePassword { password: String },
    RejectDays,
    Checkout { days: u32 },
    RemindPayment { order_id: String },
    ExpectDocument,
}

/// Transition table for text input. Every state is handled explicitly.
pub fn text_step(state: &ConversationState, input: &str, pricing: &Pricing) -> TextStep {
    match state {
        ConversationState::AwaitingPassword(flow) => {
            if input.trim().is_empty() {
                return TextStep::RepeatPasswordPrompt;
            }
            let password = input.to_string();
            match flow {
                Flow::Trial => TextStep::RedeemTrial { password },
                Flow::Paid => TextStep::StorePassword { password },
            }
        }
        ConversationState::AwaitingDays => match input.trim().parse::<u32>() {
            Ok(days) if days >= pricing.min_days && pricing.amount_for(days).is_some() => {
                TextStep::Checkout { days }
            }
            _ => TextStep::RejectDays,
        },
        ConversationState::AwaitingPayment { order_id } => TextStep::RemindPayment {
            order_id: order_id.clone(),
        },
        ConversationState::AwaitingRestoreFile => TextStep::ExpectDocument,
    }
}

pub struct ConversationMachine {
    sessions: SessionStore,
    ledger: Arc<TrialLedger>,
    payments: Arc<dyn PaymentGateway>,
    provisioning: Arc<dyn ProvisioningApi>,
    chat: Arc<dyn ChatSink>,
    maintenance: Arc<Maintenance>,
    orders: OrderRegistry,
    settings: MachineSettings,
    started_at: Instant,
}

impl ConversationMachine {
    pub fn new(
        settings: MachineSettings,
        ledger: Arc<TrialLedger>,
        payments: Arc<dyn PaymentGateway>,
        provisioning: Arc<dyn ProvisioningApi>,
        chat: Arc<dyn ChatSink>,
    ) -> Self {
        let maintenance = Arc::new(Maintenance::new(
            provisioning.clone(),
            chat.clone(),
            settings.admin_id,
            settings.backup_dir.clone(),
        ));

        Self {
            sessions: SessionStore::new(),
            ledger,
            payments,
            provisioning,
            chat,
            maintenance,
            orders: OrderRegistry::new(),
            settings,
            started_at: Instant::now(),
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn orders(&self) -> &OrderRegistry {
        &self.orders
    }

    pub fn maintenance(&self) -> Arc<Maintenance> {
        self.maintenance.clone()
    }

    /// Processes one inbound turn. Failures end up as chat messages.
    pub async fn handle(&self, event: InboundEvent) {
        log::debug!("Inbound event from user {}: {:?}", event.user_id(), event);

        match event {
            InboundEvent::Text {
                user_id,
                chat_id,
                text,
                command: Some(command),
            } => {
                log::debug!("Command {:?} with text {:?}", command, text);
                self.on_command(user_id, chat_id, command).await
            }
            InboundEvent::Text {
                user_id,
                chat_id,
                text,
                command: None,
            } => self.on_text(user_id, chat_id, &text).await,
            InboundEvent::Document {
                user_id,
                chat_id,
                file_ref,
            } => self.on_document(user_id, chat_id, &file_ref).await,
            InboundEvent::Button { user_id, chat_id, data } => self.on_button(user_id, chat_id, &data).await,
        }
    }

    /// Stops every pending order.
    pub async fn shutdown(&self) {
        self.orders.shutdown().await;
    }

    fn is_admin(&self, user_id: i64) -> bool {
        user_id == self.settings.admin_id
    }

    async fn on_command(&self, user_id: i64, chat_id: i64, command: BotCommand) {
        match command {
            BotCommand::Start => self.show_menu(chat_id).await,
            BotCommand::Trial => self.start_trial(user_id, chat_id).await,
            BotCommand::Create => self.start_paid(user_id, chat_id).await,
            BotCommand::Info => self.system_info(chat_id).await,
            BotCommand::Cancel => self.cancel_form(user_id, chat_id).await,
            BotCommand::Backup if self.is_admin(user_id) => self.backup_now(chat_id).await,
            BotCommand::Restore if self.is_admin(user_id) => {
                self.sessions.begin(user_id, ConversationState::AwaitingRestoreFile).await;
                self.say(chat_id, replies::restore_prompt()).await;
            }
            BotCommand::CancelOrder(order_id) if self.is_admin(user_id) => {
                self.cancel_order(chat_id, order_id.trim()).await
            }
            BotCommand::Backup | BotCommand::Restore | BotCommand::CancelOrder(_) => {
                self.say(chat_id, replies::admin_only()).await
            }
            BotCommand::Unknown(name) => {
                log::debug!("Unknown command /{} from user {}", name, user_id);
                self.say(chat_id, replies::unknown_command()).await
            }
        }
    }

    async fn on_button(&self, user_id: i64, chat_id: i64, data: &str) {
        match data {
            BUTTON_TRIAL => self.start_trial(user_id, chat_id).await,
            BUTTON_CREATE_PAID => self.start_paid(user_id, chat_id).await,
            BUTTON_SYSTEM_INFO => self.system_info(chat_id).await,
            BUTTON_CANCEL => self.cancel_form(user_id, chat_id).await,
            _ => self.say(chat_id, replies::unknown_option()).await,
        }
    }

    async fn on_text(&self, user_id: i64, chat_id: i64, text: &str) {
        let Some(state) = self.sessions.get_state(user_id).await else {
            self.say(chat_id, replies::idle_hint()).await;
            return;
        };
        let min_days = self.settings.pricing.min_days;

        match text_step(&state, text, &self.settings.pricing) {
            TextStep::RepeatPasswordPrompt => self.say(chat_id, replies::empty_password()).await,
            TextStep::RedeemTrial { password } => self.redeem_trial(user_id, chat_id, &password).await,
            TextStep::StorePassword { password } => {
                let recorded = self
                    .sessions
                    .record(user_id, &state, FIELD_PASSWORD, password, ConversationState::AwaitingDays)
                    .await;
                if recorded.is_some() {
                    log::info!("User {} moved to {}", user_id, ConversationState::AwaitingDays);
                    self.say(chat_id, &replies::days_prompt(min_days)).await;
                }
            }
            TextStep::RejectDays => {
                log::debug!("User {} sent invalid days {:?}", user_id, text);
                self.say(chat_id, &replies::days_rejected(min_days)).await;
            }
            TextStep::Checkout { days } => self.checkout(user_id, chat_id, days).await,
            TextStep::RemindPayment { order_id } => {
                self.say(chat_id, &replies::payment_pending(&order_id)).await
            }
            TextStep::ExpectDocument => self.say(chat_id, replies::restore_expects_file()).await,
        }
    }

    async fn on_document(&self, user_id: i64, chat_id: i64, file_ref: &str) {
        let restoring = self.sessions.get_state(user_id).await == Some(ConversationState::AwaitingRestoreFile);
        if !restoring || !self.is_admin(user_id) {
            self.say(chat_id, replies::upload_rejected()).await;
            return;
        }

        let text = match self.chat.fetch_document(file_ref).await {
            Ok(contents) => match self.maintenance.restore(&contents).await {
                Ok(report) => format!(
                    "♻️ Restore finished: {} restored, {} skipped, {} failed.",
                    report.restored, report.skipped, report.failed
                ),
                Err(e) => format!("❌ Restore failed: {}", e),
            },
            Err(e) => {
                log::error!("Error downloading backup file: {}", e);
                format!("❌ Could not download the file: {}", e)
            }
        };

        self.sessions.clear_state(user_id).await;
        self.say(chat_id, &text).await;
    }

    async fn show_menu(&self, chat_id: i64) {
        let (text, buttons) = replies::main_menu(self.settings.pricing.trial_days);
        self.menu(chat_id, &text, &buttons).await;
    }

    /// Returns the pending order id, if the user has one.
    async fn pending_order(&self, user_id: i64) -> Option<String> {
        match self.sessions.get_state(user_id).await {
            Some(ConversationState::AwaitingPayment { order_id }) => Some(order_id),
            _ => None,
        }
    }

    async fn start_trial(&self, user_id: i64, chat_id: i64) {
        if self.is_admin(user_id) {
            self.say(chat_id, replies::trial_not_for_admin()).await;
            return;
        }
        if let Some(order_id) = self.pending_order(user_id).await {
            self.say(chat_id, &replies::payment_pending(&order_id)).await;
            return;
        }
        if self.ledger.has_redeemed(user_id).await {
            self.sessions.clear_state(user_id).await;
            self.say(chat_id, replies::trial_already_used()).await;
            return;
        }

        self.sessions
            .begin(user_id, ConversationState::AwaitingPassword(Flow::Trial))
            .await;
        log::info!("User {} started the trial flow", user_id);
        self.say(chat_id, &replies::trial_password_prompt(self.settings.pricing.trial_days))
            .await;
    }

    async fn redeem_trial(&self, user_id: i64, chat_id: i64, password: &str) {
        self.sessions.clear_state(user_id).await;

        if let Err(BotError::AlreadyRedeemed) = self.ledger.reserve(user_id).await {
            log::info!("User {} tried to redeem a second trial", user_id);
            self.say(chat_id, replies::trial_already_used()).await;
            return;
        }

        let trial_days = self.settings.pricing.trial_days;
        match self.provisioning.create_account(password, trial_days).await {
            Ok(account) => {
                self.ledger.mark_redeemed(user_id).await;
                log::info!("🎁 Trial account created for user {}", user_id);
                let text = replies::trial_created(&account, password, &self.settings.location);
                self.send(chat_id, &text, Formatting::Markdown).await;
            }
            Err(e) => {
                self.ledger.release(user_id).await;
                log::error!("❌ Trial provisioning for user {} failed: {}", user_id, e);
                self.say(chat_id, &replies::provisioning_failed(&provisioning_message(&e)))
                    .await;
            }
        }
    }

    async fn start_paid(&self, user_id: i64, chat_id: i64) {
        if self.is_admin(user_id) {
            self.say(chat_id, replies::paid_not_for_admin()).await;
            return;
        }
        if let Some(order_id) = self.pending_order(user_id).await {
            self.say(chat_id, &replies::payment_pending(&order_id)).await;
            return;
        }

        self.sessions
            .begin(user_id, ConversationState::AwaitingPassword(Flow::Paid))
            .await;
        log::info!("User {} started the paid flow", user_id);
        self.say(chat_id, &replies::paid_password_prompt(self.settings.pricing.min_days))
            .await;
    }

    async fn checkout(&self, user_id: i64, chat_id: i64, days: u32) {
        let min_days = self.settings.pricing.min_days;
        let Some(amount) = self.settings.pricing.amount_for(days) else {
            self.say(chat_id, &replies::days_rejected(min_days)).await;
            return;
        };

        let now = Utc::now();
        let order_id = make_order_id(&self.settings.order_prefix, user_id, now);

        // a concurrent turn that already left AwaitingDays wins
        let Some(form) = self
            .sessions
            .record(
                user_id,
                &ConversationState::AwaitingDays,
                FIELD_DAYS,
                days.to_string(),
                ConversationState::AwaitingPayment {
                    order_id: order_id.clone(),
                },
            )
            .await
        else {
            log::debug!("User {} left the days step before checkout", user_id);
            return;
        };
        let Some(password) = form.get(FIELD_PASSWORD).cloned() else {
            self.sessions.clear_order(user_id, &order_id).await;
            self.say(chat_id, replies::idle_hint()).await;
            return;
        };

        log::info!("🧾 Order {} for user {}: {} days, amount {}", order_id, user_id, days, amount);

        let charge = match self
            .payments
            .initiate_charge(&order_id, amount, &self.settings.payment_method)
            .await
        {
            Ok(charge) => charge,
            Err(e) => {
                log::error!("❌ Payment initiation for order {} failed: {}", order_id, e);
                self.sessions.clear_order(user_id, &order_id).await;
                let reason = match &e {
                    BotError::Api(message) => Some(message.as_str()),
                    _ => None,
                };
                self.say(chat_id, &replies::payment_initiation_failed(reason)).await;
                return;
            }
        };

        if let Some(expires_at) = &charge.expires_at {
            log::debug!("Gateway expiry for order {}: {}", order_id, expires_at);
        }

        // validated at startup
        let budget = self.settings.polling.budget().unwrap_or_default();
        let deadline = now + ChronoDuration::from_std(budget).unwrap_or_else(|_| ChronoDuration::zero());
        let budget_minutes = budget.as_secs().div_ceil(60);
        let caption = replies::payment_caption(amount, days, &order_id, deadline, budget_minutes);

        let sent = match charge.payment_code {
            PaymentCode::ImageUrl(url) => self.chat.send_photo(chat_id, PhotoSource::Url(url), &caption).await,
            PaymentCode::Text(code) => {
                self.chat
                    .send_text(chat_id, &replies::payment_code_text(&code, &caption), Formatting::Plain)
                    .await
            }
        };
        if let Err(e) = sent {
            log::error!("Error sending payment code for order {}: {}", order_id, e);
        }

        let order = PendingOrder {
            order_id,
            user_id,
            chat_id,
            amount,
            password,
            days,
            created_at: now,
        };
        self.orders.spawn(self.poll_worker(), order);
    }

    fn poll_worker(&self) -> PollWorker {
        PollWorker {
            payments: self.payments.clone(),
            provisioning: self.provisioning.clone(),
            chat: self.chat.clone(),
            sessions: self.sessions.clone(),
            polling: self.settings.polling,
            location: self.settings.location.clone(),
        }
    }

    async fn cancel_form(&self, user_id: i64, chat_id: i64) {
        match self.sessions.get_state(user_id).await {
            None => self.say(chat_id, replies::nothing_to_cancel()).await,
            Some(ConversationState::AwaitingPayment { order_id }) => {
                self.say(chat_id, &replies::payment_pending(&order_id)).await
            }
            Some(state) => {
                self.sessions.clear_state(user_id).await;
                log::info!("User {} cancelled {}", user_id, state);
                self.say(chat_id, replies::cancelled()).await;
            }
        }
    }

    async fn cancel_order(&self, chat_id: i64, order_id: &str) {
        if order_id.is_empty() {
            self.say(chat_id, "Usage: /cancelorder <order_id>").await;
            return;
        }

        match self.orders.cancel(order_id) {
            Some((owner, owner_chat)) => {
                self.sessions.clear_order(owner, order_id).await;
                self.say(owner_chat, &replies::order_cancelled_by_admin(order_id)).await;
                self.say(chat_id, &format!("Order {} cancelled.", order_id)).await;
            }
            None => self.say(chat_id, &format!("No pending order {}.", order_id)).await,
        }
    }

    async fn backup_now(&self, chat_id: i64) {
        let text = match self.maintenance.run_backup().await {
            Ok(report) => format!("💾 Backup {} created ({} accounts).", report.file_name, report.accounts),
            Err(e) => format!("❌ Backup failed: {}", e),
        };
        self.say(chat_id, &text).await;
    }

    async fn system_info(&self, chat_id: i64) {
        let info = replies::SystemInfo {
            uptime: self.started_at.elapsed(),
            active_sessions: self.sessions.len().await,
            pending_orders: self.orders.len(),
            trial_users: self.ledger.len().await,
            location: &self.settings.location,
        };
        self.say(chat_id, &replies::system_info(&info)).await;
    }

    async fn say(&self, chat_id: i64, text: &str) {
        self.send(chat_id, text, Formatting::Plain).await;
    }

    async fn send(&self, chat_id: i64, text: &str, formatting: Formatting) {
        if let Err(e) = self.chat.send_text(chat_id, text, formatting).await {
            log::error!("Error sending message to chat {}: {}", chat_id, e);
        }
    }

    async fn menu(&self, chat_id: i64, text: &str, buttons: &[Vec<MenuButton>]) {
        if let Err(e) = self.chat.send_menu(chat_id, text, Formatting::Plain, buttons).await {
            log::error!("Error sending menu to chat {}: {}", chat_id, e);
        }
    }
}
