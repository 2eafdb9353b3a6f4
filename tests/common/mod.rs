#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};

use vpn_provision_bot::chat::{ChatSink, Formatting, InboundEvent, MenuButton, PhotoSource};
use vpn_provision_bot::config::{PollSettings, Pricing};
use vpn_provision_bot::conversation::{ConversationMachine, MachineSettings};
use vpn_provision_bot::error::BotError;
use vpn_provision_bot::handlers::commands::parse_bot_command;
use vpn_provision_bot::models::account::EXPIRY_FORMAT;
use vpn_provision_bot::models::Account;
use vpn_provision_bot::payment::{Charge, PaymentCode, PaymentGateway, PaymentStatus};
use vpn_provision_bot::provisioning::{ProvisioningApi, ServerLocation};
use vpn_provision_bot::trial::TrialLedger;

pub const ADMIN_ID: i64 = 1;
pub const PRICE_PER_DAY: u64 = 1000;
pub const BOT_NAME: &str = "vpn_bot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    Text {
        chat_id: i64,
        text: String,
        formatting: Formatting,
    },
    Menu {
        chat_id: i64,
        text: String,
    },
    Photo {
        chat_id: i64,
        caption: String,
    },
    Document {
        chat_id: i64,
        file_name: String,
        contents: Vec<u8>,
    },
}

impl Sent {
    pub fn body(&self) -> &str {
        match self {
            Sent::Text { text, .. } | Sent::Menu { text, .. } => text,
            Sent::Photo { caption, .. } => caption,
            Sent::Document { file_name, .. } => file_name,
        }
    }
}

/// Records everything the bot sends.
#[derive(Default)]
pub struct RecordingChat {
    pub sent: Mutex<Vec<Sent>>,
    pub download: Mutex<Vec<u8>>,
}

impl RecordingChat {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last_body(&self) -> String {
        self.sent().last().map(|sent| sent.body().to_string()).unwrap_or_default()
    }

    pub fn any_contains(&self, needle: &str) -> bool {
        self.sent().iter().any(|sent| sent.body().contains(needle))
    }

    fn push(&self, sent: Sent) {
        self.sent.lock().unwrap().push(sent);
    }
}

#[async_trait]
impl ChatSink for RecordingChat {
    async fn send_text(&self, chat_id: i64, text: &str, formatting: Formatting) -> Result<(), BotError> {
        self.push(Sent::Text {
            chat_id,
            text: text.to_string(),
            formatting,
        });
        Ok(())
    }

    async fn send_menu(
        &self,
        chat_id: i64,
        text: &str,
        _formatting: Formatting,
        _buttons: &[Vec<MenuButton>],
    ) -> Result<(), BotError> {
        self.push(Sent::Menu {
            chat_id,
            text: text.to_string(),
        });
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, _photo: PhotoSource, caption: &str) -> Result<(), BotError> {
        self.push(Sent::Photo {
            chat_id,
            caption: caption.to_string(),
        });
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        contents: Vec<u8>,
        _caption: &str,
    ) -> Result<(), BotError> {
        self.push(Sent::Document {
            chat_id,
            file_name: file_name.to_string(),
            contents,
        });
        Ok(())
    }

    async fn fetch_document(&self, _file_ref: &str) -> Result<Vec<u8>, BotError> {
        Ok(self.download.lock().unwrap().clone())
    }
}

/// Answers status queries from a script, then reports pending forever.
#[derive(Default)]
pub struct ScriptedGateway {
    pub statuses: Mutex<VecDeque<Result<PaymentStatus, BotError>>>,
    pub initiations: Mutex<Vec<(String, u64, String)>>,
    pub queries: Mutex<u32>,
    pub reject_with: Mutex<Option<String>>,
}

impl ScriptedGateway {
    pub fn with_statuses(statuses: Vec<PaymentStatus>) -> Self {
        let gateway = Self::default();
        *gateway.statuses.lock().unwrap() = statuses.into_iter().map(Ok).collect();
        gateway
    }

    pub fn initiations(&self) -> Vec<(String, u64, String)> {
        self.initiations.lock().unwrap().clone()
    }

    pub fn queries(&self) -> u32 {
        *self.queries.lock().unwrap()
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initiate_charge(&self, order_id: &str, amount: u64, method: &str) -> Result<Charge, BotError> {
        self.initiations
            .lock()
            .unwrap()
            .push((order_id.to_string(), amount, method.to_string()));

        if let Some(message) = self.reject_with.lock().unwrap().clone() {
            return Err(BotError::Api(message));
        }
        Ok(Charge {
            payment_code: PaymentCode::ImageUrl(format!("https://qr.test/{}.png", order_id)),
            expires_at: None,
        })
    }

    async fn query_status(&self, _order_id: &str) -> Result<PaymentStatus, BotError> {
        *self.queries.lock().unwrap() += 1;
        self.statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(PaymentStatus::Pending))
    }
}

/// Counts account creations; fails them while `fail_with` is set.
#[derive(Default)]
pub struct CountingProvisioning {
    pub created: Mutex<Vec<(String, u32)>>,
    pub deleted: Mutex<Vec<String>>,
    pub accounts: Mutex<Vec<Account>>,
    pub fail_with: Mutex<Option<String>>,
}

impl CountingProvisioning {
    pub fn created(&self) -> Vec<(String, u32)> {
        self.created.lock().unwrap().clone()
    }

    pub fn fail_with(&self, message: &str) {
        *self.fail_with.lock().unwrap() = Some(message.to_string());
    }

    pub fn succeed(&self) {
        *self.fail_with.lock().unwrap() = None;
    }
}

#[async_trait]
impl ProvisioningApi for CountingProvisioning {
    async fn create_account(&self, password: &str, days: u32) -> Result<Account, BotError> {
        if let Some(message) = self.fail_with.lock().unwrap().clone() {
            return Err(BotError::Api(message));
        }
        self.created.lock().unwrap().push((password.to_string(), days));
        Ok(Account {
            password: password.to_string(),
            expired: expiry_in(i64::from(days)),
        })
    }

    async fn delete_account(&self, password: &str) -> Result<(), BotError> {
        self.deleted.lock().unwrap().push(password.to_string());
        Ok(())
    }

    async fn list_accounts(&self) -> Result<Vec<Account>, BotError> {
        Ok(self.accounts.lock().unwrap().clone())
    }
}

pub fn expiry_in(days: i64) -> String {
    (Utc::now() + ChronoDuration::days(days)).format(EXPIRY_FORMAT).to_string()
}

pub struct Harness {
    pub machine: ConversationMachine,
    pub ledger: Arc<TrialLedger>,
    pub gateway: Arc<ScriptedGateway>,
    pub provisioning: Arc<CountingProvisioning>,
    pub chat: Arc<RecordingChat>,
}

pub fn poll_settings(max_attempts: u32) -> PollSettings {
    PollSettings {
        interval: Duration::from_millis(10),
        max_attempts,
    }
}

pub async fn harness(dir: &Path, gateway: ScriptedGateway, max_attempts: u32) -> Harness {
    let ledger = Arc::new(TrialLedger::load(dir.join("trial_users.db")).await.unwrap());
    let gateway = Arc::new(gateway);
    let provisioning = Arc::new(CountingProvisioning::default());
    let chat = Arc::new(RecordingChat::default());

    let settings = MachineSettings {
        admin_id: ADMIN_ID,
        pricing: Pricing {
            price_per_day: PRICE_PER_DAY,
            min_days: 7,
            trial_days: 1,
        },
        polling: poll_settings(max_attempts),
        payment_method: "qris".to_string(),
        order_prefix: "VPN".to_string(),
        backup_dir: dir.join("backups"),
        location: ServerLocation::default(),
    };

    let machine = ConversationMachine::new(
        settings,
        ledger.clone(),
        gateway.clone(),
        provisioning.clone(),
        chat.clone(),
    );

    Harness {
        machine,
        ledger,
        gateway,
        provisioning,
        chat,
    }
}

/// A text message as the Telegram adapter would deliver it.
pub fn text(user_id: i64, text: &str) -> InboundEvent {
    InboundEvent::Text {
        user_id,
        chat_id: user_id,
        text: text.to_string(),
        command: parse_bot_command(text, BOT_NAME),
    }
}

pub fn button(user_id: i64, data: &str) -> InboundEvent {
    InboundEvent::Button {
        user_id,
        chat_id: user_id,
        data: data.to_string(),
    }
}

pub fn document(user_id: i64) -> InboundEvent {
    InboundEvent::Document {
        user_id,
        chat_id: user_id,
        file_ref: "file-1".to_string(),
    }
}

/// Polls `check` until it holds or two seconds pass.
pub async fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
