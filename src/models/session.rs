use std::collections::HashMap;
use std::fmt;

pub const FIELD_PASSWORD: &str = "password";
pub const FIELD_DAYS: &str = "days";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Trial,
    Paid,
}

/// Where a user is in the conversation. Idle users have no session at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationState {
    AwaitingPassword(Flow),
    AwaitingDays,
    AwaitingPayment { order_id: String },
    AwaitingRestoreFile,
}

impl ConversationState {
    pub fn tag(&self) -> &'static str {
        match self {
            ConversationState::AwaitingPassword(Flow::Trial) => "awaiting_password(trial)",
            ConversationState::AwaitingPassword(Flow::Paid) => "awaiting_password(paid)",
            ConversationState::AwaitingDays => "awaiting_days",
            ConversationState::AwaitingPayment { .. } => "awaiting_payment",
            ConversationState::AwaitingRestoreFile => "awaiting_restore_file",
        }
    }
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone)]
pub struct UserSession {
    pub state: ConversationState,
    pub form: HashMap<String, String>,
}

impl UserSession {
    pub fn new(state: ConversationState) -> Self {
        Self {
            state,
            form: HashMap::new(),
        }
    }
}
