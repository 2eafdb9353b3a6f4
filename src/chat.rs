//! The chat transport as seen by the conversation core.
//!
//! Telegram specifics live in `handlers`; everything here is plain data plus
//! the [`ChatSink`] trait the core sends through.

use async_trait::async_trait;

use crate::error::BotError;

pub const BUTTON_TRIAL: &str = "trial";
pub const BUTTON_CREATE_PAID: &str = "create_paid";
pub const BUTTON_SYSTEM_INFO: &str = "system_info";
pub const BUTTON_CANCEL: &str = "cancel";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BotCommand {
    Start,
    Trial,
    Create,
    Info,
    Cancel,
    Backup,
    Restore,
    CancelOrder(String),
    Unknown(String),
}

/// One inbound turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    Text {
        user_id: i64,
        chat_id: i64,
        text: String,
        command: Option<BotCommand>,
    },
    Document {
        user_id: i64,
        chat_id: i64,
        file_ref: String,
    },
    Button {
        user_id: i64,
        chat_id: i64,
        data: String,
    },
}

impl InboundEvent {
    pub fn user_id(&self) -> i64 {
        match self {
            InboundEvent::Text { user_id, .. }
            | InboundEvent::Document { user_id, .. }
            | InboundEvent::Button { user_id, .. } => *user_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Formatting {
    Plain,
    /// Telegram MarkdownV2; the text must already be escaped.
    Markdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuButton {
    pub label: String,
    pub data: String,
}

impl MenuButton {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoSource {
    Url(String),
    Bytes(Vec<u8>),
}

#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str, formatting: Formatting) -> Result<(), BotError>;

    async fn send_menu(
        &self,
        chat_id: i64,
        text: &str,
        formatting: Formatting,
        buttons: &[Vec<MenuButton>],
    ) -> Result<(), BotError>;

    async fn send_photo(&self, chat_id: i64, photo: PhotoSource, caption: &str) -> Result<(), BotError>;

    async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        contents: Vec<u8>,
        caption: &str,
    ) -> Result<(), BotError>;

    async fn fetch_document(&self, file_ref: &str) -> Result<Vec<u8>, BotError>;
}
