pub mod callbacks;
pub mod commands;
pub mod messages;
pub mod utils;

pub use callbacks::callback_handler;
pub use commands::{command_handler, Command};
pub use messages::message_handler;

use std::error::Error;

use async_trait::async_trait;
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{FileId, InputFile, ParseMode};

use crate::chat::{ChatSink, Formatting, MenuButton, PhotoSource};
use crate::error::BotError;
use crate::handlers::utils::make_menu_keyboard;

pub type HandlerResult = Result<(), Box<dyn Error + Send + Sync>>;

/// Sends through the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramChat {
    bot: Bot,
}

impl TelegramChat {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn chat_error(e: impl std::fmt::Display) -> BotError {
    BotError::Chat(e.to_string())
}

#[async_trait]
impl ChatSink for TelegramChat {
    async fn send_text(&self, chat_id: i64, text: &str, formatting: Formatting) -> Result<(), BotError> {
        let request = self.bot.send_message(ChatId(chat_id), text);
        match formatting {
            Formatting::Plain => request.await.map_err(chat_error)?,
            Formatting::Markdown => request.parse_mode(ParseMode::MarkdownV2).await.map_err(chat_error)?,
        };
        Ok(())
    }

    async fn send_menu(
        &self,
        chat_id: i64,
        text: &str,
        formatting: Formatting,
        buttons: &[Vec<MenuButton>],
    ) -> Result<(), BotError> {
        let request = self
            .bot
            .send_message(ChatId(chat_id), text)
            .reply_markup(make_menu_keyboard(buttons));
        match formatting {
            Formatting::Plain => request.await.map_err(chat_error)?,
            Formatting::Markdown => request.parse_mode(ParseMode::MarkdownV2).await.map_err(chat_error)?,
        };
        Ok(())
    }

    async fn send_photo(&self, chat_id: i64, photo: PhotoSource, caption: &str) -> Result<(), BotError> {
        let file = match photo {
            PhotoSource::Url(url) => {
                let url = reqwest::Url::parse(&url).map_err(|e| BotError::Chat(format!("bad photo url: {}", e)))?;
                InputFile::url(url)
            }
            PhotoSource::Bytes(bytes) => InputFile::memory(bytes).file_name("qris.png"),
        };

        self.bot
            .send_photo(ChatId(chat_id), file)
            .caption(caption)
            .await
            .map_err(chat_error)?;
        Ok(())
    }

    async fn send_document(
        &self,
        chat_id: i64,
        file_name: &str,
        contents: Vec<u8>,
        caption: &str,
    ) -> Result<(), BotError> {
        let file = InputFile::memory(contents).file_name(file_name.to_string());
        self.bot
            .send_document(ChatId(chat_id), file)
            .caption(caption)
            .await
            .map_err(chat_error)?;
        Ok(())
    }

    async fn fetch_document(&self, file_ref: &str) -> Result<Vec<u8>, BotError> {
        let file = self
            .bot
            .get_file(FileId(file_ref.to_string()))
            .await
            .map_err(|e| BotError::Chat(format!("failed to get file info: {}", e)))?;

        let mut buf = Vec::new();
        self.bot
            .download_file(&file.path, &mut buf)
            .await
            .map_err(|e| BotError::Chat(format!("failed to download file: {}", e)))?;

        log::debug!("Downloaded file {} ({} bytes)", file_ref, buf.len());
        Ok(buf)
    }
}
