use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;

use crate::chat::{BotCommand, InboundEvent};
use crate::conversation::ConversationMachine;
use crate::handlers::utils::message_ids;
use crate::handlers::HandlerResult;

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "open the main menu")]
    Start,
    #[command(description = "open the main menu")]
    Menu,
    #[command(description = "open the main menu")]
    Panel,
    #[command(description = "get a free trial account")]
    Trial,
    #[command(description = "buy an account")]
    Create,
    #[command(description = "system info")]
    Info,
    #[command(description = "cancel the current step")]
    Cancel,
    #[command(description = "admin: back up all accounts")]
    Backup,
    #[command(description = "admin: restore accounts from a backup file")]
    Restore,
    #[command(description = "admin: cancel a pending order")]
    CancelOrder(String),
}

impl From<Command> for BotCommand {
    fn from(cmd: Command) -> Self {
        match cmd {
            Command::Start | Command::Menu | Command::Panel => BotCommand::Start,
            Command::Trial => BotCommand::Trial,
            Command::Create => BotCommand::Create,
            Command::Info => BotCommand::Info,
            Command::Cancel => BotCommand::Cancel,
            Command::Backup => BotCommand::Backup,
            Command::Restore => BotCommand::Restore,
            Command::CancelOrder(order_id) => BotCommand::CancelOrder(order_id),
        }
    }
}

/// Maps slash text to a command. Slash text `Command` cannot parse becomes
/// `BotCommand::Unknown`; anything else is not a command.
pub fn parse_bot_command(text: &str, bot_name: &str) -> Option<BotCommand> {
    if !text.starts_with('/') {
        return None;
    }

    match Command::parse(text, bot_name) {
        Ok(cmd) => Some(cmd.into()),
        Err(e) => {
            log::debug!("Unparsed command {:?}: {}", text, e);
            let name = text.split_whitespace().next().unwrap_or(text);
            Some(BotCommand::Unknown(name.trim_start_matches('/').to_string()))
        }
    }
}

pub async fn command_handler(msg: Message, cmd: Command, machine: Arc<ConversationMachine>) -> HandlerResult {
    let Some((user_id, chat_id)) = message_ids(&msg) else {
        return Ok(());
    };

    machine
        .handle(InboundEvent::Text {
            user_id,
            chat_id,
            text: msg.text().unwrap_or_default().to_string(),
            command: Some(cmd.into()),
        })
        .await;
    Ok(())
}
