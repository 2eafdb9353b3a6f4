use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::Me;

use crate::chat::InboundEvent;
use crate::conversation::ConversationMachine;
use crate::handlers::commands::parse_bot_command;
use crate::handlers::utils::message_ids;
use crate::handlers::HandlerResult;

/// Plain text, documents and commands the command filter did not take.
pub async fn message_handler(msg: Message, me: Me, machine: Arc<ConversationMachine>) -> HandlerResult {
    let Some((user_id, chat_id)) = message_ids(&msg) else {
        return Ok(());
    };

    let event = if let Some(doc) = msg.document() {
        InboundEvent::Document {
            user_id,
            chat_id,
            file_ref: doc.file.id.0.clone(),
        }
    } else if let Some(text) = msg.text() {
        InboundEvent::Text {
            user_id,
            chat_id,
            text: text.to_string(),
            command: parse_bot_command(text, me.username()),
        }
    } else {
        log::debug!("Ignoring unsupported message from user {}", user_id);
        return Ok(());
    };

    machine.handle(event).await;
    Ok(())
}
