use std::sync::Arc;

use teloxide::prelude::*;

use crate::chat::InboundEvent;
use crate::conversation::ConversationMachine;
use crate::handlers::HandlerResult;

pub async fn callback_handler(bot: Bot, q: CallbackQuery, machine: Arc<ConversationMachine>) -> HandlerResult {
    // stops the client spinner whatever the outcome
    if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
        log::warn!("Error answering callback query: {}", e);
    }

    if let (Some(data), Some(message)) = (q.data.as_deref(), q.message.as_ref()) {
        machine
            .handle(InboundEvent::Button {
                user_id: q.from.id.0 as i64,
                chat_id: message.chat().id.0,
                data: data.to_string(),
            })
            .await;
    }

    Ok(())
}
