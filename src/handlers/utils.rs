use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::chat::MenuButton;

/// Inline keyboard from menu rows.
pub fn make_menu_keyboard(rows: &[Vec<MenuButton>]) -> InlineKeyboardMarkup {
    let keyboard: Vec<Vec<InlineKeyboardButton>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| InlineKeyboardButton::callback(button.label.clone(), button.data.clone()))
                .collect()
        })
        .collect();

    InlineKeyboardMarkup::new(keyboard)
}

/// Sender and chat of a message, as plain ids.
pub fn message_ids(msg: &Message) -> Option<(i64, i64)> {
    let user = msg.from.as_ref()?;
    Some((user.id.0 as i64, msg.chat.id.0))
}
