//! User-facing texts.

use chrono::{DateTime, Utc};

use crate::chat::{MenuButton, BUTTON_CREATE_PAID, BUTTON_SYSTEM_INFO, BUTTON_TRIAL};
use crate::models::Account;
use crate::provisioning::ServerLocation;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━";

/// Escapes MarkdownV2 special characters.
pub fn escape_markdown_v2(text: &str) -> String {
    let specials = ['_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\'];
    let mut out = String::with_capacity(text.len() * 2);

    for ch in text.chars() {
        if specials.contains(&ch) {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Escapes text placed inside a MarkdownV2 `code` span.
pub fn escape_code(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    for ch in text.chars() {
        if ch == '`' || ch == '\\' {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

pub fn main_menu(trial_days: u32) -> (String, Vec<Vec<MenuButton>>) {
    let text = "Welcome to the VPN bot!\n\nChoose an option below:".to_string();
    let buttons = vec![
        vec![
            MenuButton::new(format!("Trial ({} day free, once)", trial_days), BUTTON_TRIAL),
            MenuButton::new("Buy an account", BUTTON_CREATE_PAID),
        ],
        vec![MenuButton::new("System info", BUTTON_SYSTEM_INFO)],
    ];
    (text, buttons)
}

pub fn trial_password_prompt(trial_days: u32) -> String {
    format!(
        "Enter the password for your {}-day trial account:\n\nSend /cancel to stop.",
        trial_days
    )
}

pub fn paid_password_prompt(min_days: u32) -> String {
    format!(
        "Enter the password you want (anything goes):\n\nNote: the minimum purchase is {} days. Send /cancel to stop.",
        min_days
    )
}

pub fn empty_password() -> &'static str {
    "❌ The password cannot be empty. Please enter a password:"
}

pub fn days_prompt(min_days: u32) -> String {
    format!("Enter the number of days (minimum {}):", min_days)
}

pub fn days_rejected(min_days: u32) -> String {
    format!(
        "❌ Invalid number of days or less than the minimum of {}. Try again.",
        min_days
    )
}

pub fn trial_already_used() -> &'static str {
    "❌ You have already used your free trial."
}

pub fn trial_not_for_admin() -> &'static str {
    "Admins do not need a trial."
}

pub fn paid_not_for_admin() -> &'static str {
    "Use the admin panel to create users."
}

pub fn payment_pending(order_id: &str) -> String {
    format!(
        "⏳ Your payment for order {} is still pending. Complete the payment or wait for it to expire.",
        order_id
    )
}

pub fn nothing_to_cancel() -> &'static str {
    "Nothing to cancel."
}

pub fn cancelled() -> &'static str {
    "Cancelled. Use /start to open the menu."
}

pub fn idle_hint() -> &'static str {
    "Use /start to open the menu."
}

pub fn unknown_command() -> &'static str {
    "Unknown command. Use /start."
}

pub fn unknown_option() -> &'static str {
    "Unknown option."
}

pub fn admin_only() -> &'static str {
    "⛔ This command is for the admin only."
}

pub fn payment_initiation_failed(reason: Option<&str>) -> String {
    match reason {
        Some(reason) => format!("❌ Failed to create the payment: {}. Please try again.", reason),
        None => "❌ Failed to create the payment transaction. Please try again.".to_string(),
    }
}

pub fn payment_caption(amount: u64, days: u32, order_id: &str, deadline: DateTime<Utc>, budget_minutes: u64) -> String {
    format!(
        "Scan this QRIS to pay Rp {} ({} days).\nOrder ID: {}\n\nPay within {} minutes (before {} UTC) or the order is cancelled.",
        amount,
        days,
        order_id,
        budget_minutes,
        deadline.format("%H:%M")
    )
}

pub fn payment_code_text(code: &str, caption: &str) -> String {
    format!("{}\n\nPayment code:\n{}", caption, code)
}

pub fn payment_timed_out() -> &'static str {
    "❌ Payment timed out or failed. Please try again."
}

pub fn payment_failed(order_id: &str) -> String {
    format!("❌ Payment for order {} failed or was cancelled. Please try again.", order_id)
}

pub fn trial_created(account: &Account, password: &str, location: &ServerLocation) -> String {
    format!(
        "✅ *TRIAL CREATED*\n{}\n{}\n{}\n{}",
        RULE,
        credentials(account, password, location),
        RULE,
        escape_markdown_v2("Note: one trial per Telegram account.")
    )
}

pub fn paid_account_created(account: &Account, password: &str, location: &ServerLocation) -> String {
    format!(
        "✅ *PAYMENT RECEIVED & ACCOUNT CREATED*\n{}\n{}\n{}",
        RULE,
        credentials(account, password, location),
        RULE
    )
}

fn credentials(account: &Account, password: &str, location: &ServerLocation) -> String {
    format!(
        "🔑 *Password*: `{}`\n🗓️ *Expired*: `{}`\n📍 *Location*: `{}`\n📡 *ISP*: `{}`",
        escape_code(password),
        escape_code(&account.expired),
        escape_code(&location.city),
        escape_code(&location.isp)
    )
}

pub fn provisioning_failed(message: &str) -> String {
    format!("❌ Failed: {}", message)
}

pub fn paid_provisioning_failed(order_id: &str, message: &str) -> String {
    format!(
        "❌ Payment received but account creation failed: {}\nOrder ID: {}\nPlease contact the admin.",
        message, order_id
    )
}

pub fn order_cancelled_by_admin(order_id: &str) -> String {
    format!("❌ Order {} was cancelled by the admin.", order_id)
}

pub fn restore_prompt() -> &'static str {
    "Send the backup file (.json) to restore. Send /cancel to stop."
}

pub fn restore_expects_file() -> &'static str {
    "❌ Please send the backup file (.json)."
}

pub fn upload_rejected() -> &'static str {
    "File uploads are only accepted during a restore started by the admin. Use /start."
}

pub struct SystemInfo<'a> {
    pub uptime: std::time::Duration,
    pub active_sessions: usize,
    pub pending_orders: usize,
    pub trial_users: usize,
    pub location: &'a ServerLocation,
}

pub fn system_info(info: &SystemInfo<'_>) -> String {
    let secs = info.uptime.as_secs();
    format!(
        "ℹ️ System info\n\nUptime: {}h {}m {}s\nActive sessions: {}\nPending orders: {}\nTrial users: {}\nLocation: {}\nISP: {}",
        secs / 3600,
        (secs % 3600) / 60,
        secs % 60,
        info.active_sessions,
        info.pending_orders,
        info.trial_users,
        info.location.city,
        info.location.isp
    )
}
