use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub const EXPIRY_FORMAT: &str = "%Y-%m-%d";

/// A service account as reported by the provisioning API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub password: String,
    pub expired: String,
}

impl Account {
    pub fn expiry_date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.expired.trim(), EXPIRY_FORMAT).ok()
    }
}

/// Backup file contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub created_at: DateTime<Utc>,
    pub accounts: Vec<Account>,
}
