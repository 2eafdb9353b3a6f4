//! Scheduled fleet jobs: expiry sweep and backups, plus restore from a backup.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::fs;

use crate::chat::{ChatSink, Formatting};
use crate::error::BotError;
use crate::models::{Account, AccountSnapshot};
use crate::provisioning::ProvisioningApi;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub checked: usize,
    pub deleted: Vec<String>,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct BackupReport {
    pub accounts: usize,
    pub file_name: String,
    /// `None` when the snapshot could not be written to disk.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    pub restored: usize,
    pub skipped: usize,
    pub failed: usize,
}

pub struct Maintenance {
    provisioning: Arc<dyn ProvisioningApi>,
    chat: Arc<dyn ChatSink>,
    admin_chat: i64,
    backup_dir: PathBuf,
}

impl Maintenance {
    pub fn new(
        provisioning: Arc<dyn ProvisioningApi>,
        chat: Arc<dyn ChatSink>,
        admin_chat: i64,
        backup_dir: PathBuf,
    ) -> Self {
        Self {
            provisioning,
            chat,
            admin_chat,
            backup_dir,
        }
    }

    /// Deletes every account whose expiry date has passed.
    pub async fn run_expiry_sweep(&self) -> Result<SweepReport, BotError> {
        let today = Utc::now().date_naive();
        let accounts = self.provisioning.list_accounts().await?;
        let mut report = SweepReport {
            checked: accounts.len(),
            ..Default::default()
        };

        for account in accounts {
            match is_expired(&account, today) {
                Some(true) => {}
                Some(false) => continue,
                None => {
                    log::warn!("Unparsable expiry {:?} on an account, skipping", account.expired);
                    continue;
                }
            }

            match self.provisioning.delete_account(&account.password).await {
                Ok(()) => report.deleted.push(account.password),
                Err(e) => {
                    log::error!("Error deleting expired account: {}", e);
                    report.failed += 1;
                }
            }
        }

        if !report.deleted.is_empty() {
            log::info!("🧹 Expiry sweep removed {} accounts", report.deleted.len());
            let text = format!(
                "🧹 Auto-deleted {} expired accounts:\n{}",
                report.deleted.len(),
                report.deleted.join("\n")
            );
            self.notify_admin(&text).await;
        }

        Ok(report)
    }

    /// Writes a snapshot of all accounts and sends it to the admin.
    ///
    /// A failed write is logged and the snapshot is still sent.
    pub async fn run_backup(&self) -> Result<BackupReport, BotError> {
        let accounts = self.provisioning.list_accounts().await?;
        let snapshot = AccountSnapshot {
            created_at: Utc::now(),
            accounts,
        };
        let contents = serde_json::to_vec_pretty(&snapshot).map_err(|e| BotError::decode("backup", e))?;
        let file_name = format!("backup-{}.json", snapshot.created_at.format("%Y%m%d-%H%M%S"));

        let path = match self.write_snapshot(&file_name, &contents).await {
            Ok(path) => Some(path),
            Err(e) => {
                log::warn!("⚠️ Backup {} not written to disk: {}", file_name, e);
                None
            }
        };

        let caption = format!("💾 Backup: {} accounts", snapshot.accounts.len());
        if let Err(e) = self
            .chat
            .send_document(self.admin_chat, &file_name, contents, &caption)
            .await
        {
            log::error!("Error sending backup to admin: {}", e);
        }

        log::info!("💾 Backup {} done ({} accounts)", file_name, snapshot.accounts.len());

        Ok(BackupReport {
            accounts: snapshot.accounts.len(),
            file_name,
            path,
        })
    }

    /// Recreates the still-valid accounts of a backup file.
    pub async fn restore(&self, contents: &[u8]) -> Result<RestoreReport, BotError> {
        let snapshot: AccountSnapshot =
            serde_json::from_slice(contents).map_err(|e| BotError::UserInput(format!("not a backup file: {}", e)))?;
        let today = Utc::now().date_naive();
        let mut report = RestoreReport::default();

        for account in snapshot.accounts {
            let Some(days) = remaining_days(&account, today) else {
                report.skipped += 1;
                continue;
            };

            match self.provisioning.create_account(&account.password, days).await {
                Ok(_) => report.restored += 1,
                Err(e) => {
                    log::warn!("Restore of an account failed: {}", e);
                    report.failed += 1;
                }
            }
        }

        log::info!("♻️ Restore finished: {:?}", report);
        Ok(report)
    }

    async fn write_snapshot(&self, file_name: &str, contents: &[u8]) -> Result<PathBuf, BotError> {
        fs::create_dir_all(&self.backup_dir).await?;
        let path = self.backup_dir.join(file_name);
        fs::write(&path, contents).await?;
        Ok(path)
    }

    async fn notify_admin(&self, text: &str) {
        if let Err(e) = self.chat.send_text(self.admin_chat, text, Formatting::Plain).await {
            log::error!("Error notifying admin: {}", e);
        }
    }
}

/// `None` when the expiry date cannot be parsed.
pub fn is_expired(account: &Account, today: NaiveDate) -> Option<bool> {
    account.expiry_date().map(|date| date < today)
}

/// Days left on an account, or `None` if it is expired or unreadable.
pub fn remaining_days(account: &Account, today: NaiveDate) -> Option<u32> {
    let days = (account.expiry_date()? - today).num_days();
    u32::try_from(days).ok().filter(|days| *days > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(expired: &str) -> Account {
        Account {
            password: "pw".into(),
            expired: expired.into(),
        }
    }

    #[test]
    fn expiry_is_strictly_before_today() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        assert_eq!(is_expired(&account("2025-01-09"), today), Some(true));
        assert_eq!(is_expired(&account("2025-01-10"), today), Some(false));
        assert_eq!(is_expired(&account("soon"), today), None);
    }

    #[test]
    fn remaining_days_skips_past_and_today() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 10).unwrap();
        assert_eq!(remaining_days(&account("2025-01-20"), today), Some(10));
        assert_eq!(remaining_days(&account("2025-01-10"), today), None);
        assert_eq!(remaining_days(&account("2024-12-31"), today), None);
        assert_eq!(remaining_days(&account("garbage"), today), None);
    }
}
