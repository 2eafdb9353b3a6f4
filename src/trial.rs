use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::Mutex;

use crate::error::BotError;

#[derive(Default)]
struct LedgerState {
    redeemed: HashSet<i64>,
    in_flight: HashSet<i64>,
}

/// Users who already used their one free trial, mirrored to a file.
///
/// The file is a newline separated list of user ids and is rewritten in
/// full on every new redemption while the ledger lock is held, so writers
/// never interleave.
pub struct TrialLedger {
    path: PathBuf,
    state: Mutex<LedgerState>,
}

impl TrialLedger {
    /// Reads the ledger file. A missing file is an empty ledger.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BotError> {
        let path = path.as_ref().to_path_buf();
        let redeemed = match fs::read_to_string(&path).await {
            Ok(contents) => parse_ledger(&contents),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("Trial ledger {} not found, starting empty", path.display());
                HashSet::new()
            }
            Err(e) => return Err(e.into()),
        };

        log::info!("🎟️ Loaded {} trial users from {}", redeemed.len(), path.display());

        Ok(Self {
            path,
            state: Mutex::new(LedgerState {
                redeemed,
                in_flight: HashSet::new(),
            }),
        })
    }

    pub async fn has_redeemed(&self, user_id: i64) -> bool {
        self.state.lock().await.redeemed.contains(&user_id)
    }

    /// Records the user and rewrites the file. Returns false when the user
    /// was already recorded, in which case nothing is written.
    ///
    /// A failed write is logged; the in-memory mark stays.
    pub async fn mark_redeemed(&self, user_id: i64) -> bool {
        let mut state = self.state.lock().await;
        state.in_flight.remove(&user_id);
        if !state.redeemed.insert(user_id) {
            return false;
        }

        if let Err(e) = self.persist(&state.redeemed).await {
            log::warn!(
                "⚠️ Trial for user {} recorded in memory only, ledger write failed: {}",
                user_id,
                e
            );
        }
        true
    }

    /// Claims the trial for an in-progress redemption.
    pub async fn reserve(&self, user_id: i64) -> Result<(), BotError> {
        let mut state = self.state.lock().await;
        if state.redeemed.contains(&user_id) || !state.in_flight.insert(user_id) {
            return Err(BotError::AlreadyRedeemed);
        }
        Ok(())
    }

    /// Gives a reservation back after provisioning failed.
    pub async fn release(&self, user_id: i64) {
        self.state.lock().await.in_flight.remove(&user_id);
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.redeemed.len()
    }

    async fn persist(&self, redeemed: &HashSet<i64>) -> Result<(), BotError> {
        let mut ids: Vec<i64> = redeemed.iter().copied().collect();
        ids.sort_unstable();
        let contents = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("\n");

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, contents).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

fn parse_ledger(contents: &str) -> HashSet<i64> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match line.parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                log::warn!("Skipping malformed trial ledger line: {:?}", line);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = TrialLedger::load(dir.path().join("trial_users.db")).await.unwrap();
        assert_eq!(ledger.len().await, 0);
        assert!(!ledger.has_redeemed(1).await);
    }

    #[tokio::test]
    async fn mark_persists_and_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trial_users.db");

        let ledger = TrialLedger::load(&path).await.unwrap();
        assert!(ledger.mark_redeemed(20).await);
        assert!(ledger.mark_redeemed(10).await);
        assert!(!ledger.mark_redeemed(10).await);

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "10\n20");

        let reloaded = TrialLedger::load(&path).await.unwrap();
        assert!(reloaded.has_redeemed(10).await);
        assert!(reloaded.has_redeemed(20).await);
        assert_eq!(reloaded.len().await, 2);
    }

    #[tokio::test]
    async fn malformed_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trial_users.db");
        std::fs::write(&path, "1\n\nnot-a-number\n 3 \n").unwrap();

        let ledger = TrialLedger::load(&path).await.unwrap();
        assert_eq!(ledger.len().await, 2);
        assert!(ledger.has_redeemed(3).await);
    }

    #[tokio::test]
    async fn write_failure_keeps_in_memory_mark() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("trial_users.db");

        let ledger = TrialLedger::load(&path).await.unwrap();
        assert!(ledger.mark_redeemed(5).await);
        assert!(ledger.has_redeemed(5).await);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn reservation_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = TrialLedger::load(dir.path().join("t.db")).await.unwrap();

        ledger.reserve(1).await.unwrap();
        assert!(matches!(ledger.reserve(1).await, Err(BotError::AlreadyRedeemed)));

        ledger.release(1).await;
        ledger.reserve(1).await.unwrap();
        ledger.mark_redeemed(1).await;
        assert!(matches!(ledger.reserve(1).await, Err(BotError::AlreadyRedeemed)));
    }

    #[tokio::test]
    async fn concurrent_reservations_admit_one() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = Arc::new(TrialLedger::load(dir.path().join("t.db")).await.unwrap());

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move { ledger.reserve(77).await.is_ok() }));
        }
        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}
