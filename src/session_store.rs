use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::{ConversationState, UserSession};

type Sessions = Arc<RwLock<HashMap<i64, UserSession>>>;

/// In-memory conversation state for every user, behind a single lock.
///
/// Callers only get atomic operations and copies of values, never the map.
/// The lock is held for map access only, never across I/O.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Sessions,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the state, creating an empty session when there is none.
    pub async fn set_state(&self, user_id: i64, state: ConversationState) {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&user_id) {
            Some(session) => session.state = state,
            None => {
                sessions.insert(user_id, UserSession::new(state));
            }
        }
    }

    pub async fn get_state(&self, user_id: i64) -> Option<ConversationState> {
        let sessions = self.sessions.read().await;
        sessions.get(&user_id).map(|session| session.state.clone())
    }

    /// Removes state and form data. Returns whether a session existed.
    pub async fn clear_state(&self, user_id: i64) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&user_id).is_some()
    }

    /// Starts over with a fresh session, discarding any previous form.
    pub async fn begin(&self, user_id: i64, state: ConversationState) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(user_id, UserSession::new(state));
    }

    /// Stores a form field and moves to `next` in one step, but only while
    /// the session is still in `expected`. Returns the updated form.
    pub async fn record(
        &self,
        user_id: i64,
        expected: &ConversationState,
        field: &str,
        value: impl Into<String>,
        next: ConversationState,
    ) -> Option<HashMap<String, String>> {
        let mut sessions = self.sessions.write().await;
        let session = sessions.get_mut(&user_id).filter(|session| &session.state == expected)?;
        session.form.insert(field.to_string(), value.into());
        session.state = next;
        Some(session.form.clone())
    }

    pub async fn field(&self, user_id: i64, field: &str) -> Option<String> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&user_id)
            .and_then(|session| session.form.get(field).cloned())
    }

    /// Clears the session only while it still waits for `order_id`.
    pub async fn clear_order(&self, user_id: i64, order_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        let owns_order = matches!(
            sessions.get(&user_id).map(|session| &session.state),
            Some(ConversationState::AwaitingPayment { order_id: current }) if current == order_id
        );
        if owns_order {
            sessions.remove(&user_id);
        }
        owns_order
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{FIELD_DAYS, FIELD_PASSWORD};
    use crate::models::Flow;

    #[tokio::test]
    async fn set_get_clear() {
        let store = SessionStore::new();
        assert_eq!(store.get_state(1).await, None);

        store.set_state(1, ConversationState::AwaitingDays).await;
        assert_eq!(store.get_state(1).await, Some(ConversationState::AwaitingDays));

        assert!(store.clear_state(1).await);
        assert_eq!(store.get_state(1).await, None);
        // clearing twice is a no-op
        assert!(!store.clear_state(1).await);
    }

    #[tokio::test]
    async fn one_session_per_user() {
        let store = SessionStore::new();
        store.set_state(7, ConversationState::AwaitingPassword(Flow::Paid)).await;
        store.set_state(7, ConversationState::AwaitingDays).await;
        store.begin(7, ConversationState::AwaitingPassword(Flow::Trial)).await;
        store.set_state(8, ConversationState::AwaitingDays).await;

        assert_eq!(store.len().await, 2);
        assert_eq!(
            store.get_state(7).await,
            Some(ConversationState::AwaitingPassword(Flow::Trial))
        );
    }

    #[tokio::test]
    async fn begin_discards_previous_form() {
        let store = SessionStore::new();
        store.begin(3, ConversationState::AwaitingPassword(Flow::Paid)).await;
        let paid = ConversationState::AwaitingPassword(Flow::Paid);
        assert!(store
            .record(3, &paid, FIELD_PASSWORD, "secret", ConversationState::AwaitingDays)
            .await
            .is_some());
        assert_eq!(store.field(3, FIELD_PASSWORD).await.as_deref(), Some("secret"));

        store.begin(3, ConversationState::AwaitingPassword(Flow::Paid)).await;
        assert_eq!(store.field(3, FIELD_PASSWORD).await, None);
    }

    #[tokio::test]
    async fn record_without_session_is_rejected() {
        let store = SessionStore::new();
        let days = ConversationState::AwaitingDays;
        assert_eq!(store.record(5, &days, FIELD_DAYS, "10", days.clone()).await, None);
        assert_eq!(store.get_state(5).await, None);
    }

    #[tokio::test]
    async fn record_requires_the_expected_state() {
        let store = SessionStore::new();
        store.begin(4, ConversationState::AwaitingDays).await;
        let paying = ConversationState::AwaitingPayment { order_id: "A".into() };

        let form = store
            .record(4, &ConversationState::AwaitingDays, FIELD_DAYS, "10", paying.clone())
            .await
            .unwrap();
        assert_eq!(form.get(FIELD_DAYS).map(String::as_str), Some("10"));

        // a second turn racing the first one finds the state already moved on
        let stale = ConversationState::AwaitingPayment { order_id: "B".into() };
        assert_eq!(
            store
                .record(4, &ConversationState::AwaitingDays, FIELD_DAYS, "12", stale)
                .await,
            None
        );
        assert_eq!(store.get_state(4).await, Some(paying));
        assert_eq!(store.field(4, FIELD_DAYS).await.as_deref(), Some("10"));
    }

    #[tokio::test]
    async fn clear_order_only_matches_same_order() {
        let store = SessionStore::new();
        store
            .set_state(9, ConversationState::AwaitingPayment { order_id: "A".into() })
            .await;

        assert!(!store.clear_order(9, "B").await);
        assert!(store.get_state(9).await.is_some());
        assert!(store.clear_order(9, "A").await);
        assert_eq!(store.get_state(9).await, None);
    }

    #[tokio::test]
    async fn concurrent_writers_leave_one_state() {
        let store = SessionStore::new();
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    store.set_state(1, ConversationState::AwaitingDays).await;
                } else {
                    store.clear_state(1).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert!(store.len().await <= 1);
    }
}
