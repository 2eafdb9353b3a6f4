use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tokio::time;

use crate::chat::{ChatSink, Formatting};
use crate::config::PollSettings;
use crate::error::BotError;
use crate::models::PendingOrder;
use crate::payment::{PaymentGateway, PaymentStatus};
use crate::provisioning::{ProvisioningApi, ServerLocation};
use crate::replies;
use crate::session_store::SessionStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderOutcome {
    Provisioned { expired: String },
    ProvisioningFailed(String),
    PaymentFailed,
    TimedOut,
}

/// Follows one paid order from checkout to account creation.
#[derive(Clone)]
pub struct PollWorker {
    pub payments: Arc<dyn PaymentGateway>,
    pub provisioning: Arc<dyn ProvisioningApi>,
    pub chat: Arc<dyn ChatSink>,
    pub sessions: SessionStore,
    pub polling: PollSettings,
    pub location: ServerLocation,
}

impl PollWorker {
    pub async fn run(&self, order: PendingOrder) -> OrderOutcome {
        log::info!(
            "⏳ Polling order {} for user {}: {} for {} day(s), placed {} ({} attempts every {:?})",
            order.order_id,
            order.user_id,
            order.amount,
            order.days,
            order.created_at.format("%Y-%m-%d %H:%M:%S"),
            self.polling.max_attempts,
            self.polling.interval
        );

        for attempt in 1..=self.polling.max_attempts {
            match self.payments.query_status(&order.order_id).await {
                Ok(PaymentStatus::Settled) => {
                    log::info!("💰 Order {} settled on attempt {}", order.order_id, attempt);
                    let outcome = self.fulfil(&order).await;
                    self.finish(&order).await;
                    return outcome;
                }
                Ok(PaymentStatus::Failed) => {
                    log::warn!("Order {} reported failed by the gateway", order.order_id);
                    self.notify(order.chat_id, &replies::payment_failed(&order.order_id), Formatting::Plain)
                        .await;
                    self.finish(&order).await;
                    return OrderOutcome::PaymentFailed;
                }
                Ok(PaymentStatus::Pending) => {
                    log::debug!("Order {} pending (attempt {})", order.order_id, attempt);
                }
                Ok(PaymentStatus::Unknown(status)) => {
                    log::debug!("Order {} has status {:?} (attempt {})", order.order_id, status, attempt);
                }
                Err(e) if e.is_transient() => {
                    log::warn!("Status check for order {} failed (attempt {}): {}", order.order_id, attempt, e);
                }
                Err(e) => {
                    log::error!("Gateway refused status of order {} (attempt {}): {}", order.order_id, attempt, e);
                }
            }

            if attempt < self.polling.max_attempts {
                time::sleep(self.polling.interval).await;
            }
        }

        log::info!("⌛ Order {} timed out", order.order_id);
        self.notify(order.chat_id, replies::payment_timed_out(), Formatting::Plain)
            .await;
        self.finish(&order).await;
        OrderOutcome::TimedOut
    }

    async fn fulfil(&self, order: &PendingOrder) -> OrderOutcome {
        match self.provisioning.create_account(&order.password, order.days).await {
            Ok(account) => {
                let text = replies::paid_account_created(&account, &order.password, &self.location);
                self.notify(order.chat_id, &text, Formatting::Markdown).await;
                OrderOutcome::Provisioned {
                    expired: account.expired,
                }
            }
            Err(e) => {
                log::error!("❌ Provisioning failed after payment of order {}: {}", order.order_id, e);
                let message = provisioning_message(&e);
                self.notify(
                    order.chat_id,
                    &replies::paid_provisioning_failed(&order.order_id, &message),
                    Formatting::Plain,
                )
                .await;
                OrderOutcome::ProvisioningFailed(message)
            }
        }
    }

    async fn finish(&self, order: &PendingOrder) {
        if !self.sessions.clear_order(order.user_id, &order.order_id).await {
            log::debug!("Session of user {} no longer tied to order {}", order.user_id, order.order_id);
        }
    }

    async fn notify(&self, chat_id: i64, text: &str, formatting: Formatting) {
        if let Err(e) = self.chat.send_text(chat_id, text, formatting).await {
            log::error!("Error notifying chat {}: {}", chat_id, e);
        }
    }
}

/// Backend failures go to the user untranslated.
pub fn provisioning_message(err: &BotError) -> String {
    match err {
        BotError::Api(message) => message.clone(),
        other => other.to_string(),
    }
}

struct OrderEntry {
    user_id: i64,
    chat_id: i64,
    handle: JoinHandle<OrderOutcome>,
}

/// Running polling tasks, one per order id.
#[derive(Clone, Default)]
pub struct OrderRegistry {
    tasks: Arc<Mutex<HashMap<String, OrderEntry>>>,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<String, OrderEntry>> {
        // a panicking holder cannot leave the map half-updated
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Starts polling `order`. Returns false if the order id is already tracked.
    pub fn spawn(&self, worker: PollWorker, order: PendingOrder) -> bool {
        let mut tasks = self.tasks();
        if tasks.contains_key(&order.order_id) {
            log::warn!("Order {} already has a polling task", order.order_id);
            return false;
        }

        let order_id = order.order_id.clone();
        let user_id = order.user_id;
        let chat_id = order.chat_id;
        let registry = self.clone();
        let task_order_id = order_id.clone();
        // The task can only deregister once the lock below is released,
        // so its entry always exists by then.
        let handle = tokio::spawn(async move {
            let outcome = worker.run(order).await;
            registry.tasks().remove(&task_order_id);
            outcome
        });

        tasks.insert(
            order_id,
            OrderEntry {
                user_id,
                chat_id,
                handle,
            },
        );
        true
    }

    /// Aborts the task for `order_id`, returning its `(user_id, chat_id)`.
    pub fn cancel(&self, order_id: &str) -> Option<(i64, i64)> {
        let entry = self.tasks().remove(order_id)?;
        entry.handle.abort();
        log::info!("🛑 Polling for order {} cancelled", order_id);
        Some((entry.user_id, entry.chat_id))
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.tasks().contains_key(order_id)
    }

    pub fn len(&self) -> usize {
        self.tasks().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops every polling task and waits for them to wind down.
    pub async fn shutdown(&self) {
        let entries: Vec<(String, OrderEntry)> = self.tasks().drain().collect();
        if entries.is_empty() {
            return;
        }

        log::warn!("Abandoning {} pending orders on shutdown", entries.len());
        for (order_id, entry) in entries {
            entry.handle.abort();
            match entry.handle.await {
                Ok(outcome) => log::info!("Order {} finished before shutdown: {:?}", order_id, outcome),
                Err(e) if e.is_cancelled() => log::info!("Order {} abandoned", order_id),
                Err(e) => log::error!("Polling task for order {} panicked: {}", order_id, e),
            }
        }
    }
}
