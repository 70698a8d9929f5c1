//! Delay coalescing scheduler
//!
//! New-message events are pushed right away. Any other mailbox change is
//! parked for the configured delay; further non-urgent events for the same
//! registration are absorbed into the parked entry without refreshing its
//! timestamp. A push only tells the client which account to resync, so one
//! push per window loses nothing.
//!
//! Removing an entry from the pending map is what claims its delivery: the
//! sweep and an urgent submit cannot both deliver the same entry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::delivery::Deliverer;
use crate::outcome::{Disposition, OutcomeHandler};
use crate::types::Registration;

/// Default delay for non-urgent notifications
pub const DEFAULT_DELAY: Duration = Duration::from_secs(30);

/// Default interval between sweeps of the pending set
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(20);

/// Result of submitting an event for a registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Pushed immediately
    Delivered(Disposition),
    /// Pushed immediately, cancelling the pending entry
    Superseded(Disposition),
    /// Parked until the delay expires
    Queued,
    /// Folded into an already pending entry
    Absorbed,
}

/// Decides per event whether to push now or later
pub struct Scheduler {
    pending: Mutex<HashMap<Registration, Instant>>,
    delay: Duration,
    deliverer: Arc<dyn Deliverer>,
    outcomes: OutcomeHandler,
}

impl Scheduler {
    pub fn new(deliverer: Arc<dyn Deliverer>, outcomes: OutcomeHandler, delay: Duration) -> Self {
        log::debug!("Non-urgent notifications are delayed by {:?}", delay);
        Self {
            pending: Mutex::new(HashMap::new()),
            delay,
            deliverer,
            outcomes,
        }
    }

    pub async fn submit(&self, registration: Registration, urgent: bool) -> Submission {
        self.submit_at(registration, urgent, Instant::now()).await
    }

    pub async fn submit_at(
        &self,
        registration: Registration,
        urgent: bool,
        now: Instant,
    ) -> Submission {
        let superseded = {
            let mut pending = self.pending.lock().await;
            if urgent {
                let removed = pending.remove(&registration).is_some();
                if removed {
                    log::debug!(
                        "Urgent event replaces pending notification for {}/{}",
                        registration.account_id,
                        registration.device_token
                    );
                }
                removed
            } else if pending.contains_key(&registration) {
                return Submission::Absorbed;
            } else {
                pending.insert(registration, now);
                return Submission::Queued;
            }
        };

        let disposition = self.deliver_now(&registration).await;
        if superseded {
            Submission::Superseded(disposition)
        } else {
            Submission::Delivered(disposition)
        }
    }

    /// Deliver every entry that has waited longer than the delay
    ///
    /// Returns the number of delivered entries.
    pub async fn sweep(&self) -> usize {
        self.sweep_at(Instant::now()).await
    }

    pub async fn sweep_at(&self, now: Instant) -> usize {
        let due: Vec<Registration> = {
            let mut pending = self.pending.lock().await;
            let due: Vec<Registration> = pending
                .iter()
                .filter(|(_, enqueued)| now.saturating_duration_since(**enqueued) > self.delay)
                .map(|(registration, _)| registration.clone())
                .collect();
            for registration in &due {
                pending.remove(registration);
            }
            due
        };

        if !due.is_empty() {
            log::debug!("Sending {} delayed notifications", due.len());
        }
        for registration in &due {
            self.deliver_now(registration).await;
        }
        due.len()
    }

    /// When the pending entry for `registration` was created
    pub async fn pending_since(&self, registration: &Registration) -> Option<Instant> {
        self.pending.lock().await.get(registration).copied()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }

    async fn deliver_now(&self, registration: &Registration) -> Disposition {
        log::debug!(
            "Sending notification to {}/{}",
            registration.account_id,
            registration.device_token
        );
        let result = self.deliverer.deliver(registration).await;
        self.outcomes.handle(registration, result).await
    }

    /// Periodically deliver expired entries
    pub fn spawn_sweeper(self: Arc<Self>, interval: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }
}
