//! Registration registry
//!
//! The registry maps users to the accounts and devices that asked for push
//! notifications. It is the single writable source of truth while the daemon
//! runs; the [`RegistrationStore`] is a mirror that is written best-effort and
//! in batches, so under heavy registration churn at most one upsert-triggered
//! write happens per flush interval.
//!
//! No lock is held while the store writes. The document is snapshotted under
//! the state lock together with a generation number; writers are then
//! serialized by a separate persist lock, and a snapshot older than the last
//! written one is dropped.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::Result;
use crate::store::RegistrationStore;
use crate::types::*;

/// Default interval between upsert-triggered store writes
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Default age after which a registration that was not renewed is dropped
pub const DEFAULT_STALE_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Default interval between staleness sweeps
pub const DEFAULT_STALE_SWEEP_INTERVAL: Duration = Duration::from_secs(8 * 60 * 60);

struct RegistryState {
    document: RegistryDocument,
    generation: u64,
    last_persisted: Option<Instant>,
}

impl RegistryState {
    fn touch(&mut self) {
        self.generation += 1;
    }

    fn flush_due(&self, now: Instant, interval: Duration) -> bool {
        match self.last_persisted {
            Some(last) => now.saturating_duration_since(last) > interval,
            None => true,
        }
    }

    fn snapshot(&mut self, now: Instant) -> Snapshot {
        self.last_persisted = Some(now);
        Snapshot {
            generation: self.generation,
            document: self.document.clone(),
        }
    }

    fn remove_account(&mut self, username: &str, account_id: &str) -> Option<Subscription> {
        self.document
            .users
            .get_mut(username)
            .and_then(|user| user.accounts.remove(account_id))
    }
}

struct Snapshot {
    generation: u64,
    document: RegistryDocument,
}

/// In-memory registration index backed by a durable store
pub struct Registry {
    state: Mutex<RegistryState>,
    /// Generation of the last document written to the store
    persisted: Mutex<u64>,
    store: Arc<dyn RegistrationStore>,
    flush_interval: Duration,
}

impl Registry {
    /// Load the registry from the store, creating an empty document if
    /// nothing was persisted yet
    pub async fn open(store: Arc<dyn RegistrationStore>, flush_interval: Duration) -> Result<Self> {
        let document = match store.load().await? {
            Some(document) => {
                log::info!(
                    "Loaded {} registrations for {} users",
                    document.account_count(),
                    document.users.len()
                );
                document
            }
            None => {
                log::info!("No registry found, starting empty");
                let document = RegistryDocument::default();
                store.save(&document).await?;
                document
            }
        };

        Ok(Self {
            state: Mutex::new(RegistryState {
                document,
                generation: 0,
                last_persisted: None,
            }),
            persisted: Mutex::new(0),
            store,
            flush_interval,
        })
    }

    /// Register a device for an account, replacing any previous subscription
    pub async fn upsert<I>(&self, username: &str, account_id: &str, device_token: &str, mailboxes: I)
    where
        I: IntoIterator<Item = MailboxName>,
    {
        self.upsert_at(username, account_id, device_token, mailboxes, Utc::now())
            .await
    }

    /// Like [`Registry::upsert`] with an explicit registration time
    pub async fn upsert_at<I>(
        &self,
        username: &str,
        account_id: &str,
        device_token: &str,
        mailboxes: I,
        registered_at: DateTime<Utc>,
    ) where
        I: IntoIterator<Item = MailboxName>,
    {
        let subscription = Subscription {
            device_token: device_token.to_string(),
            mailboxes: mailboxes.into_iter().collect(),
            registered_at: Some(registered_at),
        };

        let snapshot = {
            let mut state = self.state.lock().await;
            state
                .document
                .users
                .entry(username.to_string())
                .or_default()
                .accounts
                .insert(account_id.to_string(), subscription);
            state.touch();

            let now = Instant::now();
            if state.flush_due(now, self.flush_interval) {
                Some(state.snapshot(now))
            } else {
                log::debug!("Deferring registry write for {}", username);
                None
            }
        };

        if let Some(snapshot) = snapshot {
            self.persist(snapshot).await;
        }
    }

    /// Registrations of `username` that subscribed to `mailbox`
    pub async fn find(&self, username: &str, mailbox: &str) -> Vec<Registration> {
        let state = self.state.lock().await;
        state
            .document
            .users
            .get(username)
            .map(|user| {
                user.accounts
                    .iter()
                    .filter(|(_, subscription)| subscription.contains_mailbox(mailbox))
                    .map(|(account_id, subscription)| {
                        Registration::new(account_id.clone(), subscription.device_token.clone())
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub async fn user_exists(&self, username: &str) -> bool {
        self.state.lock().await.document.users.contains_key(username)
    }

    /// Remove the first account registered with `device_token`
    ///
    /// Returns whether anything was removed. The change is written to the
    /// store right away.
    pub async fn remove_by_device_token(&self, device_token: &str) -> bool {
        let snapshot = {
            let mut state = self.state.lock().await;
            let found = state.document.users.iter().find_map(|(username, user)| {
                user.accounts
                    .iter()
                    .find(|(_, subscription)| subscription.device_token == device_token)
                    .map(|(account_id, _)| (username.clone(), account_id.clone()))
            });

            let Some((username, account_id)) = found else {
                return false;
            };
            state.remove_account(&username, &account_id);
            state.touch();
            log::info!(
                "Removed registration {}/{} for {}",
                account_id,
                device_token,
                username
            );
            state.snapshot(Instant::now())
        };

        self.persist(snapshot).await;
        true
    }

    /// Drop every subscription not renewed within `max_age`
    ///
    /// Subscriptions without a registration time are kept. Returns the number
    /// of removed subscriptions.
    pub async fn sweep_stale(&self, max_age: Duration) -> usize {
        self.sweep_stale_at(max_age, Utc::now()).await
    }

    pub async fn sweep_stale_at(&self, max_age: Duration, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| now.checked_sub_signed(age))
        else {
            log::debug!("Maximum registration age {:?} reaches past any date", max_age);
            return 0;
        };

        let (removed, snapshot) = {
            let mut state = self.state.lock().await;
            let stale: Vec<(Username, AccountId)> = state
                .document
                .users
                .iter()
                .flat_map(|(username, user)| {
                    user.accounts
                        .iter()
                        .filter(move |(_, s)| s.registered_at.is_some_and(|t| t < cutoff))
                        .map(move |(account_id, _)| (username.clone(), account_id.clone()))
                })
                .collect();

            if stale.is_empty() {
                log::debug!("No stale registrations found");
                return 0;
            }

            for (username, account_id) in &stale {
                if let Some(subscription) = state.remove_account(username, account_id) {
                    log::info!(
                        "Removed stale registration {}/{} for {}",
                        account_id,
                        subscription.device_token,
                        username
                    );
                }
            }
            state.touch();
            (stale.len(), state.snapshot(Instant::now()))
        };

        self.persist(snapshot).await;
        removed
    }

    /// Write pending changes to the store regardless of the flush interval
    pub async fn flush(&self) {
        let snapshot = self.state.lock().await.snapshot(Instant::now());
        self.persist(snapshot).await;
    }

    /// Copy of the current document
    pub async fn document(&self) -> RegistryDocument {
        self.state.lock().await.document.clone()
    }

    async fn persist(&self, snapshot: Snapshot) {
        let mut persisted = self.persisted.lock().await;
        if snapshot.generation <= *persisted {
            return;
        }

        match self.store.save(&snapshot.document).await {
            Ok(()) => *persisted = snapshot.generation,
            Err(e) => log::error!("Failed to write registry, keeping it in memory: {}", e),
        }
    }

    /// Periodically remove stale registrations
    pub fn spawn_stale_sweeper(
        self: Arc<Self>,
        interval: Duration,
        max_age: Duration,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                log::debug!(
                    "Checking for registrations not renewed in {} days",
                    max_age.as_secs() / 86_400
                );
                let removed = self.sweep_stale(max_age).await;
                if removed > 0 {
                    log::info!("Removed {} stale registrations", removed);
                }
            }
        })
    }
}
