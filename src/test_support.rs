//! Helpers shared by unit tests

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::delivery::{Deliverer, DeliveryOutcome};
use crate::dispatch_context::DispatchContext;
use crate::error::Result;
use crate::outcome::OutcomeHandler;
use crate::registry::{Registry, DEFAULT_FLUSH_INTERVAL};
use crate::scheduler::{Scheduler, DEFAULT_DELAY};
use crate::store::r#impl::MemoryStore;
use crate::types::Registration;

/// Deliverer that records every call and answers with a fixed outcome
pub struct RecordingDeliverer {
    delivered: Mutex<Vec<Registration>>,
    outcome: DeliveryOutcome,
}

impl RecordingDeliverer {
    pub fn new() -> Self {
        Self::with_outcome(DeliveryOutcome::Delivered)
    }

    pub fn with_outcome(outcome: DeliveryOutcome) -> Self {
        Self {
            delivered: Mutex::new(Vec::new()),
            outcome,
        }
    }

    pub fn delivered(&self) -> Vec<Registration> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl Deliverer for RecordingDeliverer {
    async fn deliver(&self, registration: &Registration) -> Result<DeliveryOutcome> {
        self.delivered.lock().unwrap().push(registration.clone());
        Ok(self.outcome.clone())
    }
}

pub async fn memory_registry() -> Arc<Registry> {
    Arc::new(
        Registry::open(Arc::new(MemoryStore::new()), DEFAULT_FLUSH_INTERVAL)
            .await
            .unwrap(),
    )
}

/// A dispatch context over an in-memory registry
pub async fn dispatch_context(deliverer: Arc<RecordingDeliverer>) -> DispatchContext {
    let registry = memory_registry().await;
    let scheduler = Arc::new(Scheduler::new(
        deliverer,
        OutcomeHandler::new(Arc::clone(&registry)),
        DEFAULT_DELAY,
    ));
    DispatchContext::new(registry, scheduler, "com.apple.mail.XServer.test")
}
