//! Shared handles passed to command handlers and connection tasks

use std::sync::Arc;

use crate::registry::Registry;
use crate::scheduler::Scheduler;

/// Context provided to command handlers
///
/// Cloned into every connection task; all state lives behind the `Arc`s.
#[derive(Clone)]
pub struct DispatchContext {
    pub registry: Arc<Registry>,
    pub scheduler: Arc<Scheduler>,
    /// Push topic returned to clients on REGISTER
    pub topic: String,
}

impl DispatchContext {
    pub fn new(registry: Arc<Registry>, scheduler: Arc<Scheduler>, topic: impl Into<String>) -> Self {
        Self {
            registry,
            scheduler,
            topic: topic.into(),
        }
    }
}
