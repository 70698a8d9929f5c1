//! RegistrationStore trait and implementations
//!
//! The RegistrationStore is the durable mirror of the in-memory registry.
//! It persists one document keyed by username; the registry decides when
//! to write it.

use async_trait::async_trait;
use crate::error::Result;
use crate::types::RegistryDocument;

pub mod r#impl;

/// Trait for persisting the registration document
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Load the persisted document, `None` if nothing was stored yet
    async fn load(&self) -> Result<Option<RegistryDocument>>;

    /// Replace the persisted document
    ///
    /// Implementations must replace atomically: a crash mid-save leaves
    /// the previous document intact.
    async fn save(&self, document: &RegistryDocument) -> Result<()>;
}
