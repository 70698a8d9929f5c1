//! In-memory registration store

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::store::RegistrationStore;
use crate::types::RegistryDocument;

/// Keeps the document in process memory
///
/// Nothing survives a restart. Useful for tests and for running without a
/// writable data directory.
#[derive(Default)]
pub struct MemoryStore {
    document: Mutex<Option<RegistryDocument>>,
    saves: AtomicUsize,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already persisted document
    pub fn with_document(document: RegistryDocument) -> Self {
        Self {
            document: Mutex::new(Some(document)),
            ..Self::default()
        }
    }

    /// Number of successful saves so far
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    /// The last saved document
    pub async fn document(&self) -> Option<RegistryDocument> {
        self.document.lock().await.clone()
    }

    /// Make subsequent saves fail, simulating an unwritable disk
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl RegistrationStore for MemoryStore {
    async fn load(&self) -> Result<Option<RegistryDocument>> {
        Ok(self.document.lock().await.clone())
    }

    async fn save(&self, document: &RegistryDocument) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(Error::Store("simulated write failure".to_string()));
        }
        *self.document.lock().await = Some(document.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
