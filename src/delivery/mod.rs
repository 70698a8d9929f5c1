//! Deliverer trait and implementations
//!
//! A Deliverer pushes one wake-up notification to one registration. The
//! payload carries no event detail, only the account the client should
//! resynchronize.

use async_trait::async_trait;
use crate::error::Result;
use crate::types::Registration;

pub mod r#impl;

/// How the push backend answered a single notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Accepted by the backend
    Delivered,
    /// The device token will never accept pushes again
    PermanentlyInvalid,
    /// Rejected for any other reason
    TransientFailure { status: u16, reason: Option<String> },
}

/// Trait for sending push notifications
///
/// An `Err` means the backend could not be reached at all, as opposed to a
/// per-notification rejection which is reported as a [`DeliveryOutcome`].
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, registration: &Registration) -> Result<DeliveryOutcome>;
}
