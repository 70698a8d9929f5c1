//! Delivery outcome handling
//!
//! Only a permanently invalid device token changes state: its registration
//! is pruned. Everything else is logged and dropped; a later NOTIFY for the
//! same mailbox will try again.

use std::sync::Arc;

use crate::delivery::DeliveryOutcome;
use crate::error::Result;
use crate::registry::Registry;
use crate::types::Registration;

/// What happened to a registration after a delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Kept,
    Pruned,
}

/// Feeds delivery results back into the registry
#[derive(Clone)]
pub struct OutcomeHandler {
    registry: Arc<Registry>,
}

impl OutcomeHandler {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    pub async fn handle(
        &self,
        registration: &Registration,
        result: Result<DeliveryOutcome>,
    ) -> Disposition {
        match result {
            Ok(DeliveryOutcome::Delivered) => {
                log::debug!(
                    "Delivered notification to {}/{}",
                    registration.account_id,
                    registration.device_token
                );
                Disposition::Kept
            }
            Ok(DeliveryOutcome::PermanentlyInvalid) => {
                log::info!(
                    "Device token for {}/{} is no longer valid",
                    registration.account_id,
                    registration.device_token
                );
                if self
                    .registry
                    .remove_by_device_token(&registration.device_token)
                    .await
                {
                    Disposition::Pruned
                } else {
                    Disposition::Kept
                }
            }
            Ok(DeliveryOutcome::TransientFailure { status, reason }) => {
                log::error!(
                    "Push backend rejected notification to {}/{}: {} {}",
                    registration.account_id,
                    registration.device_token,
                    status,
                    reason.as_deref().unwrap_or("(no reason)")
                );
                Disposition::Kept
            }
            Err(e) => {
                log::error!(
                    "Could not deliver notification to {}/{}: {}",
                    registration.account_id,
                    registration.device_token,
                    e
                );
                Disposition::Kept
            }
        }
    }
}
