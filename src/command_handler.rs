//! Command handler trait for control protocol commands

use async_trait::async_trait;
use crate::dispatch_context::DispatchContext;
use crate::error::Result;
use crate::protocol::{Command, Response};

/// Trait for handling control protocol commands
///
/// An `Err` returned from `handle` is reported to the client as
/// `ERROR <message>`; the connection stays open.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// The name of the command this handler processes (e.g. "REGISTER")
    fn command_name(&self) -> &str;

    async fn handle(&self, command: &Command, context: &DispatchContext) -> Result<Response>;
}
