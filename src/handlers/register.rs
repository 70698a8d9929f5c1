//! REGISTER command handler

use async_trait::async_trait;
use crate::command_handler::CommandHandler;
use crate::dispatch_context::DispatchContext;
use crate::error::Result;
use crate::protocol::{Command, Response};
use crate::types::MAIL_SUBTOPIC;

/// Handler for the REGISTER command
///
/// Format:
///
/// ```text
/// REGISTER aps-account-id="AAA"<TAB>aps-device-token="BBB"<TAB>aps-subtopic="com.apple.mobilemail"<TAB>dovecot-username="user"<TAB>dovecot-mailboxes=("INBOX","Notes")
/// ```
///
/// Replaces the device's subscription for the account and answers with the
/// push topic the client must listen on.
pub struct RegisterHandler;

impl RegisterHandler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RegisterHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandHandler for RegisterHandler {
    fn command_name(&self) -> &str {
        "REGISTER"
    }

    async fn handle(&self, command: &Command, context: &DispatchContext) -> Result<Response> {
        let subtopic = command.string_arg("aps-subtopic")?;
        if subtopic != MAIL_SUBTOPIC {
            return Ok(Response::error("Unknown aps-subtopic"));
        }

        let account_id = command.string_arg("aps-account-id")?;
        let device_token = command.string_arg("aps-device-token")?;
        let username = command.string_arg("dovecot-username")?;
        let mailboxes = command.list_arg("dovecot-mailboxes")?;

        log::info!(
            "Registering {}/{} for {} on {:?}",
            account_id,
            device_token,
            username,
            mailboxes
        );
        context
            .registry
            .upsert(username, account_id, device_token, mailboxes.iter().cloned())
            .await;

        Ok(Response::ok(context.topic.clone()))
    }
}
