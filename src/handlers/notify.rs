//! NOTIFY command handler

use async_trait::async_trait;
use crate::command_handler::CommandHandler;
use crate::dispatch_context::DispatchContext;
use crate::error::Result;
use crate::protocol::{Command, Response};
use crate::types::{INBOX, MESSAGE_NEW_EVENT};

/// Handler for the NOTIFY command
///
/// Format:
///
/// ```text
/// NOTIFY dovecot-username="user"<TAB>dovecot-mailbox="INBOX"<TAB>events=("MessageNew")
/// ```
///
/// A `MessageNew` event is pushed immediately, anything else goes through
/// the coalescing delay. Old plugins send no `events` at all; those are
/// treated as new mail.
pub struct NotifyHandler;

impl NotifyHandler {
    pub fn new() -> Self {
        Self
    }

    fn is_urgent(events: Option<&[String]>) -> bool {
        match events {
            Some(events) => events.iter().any(|e| e == MESSAGE_NEW_EVENT),
            None => {
                log::warn!("No events found in NOTIFY message, please update the dovecot plugin");
                true
            }
        }
    }
}

impl Default for NotifyHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CommandHandler for NotifyHandler {
    fn command_name(&self) -> &str {
        "NOTIFY"
    }

    async fn handle(&self, command: &Command, context: &DispatchContext) -> Result<Response> {
        let username = command.string_arg("dovecot-username")?;
        let mailbox = command.string_arg("dovecot-mailbox")?;
        let urgent = Self::is_urgent(command.optional_list_arg("events")?);

        if mailbox != INBOX {
            log::debug!("Ignoring non INBOX event for {}", mailbox);
            return Ok(Response::ok(""));
        }

        let registrations = context.registry.find(username, mailbox).await;
        if registrations.is_empty() {
            if context.registry.user_exists(username).await {
                log::debug!("No device of {} is subscribed to {}", username, mailbox);
            } else {
                log::debug!("No registrations for unknown user {}", username);
            }
        }

        for registration in registrations {
            let submission = context.scheduler.submit(registration, urgent).await;
            log::debug!("NOTIFY for {}: {:?}", username, submission);
        }

        Ok(Response::ok(""))
    }
}
