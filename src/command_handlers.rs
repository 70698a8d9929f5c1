//! Command handler registry for control protocol commands
//!
//! Maps command names to handlers and turns handler failures into
//! `ERROR` responses, so a bad request never ends the connection.

use std::collections::HashMap;
use std::sync::Arc;

use crate::command_handler::CommandHandler;
use crate::dispatch_context::DispatchContext;
use crate::error::{Error, Result};
use crate::handlers::{NotifyHandler, RegisterHandler};
use crate::protocol::{Command, Response};

/// Registry of command handlers
///
/// Command names are matched exactly; the plugin always sends them in
/// upper case.
#[derive(Clone)]
pub struct CommandHandlers {
    handlers: HashMap<String, Arc<dyn CommandHandler>>,
}

impl CommandHandlers {
    /// Create a new empty command handler registry
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with the REGISTER and NOTIFY handlers installed
    pub fn with_defaults() -> Self {
        let mut handlers = Self::new();
        handlers.handlers.insert("REGISTER".to_string(), Arc::new(RegisterHandler::new()));
        handlers.handlers.insert("NOTIFY".to_string(), Arc::new(NotifyHandler::new()));
        handlers
    }

    /// Register a command handler
    ///
    /// Fails if a handler with the same name is already registered.
    pub fn register(&mut self, handler: Arc<dyn CommandHandler>) -> Result<()> {
        let name = handler.command_name().to_string();

        if self.handlers.contains_key(&name) {
            return Err(Error::Internal(format!(
                "Command handler already registered: {}",
                name
            )));
        }

        self.handlers.insert(name, handler);
        Ok(())
    }

    pub fn get(&self, command_name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.handlers.get(command_name).cloned()
    }

    /// Handle a command by dispatching to the appropriate handler
    pub async fn handle(&self, command: &Command, context: &DispatchContext) -> Response {
        match self.get(&command.name) {
            Some(handler) => match handler.handle(command, context).await {
                Ok(response) => response,
                Err(e) => Response::error(e.to_string()),
            },
            None => {
                log::debug!("Unknown command {}", command.name);
                Response::error("Unknown command")
            }
        }
    }

    /// List all registered command names
    pub fn list_commands(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn has_command(&self, command_name: &str) -> bool {
        self.handlers.contains_key(command_name)
    }
}

impl Default for CommandHandlers {
    fn default() -> Self {
        Self::with_defaults()
    }
}
