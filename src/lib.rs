//! mailpush - push notification bridge between Dovecot and APNs
//!
//! The mail server's push plugin connects to a local control socket and
//! sends `REGISTER` requests when a device subscribes and `NOTIFY` requests
//! when a mailbox changes. Registrations live in a [`Registry`] mirrored to
//! a [`RegistrationStore`]; notifications go through the coalescing
//! [`Scheduler`] to a [`Deliverer`].

pub mod error;
pub mod types;
pub mod protocol;
pub mod config;
pub mod store;
pub mod registry;
pub mod delivery;
pub mod outcome;
pub mod scheduler;
pub mod connection;
pub mod server;
pub mod session;
pub mod command_handler;
pub mod command_handlers;
pub mod handlers;
pub mod dispatch_context;

pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use store::RegistrationStore;
pub use registry::Registry;
pub use delivery::{Deliverer, DeliveryOutcome};
pub use outcome::{Disposition, OutcomeHandler};
pub use scheduler::{Scheduler, Submission};
pub use server::PushServer;
pub use command_handler::CommandHandler;
pub use command_handlers::CommandHandlers;
pub use dispatch_context::DispatchContext;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod tests;
