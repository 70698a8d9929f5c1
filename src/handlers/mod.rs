//! Built-in control protocol command handlers

pub mod notify;
pub mod register;

pub use notify::NotifyHandler;
pub use register::RegisterHandler;
