//! Deliverer implementations

pub mod apns;

pub use apns::{ApnsDeliverer, ApnsEndpoint};
