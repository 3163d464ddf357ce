//! # stardust_core
//!
//! Session, resilient request and filter state core for the Stardust
//! marketplace client.

pub mod api;
pub mod client;
pub mod config;
pub mod context;
pub mod filters;
pub mod hierarchy;
pub mod identifier;
pub mod models;
pub mod session;
pub mod store;
pub mod transport;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
