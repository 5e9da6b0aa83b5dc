//! W3C WebDriver implementation
//!
//! Spawns driver servers, talks to them over HTTP and, where offered,
//! listens to their BiDi log events.

mod bidi;
mod client;
mod driver;
mod types;

pub use bidi::{LogEntry, LogSubscription, LOG_ENTRY_ADDED};
pub use client::WebDriverClient;
pub use driver::{free_port, resolve_driver, DriverProcess};
pub use types::*;
