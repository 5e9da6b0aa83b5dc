//! LayerAudio delivery server and cross-engine smoke harness
//!
//! The server serves the client-side mixer over plain HTTP behind a TLS
//! terminating proxy and redirects anything that arrived insecurely. The
//! harness drives the mixer in three browser engines over WebDriver.

pub mod cli;
pub mod commands;
pub mod common;
pub mod harness;
pub mod server;
pub mod webdriver;

// Re-export commonly used types for tests
pub use common::{Error, Result};
pub use harness::Engine;
