//! PagePilot library
//!
//! Exposes the page session facade, configuration and CLI plumbing for the
//! binary and for integration testing.

pub mod cli;
pub mod config;
pub mod errors;
pub mod session;

pub use config::{AppConfig, LoggingConfig};
pub use errors::{ConfigError, SessionError};
pub use session::{Browser, PageSession};
