//! # Core Module
//!
//! Configuration, clock, error taxonomy and reply utilities shared by every
//! feature and transport.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 1.1.0: Add response module for size-capped transports
//! - 1.0.0: Initial creation with config, clock and error modules

pub mod clock;
pub mod config;
pub mod error;
pub mod response;

// Re-export commonly used items
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use error::ReminderError;
pub use response::{split_reply, MESSAGE_LIMIT};
