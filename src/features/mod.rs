//! # Features
//!
//! Each feature is a self-contained module under this directory.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0

pub mod reminders;
