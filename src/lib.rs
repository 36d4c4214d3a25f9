// Core layer - config, clock, errors, reply helpers
pub mod core;

// Infrastructure
pub mod database;

// Features layer
pub mod features;

// Application layer
pub mod commands;
pub mod service;

pub use core::Config;

pub use features::reminders::{
    DialogueState, InterruptPolicy, Reminder, ReminderOrchestrator, ReminderScheduler, Reply,
};
pub use service::{Inbound, ReminderService, Transport};
