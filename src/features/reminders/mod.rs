//! # Reminders Feature
//!
//! One-shot timed reminders: parsing, timers, restart recovery and the
//! create/delete dialogue.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 2.0.0: Conversational create/delete flow, durable restore on startup
//! - 1.0.0: Initial release

pub mod dialogue;
pub mod orchestrator;
pub mod parser;
pub mod restore;
pub mod scheduler;

use chrono::DateTime;
use chrono_tz::Tz;

pub use dialogue::{DialogueState, InterruptPolicy, SessionTable};
pub use orchestrator::{Reply, ReminderOrchestrator};
pub use parser::{format_instant, parse_index, parse_instant, parse_text_and_instant};
pub use restore::{restore_reminders, RestoreReport};
pub use scheduler::{Fired, FiredReceiver, ReminderScheduler, ScheduledReminder, TimerEngine, TimerHandle};

/// Chat identity a reminder or dialogue belongs to
pub type OwnerId = i64;

/// Store-assigned reminder id
pub type ReminderId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub id: ReminderId,
    pub owner_id: OwnerId,
    pub text: String,
    pub fire_at: DateTime<Tz>,
}

impl Reminder {
    /// `"{idx}) {YYYY-MM-DD HH:MM}: {text}"`
    pub fn list_line(&self, position: usize) -> String {
        format!("{position}) {}: {}", format_instant(&self.fire_at), self.text)
    }
}
