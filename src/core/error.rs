//! # Reminder Errors
//!
//! Recoverable failures surfaced to the owner of a conversation. None of these
//! escape a single interaction; the orchestrator turns each into a reply.
//!
//! - **Version**: 1.0.0
//! - **Since**: 1.0.0

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReminderError {
    /// Input matches neither `YYYY-MM-DD HH:MM` nor `HH:MM`
    #[error("unrecognised date/time: {0}")]
    Format(String),

    /// Resolved instant is not strictly after now
    #[error("instant is not in the future")]
    PastInstant,

    /// Selection outside `1..=len`
    #[error("index {index} outside 1..={len}")]
    Range { index: u64, len: usize },

    /// Non-numeric input where a number was required
    #[error("expected a number, got {0:?}")]
    Type(String),

    #[error("reminder text is empty")]
    EmptyText,

    /// Outbound send failed at fire time
    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("storage failure: {0}")]
    Storage(String),
}

impl ReminderError {
    /// Text shown to the owner for this failure
    pub fn user_message(&self) -> String {
        match self {
            ReminderError::Format(_) => {
                "Invalid date/time format. Use YYYY-MM-DD HH:MM or HH:MM.".to_string()
            }
            ReminderError::PastInstant => {
                "That date and time has already passed. Please give a future date and time."
                    .to_string()
            }
            ReminderError::Range { index, .. } => {
                format!("There is no reminder number {index}.")
            }
            ReminderError::Type(_) => "The reminder number must be a number.".to_string(),
            ReminderError::EmptyText => "The reminder text must not be empty.".to_string(),
            ReminderError::Delivery(_) => "Could not deliver the reminder.".to_string(),
            ReminderError::Storage(_) => {
                "Something went wrong saving your reminders. Please try again later.".to_string()
            }
        }
    }

    /// Whether the dialogue stays on the same step after this error
    pub fn reprompts(&self) -> bool {
        !matches!(
            self,
            ReminderError::Storage(_) | ReminderError::Delivery(_)
        )
    }
}

impl From<anyhow::Error> for ReminderError {
    fn from(err: anyhow::Error) -> Self {
        ReminderError::Storage(err.to_string())
    }
}
