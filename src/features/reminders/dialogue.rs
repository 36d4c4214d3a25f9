//! # Reminder Dialogue
//!
//! Per-owner conversation state for the multi-step create and delete flows,
//! and the routing rule deciding what an inbound message means in each state.
//!
//! Sessions are in-memory only. A restart silently drops any dialogue in
//! flight; nothing times a stalled dialogue out.
//!
//! - **Version**: 1.1.0
//! - **Since**: 2.0.0
//!
//! ## Changelog
//! - 1.1.0: Configurable handling of non-competing commands mid-dialogue
//! - 1.0.0: Initial release

use dashmap::DashMap;
use log::debug;
use std::str::FromStr;

use super::{OwnerId, ReminderId};
use crate::commands::Command;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DialogueState {
    #[default]
    Idle,
    /// Create flow: waiting for the reminder text
    AwaitingText,
    /// Create flow: text captured, waiting for when
    AwaitingDateTime { text: String },
    /// Delete flow: list shown, waiting for a 1-based position
    AwaitingTargetId,
    /// Delete flow: target resolved, waiting for yes/no
    AwaitingConfirmation { target: ReminderId, position: usize },
}

impl DialogueState {
    pub fn is_idle(&self) -> bool {
        matches!(self, DialogueState::Idle)
    }

    /// Question asked of the owner while in this state
    pub fn prompt(&self) -> Option<String> {
        match self {
            DialogueState::Idle => None,
            DialogueState::AwaitingText => Some("What should I remind you about?".to_string()),
            DialogueState::AwaitingDateTime { .. } => Some(
                "When should I remind you? Send YYYY-MM-DD HH:MM or HH:MM.".to_string(),
            ),
            DialogueState::AwaitingTargetId => {
                Some("Send the number of the reminder you want to delete.".to_string())
            }
            DialogueState::AwaitingConfirmation { position, .. } => {
                Some(format!("Delete reminder {position}? (yes/no)"))
            }
        }
    }
}

/// What happens to `/list`, `/help` and `/start` while a dialogue is open.
///
/// Competing triggers (`/remind`, `/cancel`) always re-prompt regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptPolicy {
    /// Swallow the command and repeat the current question
    #[default]
    Reprompt,
    /// Answer the command and leave the dialogue where it was
    Honor,
}

impl FromStr for InterruptPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "reprompt" | "ignore" => Ok(InterruptPolicy::Reprompt),
            "honor" | "honour" | "allow" => Ok(InterruptPolicy::Honor),
            _ => Err(anyhow::anyhow!("Invalid interrupt policy: {}", s)),
        }
    }
}

/// Outcome of routing one message against the owner's current state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Handle as a top-level command
    Command(Command),
    /// Feed the text to the current dialogue step
    Step(String),
    /// Repeat the current question, state unchanged
    Reprompt,
    /// Drop the dialogue
    Abort,
}

pub fn route(state: &DialogueState, command: Command, policy: InterruptPolicy) -> Route {
    if state.is_idle() {
        return Route::Command(command);
    }

    match command {
        Command::Stop => Route::Abort,
        Command::Text(text) => Route::Step(text),
        Command::Remind(_) | Command::Cancel(_) => Route::Reprompt,
        other => match policy {
            InterruptPolicy::Reprompt => Route::Reprompt,
            InterruptPolicy::Honor => Route::Command(other),
        },
    }
}

/// Replies accepted as "yes" at the confirmation step
pub fn is_affirmative(reply: &str) -> bool {
    matches!(
        reply.trim().to_lowercase().as_str(),
        "yes" | "y" | "да" | "д"
    )
}

/// Dialogue state per owner. Idle owners have no entry.
#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: DashMap<OwnerId, DialogueState>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, owner: OwnerId) -> DialogueState {
        self.sessions
            .get(&owner)
            .map(|s| s.value().clone())
            .unwrap_or_default()
    }

    pub fn set(&self, owner: OwnerId, state: DialogueState) {
        debug!("Owner {owner} -> {state:?}");
        if state.is_idle() {
            self.sessions.remove(&owner);
        } else {
            self.sessions.insert(owner, state);
        }
    }

    pub fn clear(&self, owner: OwnerId) {
        self.set(owner, DialogueState::Idle);
    }

    /// Owners with a dialogue in progress
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }
}
