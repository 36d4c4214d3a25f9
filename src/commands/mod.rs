//! # Command System
//!
//! Classifies inbound chat text into commands. Anything not starting with `/`
//! is plain text and only means something inside a dialogue.
//!
//! - **Version**: 3.0.0
//! - **Since**: 0.2.0
//! - **Toggleable**: false
//!
//! ## Changelog
//! - 3.0.0: Text commands for the reminder dialogue (/remind, /list, /cancel, /stop)
//! - 2.0.0: Remove bang commands
//! - 1.0.0: Initial reorganization with modular command structure

pub mod help;

pub use help::{HELP_TEXT, START_TEXT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// `/remind [text when]`
    Remind(Option<String>),
    List,
    /// `/cancel [n]`
    Cancel(Option<String>),
    Stop,
    Unknown(String),
    /// Not a command
    Text(String),
}

impl Command {
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if !trimmed.starts_with('/') {
            return Command::Text(trimmed.to_string());
        }

        let (head, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (trimmed, ""),
        };
        // Tolerate `/remind@my_bot` addressing
        let name = head.split('@').next().unwrap_or(head).to_lowercase();
        let args = (!rest.is_empty()).then(|| rest.to_string());

        match name.as_str() {
            "/start" => Command::Start,
            "/help" => Command::Help,
            "/remind" => Command::Remind(args),
            "/list" => Command::List,
            "/cancel" => Command::Cancel(args),
            "/stop" => Command::Stop,
            _ => Command::Unknown(head.to_string()),
        }
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Help => "help",
            Command::Remind(_) => "remind",
            Command::List => "list",
            Command::Cancel(_) => "cancel",
            Command::Stop => "stop",
            Command::Unknown(_) => "unknown",
            Command::Text(_) => "text",
        }
    }
}
