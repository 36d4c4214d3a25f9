//! # Reminder Orchestrator
//!
//! Owns the store, scheduler and session table and exposes the reminder
//! lifecycle to transports: create, list, cancel, timer delivery and startup
//! restore. Every failure is turned into a [`Reply`] here; nothing propagates
//! past a single interaction.
//!
//! A delivered reminder's row is not removed by the firing itself unless
//! `purge_on_fire` is set. Otherwise it stays listed until the next restore
//! prunes it.
//!
//! - **Version**: 2.0.0
//! - **Since**: 2.0.0

use anyhow::Result;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use std::sync::Arc;

use super::dialogue::{is_affirmative, route, DialogueState, InterruptPolicy, Route, SessionTable};
use super::parser::{format_instant, parse_index, parse_instant, parse_text_and_instant};
use super::restore::{restore_reminders, RestoreReport};
use super::scheduler::{Fired, ReminderScheduler, ScheduledReminder, TimerHandle};
use super::{OwnerId, Reminder, ReminderId};
use crate::commands::{Command, HELP_TEXT, START_TEXT};
use crate::core::{split_reply, Clock, ReminderError, MESSAGE_LIMIT};
use crate::database::Database;
use crate::service::Transport;

const NO_REMINDERS: &str = "You have no reminders.";

/// Text to send back to the owner, plus the failure that produced it if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub error: Option<ReminderError>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Reply {
            text: text.into(),
            error: None,
        }
    }

    pub fn failure(error: ReminderError) -> Self {
        Reply {
            text: error.user_message(),
            error: Some(error),
        }
    }

    /// Failure message followed by the question being repeated
    fn failure_then(error: ReminderError, prompt: Option<String>) -> Self {
        let mut reply = Reply::failure(error);
        if let Some(prompt) = prompt {
            reply.text.push('\n');
            reply.text.push_str(&prompt);
        }
        reply
    }
}

pub struct ReminderOrchestrator {
    database: Database,
    scheduler: ReminderScheduler,
    sessions: SessionTable,
    armed: DashMap<ReminderId, TimerHandle>,
    clock: Arc<dyn Clock>,
    interrupt_policy: InterruptPolicy,
    purge_on_fire: bool,
}

impl ReminderOrchestrator {
    pub fn new(
        database: Database,
        scheduler: ReminderScheduler,
        sessions: SessionTable,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            database,
            scheduler,
            sessions,
            armed: DashMap::new(),
            clock,
            interrupt_policy: InterruptPolicy::default(),
            purge_on_fire: false,
        }
    }

    pub fn with_interrupt_policy(mut self, policy: InterruptPolicy) -> Self {
        self.interrupt_policy = policy;
        self
    }

    pub fn with_purge_on_fire(mut self, purge: bool) -> Self {
        self.purge_on_fire = purge;
        self
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    pub fn sessions(&self) -> &SessionTable {
        &self.sessions
    }

    /// Timer currently armed for a reminder, if any
    pub fn timer_for(&self, id: ReminderId) -> Option<TimerHandle> {
        self.armed.get(&id).map(|h| *h.value())
    }

    fn timezone(&self) -> Tz {
        self.database.timezone()
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Re-arm future reminders and prune past ones. Replaces any timers armed
    /// by an earlier restore, so running it again is harmless.
    pub async fn restore(&self) -> Result<RestoreReport> {
        let previous: Vec<TimerHandle> = self.armed.iter().map(|e| *e.value()).collect();
        for handle in previous {
            self.scheduler.cancel(handle);
        }
        self.armed.clear();

        let report = restore_reminders(&self.database, &self.scheduler, self.now()).await?;
        for (id, handle) in &report.armed {
            self.armed.insert(*id, *handle);
        }
        Ok(report)
    }

    /// Route one inbound message through the owner's dialogue
    pub async fn handle_message(&self, owner: OwnerId, raw: &str) -> Reply {
        let command = Command::parse(raw);
        let state = self.sessions.state(owner);
        debug!("Owner {owner} in {state:?} sent {}", command.name());

        match route(&state, command, self.interrupt_policy) {
            Route::Command(command) => self.dispatch(owner, command).await,
            Route::Step(text) => self.on_text_input(owner, &text).await,
            Route::Reprompt => {
                let prompt = state.prompt().unwrap_or_default();
                Reply::text(format!(
                    "Let's finish this first (or send /stop to abandon it).\n{prompt}"
                ))
            }
            Route::Abort => {
                self.sessions.clear(owner);
                info!("Owner {owner} abandoned dialogue at {state:?}");
                Reply::text("Okay, abandoned.")
            }
        }
    }

    async fn dispatch(&self, owner: OwnerId, command: Command) -> Reply {
        match command {
            Command::Start => Reply::text(START_TEXT),
            Command::Help => Reply::text(HELP_TEXT),
            Command::Remind(args) => self.on_create_trigger(owner, args.as_deref()).await,
            Command::List => self.on_list_request(owner).await,
            Command::Cancel(args) => self.on_cancel_trigger(owner, args.as_deref()).await,
            Command::Stop => Reply::text("There is nothing to stop."),
            Command::Unknown(name) => Reply::text(format!(
                "Unknown command {name}. Use /help to see available commands."
            )),
            Command::Text(_) => {
                Reply::text("Send /remind to create a reminder or /help to see all commands.")
            }
        }
    }

    /// Start the create flow, or create directly from `"<text> <when>"`
    pub async fn on_create_trigger(&self, owner: OwnerId, args: Option<&str>) -> Reply {
        let Some(args) = args else {
            let next = DialogueState::AwaitingText;
            let prompt = next.prompt().unwrap_or_default();
            self.sessions.set(owner, next);
            return Reply::text(prompt);
        };

        match parse_text_and_instant(args, self.now(), self.timezone()) {
            Ok((text, fire_at)) => self.create_reply(owner, &text, fire_at).await,
            Err(e) => {
                debug!("Owner {owner} one-shot remind rejected: {e}");
                Reply::failure(e)
            }
        }
    }

    /// Feed free text to whatever step the owner's dialogue is on
    pub async fn on_text_input(&self, owner: OwnerId, raw: &str) -> Reply {
        let state = self.sessions.state(owner);
        match state {
            DialogueState::Idle => self.dispatch(owner, Command::Text(raw.to_string())).await,

            DialogueState::AwaitingText => {
                let text = raw.trim();
                if text.is_empty() {
                    return Reply::failure_then(ReminderError::EmptyText, state.prompt());
                }
                let next = DialogueState::AwaitingDateTime {
                    text: text.to_string(),
                };
                let prompt = next.prompt().unwrap_or_default();
                self.sessions.set(owner, next);
                Reply::text(prompt)
            }

            DialogueState::AwaitingDateTime { ref text } => {
                match parse_instant(raw, self.now(), self.timezone()) {
                    Ok(fire_at) => {
                        let text = text.clone();
                        self.sessions.clear(owner);
                        self.create_reply(owner, &text, fire_at).await
                    }
                    Err(e) if e.reprompts() => {
                        debug!("Owner {owner} gave unusable time {raw:?}: {e}");
                        Reply::failure_then(e, state.prompt())
                    }
                    Err(e) => {
                        self.sessions.clear(owner);
                        Reply::failure(e)
                    }
                }
            }

            DialogueState::AwaitingTargetId => {
                let reminders = match self.database.list_reminders(owner).await {
                    Ok(reminders) => reminders,
                    Err(e) => return self.storage_failure(owner, e),
                };
                if reminders.is_empty() {
                    self.sessions.clear(owner);
                    return Reply::text(NO_REMINDERS);
                }

                match parse_index(raw, reminders.len()) {
                    Ok(position) => {
                        let target = &reminders[position - 1];
                        self.sessions.set(
                            owner,
                            DialogueState::AwaitingConfirmation {
                                target: target.id,
                                position,
                            },
                        );
                        Reply::text(format!(
                            "Delete {}? (yes/no)",
                            target.list_line(position)
                        ))
                    }
                    Err(e) => Reply::failure_then(e, state.prompt()),
                }
            }

            DialogueState::AwaitingConfirmation { target, position } => {
                self.sessions.clear(owner);
                if !is_affirmative(raw) {
                    info!("Owner {owner} declined deleting reminder {target}");
                    return Reply::text("Okay, nothing was deleted.");
                }
                self.cancel_reply(target, position).await
            }
        }
    }

    /// The owner's reminders as `"{idx}) {YYYY-MM-DD HH:MM}: {text}"`, insertion order
    pub async fn on_list_request(&self, owner: OwnerId) -> Reply {
        match self.database.list_reminders(owner).await {
            Ok(reminders) if reminders.is_empty() => Reply::text(NO_REMINDERS),
            Ok(reminders) => Reply::text(format!("Your reminders:\n{}", render_list(&reminders))),
            Err(e) => self.storage_failure(owner, e),
        }
    }

    /// Start the delete flow, or delete the `n`-th listed reminder directly
    pub async fn on_cancel_trigger(&self, owner: OwnerId, args: Option<&str>) -> Reply {
        let reminders = match self.database.list_reminders(owner).await {
            Ok(reminders) => reminders,
            Err(e) => return self.storage_failure(owner, e),
        };

        let Some(args) = args else {
            if reminders.is_empty() {
                return Reply::text(NO_REMINDERS);
            }
            let next = DialogueState::AwaitingTargetId;
            let prompt = next.prompt().unwrap_or_default();
            self.sessions.set(owner, next);
            return Reply::text(format!("{}\n{prompt}", render_list(&reminders)));
        };

        let position = match parse_index(args, reminders.len()) {
            Ok(position) => position,
            Err(e) => return Reply::failure(e),
        };
        self.cancel_reply(reminders[position - 1].id, position).await
    }

    /// Persist and arm a reminder
    pub async fn create(
        &self,
        owner: OwnerId,
        text: &str,
        fire_at: DateTime<Tz>,
    ) -> Result<Reminder, ReminderError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ReminderError::EmptyText);
        }
        let fire_at = fire_at.with_timezone(&self.timezone());
        if fire_at <= self.now().with_timezone(&self.timezone()) {
            return Err(ReminderError::PastInstant);
        }

        let id = self.database.insert_reminder(owner, text, fire_at).await?;
        let reminder = Reminder {
            id,
            owner_id: owner,
            text: text.to_string(),
            fire_at,
        };
        let handle = self
            .scheduler
            .arm(fire_at, ScheduledReminder::from(&reminder));
        self.armed.insert(id, handle);

        info!(
            "Created reminder {id} for owner {owner}: {text} at {}",
            format_instant(&fire_at)
        );
        Ok(reminder)
    }

    /// Delete a reminder and revoke its timer. Returns false if it was already gone.
    pub async fn cancel(&self, id: ReminderId) -> Result<bool, ReminderError> {
        let existed = self.database.delete_reminder(id).await?;
        if let Some((_, handle)) = self.armed.remove(&id) {
            self.scheduler.cancel(handle);
        }
        info!("Cancelled reminder {id} (existed: {existed})");
        Ok(existed)
    }

    /// Timer callback: deliver `"Reminder: {text}"` to the owner.
    ///
    /// A send failure is returned as [`ReminderError::Delivery`] but the
    /// reminder still counts as fired.
    pub async fn on_timer_fired(
        &self,
        fired: Fired<ScheduledReminder>,
        transport: &dyn Transport,
    ) -> Result<(), ReminderError> {
        let Fired { handle, payload } = fired;
        if !self.scheduler.claim(handle) {
            debug!("Skipping {handle}: cancelled after it came due");
            return Ok(());
        }
        self.armed
            .remove_if(&payload.reminder_id, |_, armed| *armed == handle);

        info!(
            "Delivering reminder {} to owner {}",
            payload.reminder_id, payload.owner_id
        );
        let mut result = Ok(());
        for chunk in split_reply(&format!("Reminder: {}", payload.text), MESSAGE_LIMIT) {
            if let Err(e) = transport.send(payload.owner_id, &chunk).await {
                result = Err(ReminderError::Delivery(e.to_string()));
                break;
            }
        }

        if self.purge_on_fire {
            if let Err(e) = self.database.delete_reminder(payload.reminder_id).await {
                warn!(
                    "Failed to purge fired reminder {}: {e}",
                    payload.reminder_id
                );
            }
        }
        result
    }

    async fn create_reply(&self, owner: OwnerId, text: &str, fire_at: DateTime<Tz>) -> Reply {
        match self.create(owner, text, fire_at).await {
            Ok(reminder) => Reply::text(format!(
                "Reminder set: {} at {}",
                reminder.text,
                format_instant(&reminder.fire_at)
            )),
            Err(e) => {
                if let ReminderError::Storage(ref msg) = e {
                    error!("Failed to create reminder for owner {owner}: {msg}");
                }
                Reply::failure(e)
            }
        }
    }

    async fn cancel_reply(&self, id: ReminderId, position: usize) -> Reply {
        match self.cancel(id).await {
            Ok(true) => Reply::text(format!("Reminder {position} deleted.")),
            Ok(false) => Reply::text("That reminder no longer exists."),
            Err(e) => Reply::failure(e),
        }
    }

    fn storage_failure(&self, owner: OwnerId, err: anyhow::Error) -> Reply {
        error!("Store failure for owner {owner}: {err}");
        self.sessions.clear(owner);
        Reply::failure(ReminderError::from(err))
    }
}

fn render_list(reminders: &[Reminder]) -> String {
    reminders
        .iter()
        .enumerate()
        .map(|(i, r)| r.list_line(i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}
