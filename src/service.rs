//! # Reminder Service
//!
//! Startup, the single event loop, and teardown.
//!
//! Startup order is store, scheduler, restore, and only then the transport.
//! Teardown runs the other way round. Inbound messages and fired timers are
//! drained by one `select!` loop, so a dialogue step and a timer callback
//! never interleave. Each unit of work runs in its own task and is awaited
//! there, which turns a panic into a logged error instead of a dead loop.
//!
//! - **Version**: 1.0.0
//! - **Since**: 2.0.0

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::{split_reply, Clock, Config, MESSAGE_LIMIT};
use crate::database::Database;
use crate::features::reminders::{
    Fired, FiredReceiver, OwnerId, ReminderOrchestrator, ReminderScheduler, ScheduledReminder,
    SessionTable,
};

const INTERNAL_ERROR_REPLY: &str = "Sorry, something went wrong. Please try again.";

/// Outbound side of a chat integration
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, owner: OwnerId, text: &str) -> Result<()>;
}

/// A message received from an owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub owner: OwnerId,
    pub text: String,
}

impl Inbound {
    pub fn new(owner: OwnerId, text: impl Into<String>) -> Self {
        Self {
            owner,
            text: text.into(),
        }
    }
}

pub struct ReminderService {
    orchestrator: Arc<ReminderOrchestrator>,
    fired: FiredReceiver<ScheduledReminder>,
}

impl ReminderService {
    /// Open the store, start the scheduler and restore persisted reminders
    pub async fn open(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        let database = Database::new(&config.database_path, config.timezone).await?;
        info!(
            "Reminder store opened at {} ({})",
            config.database_path, config.timezone
        );

        let (scheduler, fired) = ReminderScheduler::new(clock.clone());
        let orchestrator =
            ReminderOrchestrator::new(database, scheduler, SessionTable::new(), clock)
                .with_interrupt_policy(config.interrupt_policy)
                .with_purge_on_fire(config.purge_on_fire);

        let report = orchestrator.restore().await?;
        info!(
            "Startup restore: {} reminders armed, {} past-due pruned",
            report.armed.len(),
            report.pruned.len()
        );

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            fired,
        })
    }

    pub fn orchestrator(&self) -> Arc<ReminderOrchestrator> {
        self.orchestrator.clone()
    }

    /// Serve until the inbound channel closes, then stop the scheduler
    pub async fn run(
        self,
        transport: Arc<dyn Transport>,
        mut inbound: mpsc::Receiver<Inbound>,
    ) -> Result<()> {
        let Self {
            orchestrator,
            mut fired,
        } = self;
        info!("Reminder service running");

        loop {
            tokio::select! {
                message = inbound.recv() => match message {
                    Some(message) => handle_inbound(&orchestrator, &transport, message).await,
                    None => {
                        info!("Transport detached, shutting down");
                        break;
                    }
                },
                Some(timer) = fired.recv() => handle_fired(&orchestrator, &transport, timer).await,
            }
        }

        orchestrator.scheduler().shutdown();
        info!(
            "Reminder service stopped ({} dialogues dropped)",
            orchestrator.sessions().active_count()
        );
        Ok(())
    }
}

async fn handle_inbound(
    orchestrator: &Arc<ReminderOrchestrator>,
    transport: &Arc<dyn Transport>,
    message: Inbound,
) {
    let request_id = Uuid::new_v4();
    let Inbound { owner, text } = message;
    debug!("[{request_id}] Message from owner {owner} ({} chars)", text.len());

    let handler = orchestrator.clone();
    let reply = match tokio::spawn(async move { handler.handle_message(owner, &text).await }).await
    {
        Ok(reply) => {
            if let Some(e) = &reply.error {
                debug!("[{request_id}] Interaction failed: {e}");
            }
            reply.text
        }
        Err(e) => {
            error!("[{request_id}] Message handler crashed: {e}");
            INTERNAL_ERROR_REPLY.to_string()
        }
    };

    for chunk in split_reply(&reply, MESSAGE_LIMIT) {
        if let Err(e) = transport.send(owner, &chunk).await {
            warn!("[{request_id}] Failed to reply to owner {owner}: {e}");
            break;
        }
    }
}

async fn handle_fired(
    orchestrator: &Arc<ReminderOrchestrator>,
    transport: &Arc<dyn Transport>,
    timer: Fired<ScheduledReminder>,
) {
    let handle = timer.handle;
    let reminder_id = timer.payload.reminder_id;
    let orchestrator = orchestrator.clone();
    let transport = transport.clone();

    let outcome =
        tokio::spawn(async move { orchestrator.on_timer_fired(timer, transport.as_ref()).await })
            .await;
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("Reminder {reminder_id} ({handle}) not delivered: {e}"),
        Err(e) => error!("Timer callback for reminder {reminder_id} ({handle}) crashed: {e}"),
    }
}
