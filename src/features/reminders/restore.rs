//! # Startup Restore
//!
//! Rebuilds the in-memory timers from the store. Every row whose instant is
//! still ahead is re-armed; every row at or before now is pruned. A reminder
//! that came due while the process was down is dropped without a late
//! notification.
//!
//! - **Version**: 1.0.0
//! - **Since**: 2.0.0

use anyhow::Result;
use chrono::{DateTime, Utc};
use log::info;
use std::collections::BTreeSet;

use super::parser::format_instant;
use super::scheduler::{ReminderScheduler, ScheduledReminder, TimerHandle};
use super::{OwnerId, ReminderId};
use crate::database::Database;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RestoreReport {
    /// Re-armed reminders and their new timers
    pub armed: Vec<(ReminderId, TimerHandle)>,
    /// Ids removed as past due
    pub pruned: Vec<ReminderId>,
}

pub async fn restore_reminders(
    database: &Database,
    scheduler: &ReminderScheduler,
    now: DateTime<Utc>,
) -> Result<RestoreReport> {
    let now = now.with_timezone(&database.timezone());
    let mut report = RestoreReport::default();
    let mut owners_with_past_rows: BTreeSet<OwnerId> = BTreeSet::new();

    for reminder in database.all_reminders().await? {
        if reminder.fire_at > now {
            let handle = scheduler.arm(reminder.fire_at, ScheduledReminder::from(&reminder));
            info!(
                "Restored reminder {} for owner {}: {} at {}",
                reminder.id,
                reminder.owner_id,
                reminder.text,
                format_instant(&reminder.fire_at)
            );
            report.armed.push((reminder.id, handle));
        } else {
            info!(
                "Pruning past-due reminder {} for owner {}: {} at {}",
                reminder.id,
                reminder.owner_id,
                reminder.text,
                format_instant(&reminder.fire_at)
            );
            owners_with_past_rows.insert(reminder.owner_id);
        }
    }

    for owner_id in owners_with_past_rows {
        report
            .pruned
            .extend(database.delete_expired(owner_id, now).await?);
    }

    info!(
        "Restore complete: {} armed, {} pruned",
        report.armed.len(),
        report.pruned.len()
    );
    Ok(report)
}
