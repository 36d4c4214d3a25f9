//! # Reminder Store
//!
//! Durable CRUD for reminders on a single sqlite table. Each call takes the
//! connection lock for its whole duration, so calls are atomic with respect to
//! one another and all store access is serialized.
//!
//! `fire_at` is persisted as an RFC 3339 string carrying the configured zone's
//! offset; rows are normalized back into that zone when read.
//!
//! - **Version**: 1.1.0
//! - **Since**: 1.0.0
//!
//! ## Changelog
//! - 1.1.0: delete_expired removes by inequality cutoff instead of exact match
//! - 1.0.0: Initial release

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat};
use chrono_tz::Tz;
use log::{debug, warn};
use sqlite::{Connection, State, Statement};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::features::reminders::{OwnerId, Reminder, ReminderId};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS reminders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL,
    text TEXT NOT NULL,
    fire_at TEXT NOT NULL
)";

#[derive(Clone)]
pub struct Database {
    connection: Arc<Mutex<Connection>>,
    timezone: Tz,
}

impl Database {
    /// Open (or create) the store at `path`. `:memory:` gives a private in-memory store.
    pub async fn new(path: &str, timezone: Tz) -> Result<Self> {
        let connection =
            sqlite::open(path).with_context(|| format!("Failed to open database at {path}"))?;
        connection
            .execute(SCHEMA)
            .context("Failed to create reminders table")?;
        debug!("Reminder store ready at {path}");

        Ok(Database {
            connection: Arc::new(Mutex::new(connection)),
            timezone,
        })
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Persist a reminder and return its store-assigned id
    pub async fn insert_reminder(
        &self,
        owner_id: OwnerId,
        text: &str,
        fire_at: DateTime<Tz>,
    ) -> Result<ReminderId> {
        let fire_at = fire_at
            .with_timezone(&self.timezone)
            .to_rfc3339_opts(SecondsFormat::Secs, false);
        let conn = self.connection.lock().await;

        let mut statement =
            conn.prepare("INSERT INTO reminders (owner_id, text, fire_at) VALUES (?, ?, ?)")?;
        statement.bind((1, owner_id))?;
        statement.bind((2, text))?;
        statement.bind((3, fire_at.as_str()))?;
        statement.next()?;
        drop(statement);

        let mut statement = conn.prepare("SELECT last_insert_rowid()")?;
        statement.next()?;
        let id = statement.read::<i64, _>(0)?;

        debug!("Inserted reminder {id} for owner {owner_id} at {fire_at}");
        Ok(id)
    }

    /// Reminders belonging to `owner_id`, in insertion order
    pub async fn list_reminders(&self, owner_id: OwnerId) -> Result<Vec<Reminder>> {
        let conn = self.connection.lock().await;
        let mut statement = conn.prepare(
            "SELECT id, owner_id, text, fire_at FROM reminders WHERE owner_id = ? ORDER BY id",
        )?;
        statement.bind((1, owner_id))?;
        self.collect_rows(&mut statement)
    }

    /// Every stored reminder, in insertion order
    pub async fn all_reminders(&self) -> Result<Vec<Reminder>> {
        let conn = self.connection.lock().await;
        let mut statement =
            conn.prepare("SELECT id, owner_id, text, fire_at FROM reminders ORDER BY id")?;
        self.collect_rows(&mut statement)
    }

    /// Remove one reminder. Returns false if no such row existed.
    pub async fn delete_reminder(&self, id: ReminderId) -> Result<bool> {
        let conn = self.connection.lock().await;

        let mut statement = conn.prepare("SELECT COUNT(*) FROM reminders WHERE id = ?")?;
        statement.bind((1, id))?;
        statement.next()?;
        let existed = statement.read::<i64, _>(0)? > 0;
        drop(statement);

        if existed {
            let mut statement = conn.prepare("DELETE FROM reminders WHERE id = ?")?;
            statement.bind((1, id))?;
            statement.next()?;
        }
        Ok(existed)
    }

    /// Remove every reminder of `owner_id` whose `fire_at` is at or before `cutoff`.
    ///
    /// Returns the ids that were removed.
    pub async fn delete_expired(
        &self,
        owner_id: OwnerId,
        cutoff: DateTime<Tz>,
    ) -> Result<Vec<ReminderId>> {
        let conn = self.connection.lock().await;

        let mut statement = conn.prepare(
            "SELECT id, owner_id, text, fire_at FROM reminders WHERE owner_id = ? ORDER BY id",
        )?;
        statement.bind((1, owner_id))?;
        let expired: Vec<ReminderId> = self
            .collect_rows(&mut statement)?
            .into_iter()
            .filter(|r| r.fire_at <= cutoff)
            .map(|r| r.id)
            .collect();
        drop(statement);

        if expired.is_empty() {
            return Ok(expired);
        }

        conn.execute("BEGIN")?;
        let result = (|| -> Result<()> {
            for id in &expired {
                let mut statement = conn.prepare("DELETE FROM reminders WHERE id = ?")?;
                statement.bind((1, *id))?;
                statement.next()?;
            }
            Ok(())
        })();

        match result {
            Ok(()) => {
                conn.execute("COMMIT")?;
                Ok(expired)
            }
            Err(e) => {
                if let Err(rollback) = conn.execute("ROLLBACK") {
                    warn!("Rollback after failed prune also failed: {rollback}");
                }
                Err(e)
            }
        }
    }

    fn collect_rows(&self, statement: &mut Statement<'_>) -> Result<Vec<Reminder>> {
        let mut reminders = Vec::new();
        while let State::Row = statement.next()? {
            let id = statement.read::<i64, _>("id")?;
            let owner_id = statement.read::<i64, _>("owner_id")?;
            let text = statement.read::<String, _>("text")?;
            let raw_fire_at = statement.read::<String, _>("fire_at")?;

            // Rows we cannot interpret are left alone rather than pruned
            match DateTime::parse_from_rfc3339(&raw_fire_at) {
                Ok(parsed) => reminders.push(Reminder {
                    id,
                    owner_id,
                    text,
                    fire_at: parsed.with_timezone(&self.timezone),
                }),
                Err(e) => warn!("Skipping reminder {id} with unreadable fire_at {raw_fire_at:?}: {e}"),
            }
        }
        Ok(reminders)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const TZ: Tz = chrono_tz::Europe::Samara;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Tz> {
        TZ.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    async fn memory_db() -> Database {
        Database::new(":memory:", TZ).await.unwrap()
    }

    #[tokio::test]
    async fn test_store_failure_only_fails_the_current_interaction() {
        use crate::core::clock::FixedClock;
        use crate::core::ReminderError;
        use crate::features::reminders::{
            DialogueState, ReminderOrchestrator, ReminderScheduler, SessionTable,
        };
        use std::sync::Arc;

        let db = memory_db().await;
        let clock = Arc::new(FixedClock::at_local(TZ, "2024-05-01 12:00:00"));
        let (scheduler, _fired) = ReminderScheduler::new(clock.clone());
        let orchestrator =
            ReminderOrchestrator::new(db.clone(), scheduler, SessionTable::new(), clock);

        orchestrator
            .create(1, "tea", at(2024, 5, 2, 10, 0))
            .await
            .unwrap();
        orchestrator.handle_message(1, "/cancel").await;
        orchestrator.handle_message(2, "/remind").await;
        assert_eq!(orchestrator.sessions().state(1), DialogueState::AwaitingTargetId);

        db.connection
            .lock()
            .await
            .execute("DROP TABLE reminders")
            .unwrap();

        let reply = orchestrator.handle_message(1, "1").await;
        assert!(matches!(reply.error, Some(ReminderError::Storage(_))));
        assert!(orchestrator.sessions().state(1).is_idle());
        assert_eq!(orchestrator.sessions().state(2), DialogueState::AwaitingText);

        // The other owner's dialogue keeps working until it needs the store
        orchestrator.handle_message(2, "buy milk").await;
        assert_eq!(
            orchestrator.sessions().state(2),
            DialogueState::AwaitingDateTime {
                text: "buy milk".into()
            }
        );
        let reply = orchestrator.handle_message(2, "2024-05-03 09:00").await;
        assert!(matches!(reply.error, Some(ReminderError::Storage(_))));
        assert!(orchestrator.sessions().state(2).is_idle());
        assert_eq!(orchestrator.scheduler().pending_count(), 1);
    }

    #[tokio::test]
    async fn test_insert_assigns_unique_ids() {
        let db = memory_db().await;
        let a = db.insert_reminder(1, "tea", at(2099, 1, 1, 10, 0)).await.unwrap();
        let b = db.insert_reminder(1, "coffee", at(2099, 1, 1, 11, 0)).await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_list_is_insertion_ordered_and_per_owner() {
        let db = memory_db().await;
        db.insert_reminder(1, "late", at(2099, 6, 1, 10, 0)).await.unwrap();
        db.insert_reminder(2, "other owner", at(2099, 1, 1, 10, 0)).await.unwrap();
        db.insert_reminder(1, "early", at(2099, 1, 1, 9, 0)).await.unwrap();

        let texts: Vec<String> = db
            .list_reminders(1)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(texts, vec!["late", "early"]);
    }

    #[tokio::test]
    async fn test_fire_at_roundtrips_in_configured_zone() {
        let db = memory_db().await;
        let when = at(2099, 1, 1, 10, 0);
        db.insert_reminder(1, "tea", when).await.unwrap();
        let stored = db.list_reminders(1).await.unwrap();
        assert_eq!(stored[0].fire_at, when);
        assert_eq!(stored[0].fire_at.timezone(), TZ);
    }

    #[tokio::test]
    async fn test_instant_from_other_zone_is_normalized() {
        let db = memory_db().await;
        let utc = chrono::Utc.with_ymd_and_hms(2099, 1, 1, 6, 0, 0).unwrap();
        db.insert_reminder(1, "tea", utc.with_timezone(&chrono_tz::UTC))
            .await
            .unwrap();
        let stored = db.list_reminders(1).await.unwrap();
        assert_eq!(stored[0].fire_at, at(2099, 1, 1, 10, 0));
    }

    #[tokio::test]
    async fn test_delete_reminder() {
        let db = memory_db().await;
        let id = db.insert_reminder(1, "tea", at(2099, 1, 1, 10, 0)).await.unwrap();
        assert!(db.delete_reminder(id).await.unwrap());
        assert!(!db.delete_reminder(id).await.unwrap());
        assert!(db.list_reminders(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_expired_uses_inclusive_cutoff() {
        let db = memory_db().await;
        let cutoff = at(2024, 1, 1, 10, 0);
        let before = db.insert_reminder(1, "before", at(2024, 1, 1, 9, 0)).await.unwrap();
        let exact = db.insert_reminder(1, "exact", cutoff).await.unwrap();
        db.insert_reminder(1, "after", at(2024, 1, 1, 11, 0)).await.unwrap();
        db.insert_reminder(2, "other owner", at(2020, 1, 1, 0, 0)).await.unwrap();

        let removed = db.delete_expired(1, cutoff).await.unwrap();
        assert_eq!(removed, vec![before, exact]);

        let left: Vec<String> = db
            .all_reminders()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.text)
            .collect();
        assert_eq!(left, vec!["after", "other owner"]);
    }
}
