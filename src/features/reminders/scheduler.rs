//! # Reminder Scheduler
//!
//! Single-shot timers keyed by an opaque handle. A timer does not run its
//! callback itself: when it comes due it hands `(handle, payload)` to the
//! service loop through a channel, and the loop runs the callback. Callbacks
//! therefore share the loop with inbound messages and never run concurrently
//! with a handler.
//!
//! Timers live only in memory. Durability is the restore pass's job.
//!
//! - **Version**: 2.0.0
//! - **Since**: 0.1.0
//!
//! ## Changelog
//! - 2.0.0: Replaced database polling with per-reminder armed timers
//! - 1.0.0: Initial release

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use dashmap::DashMap;
use log::{debug, info};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

use super::{OwnerId, Reminder, ReminderId};
use crate::core::Clock;

/// Longest single tokio sleep; tokio's timer wheel tops out around two years
const MAX_SLEEP_STEP: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

impl std::fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// Immutable snapshot captured when a reminder timer is armed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledReminder {
    pub reminder_id: ReminderId,
    pub owner_id: OwnerId,
    pub text: String,
}

impl From<&Reminder> for ScheduledReminder {
    fn from(reminder: &Reminder) -> Self {
        Self {
            reminder_id: reminder.id,
            owner_id: reminder.owner_id,
            text: reminder.text.clone(),
        }
    }
}

/// A timer that came due
#[derive(Debug)]
pub struct Fired<P> {
    pub handle: TimerHandle,
    pub payload: P,
}

pub type FiredReceiver<P> = mpsc::UnboundedReceiver<Fired<P>>;

pub type ReminderScheduler = TimerEngine<ScheduledReminder>;

pub struct TimerEngine<P> {
    next_handle: AtomicU64,
    pending: DashMap<TimerHandle, JoinHandle<()>>,
    fired_tx: mpsc::UnboundedSender<Fired<P>>,
    clock: Arc<dyn Clock>,
}

impl<P: Send + 'static> TimerEngine<P> {
    /// Create an engine and the receiving end the service loop drains
    pub fn new(clock: Arc<dyn Clock>) -> (Self, FiredReceiver<P>) {
        let (fired_tx, fired_rx) = mpsc::unbounded_channel();
        let engine = TimerEngine {
            next_handle: AtomicU64::new(1),
            pending: DashMap::new(),
            fired_tx,
            clock,
        };
        (engine, fired_rx)
    }

    /// Arm a timer that comes due at `at`. Instants already past come due immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn arm(&self, at: DateTime<Tz>, payload: P) -> TimerHandle {
        let handle = TimerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let delay = (at.with_timezone(&Utc) - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let deadline = Instant::now() + delay;
        let tx = self.fired_tx.clone();

        let task = tokio::spawn(async move {
            loop {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                sleep_until(deadline.min(now + MAX_SLEEP_STEP)).await;
            }
            // Receiver gone means the service is shutting down
            let _ = tx.send(Fired { handle, payload });
        });

        self.pending.insert(handle, task);
        debug!("Armed {handle} for {at} (in {}s)", delay.as_secs());
        handle
    }

    /// Revoke a pending timer. Unknown or already-fired handles are a no-op.
    pub fn cancel(&self, handle: TimerHandle) -> bool {
        match self.pending.remove(&handle) {
            Some((_, task)) => {
                task.abort();
                debug!("Cancelled {handle}");
                true
            }
            None => false,
        }
    }

    /// Take ownership of a fired timer before running its callback.
    ///
    /// Returns false when the timer was cancelled after it came due but before
    /// the loop got to it; the callback must then be skipped.
    pub fn claim(&self, handle: TimerHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.pending.contains_key(&handle)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Abort every pending timer
    pub fn shutdown(&self) {
        let handles: Vec<TimerHandle> = self.pending.iter().map(|e| *e.key()).collect();
        let count = handles.len();
        for handle in handles {
            self.cancel(handle);
        }
        info!("Scheduler stopped, {count} pending timers discarded");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::FixedClock;
    use chrono::TimeZone;

    const TZ: Tz = chrono_tz::Europe::Samara;

    fn engine() -> (Arc<FixedClock>, TimerEngine<&'static str>, FiredReceiver<&'static str>) {
        let clock = Arc::new(FixedClock::at_local(TZ, "2024-05-01 12:00:00"));
        let (engine, rx) = TimerEngine::new(clock.clone());
        (clock, engine, rx)
    }

    fn local(h: u32, m: u32) -> DateTime<Tz> {
        TZ.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_once_at_instant() {
        let (_clock, engine, mut rx) = engine();
        let handle = engine.arm(local(12, 5), "tea");

        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;
        let fired = rx.recv().await.unwrap();
        assert_eq!(fired.handle, handle);
        assert_eq!(fired.payload, "tea");
        assert!(engine.claim(handle));
        assert!(!engine.claim(handle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_timer_never_fires() {
        let (_clock, engine, mut rx) = engine();
        let handle = engine.arm(local(12, 1), "tea");
        assert!(engine.cancel(handle));

        tokio::time::advance(Duration::from_secs(3600)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_unknown_or_fired_is_noop() {
        let (_clock, engine, mut rx) = engine();
        assert!(!engine.cancel(TimerHandle(999)));

        let handle = engine.arm(local(11, 0), "past");
        let fired = rx.recv().await.unwrap();
        assert!(engine.claim(fired.handle));
        assert!(!engine.cancel(handle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_after_due_blocks_claim() {
        let (_clock, engine, mut rx) = engine();
        let handle = engine.arm(local(11, 0), "past");
        let fired = rx.recv().await.unwrap();
        engine.cancel(handle);
        assert!(!engine.claim(fired.handle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_far_future_timer_stays_pending() {
        let (_clock, engine, mut rx) = engine();
        let far = TZ.with_ymd_and_hms(2099, 1, 1, 10, 0, 0).unwrap();
        let handle = engine.arm(far, "someday");

        tokio::time::advance(Duration::from_secs(3 * 24 * 3600)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
        assert!(engine.is_pending(handle));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_discards_pending() {
        let (_clock, engine, mut rx) = engine();
        engine.arm(local(13, 0), "a");
        engine.arm(local(14, 0), "b");
        engine.shutdown();
        assert_eq!(engine.pending_count(), 0);

        tokio::time::advance(Duration::from_secs(3 * 3600)).await;
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());
    }
}
