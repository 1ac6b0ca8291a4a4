use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::MIN_REFRESH_INTERVAL;
use crate::day::DayKey;
use crate::models::{ConsumptionEvent, UserProfile};

/// Read access to the profile document and a day's consumption events.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// `Ok(None)` when the user has no profile document.
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>>;

    /// All events logged under the given day. A day with nothing logged is empty.
    async fn day_events(&self, uid: &str, day: DayKey) -> Result<Vec<ConsumptionEvent>>;

    /// Live feed of a day's events. Polls [`DocumentStore::day_events`]
    /// unless the store has a push channel of its own.
    fn subscribe_day(self: Arc<Self>, uid: String, day: DayKey, every: Duration) -> EventSubscription
    where
        Self: 'static,
    {
        subscribe_day_events(self, uid, day, every)
    }
}

static SNAPSHOT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Next value from the process-wide snapshot sequence.
///
/// Feeds that build their own [`EventSnapshot`]s should number them from
/// here so that a snapshot from an older subscription always sorts first.
pub fn next_snapshot_seq() -> u64 {
    SNAPSHOT_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// One delivery from a day subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSnapshot {
    /// Strictly increasing across every subscription in the process.
    pub seq: u64,
    pub day: DayKey,
    /// The full event set, or the read error.
    pub result: Result<Vec<ConsumptionEvent>, String>,
}

/// Live view of one day's events. Dropping it unsubscribes.
pub struct EventSubscription {
    updates: mpsc::Receiver<EventSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl EventSubscription {
    /// Wrap a channel fed by some other producer.
    pub fn from_channel(updates: mpsc::Receiver<EventSnapshot>) -> Self {
        Self {
            updates,
            task: None,
        }
    }

    /// Wait for the next snapshot. `None` once the feed has stopped.
    pub async fn next(&mut self) -> Option<EventSnapshot> {
        self.updates.recv().await
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Watch a day's events by re-reading them every `every` (at least
/// [`MIN_REFRESH_INTERVAL`]).
///
/// The first read is always delivered. After that a snapshot is only sent
/// when the event set (or the error) differs from the last one delivered.
pub fn subscribe_day_events<S>(
    store: Arc<S>,
    uid: String,
    day: DayKey,
    every: Duration,
) -> EventSubscription
where
    S: DocumentStore + ?Sized + 'static,
{
    let (tx, updates) = mpsc::channel(8);

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every.max(MIN_REFRESH_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last: Option<Result<Vec<ConsumptionEvent>, String>> = None;

        loop {
            ticker.tick().await;

            let result = store
                .day_events(&uid, day)
                .await
                .map_err(|e| e.to_string());
            if let Err(ref error) = result {
                warn!(uid = %uid, day = %day, error = %error, "failed to read day events");
            }
            if last.as_ref() == Some(&result) {
                continue;
            }

            let seq = next_snapshot_seq();
            debug!(uid = %uid, day = %day, seq, "day events changed");
            last = Some(result.clone());

            let snapshot = EventSnapshot { seq, day, result };
            if tx.send(snapshot).await.is_err() {
                break;
            }
        }
    });

    EventSubscription {
        updates,
        task: Some(task),
    }
}
