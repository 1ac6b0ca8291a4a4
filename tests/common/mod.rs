#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use daily_plan::day::{DayClock, DayKey};
use daily_plan::models::{ConsumptionEvent, UserProfile};
use daily_plan::store::{DocumentStore, EventSnapshot, EventSubscription};
use serde_json::Value;
use tokio::sync::{mpsc, watch};

/// In-memory stand-in for the Firestore collections.
#[derive(Default)]
pub struct MemoryStore {
    profiles: Mutex<HashMap<String, UserProfile>>,
    events: Mutex<HashMap<(String, String), Vec<ConsumptionEvent>>>,
    failing: AtomicBool,
}

impl MemoryStore {
    pub fn put_profile(&self, uid: &str, profile: Value) {
        let fields = profile.as_object().cloned().unwrap_or_default();
        let profile = UserProfile::from_fields(fields).unwrap();
        self.profiles.lock().unwrap().insert(uid.to_string(), profile);
    }

    pub fn log_event(&self, uid: &str, day: DayKey, id: &str, event: Value) {
        self.events
            .lock()
            .unwrap()
            .entry((uid.to_string(), day.to_string()))
            .or_default()
            .push(ConsumptionEvent::from_value(id, &event));
    }

    pub fn remove_event(&self, uid: &str, day: DayKey, id: &str) {
        if let Some(events) = self
            .events
            .lock()
            .unwrap()
            .get_mut(&(uid.to_string(), day.to_string()))
        {
            events.retain(|e| e.id != id);
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("GET users/{} failed: 503 - unavailable", uid));
        }
        Ok(self.profiles.lock().unwrap().get(uid).cloned())
    }

    async fn day_events(&self, uid: &str, day: DayKey) -> Result<Vec<ConsumptionEvent>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(anyhow!("LIST users/{}/days/{}/entries failed: 503 - unavailable", uid, day));
        }
        Ok(self
            .events
            .lock()
            .unwrap()
            .get(&(uid.to_string(), day.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Store whose day feed is driven by the test through a channel.
///
/// Only the first subscription gets the channel; later ones see a feed
/// that is already closed.
pub struct ScriptedStore {
    feed: Mutex<Option<mpsc::Receiver<EventSnapshot>>>,
}

impl ScriptedStore {
    pub fn new(capacity: usize) -> (Arc<Self>, mpsc::Sender<EventSnapshot>) {
        let (tx, rx) = mpsc::channel(capacity);
        let store = Self {
            feed: Mutex::new(Some(rx)),
        };
        (Arc::new(store), tx)
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    async fn get_profile(&self, _uid: &str) -> Result<Option<UserProfile>> {
        Ok(None)
    }

    async fn day_events(&self, _uid: &str, _day: DayKey) -> Result<Vec<ConsumptionEvent>> {
        Ok(Vec::new())
    }

    fn subscribe_day(self: Arc<Self>, _uid: String, _day: DayKey, _every: Duration) -> EventSubscription {
        let updates = self
            .feed
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| mpsc::channel(1).1);
        EventSubscription::from_channel(updates)
    }
}

/// Clock the test moves by hand. Wakes often so a day change is seen quickly.
#[derive(Debug)]
pub struct ManualClock {
    today: Mutex<NaiveDate>,
}

impl ManualClock {
    pub fn new(today: NaiveDate) -> Arc<Self> {
        Arc::new(Self {
            today: Mutex::new(today),
        })
    }

    pub fn set(&self, today: NaiveDate) {
        *self.today.lock().unwrap() = today;
    }
}

impl DayClock for ManualClock {
    fn today(&self) -> DayKey {
        DayKey::from(*self.today.lock().unwrap())
    }

    fn until_rollover(&self) -> Duration {
        Duration::from_millis(5)
    }
}

/// Wait (up to five seconds) for a published state matching `pred`.
pub async fn wait_until<T: Clone>(rx: &mut watch::Receiver<T>, pred: impl FnMut(&T) -> bool) -> T {
    let state = tokio::time::timeout(Duration::from_secs(5), rx.wait_for(pred))
        .await
        .expect("timed out waiting for provider state")
        .expect("provider stopped")
        .clone();
    state
}

/// The state published right after the last one this receiver saw.
pub async fn next_state<T: Clone>(rx: &mut watch::Receiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(5), rx.changed())
        .await
        .expect("timed out waiting for provider state")
        .expect("provider stopped");
    let state = rx.borrow_and_update().clone();
    state
}
