use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use daily_plan::config::{ProviderConfig, MIN_REFRESH_INTERVAL};
use daily_plan::day::{DayClock, DayKey};
use daily_plan::models::{ConsumptionEvent, DailyConsumedTotals};
use daily_plan::provider::{DailyLeftProvider, DailyPlanProvider};
use daily_plan::store::{subscribe_day_events, EventSnapshot};
use serde_json::json;
use tokio::sync::watch;

mod common;
use common::{next_state, wait_until, ManualClock, MemoryStore, ScriptedStore};

fn fast() -> ProviderConfig {
    ProviderConfig::new(Duration::from_millis(10))
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn snapshot(seq: u64, day: DayKey, kcal: f64) -> EventSnapshot {
    let event = ConsumptionEvent::from_value(format!("e{seq}"), &json!({"calories_kcal_total": kcal}));
    EventSnapshot {
        seq,
        day,
        result: Ok(vec![event]),
    }
}

fn seeded_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::default());
    store.put_profile(
        "alice",
        json!({"kg": 70, "cm": 175, "gender": "male", "year": 1990, "goal": "maintain"}),
    );
    store.put_profile(
        "bob",
        json!({"kg": 95, "cm": 190, "gender": "male", "year": 1980, "workouts": 7, "goal": "gain", "HowFast": 0.05}),
    );
    store
}

#[tokio::test]
async fn plan_provider_publishes_targets() {
    let store = seeded_store();
    let (_identity, identity_rx) = watch::channel(Some("alice".to_string()));

    let handle = DailyPlanProvider::spawn(store, identity_rx, fast());
    let mut rx = handle.subscribe();
    let state = wait_until(&mut rx, |s| s.value.is_some()).await;

    assert!(!state.loading);
    assert_eq!(state.error, None);
    assert_eq!(state.value.unwrap().protein_g, 70);
}

#[tokio::test]
async fn plan_provider_reports_missing_profile() {
    let store = Arc::new(MemoryStore::default());
    let (_identity, identity_rx) = watch::channel(Some("ghost".to_string()));

    let handle = DailyPlanProvider::spawn(store, identity_rx, fast());
    let mut rx = handle.subscribe();
    let state = wait_until(&mut rx, |s| s.error.is_some()).await;

    assert!(state.value.is_none());
    assert!(!state.loading);
    assert!(state.error.unwrap().contains("not found"));
}

#[tokio::test]
async fn plan_provider_reports_incomplete_profile() {
    let store = Arc::new(MemoryStore::default());
    store.put_profile("carol", json!({"kg": 60}));
    let (_identity, identity_rx) = watch::channel(Some("carol".to_string()));

    let handle = DailyPlanProvider::spawn(store, identity_rx, fast());
    let mut rx = handle.subscribe();
    let state = wait_until(&mut rx, |s| s.error.is_some()).await;

    assert!(state.value.is_none());
    assert!(state.error.unwrap().contains("height"));
}

#[tokio::test]
async fn plan_provider_recomputes_on_profile_change() {
    let store = seeded_store();
    let (_identity, identity_rx) = watch::channel(Some("alice".to_string()));

    let handle = DailyPlanProvider::spawn(store.clone(), identity_rx, fast());
    let mut rx = handle.subscribe();
    wait_until(&mut rx, |s| s.value.is_some()).await;

    store.put_profile(
        "alice",
        json!({"kg": 70, "cm": 175, "gender": "male", "year": 1990, "goal": "maintain",
               "kidneySettings": {"proteinLevel": "low"}}),
    );
    let state = wait_until(&mut rx, |s| s.value.as_ref().is_some_and(|t| t.protein_g == 42)).await;
    assert_eq!(state.error, None);
}

#[tokio::test]
async fn plan_provider_follows_identity_and_sign_out() {
    let store = seeded_store();
    let (identity, identity_rx) = watch::channel(Some("alice".to_string()));

    let handle = DailyPlanProvider::spawn(store, identity_rx, fast());
    let mut rx = handle.subscribe();
    let alice = wait_until(&mut rx, |s| s.value.is_some()).await.value.unwrap();

    identity.send_replace(Some("bob".to_string()));
    let bob = wait_until(&mut rx, |s| {
        s.value.as_ref().is_some_and(|t| t.protein_g == 152)
    })
    .await
    .value
    .unwrap();
    assert_ne!(alice, bob);

    identity.send_replace(None);
    let state = wait_until(&mut rx, |s| s.value.is_none() && !s.loading).await;
    assert_eq!(state.error.as_deref(), Some("not authenticated"));
}

#[tokio::test]
async fn plan_provider_keeps_targets_on_store_error() {
    let store = seeded_store();
    let (_identity, identity_rx) = watch::channel(Some("alice".to_string()));

    let handle = DailyPlanProvider::spawn(store.clone(), identity_rx, fast());
    let mut rx = handle.subscribe();
    wait_until(&mut rx, |s| s.value.is_some()).await;

    store.set_failing(true);
    let state = wait_until(&mut rx, |s| s.error.is_some()).await;
    assert!(state.value.is_some());
    assert!(state.error.unwrap().contains("503"));

    store.set_failing(false);
    wait_until(&mut rx, |s| s.error.is_none() && s.value.is_some()).await;
}

#[tokio::test]
async fn left_provider_sums_today() {
    let store = seeded_store();
    let day = DayKey::today();
    store.log_event("alice", day, "breakfast", json!({"calories_kcal_total": 450, "protein_g": 30}));
    store.log_event(
        "alice",
        day,
        "lunch",
        json!({"items": [{"calories_kcal": 200, "protein_g": 10}, {"calories_kcal": 100, "protein_g": 5}]}),
    );
    let (_identity, identity_rx) = watch::channel(Some("alice".to_string()));

    let handle = DailyLeftProvider::spawn(store, identity_rx, fast());
    let mut rx = handle.subscribe();
    let state = wait_until(&mut rx, |s| !s.loading).await;

    let totals = state.value.unwrap();
    assert_eq!(totals.calories_today, 750.0);
    assert_eq!(totals.protein_today, 45.0);
    assert_eq!(state.error, None);
}

#[tokio::test]
async fn left_provider_recomputes_on_add_and_remove() {
    let store = seeded_store();
    let day = DayKey::today();
    store.log_event("alice", day, "a", json!({"calories_kcal_total": 100}));
    let (_identity, identity_rx) = watch::channel(Some("alice".to_string()));

    let handle = DailyLeftProvider::spawn(store.clone(), identity_rx, fast());
    let mut rx = handle.subscribe();
    wait_until(&mut rx, |s| s.value.is_some_and(|t| t.calories_today == 100.0)).await;

    store.log_event("alice", day, "b", json!({"calories_kcal_total": 250}));
    wait_until(&mut rx, |s| s.value.is_some_and(|t| t.calories_today == 350.0)).await;

    store.remove_event("alice", day, "a");
    wait_until(&mut rx, |s| s.value.is_some_and(|t| t.calories_today == 250.0)).await;
}

#[tokio::test]
async fn left_provider_without_user_is_zero_with_error() {
    let store = seeded_store();
    let (_identity, identity_rx) = watch::channel(None);

    let handle = DailyLeftProvider::spawn(store, identity_rx, fast());
    let mut rx = handle.subscribe();
    let state = wait_until(&mut rx, |s| s.error.is_some()).await;

    assert_eq!(state.value, Some(DailyConsumedTotals::default()));
    assert!(!state.loading);
    assert_eq!(state.error.as_deref(), Some("not authenticated"));
}

#[tokio::test]
async fn left_provider_drops_previous_user_totals() {
    let store = seeded_store();
    let day = DayKey::today();
    store.log_event("alice", day, "a", json!({"calories_kcal_total": 900}));
    store.log_event("bob", day, "b", json!({"calories_kcal_total": 40}));
    let (identity, identity_rx) = watch::channel(Some("alice".to_string()));

    let handle = DailyLeftProvider::spawn(store, identity_rx, fast());
    let mut rx = handle.subscribe();
    wait_until(&mut rx, |s| s.value.is_some_and(|t| t.calories_today == 900.0)).await;

    identity.send_replace(Some("bob".to_string()));
    // the very next state is either the reset or bob's own totals
    let next = next_state(&mut rx).await;
    let calories = next.value.unwrap().calories_today;
    if next.loading {
        assert_eq!(calories, 0.0);
    } else {
        assert_eq!(calories, 40.0);
    }
    assert_eq!(next.error, None);
    wait_until(&mut rx, |s| s.value.is_some_and(|t| t.calories_today == 40.0)).await;
}

#[tokio::test]
async fn left_provider_never_applies_an_older_snapshot() {
    let (store, feed) = ScriptedStore::new(1);
    let clock = ManualClock::new(date(2026, 10, 19));
    let day = clock.today();
    let (_identity, identity_rx) = watch::channel(Some("alice".to_string()));

    let handle = DailyLeftProvider::spawn(store, identity_rx, fast().with_clock(clock));
    let mut rx = handle.subscribe();

    feed.send(snapshot(2, day, 200.0)).await.unwrap();
    wait_until(&mut rx, |s| s.value.is_some_and(|t| t.calories_today == 200.0)).await;

    // with room for one message, the next permit only frees up after the
    // provider has taken seq 1 off the channel and dealt with it
    feed.send(snapshot(1, day, 100.0)).await.unwrap();
    let permit = tokio::time::timeout(Duration::from_secs(5), feed.reserve())
        .await
        .unwrap()
        .unwrap();
    assert!(!rx.has_changed().unwrap());
    assert_eq!(rx.borrow().value.unwrap().calories_today, 200.0);

    // same for a snapshot of another day, however new
    permit.send(snapshot(9, DayKey::from(date(2026, 10, 18)), 999.0));
    let permit = tokio::time::timeout(Duration::from_secs(5), feed.reserve())
        .await
        .unwrap()
        .unwrap();
    assert!(!rx.has_changed().unwrap());

    permit.send(snapshot(3, day, 300.0));
    let state = next_state(&mut rx).await;
    assert_eq!(state.value.unwrap().calories_today, 300.0);
    assert!(!state.loading);
}

#[tokio::test]
async fn left_provider_resets_when_the_day_changes() {
    let store = seeded_store();
    let monday = date(2026, 10, 19);
    let tuesday = date(2026, 10, 20);
    store.log_event("alice", monday.into(), "late-snack", json!({"calories_kcal_total": 900}));
    store.log_event("alice", tuesday.into(), "breakfast", json!({"calories_kcal_total": 40}));
    let clock = ManualClock::new(monday);
    let (_identity, identity_rx) = watch::channel(Some("alice".to_string()));

    let handle = DailyLeftProvider::spawn(store, identity_rx, fast().with_clock(clock.clone()));
    let mut rx = handle.subscribe();
    wait_until(&mut rx, |s| !s.loading && s.value.is_some_and(|t| t.calories_today == 900.0)).await;

    clock.set(tuesday);
    let next = next_state(&mut rx).await;
    let calories = next.value.unwrap().calories_today;
    if next.loading {
        assert_eq!(calories, 0.0);
    } else {
        assert_eq!(calories, 40.0);
    }

    let state = wait_until(&mut rx, |s| !s.loading).await;
    assert_eq!(state.value.unwrap().calories_today, 40.0);
    assert_eq!(state.error, None);
}

#[tokio::test]
async fn zero_refresh_interval_is_raised_to_minimum() {
    let config = ProviderConfig::new(Duration::ZERO);
    assert_eq!(config.refresh_interval(), MIN_REFRESH_INTERVAL);

    let store = seeded_store();
    let day = DayKey::today();
    store.log_event("alice", day, "a", json!({"calories_kcal_total": 120}));
    let (_identity, identity_rx) = watch::channel(Some("alice".to_string()));

    let plan = DailyPlanProvider::spawn(store.clone(), identity_rx.clone(), config.clone());
    let left = DailyLeftProvider::spawn(store.clone(), identity_rx, config);
    wait_until(&mut plan.subscribe(), |s| s.value.is_some()).await;
    wait_until(&mut left.subscribe(), |s| s.value.is_some_and(|t| t.calories_today == 120.0)).await;

    let mut feed = subscribe_day_events(store, "alice".to_string(), day, Duration::ZERO);
    let first = tokio::time::timeout(Duration::from_secs(5), feed.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.result.unwrap().len(), 1);
}

#[tokio::test]
async fn dropping_handle_stops_provider() {
    let store = seeded_store();
    let (_identity, identity_rx) = watch::channel(Some("alice".to_string()));

    let handle = DailyPlanProvider::spawn(store, identity_rx, fast());
    let mut rx = handle.subscribe();
    wait_until(&mut rx, |s| s.value.is_some()).await;
    drop(handle);

    let closed = tokio::time::timeout(Duration::from_secs(5), rx.changed()).await;
    assert!(matches!(closed, Ok(Err(_))));
}
