//! Reactive providers.
//!
//! Each provider owns a background task that follows the signed-in identity,
//! re-reads its inputs from the [`DocumentStore`] and publishes a fresh,
//! fully recomputed [`ProviderState`] on a `watch` channel. An identity
//! change cancels whatever was in flight for the previous user before
//! anything else is published.

use std::future::pending;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::aggregate::aggregate_events;
use crate::config::ProviderConfig;
use crate::error::PlanError;
use crate::models::{DailyConsumedTotals, DailyTargets, UserProfile};
use crate::store::DocumentStore;
use crate::targets::compute_targets;

/// What a provider exposes to the presentation layer.
///
/// Check `loading` and `error` before trusting `value`; a missing value is
/// not the same as a zero value.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderState<T> {
    pub value: Option<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> Default for ProviderState<T> {
    fn default() -> Self {
        Self {
            value: None,
            loading: true,
            error: None,
        }
    }
}

impl<T> ProviderState<T> {
    fn ready(value: T) -> Self {
        Self {
            value: Some(value),
            loading: false,
            error: None,
        }
    }

    fn failed(value: Option<T>, error: &PlanError) -> Self {
        Self {
            value,
            loading: false,
            error: Some(error.to_string()),
        }
    }
}

pub type PlanState = ProviderState<DailyTargets>;
pub type LeftState = ProviderState<DailyConsumedTotals>;

/// Handle to a running provider. Dropping it stops the task.
pub struct ProviderHandle<T> {
    state: watch::Receiver<ProviderState<T>>,
    task: JoinHandle<()>,
}

impl<T: Clone> ProviderHandle<T> {
    /// A receiver that sees every published state.
    pub fn subscribe(&self) -> watch::Receiver<ProviderState<T>> {
        self.state.clone()
    }

    pub fn current(&self) -> ProviderState<T> {
        self.state.borrow().clone()
    }
}

impl<T> Drop for ProviderHandle<T> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Keeps the signed-in user's [`DailyTargets`] current.
pub struct DailyPlanProvider<S: ?Sized> {
    store: Arc<S>,
    identity: watch::Receiver<Option<String>>,
    config: ProviderConfig,
    state: watch::Sender<PlanState>,
}

impl<S> DailyPlanProvider<S>
where
    S: DocumentStore + ?Sized + 'static,
{
    pub fn spawn(
        store: Arc<S>,
        identity: watch::Receiver<Option<String>>,
        config: ProviderConfig,
    ) -> ProviderHandle<DailyTargets> {
        let (state, rx) = watch::channel(PlanState::default());
        let provider = Self {
            store,
            identity,
            config,
            state,
        };
        ProviderHandle {
            state: rx,
            task: tokio::spawn(provider.run()),
        }
    }

    async fn run(mut self) {
        loop {
            let uid = self.identity.borrow_and_update().clone();
            tokio::select! {
                biased;
                changed = self.identity.changed() => {
                    if changed.is_err() {
                        debug!("identity source closed, stopping plan provider");
                        return;
                    }
                    debug!("identity changed, restarting plan provider");
                }
                () = Self::follow(&self.store, &self.state, &self.config, uid) => {}
            }
        }
    }

    /// Publish targets for one identity until cancelled.
    async fn follow(
        store: &Arc<S>,
        state: &watch::Sender<PlanState>,
        config: &ProviderConfig,
        uid: Option<String>,
    ) {
        let Some(uid) = uid else {
            state.send_replace(PlanState::failed(None, &PlanError::NotAuthenticated));
            return pending().await;
        };

        // nothing from the previous identity may linger
        state.send_replace(PlanState::default());

        let mut ticker = tokio::time::interval(config.refresh_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last: Option<(UserProfile, NaiveDate)> = None;

        loop {
            ticker.tick().await;
            let today = config.clock().today().date();

            match store.get_profile(&uid).await {
                Ok(Some(profile)) => {
                    if last
                        .as_ref()
                        .is_some_and(|(p, d)| *p == profile && *d == today)
                    {
                        continue;
                    }
                    match compute_targets(&profile, today) {
                        Ok(targets) => {
                            info!(uid = %uid, calories = targets.calories, "daily targets updated");
                            state.send_replace(PlanState::ready(targets));
                        }
                        Err(e) => {
                            warn!(uid = %uid, error = %e, "cannot compute daily targets");
                            state.send_replace(PlanState::failed(None, &e));
                        }
                    }
                    last = Some((profile, today));
                }
                Ok(None) => {
                    let e = PlanError::ProfileNotFound { uid: uid.clone() };
                    warn!(uid = %uid, "profile document missing");
                    state.send_replace(PlanState::failed(None, &e));
                    last = None;
                }
                Err(e) => {
                    let e = PlanError::Store(e);
                    warn!(uid = %uid, error = %e, "failed to read profile");
                    // keep the last good targets, surface the error
                    state.send_modify(|s| {
                        s.loading = false;
                        s.error = Some(e.to_string());
                    });
                    last = None;
                }
            }
        }
    }
}

/// Keeps the signed-in user's [`DailyConsumedTotals`] for today current.
pub struct DailyLeftProvider<S: ?Sized> {
    store: Arc<S>,
    identity: watch::Receiver<Option<String>>,
    config: ProviderConfig,
    state: watch::Sender<LeftState>,
}

impl<S> DailyLeftProvider<S>
where
    S: DocumentStore + ?Sized + 'static,
{
    pub fn spawn(
        store: Arc<S>,
        identity: watch::Receiver<Option<String>>,
        config: ProviderConfig,
    ) -> ProviderHandle<DailyConsumedTotals> {
        let (state, rx) = watch::channel(LeftState {
            value: Some(DailyConsumedTotals::default()),
            ..LeftState::default()
        });
        let provider = Self {
            store,
            identity,
            config,
            state,
        };
        ProviderHandle {
            state: rx,
            task: tokio::spawn(provider.run()),
        }
    }

    async fn run(mut self) {
        loop {
            let uid = self.identity.borrow_and_update().clone();
            tokio::select! {
                biased;
                changed = self.identity.changed() => {
                    if changed.is_err() {
                        debug!("identity source closed, stopping daily-left provider");
                        return;
                    }
                    debug!("identity changed, restarting daily-left provider");
                }
                () = Self::follow(&self.store, &self.state, &self.config, uid) => {}
            }
        }
    }

    /// Publish today's totals for one identity until cancelled, resubscribing
    /// whenever the configured clock moves to a new day.
    async fn follow(
        store: &Arc<S>,
        state: &watch::Sender<LeftState>,
        config: &ProviderConfig,
        uid: Option<String>,
    ) {
        let Some(uid) = uid else {
            state.send_replace(LeftState::failed(
                Some(DailyConsumedTotals::default()),
                &PlanError::NotAuthenticated,
            ));
            return pending().await;
        };

        let clock = config.clock();
        // kept across day resubscribes; sequence numbers are process-wide
        let mut applied_seq = 0u64;

        loop {
            let day = clock.today();
            state.send_replace(LeftState {
                value: Some(DailyConsumedTotals::default()),
                ..LeftState::default()
            });

            let mut feed = Arc::clone(store).subscribe_day(uid.clone(), day, config.refresh_interval());
            let rollover = tokio::time::sleep(clock.until_rollover());
            tokio::pin!(rollover);

            loop {
                tokio::select! {
                    biased;
                    () = &mut rollover => {
                        if clock.today() == day {
                            rollover.as_mut().reset(Instant::now() + clock.until_rollover());
                            continue;
                        }
                        info!(uid = %uid, day = %day, "day changed, resubscribing");
                        break;
                    }
                    update = feed.next() => {
                        let Some(snapshot) = update else {
                            warn!(uid = %uid, day = %day, "event feed stopped, resubscribing");
                            tokio::time::sleep(config.refresh_interval()).await;
                            break;
                        };
                        if snapshot.day != day || snapshot.seq <= applied_seq {
                            debug!(seq = snapshot.seq, applied_seq, snapshot_day = %snapshot.day, "dropping stale snapshot");
                            continue;
                        }
                        applied_seq = snapshot.seq;

                        match snapshot.result {
                            Ok(events) => {
                                let totals = aggregate_events(&events);
                                debug!(uid = %uid, day = %day, seq = snapshot.seq, events = events.len(), "daily totals updated");
                                state.send_replace(LeftState::ready(totals));
                            }
                            Err(error) => {
                                state.send_modify(|s| {
                                    s.loading = false;
                                    s.error = Some(error);
                                });
                            }
                        }
                    }
                }
            }
        }
    }
}
