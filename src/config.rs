use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};

use crate::day::{DayClock, LocalClock};

const API_KEY_VAR: &str = "DAILY_PLAN_FIREBASE_API_KEY";
const PROJECT_ID_VAR: &str = "DAILY_PLAN_FIREBASE_PROJECT_ID";
const BUNDLE_ID_VAR: &str = "DAILY_PLAN_IOS_BUNDLE_ID";
const REFRESH_SECS_VAR: &str = "DAILY_PLAN_REFRESH_SECS";

const DEFAULT_REFRESH_SECS: u64 = 15;

/// Shortest refresh interval a provider or subscription will poll at.
pub const MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(10);

/// Firebase project the app's profile and food-log documents live in.
#[derive(Debug, Clone)]
pub struct FirebaseConfig {
    /// Public Web API key. Not a secret, it ships inside every app build.
    pub api_key: String,
    pub project_id: String,
    /// Sent as `X-Ios-Bundle-Identifier` when the key is restricted to the iOS app.
    pub bundle_id: Option<String>,
}

impl FirebaseConfig {
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            project_id: project_id.into(),
            bundle_id: None,
        }
    }

    /// Read the project settings from the environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            api_key: required_var(API_KEY_VAR)?,
            project_id: required_var(PROJECT_ID_VAR)?,
            bundle_id: std::env::var(BUNDLE_ID_VAR).ok().filter(|s| !s.is_empty()),
        })
    }
}

/// How often the providers re-read the document store, and which clock
/// decides the current day.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    refresh_interval: Duration,
    clock: Arc<dyn DayClock>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_REFRESH_SECS))
    }
}

impl ProviderConfig {
    /// Intervals shorter than [`MIN_REFRESH_INTERVAL`] are raised to it.
    pub fn new(refresh_interval: Duration) -> Self {
        Self {
            refresh_interval: refresh_interval.max(MIN_REFRESH_INTERVAL),
            clock: Arc::new(LocalClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn DayClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    pub fn clock(&self) -> &dyn DayClock {
        self.clock.as_ref()
    }

    pub fn from_env() -> Result<Self> {
        match std::env::var(REFRESH_SECS_VAR) {
            Ok(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .map_err(|_| anyhow!("{} must be a whole number of seconds, got {:?}", REFRESH_SECS_VAR, raw))?;
                if secs == 0 {
                    return Err(anyhow!("{} must be greater than zero", REFRESH_SECS_VAR));
                }
                Ok(Self::new(Duration::from_secs(secs)))
            }
            Err(_) => Ok(Self::default()),
        }
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| anyhow!("missing environment variable {}", name))
}
