use anyhow::Result;
use async_trait::async_trait;
use chrono::Local;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::aggregate::aggregate_events;
use crate::auth::FirebaseAuth;
use crate::config::FirebaseConfig;
use crate::day::DayKey;
use crate::error::PlanError;
use crate::firestore::{parse_document, FirestoreClient};
use crate::models::*;
use crate::store::DocumentStore;
use crate::targets::compute_targets;

/// Firestore-backed access to one signed-in user's plan data.
#[derive(Clone)]
pub struct DailyPlanClient {
    pub auth: FirebaseAuth,
    pub firestore: FirestoreClient,
    user_id: OnceCell<String>,
}

impl DailyPlanClient {
    pub fn new(config: FirebaseConfig, refresh_token: String) -> Self {
        Self::from_auth(FirebaseAuth::new(config, refresh_token))
    }

    /// Sign in with email and password.
    pub async fn login(config: FirebaseConfig, email: &str, password: &str) -> Result<Self> {
        let auth = FirebaseAuth::sign_in_with_email(config, email, password).await?;
        Ok(Self::from_auth(auth))
    }

    fn from_auth(auth: FirebaseAuth) -> Self {
        let firestore = FirestoreClient::new(auth.clone());
        Self {
            auth,
            firestore,
            user_id: OnceCell::new(),
        }
    }

    pub async fn get_user_id(&self) -> Result<String> {
        let uid = self
            .user_id
            .get_or_try_init(|| self.auth.get_user_id())
            .await?;
        Ok(uid.clone())
    }

    /// Targets for the signed-in user, computed with today's local date.
    pub async fn daily_targets(&self) -> Result<DailyTargets, PlanError> {
        let uid = self.get_user_id().await?;
        let profile = self
            .get_profile(&uid)
            .await?
            .ok_or_else(|| PlanError::ProfileNotFound { uid: uid.clone() })?;
        compute_targets(&profile, Local::now().date_naive())
    }

    /// What the signed-in user has logged so far today.
    pub async fn today_totals(&self) -> Result<DailyConsumedTotals, PlanError> {
        let uid = self.get_user_id().await?;
        let events = self.day_events(&uid, DayKey::today()).await?;
        Ok(aggregate_events(&events))
    }
}

fn profile_path(uid: &str) -> String {
    format!("users/{}", uid)
}

fn day_entries_path(uid: &str, day: DayKey) -> String {
    format!("users/{}/days/{}/entries", uid, day)
}

#[async_trait]
impl DocumentStore for DailyPlanClient {
    async fn get_profile(&self, uid: &str) -> Result<Option<UserProfile>> {
        let Some(doc) = self.firestore.get_document(&profile_path(uid)).await? else {
            return Ok(None);
        };
        Ok(Some(UserProfile::from_fields(parse_document(&doc))?))
    }

    async fn day_events(&self, uid: &str, day: DayKey) -> Result<Vec<ConsumptionEvent>> {
        let docs = self
            .firestore
            .list_all_documents(&day_entries_path(uid, day))
            .await?;
        debug!(uid, day = %day, count = docs.len(), "read day events");

        Ok(docs
            .iter()
            .map(|doc| ConsumptionEvent::from_map(doc.id(), &parse_document(doc)))
            .collect())
    }
}
