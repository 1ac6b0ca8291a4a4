use std::sync::Arc;

use anyhow::{anyhow, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::FirebaseConfig;

const SIGN_IN_URL: &str = "https://identitytoolkit.googleapis.com/v1/accounts:signInWithPassword";
const REFRESH_URL: &str = "https://securetoken.googleapis.com/v1/token";

/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct RefreshTokenResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
    local_id: String,
}

#[derive(Debug, Clone)]
struct CachedToken {
    id_token: String,
    expires_at: chrono::DateTime<chrono::Utc>,
}

/// Firebase Auth session for one user.
#[derive(Clone)]
pub struct FirebaseAuth {
    client: Client,
    config: Arc<FirebaseConfig>,
    refresh_token: Arc<Mutex<String>>,
    cached_token: Arc<Mutex<Option<CachedToken>>>,
}

impl FirebaseAuth {
    pub fn new(config: FirebaseConfig, refresh_token: String) -> Self {
        Self {
            client: Client::new(),
            config: Arc::new(config),
            refresh_token: Arc::new(Mutex::new(refresh_token)),
            cached_token: Arc::new(Mutex::new(None)),
        }
    }

    pub fn config(&self) -> &FirebaseConfig {
        &self.config
    }

    /// Sign in with email and password.
    pub async fn sign_in_with_email(
        config: FirebaseConfig,
        email: &str,
        password: &str,
    ) -> Result<Self> {
        let client = Client::new();
        let req = client
            .post(SIGN_IN_URL)
            .query(&[("key", config.api_key.as_str())])
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "returnSecureToken": true
            }));

        let resp = with_bundle_id(req, &config).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Sign-in failed: {} - {}", status, body));
        }

        let sign_in: SignInResponse = resp.json().await?;
        debug!(uid = %sign_in.local_id, "signed in");

        let expires_at = expiry_from_now(&sign_in.expires_in);

        Ok(Self {
            client,
            config: Arc::new(config),
            refresh_token: Arc::new(Mutex::new(sign_in.refresh_token)),
            cached_token: Arc::new(Mutex::new(Some(CachedToken {
                id_token: sign_in.id_token,
                expires_at,
            }))),
        })
    }

    pub async fn get_id_token(&self) -> Result<String> {
        {
            let cached = self.cached_token.lock().await;
            if let Some(ref token) = *cached {
                let margin = chrono::Duration::seconds(EXPIRY_MARGIN_SECS);
                if token.expires_at > chrono::Utc::now() + margin {
                    return Ok(token.id_token.clone());
                }
            }
        }

        self.refresh_id_token().await
    }

    async fn refresh_id_token(&self) -> Result<String> {
        let refresh_token = self.refresh_token.lock().await.clone();

        let req = self
            .client
            .post(REFRESH_URL)
            .query(&[("key", self.config.api_key.as_str())])
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
            ]);

        let resp = with_bundle_id(req, &self.config).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to refresh token: {} - {}", status, body));
        }

        let token_resp: RefreshTokenResponse = resp.json().await?;
        debug!("refreshed id token");

        let expires_at = expiry_from_now(&token_resp.expires_in);

        // Firebase may rotate the refresh token
        *self.refresh_token.lock().await = token_resp.refresh_token;

        let id_token = token_resp.id_token.clone();
        *self.cached_token.lock().await = Some(CachedToken {
            id_token: token_resp.id_token,
            expires_at,
        });

        Ok(id_token)
    }

    /// The signed-in user's id, read from the ID token claims.
    pub async fn get_user_id(&self) -> Result<String> {
        let token = self.get_id_token().await?;
        user_id_from_token(&token)
    }
}

fn with_bundle_id(req: RequestBuilder, config: &FirebaseConfig) -> RequestBuilder {
    match config.bundle_id {
        Some(ref bundle) => req.header("X-Ios-Bundle-Identifier", bundle),
        None => req,
    }
}

fn expiry_from_now(expires_in: &str) -> chrono::DateTime<chrono::Utc> {
    let secs: i64 = expires_in.parse().unwrap_or(3600);
    chrono::Utc::now() + chrono::Duration::seconds(secs)
}

/// Decode the JWT payload and pull out `user_id` (or `sub`).
pub fn user_id_from_token(token: &str) -> Result<String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(anyhow!("Invalid JWT format"));
    }

    let payload = URL_SAFE_NO_PAD.decode(parts[1].trim_end_matches('='))?;
    let claims: serde_json::Value = serde_json::from_slice(&payload)?;
    claims["user_id"]
        .as_str()
        .or_else(|| claims["sub"].as_str())
        .map(String::from)
        .ok_or_else(|| anyhow!("No user_id or sub claim in token"))
}
