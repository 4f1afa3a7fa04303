//! Access token acquisition and caching
//!
//! Every platform call needs a short-lived access token. [`TokenManager`]
//! fetches one through the primary `token` endpoint, falls back to
//! `stable_token` when the primary path fails for any reason, and caches the
//! result until five minutes before the platform-reported expiry.
//!
//! The cache lock is held for the whole refresh, so concurrent callers that
//! find the cache stale wait on the first refresh instead of starting their
//! own.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::{decode_reply, encode_body, Endpoints, Reply, Transport};
use crate::config::Credentials;
use crate::error::{ConfigError, PlatformError, Result, WxPubError};

/// Safety margin subtracted from the reported token lifetime.
pub const EXPIRY_MARGIN: Duration = Duration::from_secs(300);

/// Lifetime assumed when the primary endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN: u64 = 7200;

/// A cached access token.
#[derive(Clone)]
pub struct AccessToken {
    value: String,
    expires_at: Instant,
}

impl AccessToken {
    /// Build a token from a platform-reported lifetime in seconds.
    pub fn new(value: impl Into<String>, expires_in_secs: u64) -> Self {
        let lifetime = Duration::from_secs(expires_in_secs).saturating_sub(EXPIRY_MARGIN);
        Self {
            value: value.into(),
            expires_at: Instant::now() + lifetime,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }

    /// Time left before the token is treated as stale.
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// Short prefix safe for logs.
    pub fn redacted(&self) -> String {
        let prefix: String = self.value.chars().take(8).collect();
        format!("{}...", prefix)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &self.redacted())
            .field("remaining", &self.remaining())
            .finish()
    }
}

#[derive(Deserialize)]
struct PrimaryTokenReply {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct StableTokenReply {
    access_token: String,
    expires_in: u64,
}

#[derive(Serialize)]
struct StableTokenRequest<'a> {
    grant_type: &'a str,
    appid: &'a str,
    secret: &'a str,
    force_refresh: bool,
}

/// Obtains and caches access tokens for one app.
pub struct TokenManager {
    credentials: Credentials,
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    cached: Mutex<Option<AccessToken>>,
}

impl TokenManager {
    pub fn new(credentials: Credentials, transport: Arc<dyn Transport>, endpoints: Endpoints) -> Self {
        Self {
            credentials,
            transport,
            endpoints,
            cached: Mutex::new(None),
        }
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Return a valid access token, refreshing it when needed.
    ///
    /// # Errors
    ///
    /// - `ConfigError::CredentialsMissing` if the app id or secret is empty
    ///   (checked before any network call)
    /// - `PlatformError::Authentication` if both the primary and the stable
    ///   endpoint fail; the message names both failures
    pub async fn get_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.is_valid() {
                return Ok(token.value().to_string());
            }
            tracing::debug!("Cached access token is stale, refreshing");
        }

        if !self.credentials.is_complete() {
            return Err(ConfigError::CredentialsMissing.into());
        }

        let token = match self.fetch_primary().await {
            Ok(token) => token,
            Err(primary) => {
                tracing::warn!(
                    error = %primary,
                    "Primary token endpoint failed, trying stable token endpoint"
                );
                self.fetch_stable().await.map_err(|stable| {
                    PlatformError::Authentication(format!(
                        "token endpoint: {}; stable_token endpoint: {}",
                        primary, stable
                    ))
                })?
            }
        };

        tracing::info!(
            app_id = %self.credentials.app_id(),
            token = %token.redacted(),
            valid_for_secs = token.remaining().as_secs(),
            "Access token refreshed"
        );

        let value = token.value().to_string();
        *cached = Some(token);
        Ok(value)
    }

    /// Drop the cached token if it is still `rejected`, so the next call
    /// refreshes it.
    ///
    /// Callers use this after the platform rejects a token (codes 40001,
    /// 40014, 42001); nothing is retried automatically. A token another
    /// caller refreshed in the meantime is kept.
    pub async fn invalidate(&self, rejected: &str) {
        let mut cached = self.cached.lock().await;
        match cached.as_ref() {
            Some(token) if token.value() == rejected => {
                *cached = None;
                tracing::info!("Access token invalidated");
            }
            Some(_) => tracing::debug!("Rejected token already replaced, keeping cache"),
            None => {}
        }
    }

    async fn fetch_primary(&self) -> Result<AccessToken> {
        let query = [
            ("grant_type", "client_credential"),
            ("appid", self.credentials.app_id()),
            ("secret", self.credentials.secret()),
        ];
        let response = self.transport.get(&self.endpoints.token(), &query).await?;

        match decode_reply::<PrimaryTokenReply>(&response, "token")? {
            Reply::Success(reply) => Ok(AccessToken::new(
                reply.access_token,
                reply.expires_in.unwrap_or(DEFAULT_EXPIRES_IN),
            )),
            Reply::Rejected(err) => Err(PlatformError::Api(err).into()),
        }
    }

    async fn fetch_stable(&self) -> Result<AccessToken> {
        let body = encode_body(&StableTokenRequest {
            grant_type: "client_credential",
            appid: self.credentials.app_id(),
            secret: self.credentials.secret(),
            force_refresh: false,
        })?;
        let response = self
            .transport
            .post_json(&self.endpoints.stable_token(), &[], body)
            .await?;

        match decode_reply::<StableTokenReply>(&response, "stable_token")? {
            Reply::Success(reply) => Ok(AccessToken::new(reply.access_token, reply.expires_in)),
            Reply::Rejected(err) => Err(WxPubError::Platform(PlatformError::Api(err))),
        }
    }
}
