//! Platform credential cache
//!
//! Tokens live in a singleton row per platform. Reads are lock-free off an
//! ArcSwap snapshot; refreshes serialize on a per-platform mutex and write
//! back through compare-and-swap, so concurrent engines converge on one
//! token instead of overwriting each other.

use crate::models::{Config, Platform};
use crate::store::ContestStore;
use anyhow::{Context, Result};
use arc_swap::ArcSwapOption;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const TIKTOK_TOKEN_URL: &str = "https://open.tiktokapis.com/v2/oauth/token/";

#[derive(Debug, Clone)]
pub enum CredentialError {
    /// No credential configured and nothing usable stored
    Unavailable(Platform),
    /// The refresh endpoint or the credential store rejected us
    RefreshFailed { platform: Platform, detail: String },
}

impl std::fmt::Display for CredentialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(platform) => {
                write!(f, "No credential available for {}", platform.as_str())
            }
            Self::RefreshFailed { platform, detail } => {
                write!(
                    f,
                    "Failed to refresh {} credential: {}",
                    platform.as_str(),
                    detail
                )
            }
        }
    }
}

impl std::error::Error for CredentialError {}

#[derive(Debug)]
struct CachedToken {
    access_token: String,
    updated_at: i64,
}

#[derive(Default)]
struct PlatformSlot {
    hot: ArcSwapOption<CachedToken>,
    refresh_lock: Mutex<()>,
}

pub struct CredentialCache {
    store: ContestStore,
    client: Client,
    config: Config,
    max_age_secs: i64,
    youtube: PlatformSlot,
    tiktok: PlatformSlot,
}

impl CredentialCache {
    pub fn new(store: ContestStore, config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build credential refresh client")?;

        Ok(Self {
            store,
            client,
            config: config.clone(),
            max_age_secs: config.credential_max_age_secs,
            youtube: PlatformSlot::default(),
            tiktok: PlatformSlot::default(),
        })
    }

    /// Access token for the platform, refreshed if the stored one is older
    /// than the freshness window.
    pub async fn get_valid_token(&self, platform: Platform) -> Result<String, CredentialError> {
        let now = Utc::now().timestamp();
        let slot = self.slot(platform);

        // Lock-free fast path for the common case
        if let Some(tok) = slot.hot.load_full() {
            if now - tok.updated_at < self.max_age_secs {
                return Ok(tok.access_token.clone());
            }
        }

        self.refresh(platform, now, false).await
    }

    /// Mint a fresh token regardless of age. Used after a platform rejects
    /// the token we just handed out.
    pub async fn force_refresh(&self, platform: Platform) -> Result<String, CredentialError> {
        let now = Utc::now().timestamp();
        self.refresh(platform, now, true).await
    }

    async fn refresh(
        &self,
        platform: Platform,
        now: i64,
        force: bool,
    ) -> Result<String, CredentialError> {
        let slot = self.slot(platform);

        // One in-process refresher per platform; everyone else waits here
        // and reuses the winner's token
        let _guard = slot.refresh_lock.lock().await;

        // Re-read under the lock: another task or another process may have
        // refreshed while we waited
        let stored = self.store.get_credential(platform).await.map_err(|e| {
            CredentialError::RefreshFailed {
                platform,
                detail: format!("credential read failed: {}", e),
            }
        })?;

        if !force {
            if let Some(cred) = &stored {
                if now - cred.updated_at < self.max_age_secs {
                    self.publish(slot, &cred.access_token, cred.updated_at);
                    return Ok(cred.access_token.clone());
                }
            }
        }

        let minted = match self.mint_token(platform).await {
            Ok(tok) => tok,
            Err(err) => {
                // A stale token within twice the freshness window still
                // beats nothing, unless the platform already rejected it
                if !force {
                    if let Some(cred) = stored {
                        if now - cred.updated_at < self.max_age_secs * 2 {
                            warn!(
                                "⚠️ {} token refresh failed ({}), serving stored token from {}",
                                platform.as_str(),
                                err,
                                cred.updated_at
                            );
                            self.publish(slot, &cred.access_token, cred.updated_at);
                            return Ok(cred.access_token);
                        }
                    }
                }
                return Err(err);
            }
        };

        let expected = stored.as_ref().map(|c| c.updated_at);
        let won = self
            .store
            .put_credential_cas(platform, &minted, expected, now)
            .await
            .map_err(|e| CredentialError::RefreshFailed {
                platform,
                detail: format!("credential write failed: {}", e),
            })?;

        if won {
            self.publish(slot, &minted, now);
            info!("🔑 Refreshed {} access token", platform.as_str());
            return Ok(minted);
        }

        // Lost the swap: another process landed its refresh first. Adopt
        // that token instead of stomping on it.
        let cred = self
            .store
            .get_credential(platform)
            .await
            .map_err(|e| CredentialError::RefreshFailed {
                platform,
                detail: format!("credential re-read failed: {}", e),
            })?
            .ok_or_else(|| CredentialError::RefreshFailed {
                platform,
                detail: "credential row vanished after losing the swap".to_string(),
            })?;
        self.publish(slot, &cred.access_token, cred.updated_at);
        info!(
            "🔑 Adopted {} token refreshed by another writer",
            platform.as_str()
        );
        Ok(cred.access_token)
    }

    fn publish(&self, slot: &PlatformSlot, access_token: &str, updated_at: i64) {
        slot.hot.store(Some(Arc::new(CachedToken {
            access_token: access_token.to_string(),
            updated_at,
        })));
    }

    fn slot(&self, platform: Platform) -> &PlatformSlot {
        match platform {
            Platform::Youtube => &self.youtube,
            Platform::Tiktok => &self.tiktok,
        }
    }

    async fn mint_token(&self, platform: Platform) -> Result<String, CredentialError> {
        match platform {
            Platform::Youtube => {
                let (Some(client_id), Some(client_secret), Some(refresh_token)) = (
                    self.config.youtube_client_id.as_deref(),
                    self.config.youtube_client_secret.as_deref(),
                    self.config.youtube_refresh_token.as_deref(),
                ) else {
                    return Err(CredentialError::Unavailable(platform));
                };
                let form = [
                    ("client_id", client_id),
                    ("client_secret", client_secret),
                    ("refresh_token", refresh_token),
                    ("grant_type", "refresh_token"),
                ];
                self.request_token(platform, GOOGLE_TOKEN_URL, &form).await
            }
            Platform::Tiktok => {
                let (Some(client_key), Some(client_secret)) = (
                    self.config.tiktok_client_key.as_deref(),
                    self.config.tiktok_client_secret.as_deref(),
                ) else {
                    return Err(CredentialError::Unavailable(platform));
                };
                let form = [
                    ("client_key", client_key),
                    ("client_secret", client_secret),
                    ("grant_type", "client_credentials"),
                ];
                self.request_token(platform, TIKTOK_TOKEN_URL, &form).await
            }
        }
    }

    async fn request_token(
        &self,
        platform: Platform,
        token_url: &str,
        form: &[(&str, &str)],
    ) -> Result<String, CredentialError> {
        let resp = self
            .client
            .post(token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| CredentialError::RefreshFailed {
                platform,
                detail: format!("token request failed: {}", e),
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CredentialError::RefreshFailed {
                platform,
                detail: format!("token endpoint {}: {}", status, text),
            });
        }

        let parsed: TokenResponse =
            resp.json()
                .await
                .map_err(|e| CredentialError::RefreshFailed {
                    platform,
                    detail: format!("failed to parse token response: {}", e),
                })?;

        // TikTok signals bad app credentials inside a 200 body
        match parsed.access_token {
            Some(tok) if !tok.is_empty() => Ok(tok),
            _ => Err(CredentialError::RefreshFailed {
                platform,
                detail: format!(
                    "token endpoint returned no token: {} {}",
                    parsed.error.unwrap_or_default(),
                    parsed.error_description.unwrap_or_default()
                ),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    error_description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            database_path: ":memory:".to_string(),
            port: 8080,
            sync_interval_secs: 300,
            sync_concurrency: 4,
            credential_max_age_secs: 5400,
            youtube_client_id: None,
            youtube_client_secret: None,
            youtube_refresh_token: None,
            tiktok_client_key: None,
            tiktok_client_secret: None,
        }
    }

    fn test_cache() -> (CredentialCache, ContestStore) {
        let store = ContestStore::new_in_memory().unwrap();
        let cache = CredentialCache::new(store.clone(), &test_config()).unwrap();
        (cache, store)
    }

    #[tokio::test]
    async fn test_fresh_stored_token_is_served_without_refresh() {
        let (cache, store) = test_cache();
        let now = Utc::now().timestamp();
        store
            .put_credential(Platform::Youtube, "stored-token", now - 60)
            .await
            .unwrap();

        let tok = cache.get_valid_token(Platform::Youtube).await.unwrap();
        assert_eq!(tok, "stored-token");

        // Second read must hit the in-memory snapshot
        let tok = cache.get_valid_token(Platform::Youtube).await.unwrap();
        assert_eq!(tok, "stored-token");
    }

    #[tokio::test]
    async fn test_no_credential_and_no_config_is_unavailable() {
        let (cache, _store) = test_cache();
        let err = cache.get_valid_token(Platform::Tiktok).await.unwrap_err();
        assert!(matches!(err, CredentialError::Unavailable(Platform::Tiktok)));
    }

    #[tokio::test]
    async fn test_stale_token_within_grace_is_served_when_refresh_fails() {
        let (cache, store) = test_cache();
        let now = Utc::now().timestamp();
        // Older than the freshness window but inside the 2x grace period;
        // with no OAuth config the mint fails and the stored token is used
        store
            .put_credential(Platform::Youtube, "stale-token", now - 6000)
            .await
            .unwrap();

        let tok = cache.get_valid_token(Platform::Youtube).await.unwrap();
        assert_eq!(tok, "stale-token");
    }

    #[tokio::test]
    async fn test_token_past_grace_period_is_rejected() {
        let (cache, store) = test_cache();
        let now = Utc::now().timestamp();
        store
            .put_credential(Platform::Youtube, "ancient-token", now - 20_000)
            .await
            .unwrap();

        let err = cache.get_valid_token(Platform::Youtube).await.unwrap_err();
        assert!(matches!(err, CredentialError::Unavailable(Platform::Youtube)));
    }

    #[tokio::test]
    async fn test_force_refresh_never_reuses_stored_token() {
        let (cache, store) = test_cache();
        let now = Utc::now().timestamp();
        store
            .put_credential(Platform::Youtube, "rejected-token", now - 10)
            .await
            .unwrap();

        // The stored token is fresh, but force refresh must not serve it
        let err = cache.force_refresh(Platform::Youtube).await.unwrap_err();
        assert!(matches!(err, CredentialError::Unavailable(Platform::Youtube)));
    }
}
