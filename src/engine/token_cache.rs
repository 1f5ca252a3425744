// Per-account access-token cache. Tokens live only for the process lifetime;
// refresh tokens are exchanged on miss and never written back to the store.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::AppResult;
use crate::models::{AccountRecord, CachedToken, RefreshCredential, TokenResponse};
use crate::modules::oauth;

/// Safety margin subtracted from the upstream-reported expiry.
const EXPIRY_MARGIN_SECS: i64 = 60;
/// Hard ceiling on how long a cached token is trusted.
const CACHE_TTL_CEILING_SECS: i64 = 300;

pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Seam for the refresh-grant exchange, so cache behavior is testable
/// without the network.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(&self, refresh_token: &str) -> AppResult<TokenResponse>;
}

pub struct GoogleExchanger {
    client: reqwest::Client,
}

impl GoogleExchanger {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for GoogleExchanger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TokenExchanger for GoogleExchanger {
    async fn exchange(&self, refresh_token: &str) -> AppResult<TokenResponse> {
        oauth::refresh_access_token(&self.client, refresh_token).await
    }
}

pub struct TokenCache {
    entries: DashMap<String, CachedToken>,
    clock: Arc<dyn Clock>,
}

impl TokenCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Returns a currently valid access token for the account. Cache hits do
    /// no I/O; misses perform one refresh exchange with the bare token
    /// extracted from the (possibly composite) stored credential.
    ///
    /// Concurrent misses for the same email may both refresh; the last write
    /// to the cache wins, which is harmless.
    pub async fn get_access_token<E: TokenExchanger + ?Sized>(
        &self,
        account: &AccountRecord,
        exchanger: &E,
    ) -> AppResult<String> {
        let now = self.clock.now_unix();
        if let Some(entry) = self.entries.get(&account.email) {
            if entry.is_valid(now) {
                return Ok(entry.access_token.clone());
            }
        }

        let credential = RefreshCredential::parse(&account.refresh_token);
        let response = exchanger.exchange(&credential.refresh_token).await?;

        let ttl = (response.expires_in - EXPIRY_MARGIN_SECS).min(CACHE_TTL_CEILING_SECS);
        self.entries.insert(
            account.email.clone(),
            CachedToken {
                access_token: response.access_token.clone(),
                expires_at: now + ttl,
            },
        );
        tracing::debug!(
            "cached access token for {} (ttl {}s)",
            account.email,
            ttl
        );
        Ok(response.access_token)
    }

    #[cfg(test)]
    fn peek(&self, email: &str) -> Option<CachedToken> {
        self.entries.get(email).map(|e| e.clone())
    }
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}
