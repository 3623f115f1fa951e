//! Installation tokens, cached per repository until shortly before they expire.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use chrono::{DateTime, Duration, Utc};
use tracing::trace;

use crate::error::PublishResult;

/// Tokens are treated as expired this long before their actual expiry.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::minutes(5);

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Shareable cache of installation tokens keyed by `owner/name`.
///
/// Clones share the same storage.
#[derive(Debug, Clone)]
pub struct InstallationTokenCache {
    tokens: Arc<RwLock<HashMap<String, CachedToken>>>,
    margin: Duration,
}

impl Default for InstallationTokenCache {
    fn default() -> Self {
        Self::new(DEFAULT_EXPIRY_MARGIN)
    }
}

impl InstallationTokenCache {
    pub fn new(margin: Duration) -> Self {
        Self {
            tokens: Arc::new(RwLock::new(HashMap::new())),
            margin,
        }
    }

    /// A still-valid token for `repository`, if cached.
    pub fn get(&self, repository: &str) -> Option<String> {
        self.get_at(repository, Utc::now())
    }

    fn get_at(&self, repository: &str, now: DateTime<Utc>) -> Option<String> {
        let tokens = self.tokens.read().unwrap_or_else(|e| e.into_inner());
        tokens
            .get(repository)
            .filter(|cached| cached.expires_at - self.margin > now)
            .map(|cached| cached.token.clone())
    }

    pub fn insert(&self, repository: &str, token: String, expires_at: DateTime<Utc>) {
        let mut tokens = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        tokens.insert(
            repository.to_string(),
            CachedToken {
                token,
                expires_at,
            },
        );
    }

    /// Returns the cached token or fetches, stores and returns a new one.
    ///
    /// `fetch` yields the token and its expiry.
    pub fn get_or_insert_with<F>(&self, repository: &str, fetch: F) -> PublishResult<String>
    where
        F: FnOnce() -> PublishResult<(String, DateTime<Utc>)>,
    {
        self.get_or_insert_with_at(repository, Utc::now(), fetch)
    }

    fn get_or_insert_with_at<F>(
        &self,
        repository: &str,
        now: DateTime<Utc>,
        fetch: F,
    ) -> PublishResult<String>
    where
        F: FnOnce() -> PublishResult<(String, DateTime<Utc>)>,
    {
        if let Some(token) = self.get_at(repository, now) {
            trace!(repository, "installation token cache hit");
            return Ok(token);
        }

        let (token, expires_at) = fetch()?;
        self.insert(repository, token.clone(), expires_at);
        Ok(token)
    }

    pub fn invalidate(&self, repository: &str) {
        let mut tokens = self.tokens.write().unwrap_or_else(|e| e.into_inner());
        tokens.remove(repository);
    }

    pub fn len(&self) -> usize {
        self.tokens.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
