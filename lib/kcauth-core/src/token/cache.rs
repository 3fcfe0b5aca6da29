use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, trace};

use super::{CachedToken, TokenAcquirer};
use crate::error::TokenError;
use crate::registry::ClientRegistry;

/// Default safety margin before a token's expiry (30 seconds).
pub const DEFAULT_EXPIRY_SKEW: Duration = Duration::from_secs(30);

/// Coordination state of one client name.
///
/// Holding `outcome` is the exclusive section of that name. `completed` counts
/// finished acquisitions, so a caller that queued on the lock can tell whether
/// an acquisition ran while it was waiting and reuse its outcome.
#[derive(Debug, Default)]
struct Flight {
    completed: AtomicU64,
    outcome: Mutex<Option<Result<CachedToken, TokenError>>>,
}

/// Per-client-name token cache with single-flight acquisition.
///
/// - A fresh cached token is returned without any network call.
/// - On miss or expiry, the first caller for a name performs the acquisition;
///   callers already waiting on that name receive the same outcome.
/// - Different names never block each other.
/// - A failed acquisition leaves the cache untouched.
#[derive(Debug)]
pub struct TokenCache {
    registry: Arc<ClientRegistry>,
    acquirer: TokenAcquirer,
    skew: Duration,
    entries: RwLock<HashMap<String, CachedToken>>,
    flights: Mutex<HashMap<String, Arc<Flight>>>,
}

impl TokenCache {
    /// Creates an empty cache for the clients of `registry`.
    pub fn new(registry: Arc<ClientRegistry>, acquirer: TokenAcquirer) -> Self {
        Self {
            registry,
            acquirer,
            skew: DEFAULT_EXPIRY_SKEW,
            entries: RwLock::default(),
            flights: Mutex::default(),
        }
    }

    /// Sets the safety margin before expiry after which a token is no longer served.
    #[must_use]
    pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// The registry backing this cache.
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Returns a valid token for `name`, acquiring one if needed.
    ///
    /// # Errors
    ///
    /// - [`TokenError::UnknownClient`] if `name` is not registered
    /// - any acquisition error, see [`TokenAcquirer::exchange`]
    pub async fn get_token(&self, name: &str) -> Result<CachedToken, TokenError> {
        let Some(config) = self.registry.get(name) else {
            return Err(TokenError::UnknownClient {
                name: name.to_string(),
            });
        };

        if let Some(token) = self.fresh(name).await {
            trace!(%name, "token cache hit");
            return Ok(token);
        }

        let flight = self.flight(name).await;
        let seen = flight.completed.load(Ordering::Acquire);
        let mut outcome = flight.outcome.lock().await;

        if flight.completed.load(Ordering::Acquire) != seen
            && let Some(result) = outcome.as_ref()
        {
            debug!(%name, "joined an in-flight token acquisition");
            return result.clone();
        }

        // filled between the first lookup and entering the section
        if let Some(token) = self.fresh(name).await {
            return Ok(token);
        }

        debug!(%name, "acquiring token");
        let result = self.acquirer.acquire(config).await;
        if let Ok(token) = &result {
            self.entries
                .write()
                .await
                .insert(name.to_string(), token.clone());
        }
        *outcome = Some(result.clone());
        flight.completed.fetch_add(1, Ordering::Release);

        result
    }

    /// Drops the cached token of `name` if it is still the `rejected` one.
    ///
    /// Returns `true` if an entry was removed. A token refreshed concurrently by
    /// another caller is kept.
    pub async fn invalidate(&self, name: &str, rejected: &CachedToken) -> bool {
        let mut entries = self.entries.write().await;
        let is_rejected = entries
            .get(name)
            .is_some_and(|current| current.same_value(rejected));
        if is_rejected {
            entries.remove(name);
            debug!(%name, "cached token invalidated");
        }
        is_rejected
    }

    /// Drops the cached token of `name`, whatever it is.
    pub async fn evict(&self, name: &str) {
        self.entries.write().await.remove(name);
    }

    /// Drops every cached token.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Returns the cached token of `name` without checking its freshness.
    pub async fn peek(&self, name: &str) -> Option<CachedToken> {
        self.entries.read().await.get(name).cloned()
    }

    async fn fresh(&self, name: &str) -> Option<CachedToken> {
        let now = self.acquirer.clock().now();
        let entries = self.entries.read().await;
        entries
            .get(name)
            .filter(|token| token.is_fresh(now, self.skew))
            .cloned()
    }

    async fn flight(&self, name: &str) -> Arc<Flight> {
        let mut flights = self.flights.lock().await;
        Arc::clone(flights.entry(name.to_string()).or_default())
    }
}
