use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::error::{TokenError, TransportError};
use crate::registry::ClientRegistry;
use crate::token::{CachedToken, DEFAULT_EXPIRY_SKEW, RetryPolicy, TokenAcquirer, TokenCache};
use crate::transport::AuthenticatingTransport;

/// Default deadline of a single HTTP attempt (10 seconds).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Tuning of token acquisition and caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSettings {
    /// Safety margin before expiry after which a cached token is renewed.
    pub expiry_skew: Duration,
    /// Deadline of a single HTTP attempt.
    pub request_timeout: Duration,
    /// Retries of transient failures at the token endpoint.
    pub retry: RetryPolicy,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            expiry_skew: DEFAULT_EXPIRY_SKEW,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// Wires a [`ClientRegistry`] to a shared [`TokenCache`] and hands out
/// [`AuthenticatingTransport`]s.
///
/// One manager per process (or per test) is enough: transports are cheap
/// clones sharing the same HTTP client and cache.
///
/// ```rust,no_run
/// # use kcauth_core::{ClientRegistry, TokenManager};
/// # async fn example(registry: ClientRegistry) -> Result<(), Box<dyn std::error::Error>> {
/// let manager = TokenManager::builder(registry).build()?;
///
/// let admin = manager.transport("keycloak_admin_api_token")?;
/// let url = "http://localhost:8080/admin/realms/master/users".parse()?;
/// let response = admin.execute(admin.get(url)).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TokenManager {
    http: reqwest::Client,
    cache: Arc<TokenCache>,
}

impl TokenManager {
    /// Starts configuring a manager for the clients of `registry`.
    pub fn builder(registry: ClientRegistry) -> TokenManagerBuilder {
        TokenManagerBuilder {
            registry,
            settings: TokenSettings::default(),
            clock: Arc::new(SystemClock),
            http: None,
        }
    }

    /// The shared token cache.
    pub fn cache(&self) -> &Arc<TokenCache> {
        &self.cache
    }

    /// The HTTP client used for token and resource requests.
    pub fn http_client(&self) -> &reqwest::Client {
        &self.http
    }

    /// Returns a valid token for `name`, see [`TokenCache::get_token`].
    ///
    /// # Errors
    ///
    /// Returns a [`TokenError`] if no token can be obtained.
    pub async fn get_token(&self, name: &str) -> Result<CachedToken, TokenError> {
        self.cache.get_token(name).await
    }

    /// Returns a transport authenticating as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::UnknownClient`] if `name` is not registered, so a
    /// misconfigured name fails at wiring time rather than on first use.
    pub fn transport(&self, name: &str) -> Result<AuthenticatingTransport, TokenError> {
        if !self.cache.registry().contains(name) {
            return Err(TokenError::UnknownClient {
                name: name.to_string(),
            });
        }
        Ok(AuthenticatingTransport::new(
            self.http.clone(),
            Arc::clone(&self.cache),
            name,
        ))
    }
}

/// Builder of a [`TokenManager`].
#[derive(Debug)]
pub struct TokenManagerBuilder {
    registry: ClientRegistry,
    settings: TokenSettings,
    clock: Arc<dyn Clock>,
    http: Option<reqwest::Client>,
}

impl TokenManagerBuilder {
    /// Sets the acquisition and caching settings.
    #[must_use]
    pub fn with_settings(mut self, settings: TokenSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Sets the clock used for every expiry decision.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Uses an existing HTTP client instead of building one.
    ///
    /// The `request_timeout` setting is then ignored: the client's own
    /// configuration applies.
    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    /// Builds the manager.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::InvalidRequest`] if the HTTP client cannot be built.
    pub fn build(self) -> Result<TokenManager, TransportError> {
        let Self {
            registry,
            settings,
            clock,
            http,
        } = self;

        let http = match http {
            Some(http) => http,
            None => reqwest::Client::builder()
                .timeout(settings.request_timeout)
                .build()?,
        };

        let acquirer = TokenAcquirer::new(http.clone())
            .with_retry(settings.retry)
            .with_clock(clock);
        let cache =
            TokenCache::new(Arc::new(registry), acquirer).with_expiry_skew(settings.expiry_skew);

        Ok(TokenManager {
            http,
            cache: Arc::new(cache),
        })
    }
}
