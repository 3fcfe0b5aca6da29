use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::CachedToken;
use crate::clock::{Clock, SystemClock, shift};
use crate::error::{TokenError, truncate_body};
use crate::registry::ClientCredentialsConfig;
use crate::secret::SecureString;

/// Bounded exponential backoff applied to transient network failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub min_delay: Duration,
    /// Upper bound of a single delay.
    pub max_delay: Duration,
    /// Number of retries after the first attempt.
    pub max_retries: usize,
    /// Randomize delays.
    pub jitter: bool,
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub(crate) fn backoff(&self) -> ExponentialBuilder {
        let builder = ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_retries);
        if self.jitter {
            builder.with_jitter()
        } else {
            builder
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            max_retries: 3,
            jitter: true,
        }
    }
}

/// The grant sent to a token endpoint.
#[derive(Debug, Clone, Copy)]
pub enum Grant<'a> {
    /// Confidential client authenticating as itself.
    ClientCredentials {
        /// The OAuth2 client id.
        client_id: &'a str,
        /// The OAuth2 client secret.
        client_secret: &'a SecureString,
    },
    /// Resource-owner password grant, used to bootstrap an admin session.
    Password {
        /// The (public) client id, e.g. `admin-cli`.
        client_id: &'a str,
        /// The user name.
        username: &'a str,
        /// The user password.
        password: &'a SecureString,
    },
}

impl<'a> Grant<'a> {
    /// Builds a client-credentials grant from a registered client.
    pub fn client_credentials(config: &'a ClientCredentialsConfig) -> Self {
        Self::ClientCredentials {
            client_id: config.client_id(),
            client_secret: config.client_secret(),
        }
    }

    /// The `grant_type` parameter.
    pub fn grant_type(&self) -> &'static str {
        match self {
            Self::ClientCredentials { .. } => "client_credentials",
            Self::Password { .. } => "password",
        }
    }

    fn form(&self) -> Vec<(&'static str, &'a str)> {
        match *self {
            Self::ClientCredentials {
                client_id,
                client_secret,
            } => vec![
                ("grant_type", "client_credentials"),
                ("client_id", client_id),
                ("client_secret", client_secret.as_str()),
            ],
            Self::Password {
                client_id,
                username,
                password,
            } => vec![
                ("grant_type", "password"),
                ("client_id", client_id),
                ("username", username),
                ("password", password.as_str()),
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Performs grant exchanges against token endpoints.
///
/// Connection failures and timeouts are retried according to the [`RetryPolicy`];
/// any non-2xx answer or unusable body is an immediate
/// [`TokenError::AuthenticationFailure`].
///
/// The exchange is a plain form `POST` rather than the `oauth2` crate's
/// `exchange_client_credentials`. That client folds every HTTP answer into a
/// `RequestTokenError` after the request completes, so a retry predicate over
/// it cannot tell a dropped connection from a 503 without unpicking the error
/// variants; here only [`TokenError::TransientNetwork`] is retried and a 5xx is
/// final. The same path also serves the password grant used for realm
/// provisioning, and keeps the raw status and a truncated body in the error.
#[derive(Debug, Clone)]
pub struct TokenAcquirer {
    http: reqwest::Client,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl TokenAcquirer {
    /// Creates an acquirer using the given HTTP client.
    ///
    /// The client's timeout is the deadline of each individual attempt.
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            retry: RetryPolicy::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Sets the retry policy for transient failures.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the clock used to stamp acquired tokens.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The clock used to stamp acquired tokens.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Acquires a token for a registered client with the client-credentials grant.
    ///
    /// # Errors
    ///
    /// See [`TokenAcquirer::exchange`].
    pub async fn acquire(&self, config: &ClientCredentialsConfig) -> Result<CachedToken, TokenError> {
        self.exchange(
            config.name(),
            config.token_endpoint(),
            Grant::client_credentials(config),
        )
        .await
    }

    /// Posts a grant to a token endpoint and parses the answer.
    ///
    /// `name` only labels logs and errors.
    ///
    /// # Errors
    ///
    /// - [`TokenError::TransientNetwork`] once the retries are exhausted
    /// - [`TokenError::AuthenticationFailure`] on a non-2xx or malformed answer
    /// - [`TokenError::InvalidRequest`] if the request cannot be built
    pub async fn exchange(
        &self,
        name: &str,
        token_endpoint: &Url,
        grant: Grant<'_>,
    ) -> Result<CachedToken, TokenError> {
        let attempt = move || self.exchange_once(name, token_endpoint, grant);

        attempt
            .retry(self.retry.backoff())
            .when(TokenError::is_transient)
            .notify(|error, delay| {
                warn!(%name, %error, ?delay, "token request failed, retrying");
            })
            .await
    }

    async fn exchange_once(
        &self,
        name: &str,
        token_endpoint: &Url,
        grant: Grant<'_>,
    ) -> Result<CachedToken, TokenError> {
        let body =
            serde_urlencoded::to_string(grant.form()).map_err(|err| TokenError::InvalidRequest {
                name: name.to_string(),
                reason: err.to_string(),
            })?;

        debug!(%name, grant_type = grant.grant_type(), endpoint = %token_endpoint, "requesting token");
        let response = self
            .http
            .post(token_endpoint.clone())
            .header(CONTENT_TYPE, mime::APPLICATION_WWW_FORM_URLENCODED.as_ref())
            .header(ACCEPT, mime::APPLICATION_JSON.as_ref())
            .body(body)
            .send()
            .await
            .map_err(|err| TokenError::from_reqwest(name, &err))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|err| TokenError::from_reqwest(name, &err))?;

        if !status.is_success() {
            return Err(TokenError::AuthenticationFailure {
                name: name.to_string(),
                status: Some(status.as_u16()),
                reason: format!("token endpoint answered {status}: {}", truncate_body(&text)),
            });
        }

        let deserializer = &mut serde_json::Deserializer::from_str(&text);
        let payload: TokenResponse =
            serde_path_to_error::deserialize(deserializer).map_err(|err| {
                TokenError::AuthenticationFailure {
                    name: name.to_string(),
                    status: Some(status.as_u16()),
                    reason: format!("malformed token response at '{}': {}", err.path(), err.inner()),
                }
            })?;

        if payload.access_token.is_empty() {
            return Err(TokenError::AuthenticationFailure {
                name: name.to_string(),
                status: Some(status.as_u16()),
                reason: "token response carries an empty access_token".to_string(),
            });
        }

        let issued_at = self.clock.now();
        let lifetime = match payload.expires_in {
            Some(secs) => secs.max(0).unsigned_abs(),
            None => {
                warn!(%name, "token response without expires_in, the token will not be reused");
                0
            }
        };
        let expires_at = shift(issued_at, Duration::from_secs(lifetime));
        debug!(%name, %expires_at, "token acquired");

        Ok(CachedToken::new(payload.access_token, issued_at, expires_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_encode_client_credentials_form() {
        let secret = SecureString::from("s3cr3t&x");
        let grant = Grant::ClientCredentials {
            client_id: "admin-api",
            client_secret: &secret,
        };

        let body = serde_urlencoded::to_string(grant.form()).expect("should encode");
        assert_eq!(
            body,
            "grant_type=client_credentials&client_id=admin-api&client_secret=s3cr3t%26x"
        );
    }

    #[test]
    fn should_encode_password_form() {
        let password = SecureString::from("admin");
        let grant = Grant::Password {
            client_id: "admin-cli",
            username: "admin",
            password: &password,
        };

        assert_eq!(grant.grant_type(), "password");
        let body = serde_urlencoded::to_string(grant.form()).expect("should encode");
        assert_eq!(
            body,
            "grant_type=password&client_id=admin-cli&username=admin&password=admin"
        );
    }

    #[test]
    fn should_not_leak_secrets_in_debug() {
        let secret = SecureString::from("s3cr3t");
        let grant = Grant::ClientCredentials {
            client_id: "admin-api",
            client_secret: &secret,
        };
        assert!(!format!("{grant:?}").contains("s3cr3t"));
    }

    #[test]
    fn should_parse_token_response_without_expiry() {
        let payload: TokenResponse =
            serde_json::from_str(r#"{"access_token":"T1","token_type":"Bearer"}"#)
                .expect("should parse");
        assert_eq!(payload.access_token, "T1");
        assert_eq!(payload.expires_in, None);
    }

    #[test]
    fn should_default_to_bounded_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }
}
