//! Bearer-token decoration of outbound requests.

use std::sync::Arc;

use http::{HeaderValue, Method, StatusCode};
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{Request, RequestBuilder, Response};
use tracing::{debug, warn};
use url::Url;
use zeroize::Zeroizing;

use crate::error::TransportError;
use crate::token::{CachedToken, TokenCache};

/// Sends requests on behalf of one named client.
///
/// Every request gets an `Authorization: Bearer <token>` header from the
/// [`TokenCache`]. A 401 answer invalidates the token and the request is replayed
/// once with a fresh token; a second 401 is an
/// [`AuthenticationFailure`](TransportError::AuthenticationFailure).
/// Any other status is returned as is.
///
/// ```rust,no_run
/// # use kcauth_core::{AuthenticatingTransport, TransportError};
/// # async fn example(admin: AuthenticatingTransport) -> Result<(), TransportError> {
/// let url = "http://localhost:8080/admin/realms/master/users".parse().expect("valid url");
/// let response = admin.execute(admin.get(url)).await?;
/// if response.status().is_success() {
///     // ...
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AuthenticatingTransport {
    http: reqwest::Client,
    cache: Arc<TokenCache>,
    name: String,
}

impl AuthenticatingTransport {
    /// Creates a transport bound to the client `name`.
    pub fn new(http: reqwest::Client, cache: Arc<TokenCache>, name: impl Into<String>) -> Self {
        Self {
            http,
            cache,
            name: name.into(),
        }
    }

    /// The client name this transport authenticates as.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts a request with the underlying HTTP client.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        self.http.request(method, url)
    }

    /// Starts a `GET` request.
    pub fn get(&self, url: Url) -> RequestBuilder {
        self.request(Method::GET, url)
    }

    /// Starts a `POST` request.
    pub fn post(&self, url: Url) -> RequestBuilder {
        self.request(Method::POST, url)
    }

    /// Starts a `PUT` request.
    pub fn put(&self, url: Url) -> RequestBuilder {
        self.request(Method::PUT, url)
    }

    /// Starts a `DELETE` request.
    pub fn delete(&self, url: Url) -> RequestBuilder {
        self.request(Method::DELETE, url)
    }

    /// Builds and sends a request.
    ///
    /// # Errors
    ///
    /// See [`AuthenticatingTransport::send`].
    pub async fn execute(&self, builder: RequestBuilder) -> Result<Response, TransportError> {
        let request = builder.build()?;
        self.send(request).await
    }

    /// Sends a request with a bearer token, refreshing it once on 401.
    ///
    /// A request whose body cannot be cloned (streaming body) cannot be
    /// replayed: its first 401 is reported as an authentication failure.
    ///
    /// # Errors
    ///
    /// - [`TransportError::Token`] if no token can be obtained
    /// - [`TransportError::TransientNetwork`] on connection failure or timeout
    /// - [`TransportError::AuthenticationFailure`] on a 401 after the refresh, carrying
    ///   the rejected URL and the server's `WWW-Authenticate` challenge
    pub async fn send(&self, request: Request) -> Result<Response, TransportError> {
        let replay = request.try_clone();

        let token = self.cache.get_token(&self.name).await?;
        let response = self.dispatch(request, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!(name = %self.name, url = %response.url(), "bearer token rejected, refreshing");
        self.cache.invalidate(&self.name, &token).await;

        let Some(request) = replay else {
            return Err(self.rejected(&response));
        };

        let token = self.cache.get_token(&self.name).await?;
        let response = self.dispatch(request, &token).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            self.cache.invalidate(&self.name, &token).await;
            return Err(self.rejected(&response));
        }

        Ok(response)
    }

    fn rejected(&self, response: &Response) -> TransportError {
        let challenge = response
            .headers()
            .get(WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        warn!(name = %self.name, url = %response.url(), ?challenge, "bearer token rejected");
        TransportError::AuthenticationFailure {
            name: self.name.clone(),
            url: response.url().to_string(),
            challenge,
        }
    }

    async fn dispatch(
        &self,
        mut request: Request,
        token: &CachedToken,
    ) -> Result<Response, TransportError> {
        let raw = Zeroizing::new(format!("Bearer {}", token.access_token()));
        let mut bearer = HeaderValue::from_str(&raw).map_err(|err| {
            TransportError::InvalidRequest {
                reason: format!("access token is not a valid header value: {err}"),
            }
        })?;
        bearer.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, bearer);

        debug!(name = %self.name, method = %request.method(), url = %request.url(), "sending...");
        let response = self.http.execute(request).await?;
        debug!(status = %response.status(), "...receiving");

        Ok(response)
    }
}
