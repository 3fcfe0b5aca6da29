//! Realm bootstrap: creation of an administrative API client.
//!
//! Starting from the admin user credentials of a fresh identity provider, the
//! [`ProvisioningOrchestrator`] runs five steps, in order, each one consuming
//! the output of the previous ones:
//!
//! 1. [`AdminToken`](ProvisioningStep::AdminToken): password grant for the admin user
//! 2. [`CreateClient`](ProvisioningStep::CreateClient): create the service-account client
//! 3. [`ResolveServiceAccount`](ProvisioningStep::ResolveServiceAccount): find its user
//! 4. [`ResolveRole`](ProvisioningStep::ResolveRole): find the role to grant
//! 5. [`AssignRole`](ProvisioningStep::AssignRole): map the role onto the user
//!
//! The first failing step aborts the workflow; later steps are never attempted.
//! Nothing is rolled back.
//!
//! ```rust,no_run
//! # use kcauth_core::{ClientRepresentation, ProvisioningConfig, ProvisioningOrchestrator};
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProvisioningConfig::new(
//!     "http://localhost:8080",
//!     ClientRepresentation::service_account("admin-api", "s3cr3t"),
//! )?;
//! let orchestrator = ProvisioningOrchestrator::new(reqwest::Client::new(), config);
//!
//! orchestrator.wait_until_ready().await?;
//! let context = orchestrator.run().await?;
//! println!("created client {}", context.client_internal_id());
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

use backon::Retryable;
use reqwest::header::LOCATION;
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::endpoint;
use crate::error::{ProvisioningError, TokenError, truncate_body};
use crate::secret::SecureString;
use crate::token::{Grant, TokenAcquirer};

mod config;
pub use self::config::{ClientRepresentation, ProvisioningConfig, default_readiness};

mod step;
pub use self::step::{ProvisioningContext, ProvisioningStep};

/// Label of the admin session in logs and token errors.
const ADMIN_SESSION: &str = "provisioning-admin";

#[derive(Debug, Deserialize)]
struct IdRepresentation {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RoleRepresentation {
    id: String,
    name: String,
}

/// Runs the realm bootstrap against an identity provider.
#[derive(Debug, Clone)]
pub struct ProvisioningOrchestrator {
    http: reqwest::Client,
    acquirer: TokenAcquirer,
    config: ProvisioningConfig,
}

impl ProvisioningOrchestrator {
    /// Creates an orchestrator sending its requests with `http`.
    pub fn new(http: reqwest::Client, config: ProvisioningConfig) -> Self {
        let acquirer = TokenAcquirer::new(http.clone());
        Self {
            http,
            acquirer,
            config,
        }
    }

    /// Replaces the acquirer used for the admin password grant.
    #[must_use]
    pub fn with_acquirer(mut self, acquirer: TokenAcquirer) -> Self {
        self.acquirer = acquirer;
        self
    }

    /// The bootstrap settings.
    pub fn config(&self) -> &ProvisioningConfig {
        &self.config
    }

    /// Polls the realm endpoint until it answers with a success status.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::NotReady`] once the readiness policy is exhausted.
    pub async fn wait_until_ready(&self) -> Result<(), ProvisioningError> {
        let url = endpoint::realm(self.config.base_url(), self.config.realm())
            .map_err(|reason| ProvisioningError::Configuration { reason })?;
        let attempts = AtomicUsize::new(0);

        let http = &self.http;
        let check_url = &url;
        let counter = &attempts;
        let check = move || async move {
            counter.fetch_add(1, Ordering::Relaxed);
            match http.get(check_url.clone()).send().await {
                Ok(response) if response.status().is_success() => Ok(()),
                Ok(response) => Err(format!("status {}", response.status())),
                Err(err) => Err(err.to_string()),
            }
        };

        let result = check
            .retry(self.config.readiness().backoff())
            .notify(|reason, delay| {
                debug!(%url, %reason, ?delay, "identity provider not ready yet");
            })
            .await;

        let attempts = attempts.load(Ordering::Relaxed);
        match result {
            Ok(()) => {
                info!(%url, attempts, "identity provider is ready");
                Ok(())
            }
            Err(reason) => {
                error!(%url, attempts, %reason, "identity provider did not become ready");
                Err(ProvisioningError::NotReady {
                    url: url.to_string(),
                    attempts,
                })
            }
        }
    }

    /// Runs the five bootstrap steps in order.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step, see [`ProvisioningError::step`].
    pub async fn run(&self) -> Result<ProvisioningContext, ProvisioningError> {
        info!(
            base_url = %self.config.base_url(),
            realm = self.config.realm(),
            client_id = %self.config.client().client_id,
            "provisioning started"
        );

        let admin_token = self.admin_token().await?;
        let client_internal_id = self.create_client(&admin_token).await?;
        let service_account_user_id = self
            .resolve_service_account(&admin_token, &client_internal_id)
            .await?;
        let role = self.resolve_role(&admin_token).await?;
        self.assign_role(&admin_token, &service_account_user_id, &role)
            .await?;

        info!(%client_internal_id, %service_account_user_id, "provisioning completed");
        Ok(ProvisioningContext {
            admin_token,
            client_internal_id,
            service_account_user_id,
            role_id: role.id,
        })
    }

    async fn admin_token(&self) -> Result<SecureString, ProvisioningError> {
        let step = ProvisioningStep::AdminToken;
        let token_endpoint = self.config.token_endpoint()?;
        let grant = Grant::Password {
            client_id: self.config.admin_client_id(),
            username: self.config.admin_username(),
            password: self.config.admin_password(),
        };

        let token = self
            .acquirer
            .exchange(ADMIN_SESSION, &token_endpoint, grant)
            .await
            .map_err(|err| match err {
                // a 2xx with an unusable body is not an HTTP failure
                TokenError::AuthenticationFailure {
                    status: Some(status),
                    reason,
                    ..
                } if !(200..300).contains(&status) => ProvisioningError::StepFailed {
                    step,
                    status,
                    body: reason,
                },
                other => ProvisioningError::StepAborted {
                    step,
                    reason: other.to_string(),
                },
            })
            .inspect_err(|err| error!(%step, %err, "provisioning step failed"))?;

        info!(%step, username = self.config.admin_username(), "admin token obtained");
        Ok(token.secret())
    }

    async fn create_client(&self, admin_token: &SecureString) -> Result<String, ProvisioningError> {
        let step = ProvisioningStep::CreateClient;
        let url = self.admin_url(step, &["clients"])?;
        let request = self
            .http
            .post(url)
            .bearer_auth(admin_token.as_str())
            .json(self.config.client());
        let response = self.send(step, request).await?;

        let Some(id) = response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .and_then(last_segment)
        else {
            return Err(aborted(step, "the response has no usable Location header"));
        };

        info!(%step, client_id = %self.config.client().client_id, internal_id = id, "client created");
        Ok(id.to_string())
    }

    async fn resolve_service_account(
        &self,
        admin_token: &SecureString,
        client_internal_id: &str,
    ) -> Result<String, ProvisioningError> {
        let step = ProvisioningStep::ResolveServiceAccount;
        let url = self.admin_url(step, &["clients", client_internal_id, "service-account-user"])?;
        let request = self.http.get(url).bearer_auth(admin_token.as_str());
        let response = self.send(step, request).await?;
        let user: IdRepresentation = read_json(step, response).await?;

        info!(%step, user_id = %user.id, "service account resolved");
        Ok(user.id)
    }

    async fn resolve_role(
        &self,
        admin_token: &SecureString,
    ) -> Result<RoleRepresentation, ProvisioningError> {
        let step = ProvisioningStep::ResolveRole;
        let url = self.admin_url(step, &["roles", self.config.role()])?;
        let request = self.http.get(url).bearer_auth(admin_token.as_str());
        let response = self.send(step, request).await?;
        let role: RoleRepresentation = read_json(step, response).await?;

        if role.name != self.config.role() {
            warn!(%step, expected = self.config.role(), actual = %role.name, "role name differs");
        }
        info!(%step, role = %role.name, role_id = %role.id, "role resolved");
        Ok(role)
    }

    async fn assign_role(
        &self,
        admin_token: &SecureString,
        user_id: &str,
        role: &RoleRepresentation,
    ) -> Result<(), ProvisioningError> {
        let step = ProvisioningStep::AssignRole;
        let url = self.admin_url(step, &["users", user_id, "role-mappings", "realm"])?;
        let body = serde_json::json!([{ "id": role.id, "name": role.name }]);
        let request = self
            .http
            .post(url)
            .bearer_auth(admin_token.as_str())
            .json(&body);
        self.send(step, request).await?;

        info!(%step, %user_id, role = %role.name, "role assigned");
        Ok(())
    }

    fn admin_url(&self, step: ProvisioningStep, segments: &[&str]) -> Result<Url, ProvisioningError> {
        endpoint::admin(self.config.base_url(), self.config.realm(), segments)
            .map_err(|reason| aborted(step, reason))
    }

    async fn send(
        &self,
        step: ProvisioningStep,
        request: RequestBuilder,
    ) -> Result<Response, ProvisioningError> {
        debug!(%step, "sending...");
        let response = request
            .send()
            .await
            .map_err(|err| aborted(step, err.to_string()))?;
        let status = response.status();
        debug!(%step, %status, "...receiving");

        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|err| format!("<unable to read response body: {err}>"));
        error!(%step, %status, "provisioning step failed");
        Err(ProvisioningError::StepFailed {
            step,
            status: status.as_u16(),
            body: truncate_body(&body),
        })
    }
}

fn aborted(step: ProvisioningStep, reason: impl Into<String>) -> ProvisioningError {
    let reason = reason.into();
    error!(%step, %reason, "provisioning step aborted");
    ProvisioningError::StepAborted { step, reason }
}

fn last_segment(location: &str) -> Option<&str> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
}

async fn read_json<T>(step: ProvisioningStep, response: Response) -> Result<T, ProvisioningError>
where
    T: DeserializeOwned,
{
    let text = response
        .text()
        .await
        .map_err(|err| aborted(step, err.to_string()))?;
    let deserializer = &mut serde_json::Deserializer::from_str(&text);
    serde_path_to_error::deserialize(deserializer).map_err(|err| {
        aborted(
            step,
            format!("unexpected response at '{}': {}", err.path(), err.inner()),
        )
    })
}
