//! # kcauth Core
//!
//! Named client-credentials tokens for identity-provider administration APIs.
//!
//! This crate lets a process call several protected APIs, each one as a distinct
//! OAuth2 client, without ever handling tokens by hand:
//! - **[`ClientRegistry`]** - the named clients (client id, secret, token endpoint)
//! - **[`TokenCache`]** - one cached token per name, renewed before expiry, with a
//!   single acquisition in flight per name
//! - **[`AuthenticatingTransport`]** - adds the bearer token to every request and
//!   retries once with a fresh token on `401 Unauthorized`
//! - **[`ProvisioningOrchestrator`]** - bootstraps a fresh realm with an
//!   administrative service-account client
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kcauth_core::{ClientRegistry, TokenManager};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ClientRegistry::builder()
//!     .add_file("clients.json")?
//!     .with_auth_server_url("http://localhost:8080/")
//!     .build()?;
//!
//! let manager = TokenManager::builder(registry).build()?;
//! let admin = manager.transport("keycloak_admin_api_token")?;
//!
//! let url = "http://localhost:8080/admin/realms/Test/users".parse()?;
//! let users: serde_json::Value = admin.execute(admin.get(url)).await?.json().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Bootstrapping a realm
//!
//! ```rust,no_run
//! use kcauth_core::{ClientRepresentation, ProvisioningConfig, ProvisioningOrchestrator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProvisioningConfig::new(
//!     "http://localhost:8080",
//!     ClientRepresentation::service_account("admin-api", "s3cr3t"),
//! )?;
//! let orchestrator = ProvisioningOrchestrator::new(reqwest::Client::new(), config);
//! orchestrator.wait_until_ready().await?;
//! let context = orchestrator.run().await?;
//!
//! // the created client can now be registered
//! let entry = orchestrator.config().client_credentials("keycloak_admin_api_token")?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! - [`TokenError`] - a token could not be obtained
//! - [`TransportError`] - a request could not be authenticated or sent
//! - [`ProvisioningError`] - a bootstrap step failed, with the failing [`ProvisioningStep`]
//! - [`RegistryError`] - the client configuration is invalid
//!
//! Non-success responses of protected resources are not errors: the
//! [`AuthenticatingTransport`] hands them back untouched.
//!
//! ## Features
//!
//! - `yaml`: load the registry from YAML files (`ClientRegistryBuilder::add_yaml`)

mod clock;
mod endpoint;
mod error;
mod manager;
mod provisioning;
mod registry;
mod secret;
mod token;
mod transport;

pub use self::clock::{Clock, ManualClock, SystemClock};
pub use self::error::{ProvisioningError, RegistryError, TokenError, TransportError};
pub use self::manager::{DEFAULT_REQUEST_TIMEOUT, TokenManager, TokenManagerBuilder, TokenSettings};
pub use self::provisioning::{
    ClientRepresentation, ProvisioningConfig, ProvisioningContext, ProvisioningOrchestrator,
    ProvisioningStep, default_readiness,
};
pub use self::registry::{
    ClientCredentialsConfig, ClientRegistry, ClientRegistryBuilder, RealmClientOptions,
    RealmCredentials,
};
pub use self::secret::SecureString;
pub use self::token::{
    CachedToken, DEFAULT_EXPIRY_SKEW, Grant, RetryPolicy, TokenAcquirer, TokenCache,
};
pub use self::transport::AuthenticatingTransport;
