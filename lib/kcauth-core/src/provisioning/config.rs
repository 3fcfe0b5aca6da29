use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::endpoint;
use crate::error::{ProvisioningError, RegistryError};
use crate::registry::ClientCredentialsConfig;
use crate::secret::SecureString;
use crate::token::RetryPolicy;

const DEFAULT_REALM: &str = "master";
const DEFAULT_ADMIN_CLIENT_ID: &str = "admin-cli";
const DEFAULT_ADMIN_USERNAME: &str = "admin";
const DEFAULT_ADMIN_PASSWORD: &str = "admin";
const DEFAULT_ROLE: &str = "admin";

/// The client created by the bootstrap, as sent to the admin API.
///
/// Defaults describe a confidential client with a service account and
/// direct access grants, authenticating with its secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRepresentation {
    /// The OAuth2 client id.
    pub client_id: String,
    /// Display name.
    pub name: String,
    /// Whether the client is enabled.
    pub enabled: bool,
    /// Authenticator used by the client, `client-secret`.
    pub client_authenticator_type: String,
    /// The client secret.
    pub secret: SecureString,
    /// Public clients have no secret.
    pub public_client: bool,
    /// Enables the client-credentials grant.
    pub service_accounts_enabled: bool,
    /// Enables the authorization-code flow.
    pub standard_flow_enabled: bool,
    /// Enables the password grant.
    pub direct_access_grants_enabled: bool,
    /// Protocol, `openid-connect`.
    pub protocol: String,
}

impl ClientRepresentation {
    /// A confidential service-account client.
    pub fn service_account(client_id: impl Into<String>, secret: impl Into<SecureString>) -> Self {
        let client_id = client_id.into();
        Self {
            name: client_id.clone(),
            client_id,
            enabled: true,
            client_authenticator_type: "client-secret".to_string(),
            secret: secret.into(),
            public_client: false,
            service_accounts_enabled: true,
            standard_flow_enabled: false,
            direct_access_grants_enabled: true,
            protocol: "openid-connect".to_string(),
        }
    }
}

/// Readiness probing before the bootstrap.
pub fn default_readiness() -> RetryPolicy {
    RetryPolicy {
        min_delay: Duration::from_millis(250),
        max_delay: Duration::from_secs(5),
        max_retries: 20,
        jitter: true,
    }
}

/// Settings of a realm bootstrap.
///
/// ```rust
/// # use kcauth_core::{ClientRepresentation, ProvisioningConfig};
/// let config = ProvisioningConfig::new(
///     "http://localhost:8080",
///     ClientRepresentation::service_account("admin-api", "s3cr3t"),
/// )?
/// .with_role("realm-admin");
///
/// assert_eq!(config.realm(), "master");
/// assert_eq!(
///     config.token_endpoint()?.as_str(),
///     "http://localhost:8080/realms/master/protocol/openid-connect/token"
/// );
/// # Ok::<(), kcauth_core::ProvisioningError>(())
/// ```
#[derive(Debug, Clone)]
pub struct ProvisioningConfig {
    base_url: Url,
    realm: String,
    admin_client_id: String,
    admin_username: String,
    admin_password: SecureString,
    client: ClientRepresentation,
    role: String,
    readiness: RetryPolicy,
}

impl ProvisioningConfig {
    /// Bootstraps `client` on the identity provider at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::Configuration`] if `base_url` is not an
    /// absolute URL or the client id is empty.
    pub fn new(
        base_url: impl AsRef<str>,
        client: ClientRepresentation,
    ) -> Result<Self, ProvisioningError> {
        let base_url = base_url.as_ref();
        let base_url = Url::parse(base_url).map_err(|err| ProvisioningError::Configuration {
            reason: format!("invalid base URL '{base_url}': {err}"),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ProvisioningError::Configuration {
                reason: format!("'{base_url}' cannot be used as a base URL"),
            });
        }
        if client.client_id.is_empty() {
            return Err(ProvisioningError::Configuration {
                reason: "the client id to create is empty".to_string(),
            });
        }

        Ok(Self {
            base_url,
            realm: DEFAULT_REALM.to_string(),
            admin_client_id: DEFAULT_ADMIN_CLIENT_ID.to_string(),
            admin_username: DEFAULT_ADMIN_USERNAME.to_string(),
            admin_password: SecureString::from(DEFAULT_ADMIN_PASSWORD),
            client,
            role: DEFAULT_ROLE.to_string(),
            readiness: default_readiness(),
        })
    }

    /// Sets the realm (default `master`).
    #[must_use]
    pub fn with_realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = realm.into();
        self
    }

    /// Sets the public client used for the password grant (default `admin-cli`).
    #[must_use]
    pub fn with_admin_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.admin_client_id = client_id.into();
        self
    }

    /// Sets the bootstrap admin user (default `admin` / `admin`).
    #[must_use]
    pub fn with_admin_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<SecureString>,
    ) -> Self {
        self.admin_username = username.into();
        self.admin_password = password.into();
        self
    }

    /// Sets the role granted to the service account (default `admin`).
    #[must_use]
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    /// Sets the readiness probing policy.
    #[must_use]
    pub fn with_readiness(mut self, readiness: RetryPolicy) -> Self {
        self.readiness = readiness;
        self
    }

    /// Root URL of the identity provider.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The realm being provisioned.
    pub fn realm(&self) -> &str {
        &self.realm
    }

    /// The public client used for the password grant.
    pub fn admin_client_id(&self) -> &str {
        &self.admin_client_id
    }

    /// The bootstrap admin user name.
    pub fn admin_username(&self) -> &str {
        &self.admin_username
    }

    /// The bootstrap admin password.
    pub fn admin_password(&self) -> &SecureString {
        &self.admin_password
    }

    /// The client to create.
    pub fn client(&self) -> &ClientRepresentation {
        &self.client
    }

    /// The role granted to the service account.
    pub fn role(&self) -> &str {
        &self.role
    }

    /// The readiness probing policy.
    pub fn readiness(&self) -> &RetryPolicy {
        &self.readiness
    }

    /// The realm's token endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ProvisioningError::Configuration`] if the URL cannot be built.
    pub fn token_endpoint(&self) -> Result<Url, ProvisioningError> {
        endpoint::token_endpoint(&self.base_url, &self.realm)
            .map_err(|reason| ProvisioningError::Configuration { reason })
    }

    /// Registry entry for the created client, so it can be used with a
    /// [`TokenCache`](crate::TokenCache) once provisioned.
    ///
    /// # Errors
    ///
    /// Returns a [`RegistryError`] if the entry is invalid.
    pub fn client_credentials(
        &self,
        name: impl Into<String>,
    ) -> Result<ClientCredentialsConfig, RegistryError> {
        let name = name.into();
        let token_endpoint = endpoint::token_endpoint(&self.base_url, &self.realm).map_err(
            |reason| RegistryError::InvalidUrl {
                name: name.clone(),
                url: self.base_url.to_string(),
                reason,
            },
        )?;
        ClientCredentialsConfig::new(
            name,
            self.client.client_id.clone(),
            self.client.secret.clone(),
            token_endpoint,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProvisioningConfig {
        ProvisioningConfig::new(
            "http://localhost:8080/",
            ClientRepresentation::service_account("admin-api", "s3cr3t"),
        )
        .expect("valid config")
    }

    #[test]
    fn should_apply_defaults() {
        let config = config();
        assert_eq!(config.realm(), "master");
        assert_eq!(config.admin_client_id(), "admin-cli");
        assert_eq!(config.admin_username(), "admin");
        assert!(config.admin_password().equals_str("admin"));
        assert_eq!(config.role(), "admin");
    }

    #[test]
    fn should_serialize_client_representation() {
        let client = ClientRepresentation::service_account("admin-api", "s3cr3t");
        let json = serde_json::to_value(&client).expect("should serialize");
        assert_eq!(
            json,
            serde_json::json!({
                "clientId": "admin-api",
                "name": "admin-api",
                "enabled": true,
                "clientAuthenticatorType": "client-secret",
                "secret": "s3cr3t",
                "publicClient": false,
                "serviceAccountsEnabled": true,
                "standardFlowEnabled": false,
                "directAccessGrantsEnabled": true,
                "protocol": "openid-connect"
            })
        );
    }

    #[test]
    fn should_not_leak_secret_in_debug() {
        let debug_str = format!("{:?}", config());
        assert!(!debug_str.contains("s3cr3t"));
    }

    #[test]
    fn should_reject_relative_base_url() {
        let result = ProvisioningConfig::new(
            "localhost:8080",
            ClientRepresentation::service_account("admin-api", "s3cr3t"),
        );
        assert!(matches!(result, Err(ProvisioningError::Configuration { .. })));
    }

    #[test]
    fn should_reject_empty_client_id() {
        let result = ProvisioningConfig::new(
            "http://localhost:8080",
            ClientRepresentation::service_account("", "s3cr3t"),
        );
        assert!(matches!(result, Err(ProvisioningError::Configuration { .. })));
    }

    #[test]
    fn should_derive_registry_entry() {
        let entry = config()
            .with_realm("Test")
            .client_credentials("keycloak_admin_api_token")
            .expect("valid entry");

        assert_eq!(entry.name(), "keycloak_admin_api_token");
        assert_eq!(entry.client_id(), "admin-api");
        assert!(entry.client_secret().equals_str("s3cr3t"));
        assert_eq!(
            entry.token_endpoint().as_str(),
            "http://localhost:8080/realms/Test/protocol/openid-connect/token"
        );
    }
}
