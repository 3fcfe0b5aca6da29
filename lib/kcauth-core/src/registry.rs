//! Named client-credentials configuration.
//!
//! A [`ClientRegistry`] is built once at startup, either programmatically or from a
//! configuration document, and is read-only afterwards.
//!
//! ```rust
//! use kcauth_core::{ClientCredentialsConfig, ClientRegistry};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = ClientRegistry::builder()
//!     .add_client(ClientCredentialsConfig::new(
//!         "admin",
//!         "admin-api",
//!         "admin-secret",
//!         "http://localhost:8080/realms/master/protocol/openid-connect/token",
//!     )?)
//!     .build()?;
//!
//! assert!(registry.get("admin").is_some());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use url::Url;

use crate::endpoint;
use crate::error::RegistryError;
use crate::secret::SecureString;

/// Client-credentials configuration of one logical API consumer.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentialsConfig {
    name: String,
    client_id: String,
    client_secret: SecureString,
    token_endpoint: Url,
}

impl ClientCredentialsConfig {
    /// Creates a validated configuration.
    ///
    /// # Errors
    ///
    /// Fails if a field is empty or the token endpoint is not a valid URL.
    pub fn new(
        name: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<SecureString>,
        token_endpoint: impl AsRef<str>,
    ) -> Result<Self, RegistryError> {
        let name = name.into();
        let token_endpoint =
            Url::parse(token_endpoint.as_ref()).map_err(|err| RegistryError::InvalidUrl {
                name: name.clone(),
                url: token_endpoint.as_ref().to_string(),
                reason: err.to_string(),
            })?;
        Self::with_url(name, client_id.into(), client_secret.into(), token_endpoint)
    }

    fn with_url(
        name: String,
        client_id: String,
        client_secret: SecureString,
        token_endpoint: Url,
    ) -> Result<Self, RegistryError> {
        let empty = |field| RegistryError::EmptyField {
            name: name.clone(),
            field,
        };
        if name.trim().is_empty() {
            return Err(empty("name"));
        }
        if client_id.trim().is_empty() {
            return Err(empty("clientId"));
        }
        if client_secret.is_empty() {
            return Err(empty("clientSecret"));
        }

        Ok(Self {
            name,
            client_id,
            client_secret,
            token_endpoint,
        })
    }

    /// The registry key.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The OAuth2 client id.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The OAuth2 client secret.
    pub fn client_secret(&self) -> &SecureString {
        &self.client_secret
    }

    /// Where client-credentials grants are posted.
    pub fn token_endpoint(&self) -> &Url {
        &self.token_endpoint
    }
}

impl fmt::Debug for ClientCredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentialsConfig")
            .field("name", &self.name)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("token_endpoint", &self.token_endpoint.as_str())
            .finish()
    }
}

/// Credentials block of a [`RealmClientOptions`].
#[derive(Debug, Clone, Deserialize)]
pub struct RealmCredentials {
    /// The client secret.
    pub secret: SecureString,
}

/// Identity-provider style client options.
///
/// The token endpoint is not given directly: it is derived from the server URL
/// and the realm as `<auth-server-url>/realms/<realm>/protocol/openid-connect/token`.
#[derive(Debug, Clone, Deserialize)]
pub struct RealmClientOptions {
    /// The registry key.
    pub name: String,
    /// Realm hosting the client.
    pub realm: String,
    /// Base URL of the identity provider.
    #[serde(rename = "auth-server-url", alias = "AuthServerUrl", alias = "authServerUrl")]
    pub auth_server_url: String,
    /// The OAuth2 client id.
    pub resource: String,
    /// The client secret.
    pub credentials: RealmCredentials,
}

impl RealmClientOptions {
    /// Derives the client-credentials configuration.
    ///
    /// # Errors
    ///
    /// Fails if the server URL is invalid or a field is empty.
    pub fn to_config(&self) -> Result<ClientCredentialsConfig, RegistryError> {
        let invalid = |reason: String| RegistryError::InvalidUrl {
            name: self.name.clone(),
            url: self.auth_server_url.clone(),
            reason,
        };
        if self.realm.trim().is_empty() {
            return Err(RegistryError::EmptyField {
                name: self.name.clone(),
                field: "realm",
            });
        }
        let base = Url::parse(&self.auth_server_url).map_err(|err| invalid(err.to_string()))?;
        let token_endpoint = endpoint::token_endpoint(&base, &self.realm).map_err(invalid)?;

        ClientCredentialsConfig::with_url(
            self.name.clone(),
            self.resource.clone(),
            self.credentials.secret.clone(),
            token_endpoint,
        )
    }
}

/// Immutable mapping from client name to its configuration.
#[derive(Debug, Clone, Default)]
pub struct ClientRegistry {
    clients: IndexMap<String, ClientCredentialsConfig>,
}

impl ClientRegistry {
    /// Creates a builder.
    pub fn builder() -> ClientRegistryBuilder {
        ClientRegistryBuilder::default()
    }

    /// Looks up a client by name.
    pub fn get(&self, name: &str) -> Option<&ClientCredentialsConfig> {
        self.clients.get(name)
    }

    /// Returns `true` if the name is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.clients.contains_key(name)
    }

    /// Registered names, in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns `true` if no client is registered.
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[derive(Debug, Clone)]
enum ClientEntry {
    Explicit(ClientCredentialsConfig),
    Document(ExplicitEntry),
    Realm(RealmClientOptions),
}

/// Builder for [`ClientRegistry`].
#[derive(Debug, Clone, Default)]
pub struct ClientRegistryBuilder {
    entries: Vec<ClientEntry>,
    auth_server_url: Option<String>,
}

impl ClientRegistryBuilder {
    /// Registers a client.
    #[must_use]
    pub fn add_client(mut self, config: ClientCredentialsConfig) -> Self {
        self.entries.push(ClientEntry::Explicit(config));
        self
    }

    /// Registers a client described by realm options.
    #[must_use]
    pub fn add_realm_client(mut self, options: RealmClientOptions) -> Self {
        self.entries.push(ClientEntry::Realm(options));
        self
    }

    /// Overrides the server URL of every realm-options client.
    ///
    /// Used when the identity provider address is only known at runtime.
    #[must_use]
    pub fn with_auth_server_url(mut self, url: impl Into<String>) -> Self {
        self.auth_server_url = Some(url.into());
        self
    }

    /// Adds the clients of a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::Parse`] if the document is malformed.
    pub fn add_json(self, json: &str) -> Result<Self, RegistryError> {
        let deserializer = &mut serde_json::Deserializer::from_str(json);
        let document: RegistryDocument =
            serde_path_to_error::deserialize(deserializer).map_err(|err| {
                RegistryError::Parse {
                    path: err.path().to_string(),
                    reason: err.inner().to_string(),
                }
            })?;
        Ok(self.add_document(document))
    }

    /// Adds the clients of a YAML configuration document.
    ///
    /// # Errors
    ///
    /// Fails with [`RegistryError::Parse`] if the document is malformed.
    #[cfg(feature = "yaml")]
    pub fn add_yaml(self, yaml: &str) -> Result<Self, RegistryError> {
        let document: RegistryDocument =
            serde_saphyr::from_str(yaml).map_err(|err| RegistryError::Parse {
                path: ".".to_string(),
                reason: err.to_string(),
            })?;
        Ok(self.add_document(document))
    }

    /// Adds the clients of a configuration file.
    ///
    /// Files ending in `.yml`/`.yaml` are read as YAML (requires the `yaml` feature),
    /// everything else as JSON.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read or parsed.
    pub fn add_file(self, path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            #[cfg(feature = "yaml")]
            Some("yml" | "yaml") => self.add_yaml(&content),
            _ => self.add_json(&content),
        }
    }

    fn add_document(mut self, document: RegistryDocument) -> Self {
        self.entries
            .extend(document.clients.into_iter().map(|entry| match entry {
                DocumentEntry::Explicit(explicit) => ClientEntry::Document(explicit),
                DocumentEntry::Realm(options) => ClientEntry::Realm(options),
            }));
        self
    }

    /// Validates every entry and builds the registry.
    ///
    /// # Errors
    ///
    /// Fails on duplicate names, empty fields or invalid URLs.
    pub fn build(self) -> Result<ClientRegistry, RegistryError> {
        let Self {
            entries,
            auth_server_url,
        } = self;

        let mut clients = IndexMap::with_capacity(entries.len());
        for entry in entries {
            let config = match entry {
                ClientEntry::Explicit(config) => config,
                ClientEntry::Document(ExplicitEntry {
                    name,
                    client_id,
                    client_secret,
                    token_endpoint,
                }) => ClientCredentialsConfig::new(name, client_id, client_secret, token_endpoint)?,
                ClientEntry::Realm(mut options) => {
                    if let Some(url) = &auth_server_url {
                        options.auth_server_url.clone_from(url);
                    }
                    options.to_config()?
                }
            };
            if clients.contains_key(config.name()) {
                return Err(RegistryError::DuplicateClient {
                    name: config.name().to_string(),
                });
            }
            clients.insert(config.name().to_string(), config);
        }

        Ok(ClientRegistry { clients })
    }
}

#[derive(Debug, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    clients: Vec<DocumentEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DocumentEntry {
    Explicit(ExplicitEntry),
    Realm(RealmClientOptions),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplicitEntry {
    name: String,
    client_id: String,
    client_secret: SecureString,
    token_endpoint: String,
}
