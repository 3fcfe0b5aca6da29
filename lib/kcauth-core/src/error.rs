use crate::provisioning::ProvisioningStep;

const BODY_MAX_LENGTH: usize = 1024;

/// Shortens a response body for inclusion in an error message.
pub(crate) fn truncate_body(body: &str) -> String {
    match body.char_indices().nth(BODY_MAX_LENGTH) {
        Some((end, _)) => format!("{}... (truncated)", body.get(..end).unwrap_or_default()),
        None => body.to_string(),
    }
}

/// Errors raised while obtaining a token for a named client.
///
/// The type is `Clone` so that the outcome of a single acquisition can be handed
/// to every caller that waited on it.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Error, derive_more::Display)]
pub enum TokenError {
    /// No client is registered under this name.
    #[display("Unknown client '{name}'")]
    UnknownClient {
        /// The requested client name.
        name: String,
    },

    /// Connection, timeout or reset while talking to the token endpoint.
    ///
    /// Already retried with backoff by the acquirer when surfaced.
    #[display("Transient network error while acquiring token for '{name}': {reason}")]
    TransientNetwork {
        /// The client name.
        name: String,
        /// Description of the network failure.
        reason: String,
    },

    /// The token endpoint refused the grant or answered with an unusable body.
    #[display("Authentication failure for '{name}': {reason}")]
    AuthenticationFailure {
        /// The client name.
        name: String,
        /// HTTP status of the token endpoint response, if one was received.
        status: Option<u16>,
        /// Description of the failure.
        reason: String,
    },

    /// The token request could not be built.
    #[display("Invalid token request for '{name}': {reason}")]
    InvalidRequest {
        /// The client name.
        name: String,
        /// Description of the problem.
        reason: String,
    },
}

impl TokenError {
    /// Returns `true` if retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork { .. })
    }

    pub(crate) fn from_reqwest(name: &str, error: &reqwest::Error) -> Self {
        if error.is_builder() {
            Self::InvalidRequest {
                name: name.to_string(),
                reason: error.to_string(),
            }
        } else {
            Self::TransientNetwork {
                name: name.to_string(),
                reason: error.to_string(),
            }
        }
    }
}

/// Errors raised by [`AuthenticatingTransport`](crate::AuthenticatingTransport).
///
/// Resource-level failures (404, 500, ...) are not errors: the response is handed
/// back to the caller untouched.
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum TransportError {
    /// No valid token could be obtained.
    #[display("{_0}")]
    Token(TokenError),

    /// Connection, timeout or reset while sending the request.
    #[display("Transient network error: {reason}")]
    #[from(skip)]
    TransientNetwork {
        /// Description of the network failure.
        reason: String,
    },

    /// The request was rejected with 401 even after a token refresh.
    #[display("Authentication rejected for '{name}' on '{url}'")]
    #[from(skip)]
    AuthenticationFailure {
        /// The client name.
        name: String,
        /// The rejected URL.
        url: String,
        /// The `WWW-Authenticate` challenge of the last rejection, if any.
        challenge: Option<String>,
    },

    /// The request could not be built or sent for a non-network reason.
    #[display("Invalid request: {reason}")]
    #[from(skip)]
    InvalidRequest {
        /// Description of the problem.
        reason: String,
    },
}

impl TransportError {
    /// Returns `true` if retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Token(error) => error.is_transient(),
            Self::TransientNetwork { .. } => true,
            Self::AuthenticationFailure { .. } | Self::InvalidRequest { .. } => false,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_builder() {
            Self::InvalidRequest {
                reason: error.to_string(),
            }
        } else {
            Self::TransientNetwork {
                reason: error.to_string(),
            }
        }
    }
}

/// Errors raised by the realm bootstrap workflow.
#[derive(Debug, derive_more::Error, derive_more::Display)]
pub enum ProvisioningError {
    /// A step received a non-success HTTP status.
    #[display("Provisioning step '{step}' failed with HTTP status {status}: {body}")]
    StepFailed {
        /// The failing step.
        step: ProvisioningStep,
        /// HTTP status code of the response.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// A step could not complete for a non-HTTP reason (network, unusable response).
    #[display("Provisioning step '{step}' aborted: {reason}")]
    StepAborted {
        /// The failing step.
        step: ProvisioningStep,
        /// Description of the failure.
        reason: String,
    },

    /// The identity provider never became ready.
    #[display("Identity provider at '{url}' not ready after {attempts} attempts")]
    NotReady {
        /// The checked URL.
        url: String,
        /// Number of attempts made.
        attempts: usize,
    },

    /// The workflow configuration is unusable.
    #[display("Provisioning configuration error: {reason}")]
    Configuration {
        /// Description of the problem.
        reason: String,
    },
}

impl ProvisioningError {
    /// Returns the step that failed, if the error comes from one.
    pub fn step(&self) -> Option<ProvisioningStep> {
        match self {
            Self::StepFailed { step, .. } | Self::StepAborted { step, .. } => Some(*step),
            Self::NotReady { .. } | Self::Configuration { .. } => None,
        }
    }

    /// Returns the HTTP status of the failing response, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::StepFailed { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors raised while building a [`ClientRegistry`](crate::ClientRegistry).
#[derive(Debug, derive_more::Error, derive_more::Display)]
pub enum RegistryError {
    /// Two clients share a name.
    #[display("Client '{name}' is registered more than once")]
    DuplicateClient {
        /// The duplicated name.
        name: String,
    },

    /// A required field is empty.
    #[display("Client '{name}' has an empty '{field}'")]
    EmptyField {
        /// The client name (may itself be empty).
        name: String,
        /// The offending field.
        field: &'static str,
    },

    /// A URL could not be parsed.
    #[display("Client '{name}' has an invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The client name.
        name: String,
        /// The rejected URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The configuration document could not be parsed.
    #[display("Failed to parse client configuration at '{path}': {reason}")]
    Parse {
        /// Path inside the document where parsing failed.
        path: String,
        /// Parser message.
        reason: String,
    },

    /// The configuration file could not be read.
    #[display("Failed to read client configuration: {_0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for RegistryError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}
