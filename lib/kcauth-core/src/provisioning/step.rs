use std::fmt;

use crate::secret::SecureString;

/// The steps of the realm bootstrap, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, derive_more::Display)]
pub enum ProvisioningStep {
    /// Password grant for the bootstrap admin user.
    #[display("admin-token")]
    AdminToken,
    /// Creation of the administrative API client.
    #[display("create-client")]
    CreateClient,
    /// Lookup of the service-account user of the created client.
    #[display("resolve-service-account")]
    ResolveServiceAccount,
    /// Lookup of the role to grant.
    #[display("resolve-role")]
    ResolveRole,
    /// Role mapping on the service-account user.
    #[display("assign-role")]
    AssignRole,
}

impl ProvisioningStep {
    /// Every step, in execution order.
    pub const ALL: [Self; 5] = [
        Self::AdminToken,
        Self::CreateClient,
        Self::ResolveServiceAccount,
        Self::ResolveRole,
        Self::AssignRole,
    ];

    /// Position of the step, starting at 1.
    pub fn number(self) -> usize {
        match self {
            Self::AdminToken => 1,
            Self::CreateClient => 2,
            Self::ResolveServiceAccount => 3,
            Self::ResolveRole => 4,
            Self::AssignRole => 5,
        }
    }
}

/// What a successful bootstrap produced.
///
/// Each field is the output of exactly one step.
#[derive(Clone, PartialEq, Eq)]
pub struct ProvisioningContext {
    pub(super) admin_token: SecureString,
    pub(super) client_internal_id: String,
    pub(super) service_account_user_id: String,
    pub(super) role_id: String,
}

impl ProvisioningContext {
    /// Admin access token obtained by [`ProvisioningStep::AdminToken`].
    pub fn admin_token(&self) -> &SecureString {
        &self.admin_token
    }

    /// Internal id of the created client ([`ProvisioningStep::CreateClient`]).
    pub fn client_internal_id(&self) -> &str {
        &self.client_internal_id
    }

    /// Id of the client's service-account user ([`ProvisioningStep::ResolveServiceAccount`]).
    pub fn service_account_user_id(&self) -> &str {
        &self.service_account_user_id
    }

    /// Id of the granted role ([`ProvisioningStep::ResolveRole`]).
    pub fn role_id(&self) -> &str {
        &self.role_id
    }
}

impl fmt::Debug for ProvisioningContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningContext")
            .field("admin_token", &"[REDACTED]")
            .field("client_internal_id", &self.client_internal_id)
            .field("service_account_user_id", &self.service_account_user_id)
            .field("role_id", &self.role_id)
            .finish()
    }
}
