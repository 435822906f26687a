use stockor_auth::{Principal, PrincipalId, Role, TenantMembership, permissions_for_roles};
use stockor_core::{TenantId, UserId};

/// Tenant context for a request.
///
/// Immutable; present on every protected route.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TenantContext {
    tenant_id: TenantId,
}

impl TenantContext {
    pub fn new(tenant_id: TenantId) -> Self {
        Self { tenant_id }
    }

    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }
}

/// Authenticated identity and roles, taken from the bearer token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrincipalContext {
    principal_id: PrincipalId,
    roles: Vec<Role>,
}

impl PrincipalContext {
    pub fn new(principal_id: PrincipalId, roles: Vec<Role>) -> Self {
        Self { principal_id, roles }
    }

    pub fn principal_id(&self) -> PrincipalId {
        self.principal_id
    }

    pub fn roles(&self) -> &[Role] {
        &self.roles
    }

    pub fn user_id(&self) -> UserId {
        self.principal_id.as_user_id()
    }

    /// Resolve the principal's permissions within `tenant`.
    pub fn principal(&self, tenant: &TenantContext) -> Principal {
        Principal::new(
            self.principal_id,
            TenantMembership {
                tenant_id: tenant.tenant_id(),
                roles: self.roles.clone(),
                permissions: permissions_for_roles(&self.roles),
            },
        )
    }
}
