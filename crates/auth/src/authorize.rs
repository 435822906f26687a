use std::collections::HashSet;

use thiserror::Error;

use stockor_core::TenantId;

use crate::{Permission, PrincipalId, TenantMembership};

/// A principal resolved for authorization decisions within its active tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub principal_id: PrincipalId,
    pub active_tenant_id: TenantId,
    pub membership: TenantMembership,
}

impl Principal {
    /// Principal whose membership matches the active tenant.
    pub fn new(principal_id: PrincipalId, membership: TenantMembership) -> Self {
        Self {
            principal_id,
            active_tenant_id: membership.tenant_id,
            membership,
        }
    }

    pub(crate) fn permission_names(&self) -> HashSet<&str> {
        self.membership
            .permissions
            .iter()
            .map(|p| p.as_str())
            .collect()
    }

    pub(crate) fn in_active_tenant(&self) -> bool {
        self.active_tenant_id == self.membership.tenant_id
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("tenant mismatch")]
    TenantMismatch,

    #[error("forbidden: missing permission '{0}'")]
    Forbidden(String),
}

/// Pure policy check: no IO, no panics.
pub fn authorize(principal: &Principal, required: &Permission) -> Result<(), AuthzError> {
    if !principal.in_active_tenant() {
        return Err(AuthzError::TenantMismatch);
    }

    let perms = principal.permission_names();
    if perms.contains("*") || perms.contains(required.as_str()) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden(required.as_str().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Role;

    fn principal(perms: &[&'static str]) -> Principal {
        Principal::new(
            PrincipalId::new(),
            TenantMembership {
                tenant_id: TenantId::new(),
                roles: vec![Role::CLERK],
                permissions: perms.iter().map(|p| Permission::new(*p)).collect(),
            },
        )
    }

    #[test]
    fn explicit_permission_is_granted() {
        let p = principal(&["sku_loc.write"]);
        assert!(authorize(&p, &Permission::write("sku_loc")).is_ok());
        assert_eq!(
            authorize(&p, &Permission::write("sales_order")),
            Err(AuthzError::Forbidden("sales_order.write".to_string()))
        );
    }

    #[test]
    fn wildcard_grants_everything() {
        let p = principal(&["*"]);
        assert!(authorize(&p, &Permission::new("gl_manual_entry.write")).is_ok());
    }

    #[test]
    fn tenant_mismatch_is_rejected_first() {
        let mut p = principal(&["*"]);
        p.active_tenant_id = TenantId::new();
        assert_eq!(authorize(&p, &Permission::WILDCARD), Err(AuthzError::TenantMismatch));
    }
}
