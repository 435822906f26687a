//! Per-model read/write access used by JSON sanitizing and export.

use crate::{Permission, Principal, Role};

/// Models a clerk may write to.
const CLERK_WRITABLE: &[&str] = &[
    "address",
    "customer",
    "location",
    "pick_ticket",
    "sales_order",
    "sku",
    "sku_loc",
    "so_line",
    "invoice",
    "invoice_line",
];

/// Answers "may this user read / write records of this model".
pub trait ModelAccess {
    fn can_read(&self, model: &str) -> bool;
    fn can_write(&self, model: &str) -> bool;

    /// Holds a specific permission (used by conditional attribute rules).
    fn has_permission(&self, permission: &Permission) -> bool;
}

impl ModelAccess for Principal {
    fn can_read(&self, model: &str) -> bool {
        if !self.in_active_tenant() {
            return false;
        }
        let perms = self.permission_names();
        perms.contains("*")
            || perms.contains("*.read")
            || perms.contains(Permission::read(model).as_str())
            || perms.contains(Permission::write(model).as_str())
    }

    fn can_write(&self, model: &str) -> bool {
        if !self.in_active_tenant() {
            return false;
        }
        let perms = self.permission_names();
        perms.contains("*") || perms.contains(Permission::write(model).as_str())
    }

    fn has_permission(&self, permission: &Permission) -> bool {
        crate::authorize(self, permission).is_ok()
    }
}

/// Role → permission mapping.
///
/// `admin` gets everything, `clerk` reads everything and writes the
/// inventory/sales models, `viewer` only reads. Unknown roles grant nothing.
pub fn permissions_for_roles(roles: &[Role]) -> Vec<Permission> {
    let mut perms = Vec::new();
    for role in roles {
        match role.as_str() {
            "admin" => return vec![Permission::WILDCARD],
            "clerk" => {
                perms.push(Permission::new("*.read"));
                perms.extend(CLERK_WRITABLE.iter().map(|m| Permission::write(m)));
            }
            "viewer" => perms.push(Permission::new("*.read")),
            other => tracing::debug!(role = other, "role grants no permissions"),
        }
    }
    perms.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    perms.dedup();
    perms
}
