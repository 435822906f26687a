//! `stockor-auth`: who is asking, and what they may read or write.
//!
//! Decoupled from HTTP and storage: the API builds a [`Principal`] from a
//! verified token and the export layer asks it [`ModelAccess`] questions.

pub mod access;
pub mod authorize;
pub mod claims;
pub mod permissions;
pub mod principal;
pub mod roles;

pub use access::{ModelAccess, permissions_for_roles};
pub use authorize::{AuthzError, Principal, authorize};
pub use claims::{Hs256JwtValidator, JwtClaims, JwtValidator, TokenValidationError, validate_claims};
pub use permissions::Permission;
pub use principal::{PrincipalId, TenantMembership};
pub use roles::Role;
