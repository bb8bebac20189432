//! Authorization guards for batch operations.
//!
//! Role and tenant checks run before the store is touched. Ownership is
//! enforced by the store predicate and re-checked here only to classify a
//! no-op.

use crate::auth::{Principal, Role};
use crate::error::{TransitionError, TransitionResult};
use crate::models::Batch;

/// Require `role` and access to `tenant_id`.
pub fn require_role(principal: &Principal, role: Role, tenant_id: &str) -> TransitionResult<()> {
    if !principal.has_role(role) {
        return Err(TransitionError::unauthorized(format!(
            "must have '{role}' role"
        )));
    }
    require_tenant(principal, tenant_id)
}

/// Require any one of `roles` and access to `tenant_id`.
pub fn require_any_role(
    principal: &Principal,
    roles: &[Role],
    tenant_id: &str,
) -> TransitionResult<()> {
    if !roles.iter().any(|role| principal.has_role(*role)) {
        let names: Vec<&str> = roles.iter().map(Role::as_str).collect();
        return Err(TransitionError::unauthorized(format!(
            "must have one of the roles [{}]",
            names.join(", ")
        )));
    }
    require_tenant(principal, tenant_id)
}

pub fn require_tenant(principal: &Principal, tenant_id: &str) -> TransitionResult<()> {
    if principal.has_tenant(tenant_id) {
        Ok(())
    } else {
        Err(TransitionError::unauthorized(format!(
            "not authorized for tenant '{tenant_id}'"
        )))
    }
}

/// Caller must be the integrator that created the batch.
pub fn require_owner(principal: &Principal, batch: &Batch) -> TransitionResult<()> {
    if batch.is_owned_by(&principal.subject) {
        Ok(())
    } else {
        Err(TransitionError::unauthorized(format!(
            "batch {} is owned by a different integrator than '{}'",
            batch.id, principal.subject
        )))
    }
}
