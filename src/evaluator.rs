//! Permission evaluator
//!
//! Pure queries against the role/permission matrix. No I/O, no side
//! effects beyond optional audit logging. Every operation on an
//! unknown role fails with [`AccessError::UnknownRole`]; callers must
//! treat that as a deny, never as an implicit allow.

use crate::error::Result;
use crate::matrix::RolePermissionMatrix;
use crate::role::{Permission, Role};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Evaluates permission and role-management queries against an
/// immutable [`RolePermissionMatrix`].
#[derive(Debug, Clone)]
pub struct PermissionEvaluator {
    matrix: Arc<RolePermissionMatrix>,
    audit_enabled: bool,
}

impl PermissionEvaluator {
    pub fn new(matrix: Arc<RolePermissionMatrix>) -> Self {
        Self {
            matrix,
            audit_enabled: false,
        }
    }

    /// Enable audit logging of permission decisions.
    pub fn with_audit_logging(mut self, enabled: bool) -> Self {
        self.audit_enabled = enabled;
        self
    }

    /// The matrix this evaluator consults.
    pub fn matrix(&self) -> &RolePermissionMatrix {
        &self.matrix
    }

    /// True iff `permission` is in the role's permission set.
    pub fn has_permission(&self, role: Role, permission: Permission) -> Result<bool> {
        let granted = self.matrix.permissions_of(role)?.contains(&permission);
        self.audit(role, &[permission], granted);
        Ok(granted)
    }

    /// True iff the role holds at least one of `permissions`.
    ///
    /// An empty `permissions` slice returns false: a requirement that
    /// names no acceptable capability can never be satisfied.
    pub fn has_any_permission(&self, role: Role, permissions: &[Permission]) -> Result<bool> {
        let held = self.matrix.permissions_of(role)?;
        let granted = permissions.iter().any(|p| held.contains(p));
        self.audit(role, permissions, granted);
        Ok(granted)
    }

    /// True iff the role holds every one of `permissions`.
    ///
    /// An empty `permissions` slice returns true (vacuous truth). This
    /// is intended policy: a requirement that names nothing to check
    /// imposes no restriction beyond the caller's authentication.
    pub fn has_all_permissions(&self, role: Role, permissions: &[Permission]) -> Result<bool> {
        let held = self.matrix.permissions_of(role)?;
        let granted = permissions.iter().all(|p| held.contains(p));
        self.audit(role, permissions, granted);
        Ok(granted)
    }

    /// True iff `actor_role` sits strictly above `target_role` in the
    /// hierarchy.
    ///
    /// A role can never manage itself or any role at or above its own
    /// level; this is the anti-privilege-escalation invariant and holds
    /// for every pair, not just adjacent levels.
    pub fn can_manage_role(&self, actor_role: Role, target_role: Role) -> Result<bool> {
        Ok(self.matrix.level_of(actor_role)? > self.matrix.level_of(target_role)?)
    }

    /// All roles with a strictly lower hierarchy level than
    /// `actor_role`.
    pub fn manageable_roles(&self, actor_role: Role) -> Result<HashSet<Role>> {
        let actor_level = self.matrix.level_of(actor_role)?;
        let mut manageable = HashSet::new();
        for role in self.matrix.roles_by_level() {
            if self.matrix.level_of(role)? < actor_level {
                manageable.insert(role);
            }
        }
        Ok(manageable)
    }

    /// The hierarchy level of `role`.
    pub fn role_hierarchy_level(&self, role: Role) -> Result<u8> {
        self.matrix.level_of(role)
    }

    fn audit(&self, role: Role, permissions: &[Permission], granted: bool) {
        if !self.audit_enabled {
            return;
        }
        let wanted: Vec<&str> = permissions.iter().map(|p| p.as_str()).collect();
        if granted {
            info!(
                role = %role,
                permissions = ?wanted,
                result = "granted",
                "Permission check"
            );
        } else {
            warn!(
                role = %role,
                permissions = ?wanted,
                result = "denied",
                "Permission check"
            );
        }
    }
}
