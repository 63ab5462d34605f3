//! Role hierarchy and permission matrix
//!
//! The matrix maps every role to its hierarchy level and permission
//! set. It is built once at process start and never mutated afterwards;
//! concurrent readers are always safe. Every permission check in the
//! crate goes through this structure — nothing bypasses it.

use crate::error::{AccessError, Result};
use crate::role::{Permission, Role};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone)]
struct RoleEntry {
    level: u8,
    permissions: HashSet<Permission>,
}

/// Immutable mapping from role to hierarchy level and permission set.
///
/// Querying a role that was never registered fails with
/// [`AccessError::UnknownRole`] — never an empty permission set, since
/// that would mask a misconfiguration as a quiet deny.
#[derive(Debug, Clone)]
pub struct RolePermissionMatrix {
    entries: HashMap<Role, RoleEntry>,
}

impl RolePermissionMatrix {
    /// Create a matrix builder.
    pub fn builder() -> MatrixBuilder {
        MatrixBuilder::new()
    }

    /// The permission set held by `role`.
    pub fn permissions_of(&self, role: Role) -> Result<&HashSet<Permission>> {
        self.entries
            .get(&role)
            .map(|e| &e.permissions)
            .ok_or_else(|| AccessError::UnknownRole(role.to_string()))
    }

    /// The hierarchy level of `role` (higher = more privileged).
    pub fn level_of(&self, role: Role) -> Result<u8> {
        self.entries
            .get(&role)
            .map(|e| e.level)
            .ok_or_else(|| AccessError::UnknownRole(role.to_string()))
    }

    /// All registered roles, ordered by hierarchy level, descending.
    pub fn roles_by_level(&self) -> Vec<Role> {
        let mut roles: Vec<(Role, u8)> = self
            .entries
            .iter()
            .map(|(role, entry)| (*role, entry.level))
            .collect();
        roles.sort_by(|a, b| b.1.cmp(&a.1));
        roles.into_iter().map(|(role, _)| role).collect()
    }

    /// Whether `role` is registered in this matrix.
    pub fn contains(&self, role: Role) -> bool {
        self.entries.contains_key(&role)
    }
}

impl Default for RolePermissionMatrix {
    /// The standard five-role policy for the operations platform.
    fn default() -> Self {
        use Permission::*;

        MatrixBuilder::new()
            .with_role(Role::SuperAdmin, 5, Permission::ALL)
            .with_role(
                Role::Admin,
                4,
                [
                    ManageUsers,
                    ViewUsers,
                    ManageJourneys,
                    ViewJourneys,
                    DispatchJourneys,
                    ManageClients,
                    ViewClients,
                    ManageDrivers,
                    ViewDrivers,
                    ViewReports,
                    ExportReports,
                    ManageSettings,
                ],
            )
            .with_role(
                Role::Dispatcher,
                3,
                [
                    ManageJourneys,
                    ViewJourneys,
                    DispatchJourneys,
                    ViewClients,
                    ViewDrivers,
                    ViewReports,
                ],
            )
            .with_role(Role::Driver, 2, [ViewJourneys])
            .with_role(Role::Client, 1, [ViewJourneys])
            .build()
            .expect("default matrix is statically valid")
    }
}

/// Builder for [`RolePermissionMatrix`].
pub struct MatrixBuilder {
    entries: Vec<(Role, u8, HashSet<Permission>)>,
}

impl MatrixBuilder {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a role with its hierarchy level and permission set.
    pub fn with_role(
        mut self,
        role: Role,
        level: u8,
        permissions: impl IntoIterator<Item = Permission>,
    ) -> Self {
        self.entries
            .push((role, level, permissions.into_iter().collect()));
        self
    }

    /// Build the matrix, validating that roles are unique and levels
    /// form a total order (no two roles share a level).
    pub fn build(self) -> Result<RolePermissionMatrix> {
        let mut entries = HashMap::new();
        let mut levels = HashSet::new();

        for (role, level, permissions) in self.entries {
            if entries.contains_key(&role) {
                return Err(AccessError::Configuration(format!(
                    "role '{role}' registered twice"
                )));
            }
            if !levels.insert(level) {
                return Err(AccessError::Configuration(format!(
                    "hierarchy level {level} assigned to more than one role"
                )));
            }
            entries.insert(role, RoleEntry { level, permissions });
        }

        Ok(RolePermissionMatrix { entries })
    }
}

impl Default for MatrixBuilder {
    fn default() -> Self {
        Self::new()
    }
}
