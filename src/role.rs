//! Role and permission types
//!
//! Both sets are closed enums rather than string maps, so a reference
//! to a role or capability that does not exist is a compile error (or
//! an explicit [`AccessError`] at the config-parsing boundary), never
//! a silent fallback.

use crate::error::AccessError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A named position in the role hierarchy.
///
/// Roles form a total order; the numeric hierarchy level lives in the
/// [`crate::matrix::RolePermissionMatrix`], which is the single source
/// of truth for both levels and permission sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Dispatcher,
    Driver,
    Client,
}

impl Role {
    /// All roles in the closed set, most privileged first.
    pub const ALL: [Role; 5] = [
        Role::SuperAdmin,
        Role::Admin,
        Role::Dispatcher,
        Role::Driver,
        Role::Client,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Dispatcher => "dispatcher",
            Role::Driver => "driver",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, AccessError> {
        match s {
            "super_admin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "dispatcher" => Ok(Role::Dispatcher),
            "driver" => Ok(Role::Driver),
            "client" => Ok(Role::Client),
            other => Err(AccessError::UnknownRole(other.to_string())),
        }
    }
}

/// An atomic, independently checkable capability tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
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
    ManageBackups,
    ManageTenants,
    ManageSettings,
}

impl Permission {
    /// All capability tags in the closed set.
    pub const ALL: [Permission; 14] = [
        Permission::ManageUsers,
        Permission::ViewUsers,
        Permission::ManageJourneys,
        Permission::ViewJourneys,
        Permission::DispatchJourneys,
        Permission::ManageClients,
        Permission::ViewClients,
        Permission::ManageDrivers,
        Permission::ViewDrivers,
        Permission::ViewReports,
        Permission::ExportReports,
        Permission::ManageBackups,
        Permission::ManageTenants,
        Permission::ManageSettings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ManageUsers => "manage_users",
            Permission::ViewUsers => "view_users",
            Permission::ManageJourneys => "manage_journeys",
            Permission::ViewJourneys => "view_journeys",
            Permission::DispatchJourneys => "dispatch_journeys",
            Permission::ManageClients => "manage_clients",
            Permission::ViewClients => "view_clients",
            Permission::ManageDrivers => "manage_drivers",
            Permission::ViewDrivers => "view_drivers",
            Permission::ViewReports => "view_reports",
            Permission::ExportReports => "export_reports",
            Permission::ManageBackups => "manage_backups",
            Permission::ManageTenants => "manage_tenants",
            Permission::ManageSettings => "manage_settings",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = AccessError;

    fn from_str(s: &str) -> Result<Self, AccessError> {
        Permission::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| AccessError::UnknownPermission(s.to_string()))
    }
}

/// The trust domain a credential was issued for.
///
/// A credential issued for one namespace must never satisfy checks for
/// another, regardless of the role's nominal hierarchy level. This is
/// an independent check in the guard, not derivable from role levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    /// Ordinary tenant-scoped credentials.
    #[default]
    Tenant,
    /// Platform-operator credentials for super-admin surfaces.
    SuperAdmin,
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Namespace::Tenant => f.write_str("tenant"),
            Namespace::SuperAdmin => f.write_str("super_admin"),
        }
    }
}
