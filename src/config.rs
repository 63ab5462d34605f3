//! Declarative access-control configuration
//!
//! A serializable description of the role matrix, route rules, and
//! session timing, loadable from a JSON file. `build_*` methods turn a
//! validated configuration into the runtime structures; after that
//! point the policy is immutable.

use crate::error::{AccessError, Result};
use crate::matrix::RolePermissionMatrix;
use crate::role::{Namespace, Permission, Role};
use crate::routes::{Requirement, RequirementMode, RouteTable};
use crate::session::SessionSettings;
use serde::{Deserialize, Serialize};

/// Top-level access-control configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessConfig {
    /// Enable audit logging of permission decisions.
    pub audit_enabled: bool,
    /// Role definitions: hierarchy level and permission set.
    pub roles: Vec<RoleConfig>,
    /// Route protection rules, in declaration order.
    pub routes: Vec<RouteConfig>,
    /// Session timing policy.
    pub session: SessionSettings,
}

/// One role's place in the matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    pub role: Role,
    pub level: u8,
    pub permissions: Vec<Permission>,
}

/// One route rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub pattern: String,
    #[serde(default)]
    pub namespace: Namespace,
    pub requirement: Requirement,
}

impl Default for AccessConfig {
    /// The standard policy: the default five-role matrix plus the
    /// route rules the operations platform ships with.
    fn default() -> Self {
        let matrix = RolePermissionMatrix::default();
        let roles = Role::ALL
            .iter()
            .map(|role| RoleConfig {
                role: *role,
                level: matrix.level_of(*role).expect("default matrix is complete"),
                permissions: {
                    let mut perms: Vec<Permission> = matrix
                        .permissions_of(*role)
                        .expect("default matrix is complete")
                        .iter()
                        .copied()
                        .collect();
                    perms.sort_by_key(|p| p.as_str());
                    perms
                },
            })
            .collect();

        Self {
            audit_enabled: true,
            roles,
            routes: vec![
                RouteConfig {
                    pattern: "/admin".to_string(),
                    namespace: Namespace::Tenant,
                    requirement: Requirement::MinLevel { level: 4 },
                },
                RouteConfig {
                    pattern: "/admin/backups".to_string(),
                    namespace: Namespace::Tenant,
                    requirement: Requirement::Permissions {
                        permissions: vec![Permission::ManageBackups],
                        mode: RequirementMode::All,
                    },
                },
                RouteConfig {
                    pattern: "/journeys/:id/dispatch".to_string(),
                    namespace: Namespace::Tenant,
                    requirement: Requirement::Permissions {
                        permissions: vec![Permission::DispatchJourneys],
                        mode: RequirementMode::All,
                    },
                },
                RouteConfig {
                    pattern: "/reports".to_string(),
                    namespace: Namespace::Tenant,
                    requirement: Requirement::Permissions {
                        permissions: vec![Permission::ViewReports, Permission::ExportReports],
                        mode: RequirementMode::Any,
                    },
                },
                RouteConfig {
                    pattern: "/platform/*".to_string(),
                    namespace: Namespace::SuperAdmin,
                    requirement: Requirement::MinLevel { level: 5 },
                },
            ],
            session: SessionSettings::default(),
        }
    }
}

impl AccessConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AccessError::Configuration(format!("failed to read config file: {e}")))?;
        let config: AccessConfig = serde_json::from_str(&content)
            .map_err(|e| AccessError::Configuration(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    pub fn to_file(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .map_err(|e| AccessError::Configuration(format!("failed to write config file: {e}")))?;
        Ok(())
    }

    /// A template for production deployments: long-lived audit trail,
    /// conservative session timing.
    pub fn production_template() -> Self {
        Self {
            audit_enabled: true,
            session: SessionSettings {
                ttl_seconds: 1800,
                grace_seconds: 120,
                watch_interval_seconds: 15,
            },
            ..Self::default()
        }
    }

    /// Validate the configuration without building it.
    pub fn validate(&self) -> Result<()> {
        if self.roles.is_empty() {
            return Err(AccessError::Configuration(
                "no roles configured".to_string(),
            ));
        }
        if self.session.ttl_seconds <= 0 {
            return Err(AccessError::Configuration(
                "session ttl_seconds must be positive".to_string(),
            ));
        }
        if self.session.grace_seconds < 0 {
            return Err(AccessError::Configuration(
                "session grace_seconds must not be negative".to_string(),
            ));
        }

        // Building surfaces duplicate roles, duplicate levels, and
        // malformed route patterns.
        self.build_matrix()?;
        self.build_routes()?;
        Ok(())
    }

    /// Build the immutable role/permission matrix.
    pub fn build_matrix(&self) -> Result<RolePermissionMatrix> {
        let mut builder = RolePermissionMatrix::builder();
        for role_config in &self.roles {
            builder = builder.with_role(
                role_config.role,
                role_config.level,
                role_config.permissions.iter().copied(),
            );
        }
        builder.build()
    }

    /// Build the route table, preserving declaration order.
    pub fn build_routes(&self) -> Result<RouteTable> {
        let mut builder = RouteTable::builder();
        for route in &self.routes {
            builder = match route.namespace {
                Namespace::Tenant => builder.route(&route.pattern, route.requirement.clone()),
                Namespace::SuperAdmin => {
                    builder.super_admin_route(&route.pattern, route.requirement.clone())
                }
            };
        }
        builder.build()
    }
}
