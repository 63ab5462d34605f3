//! Route access resolver
//!
//! Maps request paths to the permission or role-level requirement
//! protecting them. Matching is deterministic: among all rules whose
//! pattern matches the path, the one with the longest literal prefix
//! wins, and ties go to the rule registered first. An unmatched path
//! resolves to the table's fallback requirement, which defaults to
//! [`Requirement::None`] (authenticated-only) and can only be changed
//! by an explicit [`RouteTableBuilder::fallback`] call.

use crate::error::{AccessError, Result};
use crate::evaluator::PermissionEvaluator;
use crate::role::{Namespace, Permission, Role};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// How a multi-permission requirement combines its members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementMode {
    /// At least one of the listed permissions.
    Any,
    /// Every one of the listed permissions.
    All,
}

/// The precondition attached to a protected path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Requirement {
    /// No restriction beyond authentication.
    None,
    /// Permission-based requirement.
    Permissions {
        permissions: Vec<Permission>,
        mode: RequirementMode,
    },
    /// Minimum hierarchy level.
    MinLevel { level: u8 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param,
    Wildcard,
}

/// A parsed path pattern: literal segments, `:param` parametric
/// segments, and an optional trailing `*` wildcard. Patterns always
/// match as a prefix of the request path.
#[derive(Debug, Clone)]
pub struct RoutePattern {
    raw: String,
    segments: Vec<Segment>,
    literal_prefix: usize,
}

impl RoutePattern {
    /// Parse a pattern like `/admin/users/:id` or `/backups/*`.
    pub fn parse(pattern: &str) -> Result<Self> {
        if !pattern.starts_with('/') {
            return Err(AccessError::InvalidRoutePattern(format!(
                "pattern '{pattern}' must start with '/'"
            )));
        }

        let mut segments = Vec::new();
        let mut literal_prefix = 0;
        let mut in_prefix = true;
        let raw_segments: Vec<&str> = pattern.split('/').skip(1).filter(|s| !s.is_empty()).collect();

        for (idx, seg) in raw_segments.iter().enumerate() {
            if *seg == "*" {
                if idx + 1 != raw_segments.len() {
                    return Err(AccessError::InvalidRoutePattern(format!(
                        "wildcard must be the final segment in '{pattern}'"
                    )));
                }
                segments.push(Segment::Wildcard);
                in_prefix = false;
            } else if let Some(name) = seg.strip_prefix(':') {
                if name.is_empty() {
                    return Err(AccessError::InvalidRoutePattern(format!(
                        "empty parameter name in '{pattern}'"
                    )));
                }
                segments.push(Segment::Param);
                in_prefix = false;
            } else {
                if in_prefix {
                    literal_prefix += seg.len();
                }
                segments.push(Segment::Literal((*seg).to_string()));
            }
        }

        Ok(Self {
            raw: pattern.to_string(),
            segments,
            literal_prefix,
        })
    }

    /// The pattern text as registered.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Bytes of literal text before the first parametric or wildcard
    /// segment; the specificity score for longest-prefix-wins
    /// resolution. Literals after a `:param` do not count, so a rule
    /// with a more specific literal prefix always outranks one that is
    /// merely longer overall.
    fn specificity(&self) -> usize {
        self.literal_prefix
    }

    fn matches(&self, path: &str) -> bool {
        let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut path_iter = path_segments.iter();

        for segment in &self.segments {
            match segment {
                Segment::Wildcard => return true,
                Segment::Param => {
                    if path_iter.next().is_none() {
                        return false;
                    }
                }
                Segment::Literal(lit) => match path_iter.next() {
                    Some(actual) if *actual == lit => {}
                    _ => return false,
                },
            }
        }

        // Prefix semantics: remaining path segments are allowed.
        true
    }
}

/// One registered rule: pattern, requirement, and the credential
/// namespace the path belongs to.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub pattern: RoutePattern,
    pub requirement: Requirement,
    pub namespace: Namespace,
}

/// The resolved protection for a concrete path.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<'a> {
    pub requirement: &'a Requirement,
    pub namespace: Namespace,
    /// The winning pattern, or `None` for the fallback.
    pub pattern: Option<&'a str>,
}

/// Ordered collection of route rules with deterministic resolution.
#[derive(Debug, Clone)]
pub struct RouteTable {
    rules: Vec<RouteRule>,
    fallback: Requirement,
}

impl RouteTable {
    pub fn builder() -> RouteTableBuilder {
        RouteTableBuilder::new()
    }

    /// Resolve the requirement protecting `path`.
    pub fn resolve(&self, path: &str) -> Resolved<'_> {
        let mut best: Option<(&RouteRule, usize)> = None;

        for rule in &self.rules {
            if !rule.pattern.matches(path) {
                continue;
            }
            let score = rule.pattern.specificity();
            // Strict '>' keeps the first-registered rule on ties.
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((rule, score));
            }
        }

        match best {
            Some((rule, _)) => {
                debug!(path, pattern = rule.pattern.as_str(), "route resolved");
                Resolved {
                    requirement: &rule.requirement,
                    namespace: rule.namespace,
                    pattern: Some(rule.pattern.as_str()),
                }
            }
            None => Resolved {
                requirement: &self.fallback,
                namespace: Namespace::Tenant,
                pattern: None,
            },
        }
    }

    /// Convenience: the requirement alone, without namespace metadata.
    pub fn resolve_requirement(&self, path: &str) -> &Requirement {
        self.resolve(path).requirement
    }

    /// Whether `role` satisfies the requirement protecting `path`.
    ///
    /// A [`Requirement::None`] resolution returns true; the
    /// authentication check itself belongs to the guard, not here.
    pub fn can_access(
        &self,
        evaluator: &PermissionEvaluator,
        role: Role,
        path: &str,
    ) -> Result<bool> {
        match self.resolve(path).requirement {
            Requirement::None => Ok(true),
            Requirement::Permissions { permissions, mode } => match mode {
                RequirementMode::Any => evaluator.has_any_permission(role, permissions),
                RequirementMode::All => evaluator.has_all_permissions(role, permissions),
            },
            Requirement::MinLevel { level } => {
                Ok(evaluator.role_hierarchy_level(role)? >= *level)
            }
        }
    }
}

/// Builder for [`RouteTable`]. Rules keep their registration order,
/// which is the tie-breaker for equally specific patterns.
pub struct RouteTableBuilder {
    rules: Vec<(String, Requirement, Namespace)>,
    fallback: Requirement,
}

impl RouteTableBuilder {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: Requirement::None,
        }
    }

    /// Register a tenant-namespace rule.
    pub fn route(mut self, pattern: &str, requirement: Requirement) -> Self {
        self.rules
            .push((pattern.to_string(), requirement, Namespace::Tenant));
        self
    }

    /// Register a rule on the super-admin credential namespace. A
    /// tenant session never satisfies these paths regardless of its
    /// role level.
    pub fn super_admin_route(mut self, pattern: &str, requirement: Requirement) -> Self {
        self.rules
            .push((pattern.to_string(), requirement, Namespace::SuperAdmin));
        self
    }

    /// Set the requirement for paths no rule matches. The default is
    /// [`Requirement::None`]; anything stricter is an explicit policy
    /// decision made here, never an accident of rule ordering.
    pub fn fallback(mut self, requirement: Requirement) -> Self {
        self.fallback = requirement;
        self
    }

    pub fn build(self) -> Result<RouteTable> {
        let mut rules = Vec::with_capacity(self.rules.len());
        for (pattern, requirement, namespace) in self.rules {
            rules.push(RouteRule {
                pattern: RoutePattern::parse(&pattern)?,
                requirement,
                namespace,
            });
        }
        Ok(RouteTable {
            rules,
            fallback: self.fallback,
        })
    }
}

impl Default for RouteTableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matrix::RolePermissionMatrix;
    use std::sync::Arc;

    fn evaluator() -> PermissionEvaluator {
        PermissionEvaluator::new(Arc::new(RolePermissionMatrix::default()))
    }

    fn perms(permissions: &[Permission], mode: RequirementMode) -> Requirement {
        Requirement::Permissions {
            permissions: permissions.to_vec(),
            mode,
        }
    }

    #[test]
    fn longest_literal_prefix_wins() {
        let table = RouteTable::builder()
            .route("/admin", Requirement::MinLevel { level: 4 })
            .route(
                "/admin/backups",
                perms(&[Permission::ManageBackups], RequirementMode::All),
            )
            .build()
            .unwrap();

        assert_eq!(
            table.resolve("/admin/backups/nightly").pattern,
            Some("/admin/backups")
        );
        assert_eq!(table.resolve("/admin/users").pattern, Some("/admin"));
    }

    #[test]
    fn literal_prefix_outweighs_literals_after_params() {
        // "/journeys/:id/dispatch" carries more literal bytes in total,
        // but "/journeys/active" has the longer literal prefix and must
        // win for paths both rules match.
        let table = RouteTable::builder()
            .route("/journeys/:id/dispatch", Requirement::MinLevel { level: 5 })
            .route("/journeys/active", Requirement::None)
            .build()
            .unwrap();

        let hit = table.resolve("/journeys/active/dispatch");
        assert_eq!(hit.pattern, Some("/journeys/active"));
        assert_eq!(hit.requirement, &Requirement::None);

        // Paths only the parametric rule matches still resolve to it.
        assert_eq!(
            table.resolve("/journeys/jrn-9/dispatch").pattern,
            Some("/journeys/:id/dispatch")
        );
    }

    #[test]
    fn ties_go_to_first_registered() {
        let table = RouteTable::builder()
            .route("/ops/:id", Requirement::MinLevel { level: 3 })
            .route("/ops/:id", Requirement::MinLevel { level: 5 })
            .build()
            .unwrap();

        assert_eq!(
            table.resolve("/ops/42").requirement,
            &Requirement::MinLevel { level: 3 }
        );
    }

    #[test]
    fn parametric_segments_match_any_value() {
        let table = RouteTable::builder()
            .route(
                "/journeys/:id/dispatch",
                perms(&[Permission::DispatchJourneys], RequirementMode::All),
            )
            .build()
            .unwrap();

        let hit = table.resolve("/journeys/abc-123/dispatch");
        assert_eq!(hit.pattern, Some("/journeys/:id/dispatch"));
        // Param requires a segment to be present.
        assert_eq!(table.resolve("/journeys").pattern, None);
    }

    #[test]
    fn wildcard_must_be_final_segment() {
        assert!(RoutePattern::parse("/a/*/b").is_err());
        assert!(RoutePattern::parse("/a/*").is_ok());
        assert!(RoutePattern::parse("relative").is_err());
    }

    #[test]
    fn unmatched_path_uses_fallback() {
        let table = RouteTable::builder()
            .route("/admin", Requirement::MinLevel { level: 4 })
            .build()
            .unwrap();
        assert_eq!(table.resolve_requirement("/profile"), &Requirement::None);

        let strict = RouteTable::builder()
            .fallback(Requirement::MinLevel { level: 4 })
            .build()
            .unwrap();
        assert_eq!(
            strict.resolve_requirement("/anything"),
            &Requirement::MinLevel { level: 4 }
        );
    }

    #[test]
    fn dispatcher_below_min_level_is_denied() {
        let table = RouteTable::builder()
            .route("/admin", Requirement::MinLevel { level: 4 })
            .build()
            .unwrap();

        let eval = evaluator();
        assert!(!table.can_access(&eval, Role::Dispatcher, "/admin").unwrap());
        assert!(table.can_access(&eval, Role::Admin, "/admin").unwrap());
    }

    #[test]
    fn any_and_all_modes_compose_with_evaluator() {
        let table = RouteTable::builder()
            .route(
                "/reports",
                perms(
                    &[Permission::ViewReports, Permission::ExportReports],
                    RequirementMode::Any,
                ),
            )
            .route(
                "/reports/export",
                perms(
                    &[Permission::ViewReports, Permission::ExportReports],
                    RequirementMode::All,
                ),
            )
            .build()
            .unwrap();

        let eval = evaluator();
        // Dispatcher holds view_reports but not export_reports.
        assert!(table.can_access(&eval, Role::Dispatcher, "/reports").unwrap());
        assert!(
            !table
                .can_access(&eval, Role::Dispatcher, "/reports/export")
                .unwrap()
        );
        assert!(
            table
                .can_access(&eval, Role::Admin, "/reports/export")
                .unwrap()
        );
    }

    #[test]
    fn none_requirement_allows_any_role() {
        let table = RouteTable::builder().build().unwrap();
        let eval = evaluator();
        for role in Role::ALL {
            assert!(table.can_access(&eval, role, "/dashboard").unwrap());
        }
    }
}
