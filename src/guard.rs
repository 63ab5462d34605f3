//! Request-time guard
//!
//! The enforcement point. For each request it asks the session
//! manager for a live session and the route table for the path's
//! requirement, then emits a verdict. Authentication failures and
//! privilege failures are distinct failure classes with distinct
//! redirect targets and are never collapsed into one.

use crate::evaluator::PermissionEvaluator;
use crate::role::Namespace;
use crate::routes::{Requirement, RequirementMode, RouteTable};
use crate::session::{Session, SessionManager, Validation};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// An inbound request as the guard sees it: the path being navigated
/// to and the credential carried in request metadata, if any.
#[derive(Debug, Clone)]
pub struct AccessRequest {
    pub path: String,
    pub token: Option<String>,
}

impl AccessRequest {
    pub fn new(path: impl Into<String>, token: Option<String>) -> Self {
        Self {
            path: path.into(),
            token,
        }
    }
}

/// The guard's decision for a request.
#[derive(Debug, Clone)]
pub enum Verdict {
    /// Render the requested content.
    Allow { session: Session },
    /// No valid credential; redirect to login, preserving the
    /// originally requested path for post-login navigation.
    DenyAuthRequired { resume: String },
    /// Authenticated but under-privileged; redirect to the
    /// access-denied surface.
    DenyRedirect { target: String },
}

/// Request-time enforcement point composing the session manager, the
/// route table, and the permission evaluator.
pub struct RequestGuard {
    sessions: Arc<SessionManager>,
    routes: Arc<RouteTable>,
    evaluator: PermissionEvaluator,
    denied_path: String,
}

impl RequestGuard {
    pub fn new(
        sessions: Arc<SessionManager>,
        routes: Arc<RouteTable>,
        evaluator: PermissionEvaluator,
    ) -> Self {
        Self {
            sessions,
            routes,
            evaluator,
            denied_path: "/access-denied".to_string(),
        }
    }

    /// Override the redirect target for privilege failures.
    pub fn with_denied_path(mut self, path: impl Into<String>) -> Self {
        self.denied_path = path.into();
        self
    }

    /// Decide whether `request` may proceed.
    pub fn authorize(&self, request: &AccessRequest) -> Verdict {
        let Some(token) = request.token.as_deref() else {
            debug!(path = %request.path, "no credential presented");
            return Verdict::DenyAuthRequired {
                resume: request.path.clone(),
            };
        };

        let session = match self.sessions.validate(token) {
            Validation::Valid(session) => session,
            Validation::Invalid(reason) => {
                debug!(path = %request.path, ?reason, "credential rejected");
                return Verdict::DenyAuthRequired {
                    resume: request.path.clone(),
                };
            }
        };

        let resolved = self.routes.resolve(&request.path);

        // Namespace isolation is an independent check: a tenant
        // credential never satisfies a super-admin surface, whatever
        // its role level.
        if resolved.namespace == Namespace::SuperAdmin
            && session.namespace != Namespace::SuperAdmin
        {
            warn!(
                actor = %session.actor_id,
                path = %request.path,
                "tenant credential presented on super-admin surface"
            );
            return Verdict::DenyRedirect {
                target: self.denied_path.clone(),
            };
        }

        let satisfied = match resolved.requirement {
            Requirement::None => Ok(true),
            Requirement::Permissions { permissions, mode } => match mode {
                RequirementMode::Any => self
                    .evaluator
                    .has_any_permission(session.role, permissions),
                RequirementMode::All => self
                    .evaluator
                    .has_all_permissions(session.role, permissions),
            },
            Requirement::MinLevel { level } => self
                .evaluator
                .role_hierarchy_level(session.role)
                .map(|actual| actual >= *level),
        };

        match satisfied {
            Ok(true) => Verdict::Allow { session },
            Ok(false) => {
                info!(
                    actor = %session.actor_id,
                    role = %session.role,
                    path = %request.path,
                    "insufficient privilege"
                );
                Verdict::DenyRedirect {
                    target: self.denied_path.clone(),
                }
            }
            // A configuration defect (unknown role in the matrix).
            // Deny by default and surface loudly for alerting; the
            // raw error never reaches the end user.
            Err(e) => {
                error!(
                    actor = %session.actor_id,
                    path = %request.path,
                    error = %e,
                    "policy configuration defect during authorization"
                );
                Verdict::DenyRedirect {
                    target: self.denied_path.clone(),
                }
            }
        }
    }

    /// Authorize a navigation using the credential persisted for
    /// `actor_id` instead of one carried on the request. A storage
    /// failure fails closed as an authentication failure, but is
    /// logged distinctly for operational visibility.
    pub fn authorize_stored(&self, actor_id: &str, path: &str) -> Verdict {
        match self.sessions.stored_token(actor_id) {
            Ok(token) => self.authorize(&AccessRequest::new(path, token)),
            Err(e) => {
                error!(actor = %actor_id, path, error = %e, "credential storage failure");
                Verdict::DenyAuthRequired {
                    resume: path.to_string(),
                }
            }
        }
    }
}
