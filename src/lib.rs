//! Role-Based Access Control and session security engine for
//! multi-tenant operations platforms.
//!
//! Opsgate decides, for any (actor, action, resource) triple, whether
//! access is permitted, and manages the lifetime and validity of the
//! credential identifying the actor. UI layers, navigation guards, and
//! request middleware call into this engine and render its verdicts;
//! they never decide policy themselves.
//!
//! # Features
//!
//! - **Hierarchical Roles**: a closed, totally ordered role set
//!   (`super_admin > admin > dispatcher > driver > client`)
//! - **Fine-grained Permissions**: atomic capability tags checked
//!   against an immutable role/permission matrix
//! - **Route Protection**: deterministic longest-prefix route rules
//!   mapping paths to permission or role-level requirements
//! - **Session Lifecycle**: signed credentials with issuance, stateless
//!   validation, grace-period renewal, and a background expiry watch
//! - **Namespace Isolation**: tenant credentials never satisfy
//!   super-admin surfaces, regardless of nominal role level
//! - **Audit Logging**: structured permission-decision logging
//!
//! # Quick Start
//!
//! ```rust
//! use opsgate::prelude::*;
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let config = AccessConfig::default();
//!     let matrix = Arc::new(config.build_matrix()?);
//!     let routes = Arc::new(config.build_routes()?);
//!
//!     let sessions = Arc::new(SessionManager::new(
//!         Arc::new(JwtCodec::hs256(b"change-me")),
//!         Arc::new(MemoryStore::new()),
//!         config.session,
//!     ));
//!     let guard = RequestGuard::new(
//!         sessions.clone(),
//!         routes,
//!         PermissionEvaluator::new(matrix).with_audit_logging(config.audit_enabled),
//!     );
//!
//!     let session = sessions.issue("dispatcher-7", Role::Dispatcher, Namespace::Tenant)?;
//!     let verdict = guard.authorize(&AccessRequest::new("/journeys", Some(session.token)));
//!     assert!(matches!(verdict, Verdict::Allow { .. }));
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod evaluator;
pub mod guard;
pub mod matrix;
pub mod role;
pub mod routes;
pub mod session;
pub mod storage;
pub mod token;

pub mod prelude {
    //! Common imports for opsgate

    pub use crate::config::{AccessConfig, RoleConfig, RouteConfig};
    pub use crate::error::{AccessError, Result};
    pub use crate::evaluator::PermissionEvaluator;
    pub use crate::guard::{AccessRequest, RequestGuard, Verdict};
    pub use crate::matrix::{MatrixBuilder, RolePermissionMatrix};
    pub use crate::role::{Namespace, Permission, Role};
    pub use crate::routes::{Requirement, RequirementMode, RouteTable, RouteTableBuilder};
    pub use crate::session::{
        InvalidReason, Renewal, Session, SessionManager, SessionSettings, SessionState, Validation,
    };
    pub use crate::storage::{CredentialStore, MemoryStore, StorageError};
    pub use crate::token::{Claims, JwtCodec, TokenCodec, TokenRejection};
}

// Re-export major components at crate level
pub use error::{AccessError, Result};
pub use evaluator::PermissionEvaluator;
pub use guard::{AccessRequest, RequestGuard, Verdict};
pub use matrix::RolePermissionMatrix;
pub use role::{Namespace, Permission, Role};
pub use routes::RouteTable;
pub use session::SessionManager;
