//! Error types for opsgate

use crate::storage::StorageError;
use thiserror::Error;

/// Result type alias for opsgate operations.
pub type Result<T> = std::result::Result<T, AccessError>;

/// Errors that can occur in access-control operations.
///
/// Expected, frequent outcomes (an expired credential, an
/// under-permissioned actor) are *not* errors; they are modeled as
/// values on [`crate::session::Validation`] and
/// [`crate::guard::Verdict`]. The variants here are configuration
/// defects and infrastructure failures.
#[derive(Error, Debug)]
pub enum AccessError {
    /// A role outside the configured matrix was queried. This is a
    /// deploy-time defect and must never be downgraded to an implicit
    /// "no permissions" answer.
    #[error("unknown role: {0}")]
    UnknownRole(String),

    #[error("unknown permission: {0}")]
    UnknownPermission(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid route pattern: {0}")]
    InvalidRoutePattern(String),

    /// Credential storage read/write failure. For authorization
    /// purposes callers treat this as an invalid credential (fail
    /// closed), but it is surfaced separately for operational
    /// visibility.
    #[error("credential storage failure: {0}")]
    Storage(#[from] StorageError),

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
