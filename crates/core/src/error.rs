//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, conflicts). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. duplicate email or natural key).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The account is restricted; distinct from a generic auth failure.
    #[error("account restricted")]
    Restricted,

    /// The presented refresh token is unknown or no longer valid.
    #[error("refresh token invalid")]
    InvalidRefreshToken,

    /// An upstream provider rejected or failed the call; carries the raw
    /// provider detail so callers can decide their own retry policy.
    #[error("{provider} integration failure: {detail}")]
    Integration { provider: String, detail: String },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn integration(provider: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Integration {
            provider: provider.into(),
            detail: detail.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}
