//! Error types for the core naming contract and connection capability.

use thiserror::Error;

/// Errors raised while validating versions and migration names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Version string is not exactly 14 ASCII digits.
    #[error("invalid version '{0}': expected 14 digits (YYYYMMDDHHMMSS)")]
    InvalidVersion(String),

    /// Migration name produced an empty slug.
    #[error("invalid migration name '{0}': no characters left after slug formatting")]
    InvalidName(String),
}

/// Convenience alias for results with [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
