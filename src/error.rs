//! Error types for the striped store

use crate::stripe::StripeRole;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the striped store
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// A stripe for this name is already present in one of the locations
    #[error("Object already exists: {name}")]
    AlreadyExists { name: String },

    /// Another writer currently holds the claim on this name
    #[error("Object is being written: {name}")]
    Busy { name: String },

    /// Name rejected at the API boundary
    #[error("Invalid object name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    // =========================================================================
    // Striping Errors
    // =========================================================================
    /// Fewer than two of the three stripes could be opened
    #[error("Insufficient redundancy for {name}: have {available} stripes, need {required}")]
    InsufficientRedundancy {
        name: String,
        available: usize,
        required: usize,
    },

    /// A half-block write did not transfer exactly one half block
    #[error("Short write to {role} stripe: wrote {written} of {expected} bytes")]
    ShortWrite {
        role: StripeRole,
        written: usize,
        expected: usize,
    },

    /// A half-block read did not transfer exactly one half block
    #[error("Short read from {role} stripe: expected {expected} bytes")]
    ShortRead { role: StripeRole, expected: usize },

    // =========================================================================
    // Integrity Errors
    // =========================================================================
    /// Content-addressed name failed to decode
    #[error("Corrupt metadata {encoded:?}: {reason}")]
    CorruptMetadata { encoded: String, reason: String },

    /// Recomputed digest differs from the published one
    #[error("Digest mismatch for {name}: expected {expected}, got {actual}")]
    DigestMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    // =========================================================================
    // Service Errors
    // =========================================================================
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a `CorruptMetadata` error for an encoded name
    pub fn corrupt(encoded: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::CorruptMetadata {
            encoded: encoded.into(),
            reason: reason.into(),
        }
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::AlreadyExists { .. } => "already_exists",
            Error::Busy { .. } => "busy",
            Error::InvalidName { .. } => "invalid_name",
            Error::InsufficientRedundancy { .. } => "insufficient_redundancy",
            Error::ShortWrite { .. } => "short_write",
            Error::ShortRead { .. } => "short_read",
            Error::CorruptMetadata { .. } => "corrupt_metadata",
            Error::DigestMismatch { .. } => "digest_mismatch",
            Error::Config(_) => "config",
            Error::Internal(_) => "internal",
        }
    }

    /// Whether the caller, rather than the storage, is at fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::AlreadyExists { .. }
                | Error::Busy { .. }
                | Error::InvalidName { .. }
                | Error::InsufficientRedundancy { .. }
        )
    }

    /// HTTP status code the front-end reports for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidName { .. } => 400,
            Error::InsufficientRedundancy { .. } => 404,
            Error::AlreadyExists { .. } | Error::Busy { .. } => 409,
            _ => 500,
        }
    }
}
