//! Domain Ports (Port/Adapter Pattern)
//!
//! The write pipeline never touches files directly. It talks to the two
//! capabilities defined here, which production code backs with stripe files
//! and tests back with in-memory fakes.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Ports (Traits)                       │
//! │            PayloadWriter  ──writes blocks to──▶  BlockSink   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Implementations                        │
//! │        PaddedWriter (stripe::writer) │ StripeSet (lifecycle) │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use crate::error::{Error, Result};
use crate::stripe::{ContentDigest, SEPARATOR};

// =============================================================================
// Value Objects
// =============================================================================

/// Logical object name, validated at the API boundary.
///
/// A valid name is a single path component: non-empty, not `.` or `..`, and
/// free of `/`, `\`, NUL and the metadata separator `$`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectName(String);

impl ObjectName {
    /// Validate and wrap a caller-supplied name.
    pub fn parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let reason = if name.is_empty() {
            Some("name is empty")
        } else if name == "." || name == ".." {
            Some("name is a directory reference")
        } else if name.contains(SEPARATOR) {
            Some("name contains the reserved '$' separator")
        } else if name.contains(['/', '\\']) {
            Some("name contains a path separator")
        } else if name.contains('\0') {
            Some("name contains NUL")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(Error::InvalidName {
                name,
                reason: reason.to_string(),
            }),
            None => Ok(Self(name)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ObjectName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Outcome of pushing a payload through a [`PayloadWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    /// Payload bytes written, padding excluded
    pub length: u64,
    /// Digest over the payload bytes, padding excluded
    pub digest: ContentDigest,
}

// =============================================================================
// Block Sink Port
// =============================================================================

/// Port for "write exactly one block".
///
/// Implementations receive blocks of exactly `BLOCK_SIZE` bytes; padding is
/// the caller's job.
pub trait BlockSink {
    /// Write one full block.
    fn write_block(&mut self, block: &[u8]) -> Result<()>;
}

// =============================================================================
// Payload Writer Port
// =============================================================================

/// Port for "write a payload of any length".
///
/// Splits the payload into blocks for a [`BlockSink`] and reports the
/// logical length and digest used to name the published object.
pub trait PayloadWriter {
    /// Write `payload` block by block into `sink`.
    fn write_payload(&self, sink: &mut dyn BlockSink, payload: &[u8]) -> Result<WriteSummary>;
}

// =============================================================================
// Tests
// =============================================================================
