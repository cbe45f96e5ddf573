//! Striping Module
//!
//! Splits every logical object across two data stripes and one XOR parity
//! stripe. Either data stripe can be lost and rebuilt from the other two.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           Striping Module                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                          │
//! │  ┌──────────────┐    ┌──────────────┐    ┌───────────────────────────┐  │
//! │  │    Writer    │    │    Reader    │    │   Repair                  │  │
//! │  │  (publish)   │    │  (degraded)  │    │   (reconcile / rebuild)   │  │
//! │  └──────────────┘    └──────────────┘    └───────────────────────────┘  │
//! │         │                   │                         │                  │
//! │         └───────────────────┼─────────────────────────┘                  │
//! │                             │                                            │
//! │        ┌────────────┬───────┴──────┬──────────────┐                      │
//! │        │   Parity   │   Metadata   │   Lifecycle  │                      │
//! │        │   Engine   │    Codec     │   / Layout   │                      │
//! │        └────────────┴──────────────┴──────────────┘                      │
//! │                                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # On-disk layout
//!
//! For a logical name `N` every location holds, once published:
//!
//! - `N$<length>$<digest>` - the stripe bytes (content-addressed name)
//! - `N` - a relative symlink to the content-addressed file
//!
//! # Usage
//!
//! ```rust,no_run
//! use tristore::domain::ObjectName;
//! use tristore::stripe::{StripeLocations, StripeReader, StripeSet, StripeWriter};
//!
//! # fn main() -> tristore::Result<()> {
//! let locations = StripeLocations::new("/srv/a", "/srv/b", "/srv/parity");
//! let name = ObjectName::parse("report.pdf")?;
//!
//! let set = StripeSet::create(&locations, &name)?;
//! let published = StripeWriter::new(set).write_and_publish(b"hello")?;
//! println!("stored as {}", published.content_name);
//!
//! let mut reader = StripeReader::open(&locations, &name)?;
//! let data = reader.read_all()?;
//! assert_eq!(data, b"hello");
//! # Ok(())
//! # }
//! ```

pub mod digest;
pub mod layout;
pub mod lifecycle;
pub mod locks;
pub mod metadata;
pub mod parity;
pub mod reader;
pub mod repair;
pub mod writer;

#[cfg(test)]
mod proptest;

use std::fmt;

pub use digest::{ContentDigest, DigestBuilder, DIGEST_LEN};
pub use layout::{StripeLocations, StripePaths};
pub use lifecycle::StripeSet;
pub use locks::{NameClaim, NameLocks};
pub use metadata::{decode_metadata, encode_metadata, ObjectMetadata, SEPARATOR};
pub use parity::{split_and_parity, xor_into, SplitBlock};
pub use reader::StripeReader;
pub use repair::{rebuild, reconcile, reconcile_except, RepairReport};
pub use writer::{PaddedWriter, PublishedObject, StripeWriter};

// =============================================================================
// Geometry
// =============================================================================

/// Size of one striping unit in bytes
pub const BLOCK_SIZE: usize = 0x10000;

/// Bytes of every block that land on each stripe
pub const HALF_BLOCK: usize = BLOCK_SIZE / 2;

const _: () = assert!(BLOCK_SIZE % 2 == 0, "block size must be even");

/// Length in bytes of every stripe holding `payload_len` logical bytes
pub fn stripe_len(payload_len: u64) -> u64 {
    payload_len.div_ceil(BLOCK_SIZE as u64) * HALF_BLOCK as u64
}

// =============================================================================
// Stripe Role
// =============================================================================

/// Which of the three parallel stripes a file holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StripeRole {
    /// First half of every block
    DataA,
    /// Second half of every block
    DataB,
    /// XOR of both halves
    Parity,
}

impl StripeRole {
    /// All roles in write order
    pub const ALL: [StripeRole; 3] = [StripeRole::DataA, StripeRole::DataB, StripeRole::Parity];

    /// Position of this role in per-stripe arrays
    pub fn index(self) -> usize {
        match self {
            StripeRole::DataA => 0,
            StripeRole::DataB => 1,
            StripeRole::Parity => 2,
        }
    }

    /// Whether this stripe carries payload bytes
    pub fn is_data(self) -> bool {
        !matches!(self, StripeRole::Parity)
    }
}

impl fmt::Display for StripeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StripeRole::DataA => write!(f, "data-a"),
            StripeRole::DataB => write!(f, "data-b"),
            StripeRole::Parity => write!(f, "parity"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stripe_len() {
        assert_eq!(stripe_len(0), 0);
        assert_eq!(stripe_len(1), HALF_BLOCK as u64);
        assert_eq!(stripe_len(BLOCK_SIZE as u64), HALF_BLOCK as u64);
        assert_eq!(stripe_len(BLOCK_SIZE as u64 + 1), 2 * HALF_BLOCK as u64);
    }

    #[test]
    fn test_role_indices() {
        for (i, role) in StripeRole::ALL.iter().enumerate() {
            assert_eq!(role.index(), i);
        }
        assert!(StripeRole::DataA.is_data());
        assert!(!StripeRole::Parity.is_data());
    }
}
