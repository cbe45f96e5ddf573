//! ContentDigest: a BLAKE3 hash truncated to 128 bits (32 hex chars).
//!
//! The digest covers the logical payload only, never the zero padding of the
//! final block, and is folded in incrementally while blocks are written.
//!
//! Layouts whose names carry an MD5 digest of the same width are not
//! interchangeable with this one: the same payload gets a different name.

use std::fmt;

/// Width of a digest in bytes
pub const DIGEST_LEN: usize = 16;

/// 16-byte content digest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentDigest([u8; DIGEST_LEN]);

impl ContentDigest {
    /// Wrap raw digest bytes
    pub fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Hash a whole buffer in one go
    pub fn of(data: &[u8]) -> Self {
        let mut builder = DigestBuilder::new();
        builder.update(data);
        builder.finalize()
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hex rendering
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl serde::Serialize for ContentDigest {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Incremental digest over payload bytes
#[derive(Debug, Clone, Default)]
pub struct DigestBuilder {
    hasher: blake3::Hasher,
}

impl DigestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold more payload bytes into the digest
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Finish and truncate to `DIGEST_LEN` bytes
    pub fn finalize(&self) -> ContentDigest {
        let full = self.hasher.finalize();
        let mut out = [0u8; DIGEST_LEN];
        out.copy_from_slice(&full.as_bytes()[..DIGEST_LEN]);
        ContentDigest(out)
    }
}
