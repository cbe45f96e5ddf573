//! Metadata Codec
//!
//! Published objects carry their metadata in the file name itself:
//!
//! ```text
//! <name>$<length>$<digest-hex>
//! ```
//!
//! `length` is canonical base-10 and `digest-hex` is exactly 32 lowercase hex
//! characters. The logical name may not be empty and may not contain `$`.

use crate::error::{Error, Result};

use super::digest::{ContentDigest, DIGEST_LEN};

/// Reserved separator between the encoded fields
pub const SEPARATOR: char = '$';

const DIGEST_HEX_LEN: usize = DIGEST_LEN * 2;

/// Metadata bound into a content-addressed name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMetadata {
    /// Logical name the caller stored the object under
    pub name: String,
    /// Payload length in bytes, padding excluded
    pub length: u64,
    /// Digest of the payload bytes
    pub digest: ContentDigest,
}

impl ObjectMetadata {
    pub fn new(name: impl Into<String>, length: u64, digest: ContentDigest) -> Self {
        Self {
            name: name.into(),
            length,
            digest,
        }
    }

    /// Encode into a content-addressed file name
    ///
    /// # Panics
    /// If the name is empty or contains the reserved separator. Names are
    /// validated at the store boundary, so reaching this is a programming error.
    pub fn encode(&self) -> String {
        encode_metadata(&self.name, self.length, &self.digest)
    }

    /// Decode a content-addressed file name
    pub fn decode(encoded: &str) -> Result<Self> {
        decode_metadata(encoded)
    }
}

/// Encode name, length and digest into a single file name
///
/// # Panics
/// If `name` is empty or contains `$`.
pub fn encode_metadata(name: &str, length: u64, digest: &ContentDigest) -> String {
    assert!(!name.is_empty(), "empty object names cannot be encoded");
    assert!(
        !name.contains(SEPARATOR),
        "object name {:?} contains the reserved separator",
        name
    );
    format!("{}{SEPARATOR}{}{SEPARATOR}{}", name, length, digest.to_hex())
}

/// Decode a file name produced by [`encode_metadata`]
///
/// Any deviation from the canonical form is reported as
/// [`Error::CorruptMetadata`].
pub fn decode_metadata(encoded: &str) -> Result<ObjectMetadata> {
    let pieces: Vec<&str> = encoded.split(SEPARATOR).collect();
    let [name, length, digest] = pieces.as_slice() else {
        return Err(Error::corrupt(
            encoded,
            format!("expected 3 fields, found {}", pieces.len()),
        ));
    };

    if name.is_empty() {
        return Err(Error::corrupt(encoded, "empty name"));
    }

    let length = parse_length(length).ok_or_else(|| {
        Error::corrupt(encoded, format!("length {:?} is not canonical base 10", length))
    })?;

    if digest.len() != DIGEST_HEX_LEN {
        return Err(Error::corrupt(
            encoded,
            format!(
                "digest has {} hex chars, expected {}",
                digest.len(),
                DIGEST_HEX_LEN
            ),
        ));
    }
    if digest.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(Error::corrupt(encoded, "digest is not lowercase hex"));
    }
    let mut bytes = [0u8; DIGEST_LEN];
    hex::decode_to_slice(digest, &mut bytes)
        .map_err(|e| Error::corrupt(encoded, format!("bad digest hex: {}", e)))?;

    Ok(ObjectMetadata {
        name: name.to_string(),
        length,
        digest: ContentDigest::from_bytes(bytes),
    })
}

// Only the form `encode_metadata` produces: no sign, no leading zeros.
fn parse_length(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if s.len() > 1 && s.starts_with('0') {
        return None;
    }
    s.parse().ok()
}

// =============================================================================
// Tests
// =============================================================================
