//! Property-Based Tests for the striping engine
//!
//! # Test Properties
//!
//! 1. **Parity**: `a ^ b == parity` and `parity ^ a == b` for every block
//! 2. **Codec Inverse**: `decode(encode(m)) == m` for every valid name
//! 3. **Degraded Roundtrip**: any single lost stripe still reads back the payload

#![cfg(test)]

use std::fs;

use proptest::prelude::*;
use tempfile::TempDir;

use super::metadata::{decode_metadata, encode_metadata};
use super::parity::{split_and_parity, xor_into};
use super::{ContentDigest, StripeLocations, StripeReader, StripeRole, StripeSet, StripeWriter};
use super::{BLOCK_SIZE, HALF_BLOCK};
use crate::domain::ObjectName;

// =============================================================================
// Property Strategies
// =============================================================================

/// Names the codec accepts: no separator, not empty.
fn name_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9._ -]{1,40}"
}

fn digest_strategy() -> impl Strategy<Value = ContentDigest> {
    prop::array::uniform16(any::<u8>()).prop_map(ContentDigest::from_bytes)
}

/// Payloads up to three blocks, biased toward block edges.
fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        prop::collection::vec(any::<u8>(), 0..64),
        prop::collection::vec(any::<u8>(), BLOCK_SIZE - 2..BLOCK_SIZE + 2),
        prop::collection::vec(any::<u8>(), 0..3 * BLOCK_SIZE),
    ]
}

fn role_strategy() -> impl Strategy<Value = StripeRole> {
    prop_oneof![
        Just(StripeRole::DataA),
        Just(StripeRole::DataB),
        Just(StripeRole::Parity),
    ]
}

// =============================================================================
// Parity Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: parity is the XOR of the halves and recovers either half.
    #[test]
    fn prop_parity_recovers_halves(block in prop::collection::vec(any::<u8>(), BLOCK_SIZE)) {
        let split = split_and_parity(&block);

        for i in 0..HALF_BLOCK {
            prop_assert_eq!(split.a[i] ^ split.b[i], split.parity[i]);
        }

        let mut b = split.parity.clone();
        xor_into(&mut b, split.a);
        prop_assert_eq!(b.as_slice(), split.b);

        let mut a = split.parity.clone();
        xor_into(&mut a, split.b);
        prop_assert_eq!(a.as_slice(), split.a);
    }
}

// =============================================================================
// Codec Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// Property: decode inverts encode.
    #[test]
    fn prop_codec_roundtrip(
        name in name_strategy(),
        length in any::<u64>(),
        digest in digest_strategy(),
    ) {
        let encoded = encode_metadata(&name, length, &digest);
        let decoded = decode_metadata(&encoded)?;

        prop_assert_eq!(decoded.name, name);
        prop_assert_eq!(decoded.length, length);
        prop_assert_eq!(decoded.digest, digest);
    }

    /// Property: decode never panics, whatever the input.
    #[test]
    fn prop_decode_total(input in ".{0,80}") {
        let _ = decode_metadata(&input);
    }
}

// =============================================================================
// Pipeline Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Property: with any one stripe lost, the payload reads back unchanged.
    #[test]
    fn prop_degraded_roundtrip(payload in payload_strategy(), lost in role_strategy()) {
        let dirs = [TempDir::new()?, TempDir::new()?, TempDir::new()?];
        let locations = StripeLocations::new(dirs[0].path(), dirs[1].path(), dirs[2].path());
        let name = ObjectName::parse("prop")?;

        let set = StripeSet::create(&locations, &name)?;
        let published = StripeWriter::new(set).write_and_publish(&payload)?;

        let dir = locations.dir(lost);
        fs::remove_file(dir.join("prop"))?;
        fs::remove_file(dir.join(&published.content_name))?;

        let mut reader = StripeReader::open(&locations, &name)?;
        let read = reader.read_all()?;
        prop_assert_eq!(read, payload);
    }
}
