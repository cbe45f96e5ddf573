//! Block Splitter / Parity Engine
//!
//! A block is split into its first and second halves; the parity half is
//! their byte-wise XOR. Any one of the three halves can be recovered by
//! XOR-ing the other two.

use super::{BLOCK_SIZE, HALF_BLOCK};

/// One block split into its on-disk halves
#[derive(Debug)]
pub struct SplitBlock<'a> {
    /// First half, stored on data-A
    pub a: &'a [u8],
    /// Second half, stored on data-B
    pub b: &'a [u8],
    /// `a ^ b`, stored on parity
    pub parity: Vec<u8>,
}

/// Split a block into halves and compute the parity half
///
/// # Panics
/// If `block` is not exactly `BLOCK_SIZE` bytes. Padding belongs to the write
/// pipeline, never to this function.
pub fn split_and_parity(block: &[u8]) -> SplitBlock<'_> {
    assert_eq!(
        block.len(),
        BLOCK_SIZE,
        "parity engine needs exactly one block"
    );

    let (a, b) = block.split_at(HALF_BLOCK);
    let parity = a.iter().zip(b).map(|(x, y)| x ^ y).collect();

    SplitBlock { a, b, parity }
}

/// XOR `src` into `dst` in place
///
/// With `dst` holding parity and `src` one data half, `dst` ends up holding
/// the other data half.
pub fn xor_into(dst: &mut [u8], src: &[u8]) {
    assert_eq!(dst.len(), src.len(), "xor operands differ in length");
    for (d, s) in dst.iter_mut().zip(src) {
        *d ^= s;
    }
}
