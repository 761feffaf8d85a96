//! Bit field extraction from the 32-bit words returned by the PUNIT.

/// Returns the value held in the inclusive bit range between `i` and `j`.
///
/// The order of the bounds does not matter; the smaller one is the least significant bit of
/// the result. Both bounds must be in `0..32`.
#[must_use]
pub(crate) fn extract_bits(word: u32, i: u32, j: u32) -> u32 {
    let (lsb, msb) = if i <= j { (i, j) } else { (j, i) };

    debug_assert!(msb < u32::BITS, "bit index {msb} out of range");

    let width = msb - lsb + 1;
    let mask = u32::MAX >> (u32::BITS - width);

    (word >> lsb) & mask
}

/// Same as [`extract_bits()`] but for fields that are at most 8 bits wide.
#[must_use]
pub(crate) fn extract_u8(word: u32, i: u32, j: u32) -> u8 {
    u8::try_from(extract_bits(word, i, j))
        .expect("bit range wider than 8 bits used for a byte field")
}

/// Whether bit `n` of `word` is set. `n` must be in `0..32`.
#[must_use]
pub(crate) fn is_bit_set(word: u32, n: u32) -> bool {
    debug_assert!(n < u32::BITS, "bit index {n} out of range");

    word & (1 << n) != 0
}
