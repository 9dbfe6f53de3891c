//! Size-class codec.
//!
//! A bin index is a tiny floating-point number: 5 bits of exponent and
//! 3 bits of mantissa, `(exponent << 3) | mantissa`. Bins 0..8 are the exact
//! sizes 0..8; above that each power of two is split into 8 linear steps,
//! so rounding to a bin never wastes more than 12.5%.

/// An 8-bit size class.
pub type BinIndex = u8;

/// Number of bins.
pub const BIN_COUNT: usize = 256;

/// Mantissa width in bits.
pub(crate) const MANTISSA_BITS: u32 = 3;

/// Number of linear bins per exponent ("row" of the sparse bitmap).
pub(crate) const MANTISSA_VALUE: u32 = 1 << MANTISSA_BITS;

const MANTISSA_MASK: u32 = MANTISSA_VALUE - 1;

/// Map `size` to the smallest bin whose size is at least `size`.
///
/// Used for requests: any span stored in this bin or above can hold `size`.
#[inline]
pub fn bin_index_round_up(size: u32) -> BinIndex {
    if size < MANTISSA_VALUE {
        return size as BinIndex;
    }

    let highest_bit = 31 - size.leading_zeros();
    let mantissa_start = highest_bit - MANTISSA_BITS;
    let exponent = mantissa_start + 1;
    let mut mantissa = (size >> mantissa_start) & MANTISSA_MASK;

    let low_bits_mask = (1u32 << mantissa_start) - 1;
    if size & low_bits_mask != 0 {
        mantissa += 1;
    }

    // A mantissa overflow carries into the exponent.
    ((exponent << MANTISSA_BITS) + mantissa) as BinIndex
}

/// Map `size` to the largest bin whose size is at most `size`.
///
/// Used when filing free spans, so every span in bin `b` holds at least
/// `bin_size(b)` bytes.
#[inline]
pub fn bin_index_round_down(size: u32) -> BinIndex {
    if size < MANTISSA_VALUE {
        return size as BinIndex;
    }

    let highest_bit = 31 - size.leading_zeros();
    let mantissa_start = highest_bit - MANTISSA_BITS;
    let exponent = mantissa_start + 1;
    let mantissa = (size >> mantissa_start) & MANTISSA_MASK;

    ((exponent << MANTISSA_BITS) | mantissa) as BinIndex
}

/// Smallest size represented by `bin`.
///
/// Saturates at `u32::MAX` for bins above the largest `u32` size class;
/// nothing is ever filed there.
#[inline]
pub fn bin_size(bin: BinIndex) -> u32 {
    let bin = bin as u32;
    let exponent = bin >> MANTISSA_BITS;
    let mantissa = bin & MANTISSA_MASK;

    if exponent == 0 {
        mantissa
    } else {
        let value = ((mantissa | MANTISSA_VALUE) as u64) << (exponent - 1);
        value.min(u32::MAX as u64) as u32
    }
}

/// Split a bin into its (sparse row, linear column) bitmap coordinates.
#[inline]
pub(crate) fn bin_coords(bin: BinIndex) -> (u32, u32) {
    let bin = bin as u32;
    (bin >> MANTISSA_BITS, bin & MANTISSA_MASK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_exact_small_bins() {
        for size in 0..8 {
            assert_eq!(bin_index_round_up(size), size as u8);
            assert_eq!(bin_index_round_down(size), size as u8);
            assert_eq!(bin_size(size as u8), size);
        }
    }

    #[test]
    fn test_known_values() {
        // 8..16 are still exact
        assert_eq!(bin_index_round_up(8), 8);
        assert_eq!(bin_index_round_up(15), 15);
        assert_eq!(bin_index_round_up(16), 16);
        assert_eq!(bin_size(16), 16);

        // 17 lies between the 16 and 18 steps
        assert_eq!(bin_index_round_up(17), 17);
        assert_eq!(bin_size(17), 18);
        assert_eq!(bin_index_round_down(17), 16);

        // mantissa carry: 31 rounds up into the next exponent
        assert_eq!(bin_index_round_up(31), 24);
        assert_eq!(bin_size(24), 32);

        assert_eq!(bin_index_round_down(1024), 64);
        assert_eq!(bin_size(64), 1024);
        assert_eq!(bin_index_round_down(989), 63);
        assert_eq!(bin_size(63), 960);
    }

    #[test]
    fn test_extremes() {
        assert_eq!(bin_index_round_down(u32::MAX), 239);
        assert_eq!(bin_size(239), 0xF000_0000);
        assert_eq!(bin_index_round_up(0xF000_0000), 239);
        assert_eq!(bin_index_round_up(0xF000_0001), 240);
        assert_eq!(bin_size(240), u32::MAX);
        assert_eq!(bin_size(255), u32::MAX);
    }

    #[test]
    fn test_bin_size_is_monotonic() {
        for bin in 1..=255u8 {
            assert!(bin_size(bin) >= bin_size(bin - 1), "bin {}", bin);
        }
    }

    #[test]
    fn test_coords() {
        assert_eq!(bin_coords(0), (0, 0));
        assert_eq!(bin_coords(63), (7, 7));
        assert_eq!(bin_coords(64), (8, 0));
    }

    proptest! {
        #[test]
        fn round_up_covers_request(size in 1u32..) {
            prop_assert!(bin_size(bin_index_round_up(size)) >= size);
        }

        #[test]
        fn round_down_fits_in_span(size in 1u32..) {
            prop_assert!(bin_size(bin_index_round_down(size)) <= size);
        }

        #[test]
        fn round_up_is_monotonic(a in 1u32.., b in 1u32..) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(bin_index_round_up(lo) <= bin_index_round_up(hi));
            prop_assert!(
                bin_size(bin_index_round_up(lo)) <= bin_size(bin_index_round_up(hi))
            );
        }

        #[test]
        fn rounding_overhead_is_bounded(size in 8u32..0xF000_0000) {
            let rounded = bin_size(bin_index_round_up(size)) as u64;
            prop_assert!(rounded * 8 <= size as u64 * 9);
        }
    }
}
