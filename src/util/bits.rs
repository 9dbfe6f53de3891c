//! Bit-scan primitives for fixed-width bitmaps.
//!
//! The heap's two-level bin bitmap is a `u32` of rows and a `u8` per row.
//! Every scan it performs is "first set bit at or above `index`" or
//! "highest set bit", so those live here instead of at each call site.

pub(crate) trait BitScan: Copy {
    /// Index of the lowest set bit at or above `index`.
    fn lowest_set_from(self, index: u32) -> Option<u32>;

    /// Index of the highest set bit.
    fn highest_set(self) -> Option<u32>;

    fn with_bit(self, index: u32) -> Self;

    fn without_bit(self, index: u32) -> Self;

    fn has_bit(self, index: u32) -> bool;
}

macro_rules! impl_bit_scan {
    ($($ty:ty),*) => {$(
        impl BitScan for $ty {
            #[inline]
            fn lowest_set_from(self, index: u32) -> Option<u32> {
                if index >= Self::BITS {
                    return None;
                }
                let masked = self & (<$ty>::MAX << index);
                if masked == 0 {
                    None
                } else {
                    Some(masked.trailing_zeros())
                }
            }

            #[inline]
            fn highest_set(self) -> Option<u32> {
                if self == 0 {
                    None
                } else {
                    Some(Self::BITS - 1 - self.leading_zeros())
                }
            }

            #[inline]
            fn with_bit(self, index: u32) -> Self {
                self | (1 << index)
            }

            #[inline]
            fn without_bit(self, index: u32) -> Self {
                self & !(1 << index)
            }

            #[inline]
            fn has_bit(self, index: u32) -> bool {
                self & (1 << index) != 0
            }
        }
    )*};
}

impl_bit_scan!(u8, u32);
