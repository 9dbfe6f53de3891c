//! Alignment utilities.

/// Align an offset up to the given power-of-two alignment.
///
/// Returns `None` if the aligned offset does not fit in a `u32`.
#[inline]
pub const fn align_up(offset: u32, align: u32) -> Option<u32> {
    let mask = align - 1;
    match offset.checked_add(mask) {
        Some(bumped) => Some(bumped & !mask),
        None => None,
    }
}

/// Align a byte position up to the given power-of-two alignment.
#[inline]
pub const fn align_up_usize(pos: usize, align: usize) -> usize {
    (pos + align - 1) & !(align - 1)
}
