//! Scratch arena - linear staging buffer for temporary arrays.
//!
//! Call sites stage short-lived arrays here (descriptor writes, barrier
//! lists, copy regions) and reset the arena once they are consumed.
//! Allocation is a bounds check and a head bump.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::cell::Cell;
use std::ptr::NonNull;

use crate::util::layout::align_up_usize;

/// Alignment of the arena's backing buffer.
const ARENA_ALIGN: usize = 16;

/// Saved head position, see [`ScratchArena::mark`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchMark(usize);

/// A bump allocator for staging temporary arrays.
///
/// Allocation takes `&self`, so several staged slices can be alive at once;
/// [`reset`](Self::reset) takes `&mut self`, which proves none of them are.
pub struct ScratchArena {
    /// Base pointer of the buffer
    base: NonNull<u8>,
    /// Current allocation head (offset from base)
    head: Cell<usize>,
    /// Total capacity in bytes
    capacity: usize,
    /// Highest head position seen since creation
    high_water: Cell<usize>,
}

// SAFETY: the arena exclusively owns its buffer.
unsafe impl Send for ScratchArena {}

impl ScratchArena {
    /// Create a scratch arena with the given capacity in bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` overflows a valid layout.
    pub fn new(capacity: usize) -> Self {
        let base = if capacity == 0 {
            NonNull::<u128>::dangling().cast()
        } else {
            let layout = Self::buffer_layout(capacity);
            // SAFETY: layout has a non-zero size
            let ptr = unsafe { alloc(layout) };
            NonNull::new(ptr).unwrap_or_else(|| handle_alloc_error(layout))
        };

        Self {
            base,
            head: Cell::new(0),
            capacity,
            high_water: Cell::new(0),
        }
    }

    fn buffer_layout(capacity: usize) -> Layout {
        match Layout::from_size_align(capacity, ARENA_ALIGN) {
            Ok(layout) => layout,
            Err(_) => panic!("scratch arena capacity {} is too large", capacity),
        }
    }

    /// Reserve raw bytes for `layout`.
    ///
    /// Returns `None` if the arena is exhausted.
    pub fn alloc_layout(&self, layout: Layout) -> Option<NonNull<u8>> {
        let base_addr = self.base.as_ptr() as usize;
        let head_addr = base_addr.checked_add(self.head.get())?;
        let aligned = align_up_usize(head_addr, layout.align()) - base_addr;
        let end = aligned.checked_add(layout.size())?;

        if end > self.capacity {
            return None;
        }

        self.head.set(end);
        if end > self.high_water.get() {
            self.high_water.set(end);
        }

        // SAFETY: aligned <= end <= capacity, so the pointer stays inside
        // (or one past the end of) the buffer.
        Some(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(aligned)) })
    }

    /// Stage a single value.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc<T: Copy>(&self, value: T) -> Option<&mut T> {
        let ptr = self.alloc_layout(Layout::new::<T>())?.cast::<T>();
        // SAFETY: fresh, aligned, in-bounds storage that no other borrow covers
        unsafe {
            ptr.as_ptr().write(value);
            Some(&mut *ptr.as_ptr())
        }
    }

    /// Stage a copy of `src`.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice_copy<T: Copy>(&self, src: &[T]) -> Option<&mut [T]> {
        let layout = Layout::array::<T>(src.len()).ok()?;
        let ptr = self.alloc_layout(layout)?.cast::<T>();
        // SAFETY: fresh, aligned, in-bounds storage for src.len() elements
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), ptr.as_ptr(), src.len());
            Some(std::slice::from_raw_parts_mut(ptr.as_ptr(), src.len()))
        }
    }

    /// Stage `count` copies of `value`.
    #[allow(clippy::mut_from_ref)]
    pub fn alloc_slice_fill<T: Copy>(&self, count: usize, value: T) -> Option<&mut [T]> {
        let layout = Layout::array::<T>(count).ok()?;
        let ptr = self.alloc_layout(layout)?.cast::<T>();
        // SAFETY: fresh, aligned, in-bounds storage for count elements
        unsafe {
            for i in 0..count {
                ptr.as_ptr().add(i).write(value);
            }
            Some(std::slice::from_raw_parts_mut(ptr.as_ptr(), count))
        }
    }

    /// Save the current head position.
    pub fn mark(&self) -> ScratchMark {
        ScratchMark(self.head.get())
    }

    /// Roll back to a previously saved mark.
    pub fn reset_to(&mut self, mark: ScratchMark) {
        debug_assert!(mark.0 <= self.head.get(), "Cannot reset forward");
        self.head.set(mark.0.min(self.head.get()));
    }

    /// Reset the arena, invalidating all staged data.
    pub fn reset(&mut self) {
        self.head.set(0);
    }

    /// Bytes currently staged.
    pub fn allocated(&self) -> usize {
        self.head.get()
    }

    /// Remaining capacity.
    pub fn remaining(&self) -> usize {
        self.capacity - self.head.get()
    }

    /// Total capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Highest number of bytes ever staged at once.
    pub fn high_water_mark(&self) -> usize {
        self.high_water.get()
    }
}

impl Drop for ScratchArena {
    fn drop(&mut self) {
        if self.capacity != 0 {
            // SAFETY: allocated in `new()` with this layout
            unsafe {
                dealloc(self.base.as_ptr(), Self::buffer_layout(self.capacity));
            }
        }
    }
}

impl std::fmt::Debug for ScratchArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchArena")
            .field("allocated", &self.allocated())
            .field("capacity", &self.capacity)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_several_slices_alive() {
        let arena = ScratchArena::new(1024);
        let offsets = arena.alloc_slice_copy(&[0u64, 256, 512]).unwrap();
        let sizes = arena.alloc_slice_fill(3, 64u32).unwrap();
        let flag = arena.alloc(true).unwrap();

        sizes[1] = 128;
        *flag = false;
        assert_eq!(offsets, &[0, 256, 512]);
        assert_eq!(sizes, &[64, 128, 64]);
        assert_eq!(arena.allocated(), 24 + 12 + 1);
    }

    #[test]
    fn test_alignment() {
        #[derive(Clone, Copy)]
        #[repr(align(64))]
        struct Wide([u8; 64]);

        let arena = ScratchArena::new(4096);
        arena.alloc(1u8).unwrap();
        let wide = arena.alloc(Wide([0; 64])).unwrap();
        assert_eq!(wide as *mut Wide as usize % 64, 0);
        let word = arena.alloc(7u64).unwrap();
        assert_eq!(word as *mut u64 as usize % 8, 0);
    }

    #[test]
    fn test_exhaustion() {
        let arena = ScratchArena::new(32);
        assert!(arena.alloc_slice_fill(4, 0u64).is_some());
        assert!(arena.alloc(0u8).is_none());
        assert_eq!(arena.remaining(), 0);
    }

    #[test]
    fn test_reset_and_marks() {
        let mut arena = ScratchArena::new(256);
        arena.alloc_slice_fill(10, 1u32).unwrap();
        let mark = arena.mark();
        arena.alloc_slice_fill(10, 2u32).unwrap();
        assert_eq!(arena.allocated(), 80);

        arena.reset_to(mark);
        assert_eq!(arena.allocated(), 40);

        arena.reset();
        assert_eq!(arena.allocated(), 0);
        assert_eq!(arena.high_water_mark(), 80);
    }

    #[test]
    fn test_zero_capacity() {
        let arena = ScratchArena::new(0);
        assert!(arena.alloc(1u8).is_none());
        assert_eq!(arena.alloc_slice_copy::<u32>(&[]).map(|s| s.len()), Some(0));
    }
}
