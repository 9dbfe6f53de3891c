//! Generation-checked resource pool.
//!
//! Every handle-addressable object (buffers, textures, pipelines, heap
//! blocks) lives in a `Pool` and is referenced only through a [`Handle`].
//! A handle packs a 24-bit slot index with an 8-bit generation; the slot's
//! generation advances each time it is reused, so a handle kept past
//! `remove` can never alias the slot's next occupant.
//!
//! Live slots are threaded on an intrusive doubly linked list so teardown
//! code can walk every object without holding its handle.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::api::error::{Error, Misuse, Result};
use crate::api::stats::PoolStats;

const GENERATION_BITS: u32 = 8;
const GENERATION_MASK: u32 = (1 << GENERATION_BITS) - 1;

/// Maximum number of slots a pool can address.
pub const MAX_CAPACITY: u32 = 1 << (32 - GENERATION_BITS);

/// Smallest capacity a pool grows to.
const MIN_GROWTH: u32 = 8;

/// A generation-checked reference to a pool slot.
pub struct Handle<T> {
    raw: u32,
    _marker: PhantomData<fn() -> T>,
}

// Manual implementations to avoid bounds on T
impl<T> Copy for Handle<T> {}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<T> Eq for Handle<T> {}

impl<T> Hash for Handle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "Handle(NULL)")
        } else {
            write!(f, "Handle({}v{})", self.index(), self.generation())
        }
    }
}

impl<T> Default for Handle<T> {
    fn default() -> Self {
        Self::NULL
    }
}

impl<T> Handle<T> {
    /// The handle that never refers to anything.
    pub const NULL: Self = Self {
        raw: 0,
        _marker: PhantomData,
    };

    #[inline]
    fn new(index: u32, generation: u8) -> Self {
        debug_assert!(index < MAX_CAPACITY);
        Self {
            raw: (index << GENERATION_BITS) | generation as u32,
            _marker: PhantomData,
        }
    }

    /// Check if this is the NULL handle.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.raw == 0
    }

    /// Slot index.
    #[inline]
    pub fn index(&self) -> u32 {
        self.raw >> GENERATION_BITS
    }

    /// Slot generation at the time the handle was issued.
    #[inline]
    pub fn generation(&self) -> u8 {
        (self.raw & GENERATION_MASK) as u8
    }

    /// Packed `index << 8 | generation` form, e.g. for storing in a `u32` field.
    #[inline]
    pub fn to_raw(&self) -> u32 {
        self.raw
    }

    /// Rebuild a handle from [`to_raw`](Self::to_raw).
    #[inline]
    pub fn from_raw(raw: u32) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }
}

/// One pool slot.
struct Slot<T> {
    /// `None` while the slot is on the free stack.
    value: Option<T>,
    /// Generation of the current (or last) occupant; 0 = never used.
    generation: u8,
    /// Live-list links.
    next: Option<u32>,
    prev: Option<u32>,
}

impl<T> Slot<T> {
    fn empty() -> Self {
        Self {
            value: None,
            generation: 0,
            next: None,
            prev: None,
        }
    }
}

/// Growable slot allocator with generation-checked handles.
///
/// References returned by [`get`](Self::get) borrow the pool, so none can be
/// held across an [`add`](Self::add) that reallocates the slot storage.
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    free_indices: Vec<u32>,
    head: Option<u32>,
    tail: Option<u32>,
    len: u32,
    grow_count: u32,
}

impl<T> Pool<T> {
    /// Create an empty pool with no slots.
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create an empty pool with `capacity` slots ready.
    pub fn with_capacity(capacity: u32) -> Self {
        let capacity = capacity.min(MAX_CAPACITY);
        let mut pool = Self {
            slots: Vec::new(),
            free_indices: Vec::new(),
            head: None,
            tail: None,
            len: 0,
            grow_count: 0,
        };
        pool.extend_slots(capacity);
        pool
    }

    /// Number of live elements.
    pub fn len(&self) -> u32 {
        self.len
    }

    /// True when no element is live.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots currently backed by storage.
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Store `value` and return its handle, growing the pool if needed.
    ///
    /// # Panics
    ///
    /// Panics if all [`MAX_CAPACITY`] slots are live.
    pub fn add(&mut self, value: T) -> Handle<T> {
        match self.try_add(value) {
            Ok(handle) => handle,
            Err(_) => panic!("pool exhausted: all {} slots are live", MAX_CAPACITY),
        }
    }

    /// Store `value`, failing with `NoMemory` once the index space is full.
    pub fn try_add(&mut self, value: T) -> Result<Handle<T>> {
        if self.free_indices.is_empty() {
            self.grow()?;
        }
        let index = self.free_indices.pop().ok_or(Error::NoMemory)?;

        let prev = self.tail;
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.value.is_none());
        slot.value = Some(value);
        slot.generation = next_generation(slot.generation);
        slot.prev = prev;
        slot.next = None;
        let generation = slot.generation;

        match prev {
            Some(tail) => self.slots[tail as usize].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        self.len += 1;

        Ok(Handle::new(index, generation))
    }

    /// Remove the element behind `handle` and return it.
    ///
    /// The slot's generation is left alone until the slot is reused, so the
    /// handle keeps reporting `DoubleFree` until then and `StaleHandle` after.
    pub fn remove(&mut self, handle: Handle<T>) -> Result<T> {
        let index = self.check_handle(handle)?;

        let slot = &mut self.slots[index as usize];
        let Some(value) = slot.value.take() else {
            ga_emit!(GA102);
            return Err(Error::Internal(Misuse::DoubleFree));
        };
        let (prev, next) = (slot.prev.take(), slot.next.take());

        match prev {
            Some(p) => self.slots[p as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n as usize].prev = prev,
            None => self.tail = prev,
        }

        self.free_indices.push(index);
        self.len -= 1;
        Ok(value)
    }

    /// Borrow the element behind `handle`, if it is still live.
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        let slot = self.slots.get(handle.index() as usize)?;
        if handle.is_null() || slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_ref()
    }

    /// Mutably borrow the element behind `handle`, if it is still live.
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        let slot = self.slots.get_mut(handle.index() as usize)?;
        if handle.is_null() || slot.generation != handle.generation() {
            return None;
        }
        slot.value.as_mut()
    }

    /// Check if `handle` refers to a live element.
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    // -------------------------------------------------------------------------
    // Raw live-list traversal
    // -------------------------------------------------------------------------

    /// Slot index of the oldest live element.
    pub fn head_index(&self) -> Option<u32> {
        self.head
    }

    /// Slot index of the newest live element.
    pub fn tail_index(&self) -> Option<u32> {
        self.tail
    }

    /// Slot index after `index` on the live list.
    pub fn next_index(&self, index: u32) -> Option<u32> {
        self.live_slot(index)?.next
    }

    /// Slot index before `index` on the live list.
    pub fn prev_index(&self, index: u32) -> Option<u32> {
        self.live_slot(index)?.prev
    }

    /// Borrow the element in slot `index`, if live.
    pub fn get_by_index(&self, index: u32) -> Option<&T> {
        self.live_slot(index)?.value.as_ref()
    }

    /// Mutably borrow the element in slot `index`, if live.
    pub fn get_by_index_mut(&mut self, index: u32) -> Option<&mut T> {
        self.slots
            .get_mut(index as usize)
            .filter(|slot| slot.value.is_some())?
            .value
            .as_mut()
    }

    /// Current handle of the element in slot `index`, if live.
    pub fn handle_at(&self, index: u32) -> Option<Handle<T>> {
        let slot = self.live_slot(index)?;
        Some(Handle::new(index, slot.generation))
    }

    /// Iterate live elements from oldest to newest.
    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            pool: self,
            cursor: self.head,
        }
    }

    /// Remove every live element, oldest first.
    ///
    /// Elements not yielded before the iterator is dropped are removed anyway.
    pub fn drain(&mut self) -> Drain<'_, T> {
        Drain { pool: self }
    }

    /// Release all storage, dropping any elements still live.
    pub fn shutdown(&mut self) {
        if self.len != 0 {
            ga_emit!(GA103);
        }
        self.slots = Vec::new();
        self.free_indices = Vec::new();
        self.head = None;
        self.tail = None;
        self.len = 0;
    }

    /// Snapshot of the pool's occupancy.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            len: self.len,
            capacity: self.capacity(),
            grow_count: self.grow_count,
        }
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn check_handle(&self, handle: Handle<T>) -> Result<u32> {
        if handle.is_null() {
            ga_emit!(GA101);
            return Err(Error::Internal(Misuse::NullHandle));
        }
        if self.len == 0 {
            ga_emit!(GA102);
            return Err(Error::Internal(Misuse::EmptyPool));
        }
        let index = handle.index();
        let Some(slot) = self.slots.get(index as usize) else {
            ga_emit!(GA101);
            return Err(Error::Internal(Misuse::IndexOutOfRange));
        };
        if slot.generation != handle.generation() {
            ga_emit!(GA101);
            return Err(Error::Internal(Misuse::StaleHandle));
        }
        Ok(index)
    }

    fn live_slot(&self, index: u32) -> Option<&Slot<T>> {
        self.slots
            .get(index as usize)
            .filter(|slot| slot.value.is_some())
    }

    fn grow(&mut self) -> Result<()> {
        let capacity = self.capacity();
        if capacity >= MAX_CAPACITY {
            return Err(Error::NoMemory);
        }
        let new_capacity = capacity.saturating_mul(2).max(MIN_GROWTH).min(MAX_CAPACITY);
        self.extend_slots(new_capacity - capacity);
        self.grow_count += 1;
        Ok(())
    }

    fn extend_slots(&mut self, additional: u32) {
        let start = self.capacity();
        let end = start + additional;
        self.slots.reserve_exact(additional as usize);
        self.slots.extend((start..end).map(|_| Slot::empty()));
        // Lowest index on top of the stack.
        self.free_indices.reserve(additional as usize);
        self.free_indices.extend((start..end).rev());
    }
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("len", &self.len)
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// Next generation in the 1..=255 cycle.
#[inline]
fn next_generation(generation: u8) -> u8 {
    if generation == u8::MAX {
        1
    } else {
        generation + 1
    }
}

/// Iterator over live elements in insertion order.
pub struct Iter<'a, T> {
    pool: &'a Pool<T>,
    cursor: Option<u32>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Handle<T>, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let slot = &self.pool.slots[index as usize];
        self.cursor = slot.next;
        let value = slot.value.as_ref()?;
        Some((Handle::new(index, slot.generation), value))
    }
}

impl<'a, T> IntoIterator for &'a Pool<T> {
    type Item = (Handle<T>, &'a T);
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Draining iterator returned by [`Pool::drain`].
pub struct Drain<'a, T> {
    pool: &'a mut Pool<T>,
}

impl<T> Iterator for Drain<'_, T> {
    type Item = (Handle<T>, T);

    fn next(&mut self) -> Option<Self::Item> {
        let handle = self.pool.handle_at(self.pool.head?)?;
        let value = self.pool.remove(handle).ok()?;
        Some((handle, value))
    }
}

impl<T> Drop for Drain<'_, T> {
    fn drop(&mut self) {
        for _ in self.by_ref() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() {
        crate::diagnostics::suppress_diagnostics(true);
    }

    fn forward(pool: &Pool<u32>) -> Vec<u32> {
        let mut out = Vec::new();
        let mut cursor = pool.head_index();
        while let Some(index) = cursor {
            out.push(*pool.get_by_index(index).unwrap());
            cursor = pool.next_index(index);
        }
        out
    }

    fn backward(pool: &Pool<u32>) -> Vec<u32> {
        let mut out = Vec::new();
        let mut cursor = pool.tail_index();
        while let Some(index) = cursor {
            out.push(*pool.get_by_index(index).unwrap());
            cursor = pool.prev_index(index);
        }
        out
    }

    #[test]
    fn test_basic_add_get_remove() {
        let mut pool = Pool::with_capacity(4);
        let handle = pool.add(42u64);
        assert!(!handle.is_null());
        assert_eq!(pool.get(handle), Some(&42));

        *pool.get_mut(handle).unwrap() = 7;
        assert_eq!(pool.remove(handle), Ok(7));
        assert!(pool.get(handle).is_none());
        assert!(pool.is_empty());
    }

    #[test]
    fn test_handle_packing() {
        let handle: Handle<()> = Handle::new(0x12_3456, 0x9a);
        assert_eq!(handle.index(), 0x12_3456);
        assert_eq!(handle.generation(), 0x9a);
        assert_eq!(Handle::<()>::from_raw(handle.to_raw()), handle);
        assert!(Handle::<()>::default().is_null());
    }

    #[test]
    fn test_first_handle_is_not_null() {
        let mut pool = Pool::new();
        let handle = pool.add("first");
        assert_eq!(handle.index(), 0);
        assert_eq!(handle.generation(), 1);
        assert!(!handle.is_null());
    }

    #[test]
    fn test_remove_middle_preserves_order() {
        let mut pool = Pool::with_capacity(8);
        let handles: Vec<_> = (0..5).map(|i| pool.add(i)).collect();

        pool.remove(handles[2]).unwrap();
        assert_eq!(forward(&pool), vec![0, 1, 3, 4]);
        assert_eq!(backward(&pool), vec![4, 3, 1, 0]);

        pool.remove(handles[0]).unwrap();
        pool.remove(handles[4]).unwrap();
        assert_eq!(forward(&pool), vec![1, 3]);
        assert_eq!(backward(&pool), vec![3, 1]);

        let values: Vec<_> = pool.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![1, 3]);
    }

    #[test]
    fn test_double_remove_fails() {
        quiet();
        let mut pool = Pool::with_capacity(4);
        let a = pool.add(1);
        let _b = pool.add(2);
        assert!(pool.remove(a).is_ok());
        assert_eq!(pool.remove(a), Err(Error::Internal(Misuse::DoubleFree)));
    }

    #[test]
    fn test_remove_from_empty_pool() {
        quiet();
        let mut pool = Pool::with_capacity(4);
        let a = pool.add(1);
        pool.remove(a).unwrap();
        assert_eq!(pool.remove(a), Err(Error::Internal(Misuse::EmptyPool)));
        assert_eq!(
            pool.remove(Handle::NULL),
            Err(Error::Internal(Misuse::NullHandle))
        );
    }

    #[test]
    fn test_stale_handle_after_reuse() {
        quiet();
        let mut pool = Pool::with_capacity(4);
        let _keep = pool.add(0);
        let old = pool.add(1);
        pool.remove(old).unwrap();

        let new = pool.add(2);
        assert_eq!(old.index(), new.index());
        assert_ne!(old.generation(), new.generation());

        assert!(pool.get(old).is_none());
        assert_eq!(pool.remove(old), Err(Error::Internal(Misuse::StaleHandle)));
        assert_eq!(pool.get(new), Some(&2));
    }

    #[test]
    fn test_out_of_range_handle() {
        quiet();
        let mut pool = Pool::with_capacity(2);
        pool.add(1);
        let bogus = Handle::new(100, 1);
        assert!(pool.get(bogus).is_none());
        assert_eq!(pool.remove(bogus), Err(Error::Internal(Misuse::IndexOutOfRange)));
    }

    #[test]
    fn test_growth_keeps_handles_valid() {
        let mut pool = Pool::with_capacity(4);
        let handles: Vec<_> = (0..4).map(|i| pool.add(i * 10)).collect();
        assert_eq!(pool.capacity(), 4);

        let extra = pool.add(40);
        assert_eq!(pool.capacity(), 8);
        assert_eq!(pool.stats().grow_count, 1);

        for (i, handle) in handles.iter().enumerate() {
            assert_eq!(pool.get(*handle), Some(&(i as u32 * 10)));
        }
        assert_eq!(pool.get(extra), Some(&40));
        assert_eq!(forward(&pool), vec![0, 10, 20, 30, 40]);
    }

    #[test]
    fn test_zero_capacity_grows() {
        let mut pool = Pool::new();
        assert_eq!(pool.capacity(), 0);
        pool.add(1u8);
        assert_eq!(pool.capacity(), MIN_GROWTH);
    }

    #[test]
    fn test_freed_slots_reused_before_new_ones() {
        let mut pool = Pool::with_capacity(2);
        let a = pool.add(1);
        let _b = pool.add(2);
        pool.remove(a).unwrap();
        // Full: a's slot is free, so no growth.
        let c = pool.add(3);
        assert_eq!(c.index(), a.index());
        assert_eq!(pool.capacity(), 2);
    }

    #[test]
    fn test_generation_wraps_past_zero() {
        let mut pool = Pool::with_capacity(1);
        let mut last = pool.add(0);
        for i in 1..600 {
            pool.remove(last).unwrap();
            last = pool.add(i);
            assert_ne!(last.generation(), 0);
            assert!(!last.is_null());
        }
        assert_eq!(pool.capacity(), 1);
    }

    #[test]
    fn test_handle_at_and_traversal_skip_free() {
        let mut pool = Pool::with_capacity(4);
        let a = pool.add(1);
        let b = pool.add(2);
        assert_eq!(pool.handle_at(b.index()), Some(b));
        pool.remove(a).unwrap();
        assert_eq!(pool.handle_at(a.index()), None);
        assert_eq!(pool.get_by_index(a.index()), None);
        assert_eq!(pool.head_index(), Some(b.index()));
        assert_eq!(pool.prev_index(b.index()), None);
    }

    #[test]
    fn test_get_by_index_mut() {
        let mut pool = Pool::with_capacity(4);
        let a = pool.add(1u32);
        let b = pool.add(2u32);

        *pool.get_by_index_mut(b.index()).unwrap() += 40;
        assert_eq!(pool.get(b), Some(&42));

        pool.remove(a).unwrap();
        assert_eq!(pool.get_by_index_mut(a.index()), None);
        assert_eq!(pool.get_by_index_mut(99), None);
    }

    #[test]
    fn test_drain_empties_in_order() {
        let mut pool = Pool::with_capacity(4);
        let handles: Vec<_> = (0..3).map(|i| pool.add(i)).collect();
        let drained: Vec<_> = pool.drain().collect();
        assert_eq!(drained, vec![(handles[0], 0), (handles[1], 1), (handles[2], 2)]);
        assert!(pool.is_empty());
        assert_eq!(pool.head_index(), None);

        let again = pool.add(9);
        assert!(pool.contains(again));
    }

    #[test]
    fn test_shutdown_releases_storage() {
        quiet();
        let mut pool = Pool::with_capacity(16);
        pool.add(String::from("leaked"));
        pool.shutdown();
        assert_eq!(pool.capacity(), 0);
        assert!(pool.is_empty());
    }
}
