//! Heap set - a growable collection of heaps over device-memory blocks.
//!
//! Each shared block gets its own [`Heap`]; requests are served from the
//! most recently used block first, then from any other block with room,
//! and only then from a freshly created block. Requests above the dedicated
//! threshold bypass sub-allocation and get a block of their own.

use crate::allocators::deferred::DeferredFreeQueue;
use crate::allocators::heap::{Heap, HeapAllocation};
use crate::allocators::pool::{Handle, Pool};
use crate::api::config::AllocConfig;
use crate::api::error::{Error, Misuse, Result};
use crate::api::stats::HeapSetStats;
use crate::gpu::traits::BlockSource;

/// One block owned by the set.
struct BlockEntry<B> {
    block: B,
    /// `None` for dedicated blocks
    heap: Option<Heap>,
    size: u32,
}

type BlockHandle<B> = Handle<BlockEntry<B>>;

/// Opaque identifier of a block inside a [`HeapSet`].
///
/// Generation-checked: an id outlives its block only as a stale value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(u32);

impl BlockId {
    fn from_handle<B>(handle: BlockHandle<B>) -> Self {
        Self(handle.to_raw())
    }

    fn handle<B>(self) -> BlockHandle<B> {
        Handle::from_raw(self.0)
    }
}

/// A region handed out by [`HeapSet::alloc`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapSetAllocation {
    block: BlockId,
    /// `None` when the allocation owns a dedicated block
    allocation: Option<HeapAllocation>,
    size: u32,
}

impl HeapSetAllocation {
    /// Byte offset inside the block.
    pub fn offset(&self) -> u32 {
        self.allocation.map_or(0, |a| a.offset())
    }

    /// Requested size in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// The block this allocation lives in.
    pub fn block(&self) -> BlockId {
        self.block
    }

    /// True if the allocation owns its block outright.
    pub fn is_dedicated(&self) -> bool {
        self.allocation.is_none()
    }
}

/// A growable set of heaps backed by a [`BlockSource`].
pub struct HeapSet<S: BlockSource> {
    source: S,
    config: AllocConfig,
    blocks: Pool<BlockEntry<S::Block>>,
    last_used: Option<BlockHandle<S::Block>>,
    deferred: DeferredFreeQueue<HeapSetAllocation>,
}

impl<S: BlockSource> HeapSet<S> {
    /// Create an empty heap set. No block is requested until the first
    /// allocation.
    pub fn new(source: S, config: AllocConfig) -> Self {
        Self {
            blocks: Pool::with_capacity(config.block_handle_capacity),
            source,
            config,
            last_used: None,
            deferred: DeferredFreeQueue::new(),
        }
    }

    /// Create a heap set with the default configuration.
    pub fn with_source(source: S) -> Self {
        Self::new(source, AllocConfig::default())
    }

    /// Allocate `size` bytes aligned to `alignment`.
    pub fn alloc(&mut self, size: u32, alignment: u32) -> Result<HeapSetAllocation> {
        if size == 0 {
            return Err(Error::Internal(Misuse::ZeroSize));
        }
        if !alignment.is_power_of_two() {
            return Err(Error::Internal(Misuse::BadAlignment));
        }

        if size > self.config.effective_dedicated_threshold() {
            return self.alloc_dedicated(size);
        }

        if let Some(handle) = self.last_used {
            if let Some(allocation) = self.alloc_in(handle, size, alignment) {
                return Ok(allocation);
            }
        }

        let mut cursor = self.blocks.head_index();
        while let Some(index) = cursor {
            cursor = self.blocks.next_index(index);
            let Some(handle) = self.blocks.handle_at(index) else {
                continue;
            };
            if Some(handle) == self.last_used {
                continue;
            }
            if let Some(allocation) = self.alloc_in(handle, size, alignment) {
                self.last_used = Some(handle);
                return Ok(allocation);
            }
        }

        self.alloc_in_new_block(size, alignment)
    }

    /// Return an allocation to its block.
    ///
    /// Dedicated blocks go straight back to the source; shared blocks do
    /// when they become empty and `release_empty_blocks` is set.
    pub fn free(&mut self, allocation: HeapSetAllocation) -> Result<()> {
        let handle = allocation.block.handle();
        let Some(entry) = self.blocks.get_mut(handle) else {
            ga_emit!(GA101);
            return Err(Error::Internal(Misuse::StaleHandle));
        };

        let release = match (&mut entry.heap, allocation.allocation) {
            (Some(heap), Some(inner)) => {
                heap.free(inner)?;
                heap.is_empty() && self.config.release_empty_blocks
            }
            (None, None) => true,
            _ => {
                ga_emit!(GA003);
                return Err(Error::Internal(Misuse::ForeignAllocation));
            }
        };

        if release {
            self.release_block(handle)?;
        }
        Ok(())
    }

    /// Queue `allocation` to be freed once `frame` has completed.
    ///
    /// Safe to call from any thread holding a shared reference.
    pub fn defer_free(&self, allocation: HeapSetAllocation, frame: u64) {
        self.deferred.push(allocation, frame);
    }

    /// Free every deferred allocation whose frame is `<= completed`.
    ///
    /// All retired entries are processed even if one fails; the first error
    /// is returned. Returns the number of allocations freed.
    pub fn retire_frame(&mut self, completed: u64) -> Result<usize> {
        let mut retired = Vec::new();
        self.deferred.drain_retired(completed, |allocation| retired.push(allocation));

        let mut freed = 0;
        let mut first_error = None;
        for allocation in retired {
            match self.free(allocation) {
                Ok(()) => freed += 1,
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(freed),
        }
    }

    /// The backend block behind `id`, if it is still owned by the set.
    pub fn block(&self, id: BlockId) -> Option<&S::Block> {
        self.blocks.get(id.handle()).map(|entry| &entry.block)
    }

    /// The heap sub-allocating block `id`, or `None` for dedicated blocks.
    pub fn heap(&self, id: BlockId) -> Option<&Heap> {
        self.blocks.get(id.handle()).and_then(|entry| entry.heap.as_ref())
    }

    /// Ids of every block, oldest first.
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        let mut cursor = self.blocks.head_index();
        std::iter::from_fn(move || {
            let index = cursor?;
            cursor = self.blocks.next_index(index);
            self.blocks.handle_at(index).map(BlockId::from_handle)
        })
    }

    /// The block source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The active configuration.
    pub fn config(&self) -> &AllocConfig {
        &self.config
    }

    /// Snapshot of the set's occupancy.
    pub fn stats(&self) -> HeapSetStats {
        let mut stats = HeapSetStats {
            pending_frees: self.deferred.len(),
            ..HeapSetStats::default()
        };

        for (_, entry) in self.blocks.iter() {
            stats.reserved_bytes += entry.size as u64;
            match &entry.heap {
                Some(heap) => {
                    stats.shared_blocks += 1;
                    stats.used_bytes += heap.used_bytes() as u64;
                    stats.allocation_count += heap.allocation_count() as u64;
                }
                None => {
                    stats.dedicated_blocks += 1;
                    stats.used_bytes += entry.size as u64;
                    stats.allocation_count += 1;
                }
            }
        }

        stats
    }

    /// Apply every pending deferred free, then return all blocks to the
    /// source. Returns the occupancy seen just before the blocks went away.
    ///
    /// The set is empty and reusable afterwards.
    pub fn shutdown(&mut self) -> HeapSetStats {
        // Errors were already reported through diagnostics.
        let _ = self.retire_frame(u64::MAX);

        let stats = self.stats();
        if stats.allocation_count != 0 {
            ga_emit!(GA202);
        }

        self.last_used = None;
        for (_, entry) in self.blocks.drain() {
            self.source.destroy_block(entry.block);
        }

        stats
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    /// Try to serve the request from one shared block.
    fn alloc_in(
        &mut self,
        handle: BlockHandle<S::Block>,
        size: u32,
        alignment: u32,
    ) -> Option<HeapSetAllocation> {
        let heap = self.blocks.get_mut(handle)?.heap.as_mut()?;
        if !heap.can_alloc_aligned(size, alignment) {
            return None;
        }
        let allocation = heap.alloc_aligned(size, alignment).ok()?;

        Some(HeapSetAllocation {
            block: BlockId::from_handle(handle),
            allocation: Some(allocation),
            size,
        })
    }

    fn alloc_in_new_block(&mut self, size: u32, alignment: u32) -> Result<HeapSetAllocation> {
        let mut heap = Heap::new(self.config.block_size, self.config.max_allocations_per_block)?;

        // An empty heap serves any request up to its size at offset 0, and
        // larger requests went to a dedicated block.
        let allocation = heap.alloc_aligned(size, alignment)?;

        let handle = self.add_block(self.config.block_size, Some(heap))?;
        self.last_used = Some(handle);

        Ok(HeapSetAllocation {
            block: BlockId::from_handle(handle),
            allocation: Some(allocation),
            size,
        })
    }

    fn alloc_dedicated(&mut self, size: u32) -> Result<HeapSetAllocation> {
        let handle = self.add_block(size, None)?;

        Ok(HeapSetAllocation {
            block: BlockId::from_handle(handle),
            allocation: None,
            size,
        })
    }

    fn add_block(&mut self, size: u32, heap: Option<Heap>) -> Result<BlockHandle<S::Block>> {
        let block = match self.source.create_block(size) {
            Ok(block) => block,
            Err(err) => {
                ga_emit!(GA201);
                return Err(err);
            }
        };

        match self.blocks.try_add(BlockEntry { block, heap, size }) {
            Ok(handle) => {
                #[cfg(feature = "log")]
                log::debug!(
                    "gfxalloc: created {} block {:?} ({} bytes)",
                    if self.blocks.get(handle).is_some_and(|e| e.heap.is_some()) {
                        "shared"
                    } else {
                        "dedicated"
                    },
                    handle,
                    size
                );
                Ok(handle)
            }
            Err(err) => {
                // The table only fails once its index space is exhausted;
                // the block never became reachable.
                ga_emit!(GA201);
                Err(err)
            }
        }
    }

    fn release_block(&mut self, handle: BlockHandle<S::Block>) -> Result<()> {
        let entry = self.blocks.remove(handle)?;
        if self.last_used == Some(handle) {
            self.last_used = None;
        }

        #[cfg(feature = "log")]
        log::debug!("gfxalloc: released block {:?} ({} bytes)", handle, entry.size);

        self.source.destroy_block(entry.block);
        Ok(())
    }
}

impl<S: BlockSource> Drop for HeapSet<S> {
    fn drop(&mut self) {
        if !self.blocks.is_empty() || !self.deferred.is_empty() {
            self.shutdown();
        }
    }
}

impl<S: BlockSource> std::fmt::Debug for HeapSet<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapSet")
            .field("blocks", &self.blocks.len())
            .field("pending_frees", &self.deferred.len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::dummy::DummySource;
    use crate::util::size::kb;

    fn config() -> AllocConfig {
        AllocConfig::minimal()
            .with_block_size(kb(64))
            .with_dedicated_threshold(kb(32))
            .with_max_allocations(16)
            .with_release_empty_blocks(false)
    }

    #[test]
    fn test_lazy_first_block() {
        let mut source = DummySource::new();
        let mut set = HeapSet::new(&mut source, config());
        assert_eq!(set.stats().shared_blocks, 0);
        assert_eq!(set.source().live_blocks(), 0);

        let a = set.alloc(256, 16).unwrap();
        assert_eq!(a.offset(), 0);
        assert!(!a.is_dedicated());
        assert_eq!(set.block(a.block()).map(|b| b.size), Some(kb(64)));

        set.free(a).unwrap();
        set.shutdown();
        drop(set);
        assert_eq!(source.live_blocks(), 0);
    }

    #[test]
    fn test_grows_when_full() {
        let mut source = DummySource::new();
        let mut set = HeapSet::new(&mut source, config());

        let allocations: Vec<_> = (0..4).map(|_| set.alloc(kb(24), 256).unwrap()).collect();
        // Two 24 KB regions fit in a 64 KB block, the third does not.
        assert_eq!(allocations[0].block(), allocations[1].block());
        assert_ne!(allocations[1].block(), allocations[2].block());
        assert_eq!(allocations[2].block(), allocations[3].block());
        assert_eq!(set.stats().shared_blocks, 2);

        // The newest block is full, so room in the first one is found by
        // walking the list.
        set.free(allocations[0]).unwrap();
        let again = set.alloc(kb(24), 256).unwrap();
        assert_eq!(again.block(), allocations[0].block());
        assert_eq!(set.stats().shared_blocks, 2);
    }

    #[test]
    fn test_alignment_is_honoured() {
        let mut set = HeapSet::new(DummySource::new(), config());
        set.alloc(3, 1).unwrap();
        let aligned = set.alloc(100, 256).unwrap();
        assert_eq!(aligned.offset() % 256, 0);
        assert_eq!(aligned.size(), 100);
    }

    #[test]
    fn test_dedicated_blocks() {
        let mut source = DummySource::new();
        let mut set = HeapSet::new(&mut source, config());

        let big = set.alloc(kb(40), 4096).unwrap();
        assert!(big.is_dedicated());
        assert_eq!(big.offset(), 0);
        assert_eq!(set.block(big.block()).map(|b| b.size), Some(kb(40)));
        assert!(set.heap(big.block()).is_none());

        let stats = set.stats();
        assert_eq!(stats.dedicated_blocks, 1);
        assert_eq!(stats.used_bytes, kb(40) as u64);

        set.free(big).unwrap();
        assert_eq!(set.block(big.block()), None);
        assert_eq!(set.source().live_blocks(), 0);

        // Freeing again is caught by the block generation.
        crate::diagnostics::suppress_diagnostics(true);
        assert_eq!(
            set.free(big),
            Err(Error::Internal(Misuse::StaleHandle))
        );
    }

    #[test]
    fn test_release_empty_blocks() {
        let mut source = DummySource::new();
        let mut set = HeapSet::new(&mut source, config().with_release_empty_blocks(true));

        let a = set.alloc(1024, 16).unwrap();
        let b = set.alloc(1024, 16).unwrap();
        set.free(a).unwrap();
        assert_eq!(set.stats().shared_blocks, 1);
        set.free(b).unwrap();
        assert_eq!(set.stats().shared_blocks, 0);
        assert_eq!(set.source().live_blocks(), 0);

        // last_used was cleared with the block
        let c = set.alloc(1024, 16).unwrap();
        assert_eq!(c.offset(), 0);
        assert_eq!(set.source().created(), 2);
    }

    #[test]
    fn test_source_failure() {
        crate::diagnostics::suppress_diagnostics(true);
        let mut set = HeapSet::new(DummySource::with_budget(kb(64) as u64), config());

        let a = set.alloc(kb(30), 1).unwrap();
        set.alloc(kb(30), 1).unwrap();
        assert_eq!(set.alloc(kb(30), 1), Err(Error::NoMemory));
        assert_eq!(set.stats().shared_blocks, 1);

        set.free(a).unwrap();
        assert!(set.alloc(kb(30), 1).is_ok());
    }

    #[test]
    fn test_argument_checks() {
        let mut set = HeapSet::new(DummySource::new(), config());
        assert_eq!(set.alloc(0, 1), Err(Error::Internal(Misuse::ZeroSize)));
        assert_eq!(set.alloc(16, 3), Err(Error::Internal(Misuse::BadAlignment)));
        assert_eq!(set.source().created(), 0);
    }

    #[test]
    fn test_deferred_frees() {
        let mut set = HeapSet::new(DummySource::new(), config());
        let a = set.alloc(512, 16).unwrap();
        let b = set.alloc(512, 16).unwrap();

        set.defer_free(a, 10);
        set.defer_free(b, 11);
        assert_eq!(set.stats().pending_frees, 2);

        assert_eq!(set.retire_frame(9), Ok(0));
        assert_eq!(set.retire_frame(10), Ok(1));
        assert_eq!(set.stats().allocation_count, 1);
        assert_eq!(set.retire_frame(11), Ok(1));

        let stats = set.stats();
        assert_eq!(stats.allocation_count, 0);
        assert_eq!(stats.pending_frees, 0);
    }

    #[test]
    fn test_shutdown_reports_leaks() {
        use crate::diagnostics::{clear_sink, set_sink, CollectingSink};
        use std::sync::Arc;

        let sink = Arc::new(CollectingSink::new());
        set_sink(sink.clone());

        let mut source = DummySource::new();
        let mut set = HeapSet::new(&mut source, config());
        set.alloc(128, 16).unwrap();
        set.alloc(kb(40), 16).unwrap();

        let stats = set.shutdown();
        assert_eq!(stats.allocation_count, 2);
        assert_eq!(set.stats().allocation_count, 0);
        drop(set);

        clear_sink();
        assert_eq!(source.live_blocks(), 0);
        assert_eq!(sink.codes(), vec!["GA202"]);
    }
}
