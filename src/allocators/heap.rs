//! Segmented-fit heap sub-allocator.
//!
//! A `Heap` hands out byte ranges of a fixed address space `[0, size)`. It
//! never touches memory: callers map offsets onto whatever backs the heap
//! (a device memory block, a buffer, a descriptor range).
//!
//! Free spans are filed into 256 size classes ([`bin`](super::bin)), and a
//! two-level bitmap (32 rows of 8 bins) finds the smallest populated class
//! that fits a request with two bit scans. Every span, free or used, is also
//! linked to its physical neighbours, so freeing coalesces in O(1).

use super::bin::{self, BinIndex, BIN_COUNT};
use crate::api::error::{Error, Misuse, Result};
use crate::api::stats::HeapStats;
use crate::util::bits::BitScan;
use crate::util::layout::align_up;

/// Number of rows in the sparse bitmap.
const SPARSE_ROWS: usize = BIN_COUNT / bin::MANTISSA_VALUE as usize;

/// Index of a node in the heap's node arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeIndex(u32);

impl NodeIndex {
    #[inline]
    fn get(self) -> usize {
        self.0 as usize
    }
}

/// One contiguous span of the heap.
#[derive(Debug, Clone, Copy, Default)]
struct HeapNode {
    offset: u32,
    size: u32,
    used: bool,
    /// Free-list links within the node's bin.
    next_bin: Option<NodeIndex>,
    prev_bin: Option<NodeIndex>,
    /// Physically adjacent spans.
    next_neighbour: Option<NodeIndex>,
    prev_neighbour: Option<NodeIndex>,
}

impl HeapNode {
    #[inline]
    fn end(&self) -> u32 {
        self.offset + self.size
    }
}

/// A live allocation.
///
/// Opaque: hand it back to [`Heap::free`] unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeapAllocation {
    offset: u32,
    node: NodeIndex,
    generation: u32,
}

impl HeapAllocation {
    /// Byte offset of the allocation inside the heap.
    #[inline]
    pub fn offset(&self) -> u32 {
        self.offset
    }
}

/// A candidate span found by staging, not yet claimed.
#[derive(Debug, Clone, Copy)]
struct Staged {
    node: NodeIndex,
    offset: u32,
}

/// Two-level segmented-fit allocator over `[0, size)`.
pub struct Heap {
    /// Bit `r` set when row `r` of `used_linear_bins` is non-zero.
    used_sparse_bins: u32,
    /// Bit `c` of row `r` set when bin `r * 8 + c` has free spans.
    used_linear_bins: [u8; SPARSE_ROWS],
    /// Head of each bin's free list.
    bins: [Option<NodeIndex>; BIN_COUNT],

    nodes: Vec<HeapNode>,
    free_nodes: Vec<NodeIndex>,
    /// Bumped each time a node is claimed for an allocation; survives
    /// node recycling and `reset`.
    generations: Vec<u32>,

    size: u32,
    max_allocations: u32,
    allocation_count: u32,
    used_bytes: u32,
}

impl Heap {
    /// Create a heap covering `[0, size)` with room for `max_allocations`
    /// simultaneous allocations.
    pub fn new(size: u32, max_allocations: u32) -> Result<Self> {
        if size == 0 || max_allocations == 0 {
            return Err(Error::Internal(Misuse::ZeroSize));
        }

        // k allocations with every free span coalesced partition the heap
        // into at most 2k + 1 spans.
        let node_capacity = max_allocations
            .checked_mul(2)
            .and_then(|n| n.checked_add(1))
            .ok_or(Error::NoMemory)?;

        let mut heap = Self {
            used_sparse_bins: 0,
            used_linear_bins: [0; SPARSE_ROWS],
            bins: [None; BIN_COUNT],
            nodes: vec![HeapNode::default(); node_capacity as usize],
            // Reversed so index 0 is handed out first.
            free_nodes: (0..node_capacity).rev().map(NodeIndex).collect(),
            generations: vec![0; node_capacity as usize],
            size,
            max_allocations,
            allocation_count: 0,
            used_bytes: 0,
        };

        let root = heap.grab_node_index();
        heap.nodes[root.get()] = HeapNode {
            offset: 0,
            size,
            ..HeapNode::default()
        };
        heap.insert_node_to_bin(root);

        Ok(heap)
    }

    /// Size of the heap's address range.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Number of live allocations.
    pub fn allocation_count(&self) -> u32 {
        self.allocation_count
    }

    /// Maximum number of simultaneous allocations.
    pub fn max_allocations(&self) -> u32 {
        self.max_allocations
    }

    /// Bytes covered by live allocations.
    pub fn used_bytes(&self) -> u32 {
        self.used_bytes
    }

    /// True when nothing is allocated.
    pub fn is_empty(&self) -> bool {
        self.allocation_count == 0
    }

    /// Allocate `size` bytes at any offset.
    pub fn alloc(&mut self, size: u32) -> Result<HeapAllocation> {
        check_size(size)?;
        let staged = self.stage_alloc(size).ok_or_else(no_memory)?;
        Ok(self.commit_alloc(staged, size))
    }

    /// Allocate `size` bytes at an offset that is a multiple of `alignment`.
    pub fn alloc_aligned(&mut self, size: u32, alignment: u32) -> Result<HeapAllocation> {
        check_size(size)?;
        check_alignment(alignment)?;
        let staged = self
            .stage_alloc_aligned(size, alignment)
            .ok_or_else(no_memory)?;
        Ok(self.commit_alloc(staged, size))
    }

    /// Would `alloc(size)` succeed right now?
    pub fn can_alloc(&self, size: u32) -> bool {
        size != 0 && self.stage_alloc(size).is_some()
    }

    /// Would `alloc_aligned(size, alignment)` succeed right now?
    pub fn can_alloc_aligned(&self, size: u32, alignment: u32) -> bool {
        size != 0
            && alignment.is_power_of_two()
            && self.stage_alloc_aligned(size, alignment).is_some()
    }

    /// Return an allocation to the heap, merging it with free neighbours.
    pub fn free(&mut self, allocation: HeapAllocation) -> Result<()> {
        let index = allocation.node;
        let Some(node) = self.live_node(index) else {
            ga_emit!(GA003);
            return Err(Error::Internal(Misuse::ForeignAllocation));
        };
        if !node.used {
            ga_emit!(GA002);
            return Err(Error::Internal(Misuse::DoubleFree));
        }
        if self.generations[index.get()] != allocation.generation {
            // The node was claimed again after this allocation was freed.
            ga_emit!(GA002);
            return Err(Error::Internal(Misuse::DoubleFree));
        }

        let mut offset = node.offset;
        let mut size = node.size;
        let mut prev = node.prev_neighbour;
        let mut next = node.next_neighbour;

        self.allocation_count -= 1;
        self.used_bytes -= node.size;

        if let Some(p) = prev.filter(|&p| !self.nodes[p.get()].used) {
            let prev_node = self.nodes[p.get()];
            offset = prev_node.offset;
            size += prev_node.size;
            prev = prev_node.prev_neighbour;
            self.remove_node_from_bin(p);
            self.release_node_index(p);
        }

        if let Some(n) = next.filter(|&n| !self.nodes[n.get()].used) {
            let next_node = self.nodes[n.get()];
            size += next_node.size;
            next = next_node.next_neighbour;
            self.remove_node_from_bin(n);
            self.release_node_index(n);
        }

        self.release_node_index(index);
        let merged = self.grab_node_index();
        self.nodes[merged.get()] = HeapNode {
            offset,
            size,
            prev_neighbour: prev,
            next_neighbour: next,
            ..HeapNode::default()
        };
        self.link_neighbours(prev, merged, next);
        self.insert_node_to_bin(merged);

        Ok(())
    }

    /// Release every allocation, restoring the single free span.
    pub fn reset(&mut self) {
        let node_capacity = self.nodes.len() as u32;
        self.used_sparse_bins = 0;
        self.used_linear_bins = [0; SPARSE_ROWS];
        self.bins = [None; BIN_COUNT];
        self.free_nodes = (0..node_capacity).rev().map(NodeIndex).collect();
        self.allocation_count = 0;
        self.used_bytes = 0;

        let root = self.grab_node_index();
        self.nodes[root.get()] = HeapNode {
            offset: 0,
            size: self.size,
            ..HeapNode::default()
        };
        self.insert_node_to_bin(root);
    }

    /// Tear the heap down, reporting what was still allocated.
    pub fn shutdown(self) -> HeapStats {
        let stats = self.stats();
        if stats.allocation_count != 0 {
            ga_emit!(GA004);
        }
        stats
    }

    /// Snapshot of the heap's occupancy.
    pub fn stats(&self) -> HeapStats {
        let mut free_span_count = 0;
        for head in self.bins.iter() {
            let mut cursor = *head;
            while let Some(index) = cursor {
                free_span_count += 1;
                cursor = self.nodes[index.get()].next_bin;
            }
        }

        HeapStats {
            size: self.size,
            used_bytes: self.used_bytes,
            allocation_count: self.allocation_count,
            free_span_count,
            largest_free_span: self.largest_free_span(),
        }
    }

    /// Size of the largest free span, or 0 when the heap is full.
    pub fn largest_free_span(&self) -> u32 {
        let Some(row) = self.used_sparse_bins.highest_set() else {
            return 0;
        };
        let Some(column) = self.used_linear_bins[row as usize].highest_set() else {
            return 0;
        };

        // Spans in the top bin are the only candidates; they differ by less
        // than one bin step, so walk the list.
        let mut largest = 0;
        let mut cursor = self.bins[(row * bin::MANTISSA_VALUE + column) as usize];
        while let Some(index) = cursor {
            let node = &self.nodes[index.get()];
            largest = largest.max(node.size);
            cursor = node.next_bin;
        }
        largest
    }

    /// Walk the physical chain and check every structural invariant.
    ///
    /// Intended for tests and debug tooling; O(nodes).
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        let mut is_free_slot = vec![false; self.nodes.len()];
        for index in &self.free_nodes {
            is_free_slot[index.get()] = true;
        }

        let first = (0..self.nodes.len())
            .find(|&i| !is_free_slot[i] && self.nodes[i].offset == 0 && self.nodes[i].prev_neighbour.is_none())
            .ok_or("no node covers offset 0")?;

        let mut expected_offset = 0u32;
        let mut used_bytes = 0u32;
        let mut used_count = 0u32;
        let mut live_nodes = 0usize;
        let mut previous: Option<NodeIndex> = None;
        let mut cursor = Some(NodeIndex(first as u32));

        while let Some(index) = cursor {
            let node = &self.nodes[index.get()];
            if is_free_slot[index.get()] {
                return Err(format!("node {} is linked but released", index.0));
            }
            if node.offset != expected_offset {
                return Err(format!(
                    "gap or overlap at {}: node {} starts at {}",
                    expected_offset, index.0, node.offset
                ));
            }
            if node.size == 0 {
                return Err(format!("node {} is empty", index.0));
            }
            if node.prev_neighbour != previous {
                return Err(format!("node {} has a broken back link", index.0));
            }
            if node.used {
                used_bytes += node.size;
                used_count += 1;
            } else {
                if previous.is_some_and(|p| !self.nodes[p.get()].used) {
                    return Err(format!("free node {} follows a free node", index.0));
                }
                if !self.bin_contains(index) {
                    return Err(format!("free node {} is missing from its bin", index.0));
                }
            }

            live_nodes += 1;
            expected_offset = node.end();
            previous = Some(index);
            cursor = node.next_neighbour;
        }

        if expected_offset != self.size {
            return Err(format!("chain ends at {} instead of {}", expected_offset, self.size));
        }
        if live_nodes + self.free_nodes.len() != self.nodes.len() {
            return Err("leaked node indices".to_string());
        }
        if used_bytes != self.used_bytes || used_count != self.allocation_count {
            return Err("usage counters disagree with the chain".to_string());
        }

        for (bin_index, head) in self.bins.iter().enumerate() {
            let (row, column) = bin::bin_coords(bin_index as BinIndex);
            let flagged = self.used_linear_bins[row as usize].has_bit(column);
            if flagged != head.is_some() {
                return Err(format!("bitmap disagrees with bin {}", bin_index));
            }
        }
        for row in 0..SPARSE_ROWS as u32 {
            let flagged = self.used_sparse_bins.has_bit(row);
            if flagged != (self.used_linear_bins[row as usize] != 0) {
                return Err(format!("sparse bitmap disagrees with row {}", row));
            }
        }

        Ok(())
    }

    // -------------------------------------------------------------------------
    // Staging and committing
    // -------------------------------------------------------------------------

    /// Find a span for `size` without mutating anything.
    fn stage_alloc(&self, size: u32) -> Option<Staged> {
        if self.allocation_count >= self.max_allocations {
            return None;
        }
        let node = self.find_node_for_size(size)?;
        debug_assert!(self.nodes[node.get()].size >= size);
        Some(Staged {
            node,
            offset: self.nodes[node.get()].offset,
        })
    }

    /// Find a span that can hold `size` bytes at an aligned offset.
    fn stage_alloc_aligned(&self, size: u32, alignment: u32) -> Option<Staged> {
        let staged = self.stage_alloc(size)?;
        if let Some(staged) = self.fit_aligned(staged.node, size, alignment) {
            return Some(staged);
        }

        // A span of size + alignment - 1 holds an aligned span of `size`
        // wherever it starts.
        let padded = size.checked_add(alignment - 1)?;
        let staged = self.stage_alloc(padded)?;
        self.fit_aligned(staged.node, size, alignment)
    }

    fn fit_aligned(&self, index: NodeIndex, size: u32, alignment: u32) -> Option<Staged> {
        let node = &self.nodes[index.get()];
        let offset = align_up(node.offset, alignment)?;
        let padding = offset - node.offset;
        if padding > node.size || node.size - padding < size {
            return None;
        }
        Some(Staged { node: index, offset })
    }

    /// Claim `[staged.offset, staged.offset + size)` from the staged span.
    fn commit_alloc(&mut self, staged: Staged, size: u32) -> HeapAllocation {
        let index = staged.node;
        self.remove_node_from_bin(index);

        let node = self.nodes[index.get()];
        let mut prev = node.prev_neighbour;
        let mut next = node.next_neighbour;

        let head_size = staged.offset - node.offset;
        if head_size > 0 {
            let mut head_offset = node.offset;
            let mut merged_size = head_size;
            if let Some(p) = prev.filter(|&p| !self.nodes[p.get()].used) {
                let prev_node = self.nodes[p.get()];
                head_offset = prev_node.offset;
                merged_size += prev_node.size;
                prev = prev_node.prev_neighbour;
                self.remove_node_from_bin(p);
                self.release_node_index(p);
            }

            let head = self.grab_node_index();
            self.nodes[head.get()] = HeapNode {
                offset: head_offset,
                size: merged_size,
                prev_neighbour: prev,
                next_neighbour: Some(index),
                ..HeapNode::default()
            };
            if let Some(p) = prev {
                self.nodes[p.get()].next_neighbour = Some(head);
            }
            self.insert_node_to_bin(head);
            prev = Some(head);
        }

        let tail_offset = staged.offset + size;
        let tail_size = node.end() - tail_offset;
        if tail_size > 0 {
            let mut merged_size = tail_size;
            if let Some(n) = next.filter(|&n| !self.nodes[n.get()].used) {
                let next_node = self.nodes[n.get()];
                merged_size += next_node.size;
                next = next_node.next_neighbour;
                self.remove_node_from_bin(n);
                self.release_node_index(n);
            }

            let tail = self.grab_node_index();
            self.nodes[tail.get()] = HeapNode {
                offset: tail_offset,
                size: merged_size,
                prev_neighbour: Some(index),
                next_neighbour: next,
                ..HeapNode::default()
            };
            if let Some(n) = next {
                self.nodes[n.get()].prev_neighbour = Some(tail);
            }
            self.insert_node_to_bin(tail);
            next = Some(tail);
        }

        let claimed = &mut self.nodes[index.get()];
        claimed.offset = staged.offset;
        claimed.size = size;
        claimed.used = true;
        claimed.prev_neighbour = prev;
        claimed.next_neighbour = next;

        self.allocation_count += 1;
        self.used_bytes += size;

        let generation = &mut self.generations[index.get()];
        *generation = generation.wrapping_add(1);

        HeapAllocation {
            offset: staged.offset,
            node: index,
            generation: *generation,
        }
    }

    // -------------------------------------------------------------------------
    // Bin table
    // -------------------------------------------------------------------------

    /// A free span that can hold `size` bytes.
    ///
    /// Spans are filed rounded down, so when no class at or above the
    /// request's rounded-up class is populated, the head of the request's
    /// rounded-down class may still be large enough.
    fn find_node_for_size(&self, size: u32) -> Option<NodeIndex> {
        if let Some(bin) = self.find_bin_for_size(size) {
            return self.bins[bin as usize];
        }

        let head = self.bins[bin::bin_index_round_down(size) as usize]?;
        (self.nodes[head.get()].size >= size).then_some(head)
    }

    /// Lowest populated bin whose every span can satisfy `size`.
    fn find_bin_for_size(&self, size: u32) -> Option<BinIndex> {
        let (row, column) = bin::bin_coords(bin::bin_index_round_up(size));

        if let Some(found) = self.used_linear_bins[row as usize].lowest_set_from(column) {
            return Some((row * bin::MANTISSA_VALUE + found) as BinIndex);
        }

        let row = self.used_sparse_bins.lowest_set_from(row + 1)?;
        let column = self.used_linear_bins[row as usize].lowest_set_from(0)?;
        Some((row * bin::MANTISSA_VALUE + column) as BinIndex)
    }

    /// File a free node at the head of its bin.
    fn insert_node_to_bin(&mut self, index: NodeIndex) {
        let bin = bin::bin_index_round_down(self.nodes[index.get()].size);
        let (row, column) = bin::bin_coords(bin);

        let row_bits = &mut self.used_linear_bins[row as usize];
        *row_bits = row_bits.with_bit(column);
        self.used_sparse_bins = self.used_sparse_bins.with_bit(row);

        let old_head = self.bins[bin as usize];
        if let Some(head) = old_head {
            self.nodes[head.get()].prev_bin = Some(index);
        }

        let node = &mut self.nodes[index.get()];
        node.used = false;
        node.prev_bin = None;
        node.next_bin = old_head;
        self.bins[bin as usize] = Some(index);
    }

    /// Unlink a free node from its bin, clearing bitmap bits that go empty.
    fn remove_node_from_bin(&mut self, index: NodeIndex) {
        let node = self.nodes[index.get()];
        debug_assert!(!node.used, "node {} is not free", index.0);

        if let Some(prev) = node.prev_bin {
            self.nodes[prev.get()].next_bin = node.next_bin;
        } else {
            let bin = bin::bin_index_round_down(node.size);
            self.bins[bin as usize] = node.next_bin;

            if node.next_bin.is_none() {
                let (row, column) = bin::bin_coords(bin);
                let row_bits = &mut self.used_linear_bins[row as usize];
                *row_bits = row_bits.without_bit(column);
                if *row_bits == 0 {
                    self.used_sparse_bins = self.used_sparse_bins.without_bit(row);
                }
            }
        }

        if let Some(next) = node.next_bin {
            self.nodes[next.get()].prev_bin = node.prev_bin;
        }

        let node = &mut self.nodes[index.get()];
        node.next_bin = None;
        node.prev_bin = None;
    }

    fn bin_contains(&self, index: NodeIndex) -> bool {
        let bin = bin::bin_index_round_down(self.nodes[index.get()].size);
        let mut cursor = self.bins[bin as usize];
        while let Some(current) = cursor {
            if current == index {
                return true;
            }
            cursor = self.nodes[current.get()].next_bin;
        }
        false
    }

    // -------------------------------------------------------------------------
    // Node arena
    // -------------------------------------------------------------------------

    fn grab_node_index(&mut self) -> NodeIndex {
        self.free_nodes.pop().unwrap_or_else(|| {
            ga_emit!(GA901);
            unreachable!("heap node arena exhausted")
        })
    }

    fn release_node_index(&mut self, index: NodeIndex) {
        debug_assert!(self.free_nodes.len() < self.nodes.len());
        self.free_nodes.push(index);
    }

    fn link_neighbours(&mut self, prev: Option<NodeIndex>, node: NodeIndex, next: Option<NodeIndex>) {
        if let Some(p) = prev {
            self.nodes[p.get()].next_neighbour = Some(node);
        }
        if let Some(n) = next {
            self.nodes[n.get()].prev_neighbour = Some(node);
        }
    }

    fn live_node(&self, index: NodeIndex) -> Option<HeapNode> {
        self.nodes.get(index.get()).copied()
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("size", &self.size)
            .field("used_bytes", &self.used_bytes)
            .field("allocation_count", &self.allocation_count)
            .field("max_allocations", &self.max_allocations)
            .finish()
    }
}

#[inline]
fn check_size(size: u32) -> Result<()> {
    if size == 0 {
        return Err(Error::Internal(Misuse::ZeroSize));
    }
    Ok(())
}

#[inline]
fn check_alignment(alignment: u32) -> Result<()> {
    if !alignment.is_power_of_two() {
        return Err(Error::Internal(Misuse::BadAlignment));
    }
    Ok(())
}

fn no_memory() -> Error {
    ga_emit!(GA001);
    Error::NoMemory
}
