//! # gfxalloc
//!
//! Backend-agnostic sub-allocation for GPU memory.
//!
//! ## Features
//!
//! - O(1) offset allocator over a fixed address range ([`Heap`]), with
//!   aligned allocation and neighbour coalescing on free
//! - 256 floating-point size classes tracked in a two-level bitmap
//! - Growable heap sets over backend blocks ([`HeapSet`]), with dedicated
//!   blocks for large requests and frame-deferred frees
//! - Generation-checked resource pools ([`Pool`], [`Handle`])
//! - Scratch arena for staging temporary arrays ([`ScratchArena`])
//! - Coded diagnostics with a strict mode for CI
//!
//! ## Quick Start
//!
//! ```rust
//! use gfxalloc::{AllocConfig, DummySource, HeapSet};
//!
//! let mut set = HeapSet::new(DummySource::new(), AllocConfig::minimal());
//!
//! let vertices = set.alloc(4096, 256).unwrap();
//! let indices = set.alloc(1024, 4).unwrap();
//! assert_eq!(vertices.block(), indices.block());
//!
//! // Still in flight on the GPU: free once frame 7 has completed.
//! set.defer_free(vertices, 7);
//! set.free(indices).unwrap();
//! set.retire_frame(7).unwrap();
//! ```
//!
//! A single [`Heap`] hands out offsets without any backing memory at all:
//!
//! ```rust
//! use gfxalloc::Heap;
//!
//! let mut heap = Heap::new(1024 * 1024, 256).unwrap();
//! let a = heap.alloc_aligned(1000, 256).unwrap();
//! assert_eq!(a.offset() % 256, 0);
//! heap.free(a).unwrap();
//! ```

#[macro_use]
pub mod diagnostics;

pub mod allocators;
pub mod api;
pub mod gpu;

mod sync;
mod util;

// Re-export public API at crate root for convenience
pub use allocators::bin::{bin_index_round_down, bin_index_round_up, bin_size, BinIndex, BIN_COUNT};
pub use allocators::deferred::DeferredFreeQueue;
pub use allocators::heap::{Heap, HeapAllocation};
pub use allocators::heap_set::{BlockId, HeapSet, HeapSetAllocation};
pub use allocators::pool::{Handle, Pool, MAX_CAPACITY};
pub use allocators::scratch::{ScratchArena, ScratchMark};
pub use api::config::AllocConfig;
pub use api::error::{Error, Misuse, Result};
pub use api::stats::{HeapSetStats, HeapStats, PoolStats};
pub use gpu::{BlockSource, DummyBlock, DummySource};

// Diagnostics - Core types and predefined codes
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use diagnostics::{StrictMode, set_strict_mode, StrictModeGuard};
pub use diagnostics::{GA001, GA002, GA003, GA004, GA101, GA102, GA103, GA201, GA202, GA901};
