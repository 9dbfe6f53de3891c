//! Block source trait.
//!
//! This module defines the backend interface WITHOUT pulling in any
//! backend-specific dependencies.

use crate::api::error::Result;

/// Provider of large device-memory blocks.
///
/// A block is whatever the backend needs to bind a sub-allocation later:
/// a `VkDeviceMemory`, a `wgpu::Buffer`, an index into a CPU mirror.
/// The heap set owns every block it creates and hands each one back
/// exactly once through [`destroy_block`](Self::destroy_block).
pub trait BlockSource {
    /// Backend block object.
    type Block;

    /// Create a block of at least `size` bytes.
    ///
    /// Return [`Error::NoMemory`](crate::Error::NoMemory) when the device
    /// is out of memory, [`Error::Backend`](crate::Error::Backend) for
    /// anything else.
    fn create_block(&mut self, size: u32) -> Result<Self::Block>;

    /// Release a block previously returned by `create_block`.
    fn destroy_block(&mut self, block: Self::Block);
}

impl<S: BlockSource + ?Sized> BlockSource for &mut S {
    type Block = S::Block;

    fn create_block(&mut self, size: u32) -> Result<Self::Block> {
        (**self).create_block(size)
    }

    fn destroy_block(&mut self, block: Self::Block) {
        (**self).destroy_block(block)
    }
}
