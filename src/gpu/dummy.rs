//! Dummy block source for testing
//!
//! Hands out numbered blocks without touching any device, and keeps enough
//! bookkeeping to verify that every block comes back.

use super::traits::BlockSource;
use crate::api::error::{Error, Result};

/// A block handed out by [`DummySource`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct DummyBlock {
    /// Creation order, starting at 0
    pub id: u64,
    /// Size in bytes
    pub size: u32,
}

/// Dummy block source for testing
#[derive(Debug, Default)]
pub struct DummySource {
    /// Byte budget, `None` for unlimited
    budget: Option<u64>,
    next_id: u64,
    live_blocks: usize,
    live_bytes: u64,
    peak_bytes: u64,
    destroyed: usize,
}

impl DummySource {
    /// Create an unlimited source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source that refuses to exceed `budget` live bytes.
    pub fn with_budget(budget: u64) -> Self {
        Self {
            budget: Some(budget),
            ..Self::default()
        }
    }

    /// Number of blocks currently live.
    pub fn live_blocks(&self) -> usize {
        self.live_blocks
    }

    /// Bytes currently live.
    pub fn live_bytes(&self) -> u64 {
        self.live_bytes
    }

    /// Highest number of live bytes seen.
    pub fn peak_bytes(&self) -> u64 {
        self.peak_bytes
    }

    /// Total blocks ever created.
    pub fn created(&self) -> u64 {
        self.next_id
    }

    /// Total blocks destroyed.
    pub fn destroyed(&self) -> usize {
        self.destroyed
    }
}

impl BlockSource for DummySource {
    type Block = DummyBlock;

    fn create_block(&mut self, size: u32) -> Result<DummyBlock> {
        if size == 0 {
            return Err(Error::Backend("zero-sized block".to_string()));
        }

        let live_bytes = self.live_bytes + size as u64;
        if self.budget.is_some_and(|budget| live_bytes > budget) {
            return Err(Error::NoMemory);
        }

        let block = DummyBlock {
            id: self.next_id,
            size,
        };
        self.next_id += 1;
        self.live_blocks += 1;
        self.live_bytes = live_bytes;
        self.peak_bytes = self.peak_bytes.max(live_bytes);
        Ok(block)
    }

    fn destroy_block(&mut self, block: DummyBlock) {
        debug_assert!(block.id < self.next_id, "block was not created by this source");
        self.live_blocks -= 1;
        self.live_bytes -= block.size as u64;
        self.destroyed += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbered_blocks() {
        let mut source = DummySource::new();
        let a = source.create_block(1024).unwrap();
        let b = source.create_block(512).unwrap();
        assert_eq!((a.id, b.id), (0, 1));
        assert_eq!(source.live_bytes(), 1536);

        source.destroy_block(a);
        assert_eq!(source.live_blocks(), 1);
        assert_eq!(source.live_bytes(), 512);
        assert_eq!(source.peak_bytes(), 1536);
        source.destroy_block(b);
        assert_eq!(source.destroyed(), 2);
    }

    #[test]
    fn test_budget() {
        let mut source = DummySource::with_budget(1000);
        let block = source.create_block(600).unwrap();
        assert_eq!(source.create_block(600), Err(Error::NoMemory));

        source.destroy_block(block);
        assert!(source.create_block(600).is_ok());
    }

    #[test]
    fn test_zero_size() {
        let mut source = DummySource::new();
        assert!(matches!(source.create_block(0), Err(Error::Backend(_))));
        assert_eq!(source.created(), 0);
    }
}
