//! Heap set configuration.

use crate::util::size::{kb, mb};

/// Configuration for a [`HeapSet`](crate::HeapSet).
#[derive(Debug, Clone)]
pub struct AllocConfig {
    /// Size of each shared block requested from the block source (default: 64 MB)
    pub block_size: u32,

    /// Maximum live allocations in one shared block (default: 4096)
    pub max_allocations_per_block: u32,

    /// Requests larger than this get their own dedicated block (default: 32 MB)
    pub dedicated_threshold: u32,

    /// Return shared blocks to the source as soon as they become empty
    pub release_empty_blocks: bool,

    /// Initial capacity of the block table (grows on demand)
    pub block_handle_capacity: u32,
}

impl Default for AllocConfig {
    fn default() -> Self {
        Self {
            block_size: mb(64),
            max_allocations_per_block: 4096,
            dedicated_threshold: mb(32),
            release_empty_blocks: false,
            block_handle_capacity: 8,
        }
    }
}

impl AllocConfig {
    /// Create a minimal config for testing or constrained environments.
    pub fn minimal() -> Self {
        Self {
            block_size: kb(64),
            max_allocations_per_block: 64,
            dedicated_threshold: kb(32),
            release_empty_blocks: true,
            block_handle_capacity: 1,
        }
    }

    /// Create a config for many small, short-lived allocations.
    pub fn high_throughput() -> Self {
        Self {
            block_size: mb(256),
            max_allocations_per_block: 65536,
            dedicated_threshold: mb(128),
            release_empty_blocks: false,
            block_handle_capacity: 16,
        }
    }

    /// Builder pattern: set block size.
    pub fn with_block_size(mut self, size: u32) -> Self {
        self.block_size = size;
        self
    }

    /// Builder pattern: set the per-block allocation limit.
    pub fn with_max_allocations(mut self, max: u32) -> Self {
        self.max_allocations_per_block = max;
        self
    }

    /// Builder pattern: set the dedicated allocation threshold.
    pub fn with_dedicated_threshold(mut self, threshold: u32) -> Self {
        self.dedicated_threshold = threshold;
        self
    }

    /// Builder pattern: release empty shared blocks.
    pub fn with_release_empty_blocks(mut self, enable: bool) -> Self {
        self.release_empty_blocks = enable;
        self
    }

    /// Effective dedicated threshold; never larger than a block.
    pub(crate) fn effective_dedicated_threshold(&self) -> u32 {
        self.dedicated_threshold.min(self.block_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders() {
        let config = AllocConfig::minimal()
            .with_block_size(kb(4))
            .with_max_allocations(8)
            .with_release_empty_blocks(false);
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.max_allocations_per_block, 8);
        assert!(!config.release_empty_blocks);
        // threshold from the preset is clamped to the new block size
        assert_eq!(config.effective_dedicated_threshold(), 4096);
    }
}
