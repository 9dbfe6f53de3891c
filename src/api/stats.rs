//! Allocation statistics.

use crate::util::size::format_bytes;

/// Snapshot of a single heap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapStats {
    /// Size of the heap's address range.
    pub size: u32,

    /// Bytes covered by live allocations.
    pub used_bytes: u32,

    /// Number of live allocations.
    pub allocation_count: u32,

    /// Number of free spans.
    pub free_span_count: u32,

    /// Size of the largest free span.
    pub largest_free_span: u32,
}

impl HeapStats {
    /// Bytes not covered by live allocations.
    pub fn free_bytes(&self) -> u32 {
        self.size - self.used_bytes
    }

    /// Fraction of free space outside the largest free span (0.0 to 1.0).
    pub fn fragmentation(&self) -> f64 {
        let free = self.free_bytes();
        if free == 0 {
            return 0.0;
        }
        1.0 - self.largest_free_span as f64 / free as f64
    }
}

impl std::fmt::Display for HeapStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Heap Statistics:")?;
        writeln!(f, "  Size:          {}", format_bytes(self.size as u64))?;
        writeln!(f, "  Used:          {}", format_bytes(self.used_bytes as u64))?;
        writeln!(f, "  Allocations:   {}", self.allocation_count)?;
        writeln!(f, "  Free spans:    {}", self.free_span_count)?;
        writeln!(f, "  Largest free:  {}", format_bytes(self.largest_free_span as u64))?;
        write!(f, "  Fragmentation: {:.1}%", self.fragmentation() * 100.0)
    }
}

/// Snapshot of a resource pool.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of live elements.
    pub len: u32,
    /// Total slot capacity.
    pub capacity: u32,
    /// Number of times the backing storage grew.
    pub grow_count: u32,
}

impl std::fmt::Display for PoolStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Pool: {}/{} slots live, grown {} times",
            self.len, self.capacity, self.grow_count
        )
    }
}

/// Aggregated statistics of a heap set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeapSetStats {
    /// Shared blocks currently owned.
    pub shared_blocks: u32,
    /// Dedicated blocks currently owned.
    pub dedicated_blocks: u32,
    /// Bytes reserved from the block source.
    pub reserved_bytes: u64,
    /// Bytes covered by live allocations.
    pub used_bytes: u64,
    /// Number of live allocations.
    pub allocation_count: u64,
    /// Frees waiting for their frame to retire.
    pub pending_frees: usize,
}

impl HeapSetStats {
    /// Reserved bytes not handed out to allocations.
    pub fn free_bytes(&self) -> u64 {
        self.reserved_bytes - self.used_bytes
    }
}

impl std::fmt::Display for HeapSetStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Heap Set Statistics:")?;
        writeln!(f, "  Shared blocks:    {}", self.shared_blocks)?;
        writeln!(f, "  Dedicated blocks: {}", self.dedicated_blocks)?;
        writeln!(f, "  Reserved:         {}", format_bytes(self.reserved_bytes))?;
        writeln!(f, "  Used:             {}", format_bytes(self.used_bytes))?;
        writeln!(f, "  Allocations:      {}", self.allocation_count)?;
        write!(f, "  Pending frees:    {}", self.pending_frees)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heap_fragmentation() {
        let stats = HeapStats {
            size: 1000,
            used_bytes: 600,
            allocation_count: 3,
            free_span_count: 2,
            largest_free_span: 300,
        };
        assert_eq!(stats.free_bytes(), 400);
        assert!((stats.fragmentation() - 0.25).abs() < 1e-9);

        let full = HeapStats { size: 10, used_bytes: 10, ..Default::default() };
        assert_eq!(full.fragmentation(), 0.0);
    }

    #[test]
    fn test_display() {
        let stats = PoolStats { len: 3, capacity: 8, grow_count: 1 };
        assert_eq!(stats.to_string(), "Pool: 3/8 slots live, grown 1 times");
    }
}
