//! Error types.

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by heaps, pools and heap sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// No free span large enough. Recoverable: grow, or try a dedicated block.
    NoMemory,
    /// The caller misused the API. Never expected in correct usage.
    Internal(Misuse),
    /// Backend-specific failure reported by a block source (opaque)
    Backend(String),
}

/// The specific misuse behind an [`Error::Internal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Misuse {
    /// The NULL handle was passed where a live handle is required.
    NullHandle,
    /// Removal from a pool with no live elements.
    EmptyPool,
    /// Handle index beyond the pool's capacity.
    IndexOutOfRange,
    /// Handle generation does not match the slot (slot was reused).
    StaleHandle,
    /// Slot or span is already free.
    DoubleFree,
    /// Zero-byte allocation or zero-byte heap.
    ZeroSize,
    /// Alignment is not a power of two.
    BadAlignment,
    /// Allocation does not belong to this heap or heap set.
    ForeignAllocation,
}

impl Misuse {
    /// Short description of the misuse.
    pub fn description(&self) -> &'static str {
        match self {
            Misuse::NullHandle => "null handle",
            Misuse::EmptyPool => "pool is empty",
            Misuse::IndexOutOfRange => "handle index out of range",
            Misuse::StaleHandle => "stale handle (generation mismatch)",
            Misuse::DoubleFree => "double free",
            Misuse::ZeroSize => "zero size",
            Misuse::BadAlignment => "alignment is not a power of two",
            Misuse::ForeignAllocation => "allocation does not belong to this allocator",
        }
    }
}

impl fmt::Display for Misuse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NoMemory => write!(f, "out of heap memory"),
            Error::Internal(misuse) => write!(f, "internal error: {}", misuse),
            Error::Backend(msg) => write!(f, "backend error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<Misuse> for Error {
    fn from(misuse: Misuse) -> Self {
        Error::Internal(misuse)
    }
}

impl Error {
    /// Whether the caller can recover by growing or retrying elsewhere.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::NoMemory)
    }

    /// The misuse behind an internal error, if any.
    pub fn misuse(&self) -> Option<Misuse> {
        match self {
            Error::Internal(misuse) => Some(*misuse),
            _ => None,
        }
    }
}
