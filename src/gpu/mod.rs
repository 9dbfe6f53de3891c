//! Backing-memory interface.
//!
//! The heap set never talks to a graphics API directly. It asks a
//! [`BlockSource`] for large blocks of device memory and sub-allocates
//! offsets inside them.
//!
//! ## Sources
//! - [`DummySource`]: numbered blocks with an optional byte budget, for
//!   tests and tooling
//! - Real backends implement [`BlockSource`] in the embedding renderer

// Always present: the heap set is generic over this trait
pub mod traits;
pub use traits::BlockSource;

// Dummy source for testing (always available)
pub mod dummy;
pub use dummy::{DummyBlock, DummySource};
