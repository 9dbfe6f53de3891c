//! Public API types shared by every allocator in the crate.

pub mod config;
pub mod error;
pub mod stats;
