//! Allocation backends.
//!
//! This module contains the core allocator implementations.
//! **`scratch` is the only module that should contain `unsafe` code.**

pub mod bin;
pub mod deferred;
pub mod heap;
pub mod heap_set;
pub mod pool;
pub mod scratch;
