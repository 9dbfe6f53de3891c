//! Runtime diagnostics.
//!
//! Allocator misuse and resource exhaustion are reported through coded
//! diagnostics in addition to the returned `Result`:
//!
//! | Code  | Meaning                        |
//! |-------|--------------------------------|
//! | GA0xx | Heap allocation issues         |
//! | GA1xx | Resource pool issues           |
//! | GA2xx | Heap set / block source issues |
//! | GA9xx | Internal errors                |
//!
//! Output goes to stderr in debug builds (or with the `diagnostics`
//! feature) and to the `log` crate when the `log` feature is enabled.
//! Strict mode turns error diagnostics into panics, which is useful in CI.
//!
//! ```rust,ignore
//! use gfxalloc::ga_emit;
//!
//! ga_emit!(GA102);
//! ```

pub mod emit;
pub mod kind;
#[macro_use]
pub mod macros;
pub mod strict;

pub use emit::{emit, suppress_diagnostics, set_sink, clear_sink, DiagnosticSink, CollectingSink};
pub use kind::{Diagnostic, DiagnosticKind};
pub use strict::{StrictMode, set_strict_mode, strict_mode, StrictModeGuard, init_from_env};

pub use kind::{GA001, GA002, GA003, GA004, GA101, GA102, GA103, GA201, GA202, GA901};
