//! Strict mode handling for diagnostics.
//!
//! Allows configuration of how diagnostics are treated:
//! - Warn: Just emit the diagnostic
//! - Panic: Emit and then panic (useful for CI)

use std::cell::Cell;
use std::sync::atomic::{AtomicU8, Ordering};

/// Strict mode behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum StrictMode {
    /// Just warn, don't panic.
    Warn = 0,
    /// Panic on errors.
    PanicOnError = 1,
    /// Panic on errors and warnings.
    PanicOnWarning = 2,
}

impl From<u8> for StrictMode {
    fn from(val: u8) -> Self {
        match val {
            1 => StrictMode::PanicOnError,
            2 => StrictMode::PanicOnWarning,
            _ => StrictMode::Warn,
        }
    }
}

/// Process-wide strict mode.
static STRICT_MODE: AtomicU8 = AtomicU8::new(0);

thread_local! {
    /// Override installed by [`StrictModeGuard`] on this thread.
    static STRICT_OVERRIDE: Cell<Option<StrictMode>> = Cell::new(None);
}

/// Set the process-wide strict mode.
pub fn set_strict_mode(mode: StrictMode) {
    STRICT_MODE.store(mode as u8, Ordering::Relaxed);
}

/// Get the strict mode in effect on this thread.
pub fn strict_mode() -> StrictMode {
    STRICT_OVERRIDE
        .with(Cell::get)
        .unwrap_or_else(|| StrictMode::from(STRICT_MODE.load(Ordering::Relaxed)))
}

/// Check if error diagnostics should panic.
pub fn should_panic() -> bool {
    matches!(strict_mode(), StrictMode::PanicOnError | StrictMode::PanicOnWarning)
}

/// Check if warning diagnostics should panic.
pub fn should_panic_on_warning() -> bool {
    matches!(strict_mode(), StrictMode::PanicOnWarning)
}

/// RAII guard that overrides strict mode on the current thread.
pub struct StrictModeGuard {
    previous: Option<StrictMode>,
}

impl StrictModeGuard {
    /// Create a new guard that sets strict mode.
    pub fn new(mode: StrictMode) -> Self {
        let previous = STRICT_OVERRIDE.with(|o| o.replace(Some(mode)));
        Self { previous }
    }

    /// Create a guard that enables panic-on-error.
    pub fn panic_on_error() -> Self {
        Self::new(StrictMode::PanicOnError)
    }

    /// Create a guard that enables panic-on-warning.
    pub fn panic_on_warning() -> Self {
        Self::new(StrictMode::PanicOnWarning)
    }
}

impl Drop for StrictModeGuard {
    fn drop(&mut self) {
        STRICT_OVERRIDE.with(|o| o.set(self.previous));
    }
}

/// Initialize strict mode from environment variable.
///
/// Checks `GFXALLOC_STRICT`:
/// - "1", "error" or "true" -> PanicOnError
/// - "2", "warning" or "all" -> PanicOnWarning
/// - anything else -> Warn
pub fn init_from_env() {
    if let Ok(val) = std::env::var("GFXALLOC_STRICT") {
        set_strict_mode(parse_strict_mode(&val));
    }
}

fn parse_strict_mode(val: &str) -> StrictMode {
    match val.trim().to_lowercase().as_str() {
        "1" | "error" | "true" => StrictMode::PanicOnError,
        "2" | "warning" | "all" => StrictMode::PanicOnWarning,
        _ => StrictMode::Warn,
    }
}
