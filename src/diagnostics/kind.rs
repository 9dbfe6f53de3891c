//! Diagnostic kinds and predefined codes.

/// The severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A hard error - the caller misused the allocator.
    Error,
    /// A warning - recoverable, but probably worth a look.
    Warning,
    /// Additional context.
    Note,
}

impl DiagnosticKind {
    /// Get the display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Note => "note",
        }
    }
}

/// A diagnostic message with code, message, and optional context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "GA001").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional additional context.
    pub note: Option<&'static str>,
    /// Optional fix suggestion.
    pub help: Option<&'static str>,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub const fn error(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Create a new warning diagnostic.
    pub const fn warning(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            code,
            message,
            note: None,
            help: None,
        }
    }

    /// Add a note to this diagnostic.
    pub const fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }

    /// Add a help message to this diagnostic.
    pub const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

// =============================================================================
// GA0xx - Heap allocation
// =============================================================================

/// GA001: Heap has no free span large enough.
pub const GA001: Diagnostic = Diagnostic::warning(
    "GA001",
    "heap has no free span large enough for the request"
).with_note("no bin at or above the request's size class is populated")
 .with_help("grow the heap set, or route large requests to a dedicated block");

/// GA002: Heap allocation freed twice.
pub const GA002: Diagnostic = Diagnostic::error(
    "GA002",
    "heap allocation freed twice"
).with_note("the span behind this allocation is already free")
 .with_help("make sure every HeapAllocation is freed exactly once");

/// GA003: Allocation does not belong to this heap.
pub const GA003: Diagnostic = Diagnostic::error(
    "GA003",
    "allocation does not belong to this heap"
).with_note("the allocation's node does not describe the span it claims")
 .with_help("free allocations through the heap or heap set that produced them");

/// GA004: Heap torn down with live allocations.
pub const GA004: Diagnostic = Diagnostic::warning(
    "GA004",
    "heap shut down while allocations are still live"
).with_note("offsets handed out by this heap now refer to released memory")
 .with_help("free every HeapAllocation before shutting its heap down");

// =============================================================================
// GA1xx - Resource pools
// =============================================================================

/// GA101: Stale pool handle.
pub const GA101: Diagnostic = Diagnostic::error(
    "GA101",
    "pool handle is stale or invalid"
).with_note("the handle's generation doesn't match its slot, or the slot is out of range")
 .with_help("ensure handles are not used after removal, or check contains() first");

/// GA102: Pool element removed twice.
pub const GA102: Diagnostic = Diagnostic::error(
    "GA102",
    "pool element removed twice"
).with_note("the slot addressed by this handle is already free")
 .with_help("drop handles once the element has been removed");

/// GA103: Pool shut down with live elements.
pub const GA103: Diagnostic = Diagnostic::warning(
    "GA103",
    "pool shut down while elements are still live"
).with_note("live elements are dropped without their owner destroying them first")
 .with_help("walk the live list with head_index()/next_index() and destroy every object before shutdown");

// =============================================================================
// GA2xx - Heap sets and block sources
// =============================================================================

/// GA201: Block source failed to create a block.
pub const GA201: Diagnostic = Diagnostic::warning(
    "GA201",
    "block source could not provide a new block"
).with_note("the heap set is full and the backend refused to grow it")
 .with_help("raise the backend's memory budget, or free allocations before retrying");

/// GA202: Heap set shut down with live allocations.
pub const GA202: Diagnostic = Diagnostic::warning(
    "GA202",
    "heap set shut down while allocations are still live"
).with_note("the blocks backing these allocations were returned to the source")
 .with_help("free every allocation, or retire all pending frames, before shutdown");

// =============================================================================
// GA9xx - Internal
// =============================================================================

/// GA901: Internal allocator error.
pub const GA901: Diagnostic = Diagnostic::error(
    "GA901",
    "internal allocator error"
).with_note("this indicates a bug in gfxalloc");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predefined_codes() {
        assert_eq!(GA001.kind, DiagnosticKind::Warning);
        assert_eq!(GA102.kind, DiagnosticKind::Error);
        assert_eq!(GA102.code, "GA102");
        assert!(GA101.help.is_some());
        assert!(GA901.help.is_none());
    }
}
