//! Diagnostic macros.

/// Emit a runtime diagnostic built in place.
///
/// ```rust,ignore
/// ga_diagnostic!(
///     Warning,
///     code = "GA001",
///     message = "heap has no free span large enough",
///     help = "grow the heap set"
/// );
/// ```
#[macro_export]
macro_rules! ga_diagnostic {
    (
        $kind:ident,
        code = $code:expr,
        message = $msg:expr
        $(, note = $note:expr)?
        $(, help = $help:expr)?
    ) => {{
        let diag = $crate::diagnostics::Diagnostic {
            kind: $crate::diagnostics::DiagnosticKind::$kind,
            code: $code,
            message: $msg,
            note: None $(.or(Some($note)))?,
            help: None $(.or(Some($help)))?,
        };
        $crate::diagnostics::emit::emit(&diag);
    }};
}

/// Emit a predefined diagnostic by code.
///
/// ```rust,ignore
/// ga_emit!(GA002);
/// ```
#[macro_export]
macro_rules! ga_emit {
    ($code:ident) => {{
        $crate::diagnostics::emit::emit(&$crate::diagnostics::$code);
    }};
}
