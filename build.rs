//! Build script for gfxalloc.
//!
//! Provides build-time feature notes for users integrating gfxalloc into
//! their renderer.

use std::env;

fn main() {
    // Re-run if features change
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_PARKING_LOT");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_DIAGNOSTICS");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_LOG");
    println!("cargo:rerun-if-env-changed=GFXALLOC_QUIET");

    if env::var("GFXALLOC_QUIET").is_ok() {
        return;
    }

    let parking_lot_enabled = env::var("CARGO_FEATURE_PARKING_LOT").is_ok();
    let diagnostics_enabled = env::var("CARGO_FEATURE_DIAGNOSTICS").is_ok();
    let log_enabled = env::var("CARGO_FEATURE_LOG").is_ok();

    let profile = env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());
    let is_release = profile == "release";

    // =========================================================================
    // Feature-specific diagnostics
    // =========================================================================

    if diagnostics_enabled && is_release {
        emit_info("Diagnostics enabled in release build");
        emit_note("GA-coded diagnostics will be printed to stderr.");
    }

    if log_enabled {
        emit_info("Routing diagnostics and block lifecycle events through the log crate");
    }

    if is_release && !parking_lot_enabled {
        emit_note("Tip: Consider enabling 'parking_lot' for better mutex performance:");
        emit_note("  gfxalloc = { version = \"0.1\", features = [\"parking_lot\"] }");
    }

    check_target_features();
}

// =============================================================================
// Diagnostic emission helpers
// =============================================================================

fn emit_info(msg: &str) {
    println!("cargo:warning=[gfxalloc] {}", msg);
}

fn emit_note(msg: &str) {
    println!("cargo:warning=[gfxalloc]    {}", msg);
}

fn emit_warning(msg: &str) {
    println!("cargo:warning=[gfxalloc] warning: {}", msg);
}

// =============================================================================
// Environment checks
// =============================================================================

fn check_target_features() {
    let pointer_width = env::var("CARGO_CFG_TARGET_POINTER_WIDTH").unwrap_or_default();
    if pointer_width == "16" {
        emit_warning("16-bit targets cannot address a full heap range");
        emit_note("Heap offsets are u32; scratch arenas are limited by usize.");
    }

    let target = env::var("TARGET").unwrap_or_default();
    if target.contains("wasm") && env::var("CARGO_FEATURE_PARKING_LOT").is_ok() {
        emit_note("parking_lot on WebAssembly falls back to spinning without threads support.");
    }
}
