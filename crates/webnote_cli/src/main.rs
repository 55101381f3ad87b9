//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `webnote_core` linkage.
//! - Keep output deterministic for quick local sanity checks.

fn main() {
    println!("webnote_core ping={}", webnote_core::ping());
    println!("webnote_core version={}", webnote_core::core_version());
}
