//! Logging utilities
//!
//! Messages carry a bracketed subsystem prefix (`[BUFFER]`, `[RECLAIM]`,
//! `[DESCRIPTOR]`, `[PIPELINE]`, `[SHADER]`, `[VULKAN]`) so `RUST_LOG` output can be
//! filtered by eye.

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system from `RUST_LOG`
///
/// Panics if a logger is already installed; use [`try_init`] when embedding.
pub fn init() {
    env_logger::init();
}

/// Initialize the logging system, ignoring an already installed logger
pub fn try_init() -> bool {
    env_logger::builder().is_test(cfg!(test)).try_init().is_ok()
}
