//! RTCC Configuration Module
//!
//! Provides deployment configuration loaded from TOML files, replacing
//! hardcoded engine thresholds with operator-tunable values.
//!
//! ## Loading Order
//!
//! 1. `RTCC_CONFIG` environment variable (path to TOML file)
//! 2. `rtcc_config.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(RtccConfig::load());
//!
//! // Anywhere in the codebase:
//! let threshold = config::get().fusion.similarity_threshold;
//! ```

mod rtcc_config;

pub use rtcc_config::*;

use std::sync::OnceLock;

/// Global deployment configuration, initialized once at startup.
static RTCC_CONFIG: OnceLock<RtccConfig> = OnceLock::new();

/// Initialize the global configuration.
///
/// Must be called exactly once before any calls to `get()`.
pub fn init(config: RtccConfig) {
    if RTCC_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global configuration.
///
/// Panics if `init()` has not been called. A missing config is a fatal
/// startup error, not a recoverable condition.
pub fn get() -> &'static RtccConfig {
    RTCC_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

/// Check whether the config has been initialized.
///
/// Useful for tests and optional config paths.
pub fn is_initialized() -> bool {
    RTCC_CONFIG.get().is_some()
}
