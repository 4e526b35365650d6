// src/observability/mod.rs
//! Tracing initialization
//!
//! All engine diagnostics go through `tracing`. Emission never blocks and a
//! failed log line is never propagated to a handler's caller.

use crate::utils::errors::{EngineError, Result};
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Honors `RUST_LOG`; defaults to `info` when unset. Safe to call from the
/// binary exactly once.
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| EngineError::Config(format!("failed to initialize tracing: {e}")))
}
