// src/lib.rs
//! Mirage Interception Engine Library
//!
//! This library implements a selective interception layer over a handful of
//! host introspection interfaces: hypervisor presence, secure-level, device
//! registry properties and loaded-extension listings. Answers are rewritten
//! per calling process according to configured filter lists.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **hook**: Symbol resolution, rerouting and typed hook bindings
//! - **identity**: Caller-identity classification and filter sets
//! - **registry**: Sysctl-style registry tree and handler navigation
//! - **host**: Boundary traits, object model, and the simulated host
//! - **interception**: Per-interface response-policy handlers
//! - **orchestrator**: Boot sequence and module lifecycle
//! - **observability**: Tracing and logging
//! - **utils**: Configuration, errors, and common helpers

// Public module exports
pub mod hook;
pub mod host;
pub mod identity;
pub mod interception;
pub mod observability;
pub mod orchestrator;
pub mod registry;
pub mod utils;

// Re-export commonly used types
pub use orchestrator::{Engine, HostBindings};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
