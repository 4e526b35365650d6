// src/utils/errors.rs
//! Engine error types
//!
//! One taxonomy for the whole crate:
//!
//! - resolution failures (symbolic target not found)
//! - route failures (replacement could not be installed)
//! - traversal failures (expected registry node missing or malformed)
//! - configuration errors
//! - fatal conditions the orchestrator refuses to continue past
//!
//! Construction failures (a filtered container could not be allocated) are
//! deliberately *not* errors: every handler falls back to the original,
//! unfiltered value instead of propagating them.

use thiserror::Error;

/// Errors produced by the interception engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// A symbolic target could not be resolved to an address
    #[error("failed to resolve symbol '{0}'")]
    SymbolResolution(String),

    /// A replacement could not be installed over a resolved target
    #[error("failed to route '{symbol}': {reason}")]
    RouteFailed { symbol: String, reason: String },

    /// A registry-tree path had no matching node
    #[error("registry path '{0}' not found")]
    Traversal(String),

    /// The node targeted for a handler swap failed its preconditions
    #[error("refusing handler swap at '{path}': {reason}")]
    HandlerSwap { path: String, reason: String },

    /// Configuration could not be loaded or was invalid
    #[error("configuration error: {0}")]
    Config(String),

    /// A condition the orchestrator treats as fatal for the host process
    #[error("fatal: {0}")]
    Fatal(String),
}

/// Crate-wide result type
pub type Result<T> = std::result::Result<T, EngineError>;
