// src/registry/mod.rs
//! Hierarchical named-record registry
//!
//! The host owns a small tree of named nodes (the sysctl directory); the
//! engine only reads it and performs exactly one guarded write per module:
//! the handler-pointer swap. Lookups are fresh linear scans — the tree holds
//! tens of entries and is only walked at initialization.

pub mod navigator;
pub mod node;

pub use navigator::{find_node, swap_handler};
pub use node::{NodeKind, OidHandler, QueryRequest, RegistryNode, SysctlTree};
