// src/identity/mod.rs
//! Caller-identity classification and filter sets
//!
//! Every intercepted interface decides its behavior from the identity of the
//! process *currently executing* the call. This module owns:
//!
//! - **Classifier**: resolves the caller into a stable identity string
//! - **FilterSet**: per-module caller allow/deny lists (exact name match)
//! - **ClassFilterSet**: registry-entry class names hidden from in-scope callers

pub mod classifier;
pub mod filter;

pub use classifier::{CallerContext, CallerResolver, Classifier, MAX_COMM_LEN};
pub use filter::{ClassFilterSet, FilterSet, ProcessDescriptor};
