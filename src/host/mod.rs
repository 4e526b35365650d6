// src/host/mod.rs
//! Host boundary
//!
//! Everything the engine consumes from its host environment lives here: the
//! object model of the intercepted interfaces, the boundary traits, Darwin
//! version constants and an in-memory simulated host used by the tests and
//! the demo binary.

pub mod objects;
pub mod sim;

pub use objects::{
    EntryIterator, KextInfo, KextInfoDict, MatchingDict, PropKey, PropValue, ServiceEntry,
};
pub use sim::{SimHost, SimOptions};

use crate::registry::node::SysctlTree;
use std::sync::Arc;

/// Darwin major version constants used for gating
pub mod version {
    pub const HIGH_SIERRA: i32 = 17;
    pub const BIG_SUR: i32 = 20;
    pub const MONTEREY: i32 = 21;
    pub const VENTURA: i32 = 22;
    pub const SEQUOIA: i32 = 24;
    pub const TAHOE: i32 = 25;
}

/// Detected kernel version (consumed boundary)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DarwinVersion {
    pub major: i32,
    pub minor: i32,
}

impl DarwinVersion {
    pub fn new(major: i32, minor: i32) -> Self {
        Self { major, minor }
    }
}

/// Access to the host-owned registry tree (consumed boundary)
pub trait SysctlTreeProvider: Send + Sync {
    /// Handle to the populated tree, or None if it is not available
    fn sysctl_children(&self) -> Option<SysctlTree>;
}

/// Fallible container construction (consumed boundary).
///
/// Mirrors the host's own collection allocators: construction can fail, and
/// every policy that builds a filtered container falls back to the original,
/// unfiltered value when it does.
pub trait CollectionFactory: Send + Sync {
    fn kext_dict_with_capacity(&self, capacity: usize) -> Option<KextInfoDict>;
    fn entry_list_with_capacity(&self, capacity: usize) -> Option<Vec<Arc<ServiceEntry>>>;
}

/// Factory whose allocations always succeed
pub struct InfallibleCollections;

impl CollectionFactory for InfallibleCollections {
    fn kext_dict_with_capacity(&self, _capacity: usize) -> Option<KextInfoDict> {
        Some(KextInfoDict::new())
    }

    fn entry_list_with_capacity(&self, capacity: usize) -> Option<Vec<Arc<ServiceEntry>>> {
        Some(Vec::with_capacity(capacity))
    }
}
