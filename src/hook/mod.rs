// src/hook/mod.rs
//! Hook installation boundary
//!
//! The engine does not patch memory itself; it consumes two primitives from
//! the host (resolve a symbolic name to an address, install a replacement and
//! get the original back) and layers typed bindings on top:
//!
//! - **Patcher**: the consumed resolve/route interface
//! - **MemoryGuard / WritePermit**: scoped writable-memory permission
//! - **HookBinding / reroute**: typed, write-once capture of the original

pub mod binding;
pub mod patcher;

pub use binding::{reroute, HookBinding};
pub use patcher::{
    Address, MemoryGuard, NoopGuard, Patcher, RoutedHandler, WritePermit, MIN_ROUTE_DISTANCE,
};
