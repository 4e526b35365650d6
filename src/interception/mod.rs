// src/interception/mod.rs
//! Response-policy handlers
//!
//! One file per intercepted subsystem. Every handler follows the same shape:
//!
//! ```text
//! original = invoke saved original      (always first, so logs are accurate)
//! identity = classify current caller
//! out of scope  -> return original unmodified, silently
//! in scope      -> apply this interface's policy (spoof / filter / observe)
//! ```
//!
//! The two unconditional handlers (secure-level, extension-info scrub) do not
//! gate on identity; their purpose is the same answer for every observer.
//!
//! - **hypervisor**: `kern.hv_vmm_present` reports 1 only to filtered callers
//! - **securelevel**: `kern.securelevel` always reports the elevated constant
//! - **kext_info**: loaded-extension listings scrubbed of excluded publishers
//! - **device_registry**: property spoofing, class-filtered service matching,
//!   and observation-only name/iterator taps

pub mod device_registry;
pub mod hypervisor;
pub mod kext_info;
pub mod securelevel;

pub use device_registry::DeviceRegistryModule;
pub use hypervisor::HypervisorModule;
pub use kext_info::KextInfoModule;
pub use securelevel::SecureLevelModule;

/// Lifecycle of one interception module. There is no removed state: once
/// installed, hooks are permanent for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Uninitialized,
    Resolving,
    Installed,
    Failed,
}
