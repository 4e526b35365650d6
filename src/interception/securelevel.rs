// src/interception/securelevel.rs
//! Secure-level interception
//!
//! Swaps the handler behind `kern.securelevel`. Unlike the other modules this
//! one has no pass-through branch: every caller, filtered or not, is told the
//! hardened value. The replacement never consults ground truth because its
//! output does not depend on it.

use crate::hook::binding::HookBinding;
use crate::hook::patcher::MemoryGuard;
use crate::identity::Classifier;
use crate::interception::ModuleState;
use crate::registry::navigator::swap_handler;
use crate::registry::node::{NodeKind, OidHandler, SysctlTree};
use crate::utils::errors::Result;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Registry path of the intercepted leaf
pub const SECURELEVEL_PATH: [&str; 2] = ["kern", "securelevel"];

/// Secure-level interception module
pub struct SecureLevelModule {
    spoofed_level: i32,
    classifier: Classifier,
    binding: Option<HookBinding<OidHandler>>,
    state: ModuleState,
}

impl SecureLevelModule {
    pub fn new(spoofed_level: i32, classifier: Classifier) -> Self {
        Self {
            spoofed_level,
            classifier,
            binding: None,
            state: ModuleState::Uninitialized,
        }
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Install the replacement handler. Required hook: failure is fatal.
    pub fn init(&mut self, tree: &SysctlTree, guard: &dyn MemoryGuard) -> Result<()> {
        debug!("securelevel module starting");
        self.state = ModuleState::Resolving;

        let replacement = elevated_handler(self.spoofed_level, self.classifier.clone());
        match swap_handler(tree, &SECURELEVEL_PATH, NodeKind::Int, replacement, guard) {
            Ok(original) => {
                self.binding = Some(HookBinding::installed(SECURELEVEL_PATH.join("."), original));
                self.state = ModuleState::Installed;
                info!("kern.securelevel rerouted successfully");
                Ok(())
            }
            Err(e) => {
                self.state = ModuleState::Failed;
                error!(error = %e, "failed to reroute kern.securelevel");
                Err(e)
            }
        }
    }
}

/// Replacement handler: a fixed elevated constant for every caller
fn elevated_handler(level: i32, classifier: Classifier) -> OidHandler {
    Arc::new(move |req| {
        let (identity, pid) = classifier.current();
        debug!(
            caller = %identity,
            pid,
            value = level,
            "securelevel accessed, spoofing value"
        );
        req.return_int(level)
    })
}
