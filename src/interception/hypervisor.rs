// src/interception/hypervisor.rs
//! Hypervisor-presence interception
//!
//! Swaps the handler behind `kern.hv_vmm_present`. The replacement ignores
//! the true hardware state entirely: callers on the module's filter list are
//! told a hypervisor is present (1), everyone else that it is absent (0).
//! Both directions override ground truth, so the saved original is kept only
//! as the path back to the real answer.

use crate::hook::binding::HookBinding;
use crate::hook::patcher::MemoryGuard;
use crate::identity::{Classifier, FilterSet};
use crate::interception::ModuleState;
use crate::registry::navigator::swap_handler;
use crate::registry::node::{NodeKind, OidHandler, SysctlTree};
use crate::utils::errors::Result;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Registry path of the intercepted leaf
pub const HV_PRESENT_PATH: [&str; 2] = ["kern", "hv_vmm_present"];

/// Hypervisor-presence interception module
pub struct HypervisorModule {
    filter: FilterSet,
    classifier: Classifier,
    binding: Option<HookBinding<OidHandler>>,
    state: ModuleState,
}

impl HypervisorModule {
    pub fn new(filter: FilterSet, classifier: Classifier) -> Self {
        Self {
            filter,
            classifier,
            binding: None,
            state: ModuleState::Uninitialized,
        }
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Install the replacement handler. Required hook: failure is reported up
    /// and the orchestrator treats it as fatal.
    pub fn init(&mut self, tree: &SysctlTree, guard: &dyn MemoryGuard) -> Result<()> {
        debug!("hypervisor module starting");
        self.state = ModuleState::Resolving;

        let replacement = presence_handler(self.filter.clone(), self.classifier.clone());
        match swap_handler(tree, &HV_PRESENT_PATH, NodeKind::Int, replacement, guard) {
            Ok(original) => {
                self.binding = Some(HookBinding::installed(HV_PRESENT_PATH.join("."), original));
                self.state = ModuleState::Installed;
                info!("kern.hv_vmm_present rerouted successfully");
                Ok(())
            }
            Err(e) => {
                self.state = ModuleState::Failed;
                error!(error = %e, "failed to reroute kern.hv_vmm_present");
                Err(e)
            }
        }
    }
}

/// Replacement handler: presence is a pure function of caller identity
fn presence_handler(filter: FilterSet, classifier: Classifier) -> OidHandler {
    Arc::new(move |req| {
        let (identity, pid) = classifier.current();
        let present = i32::from(filter.matches(&identity));
        if present == 1 {
            debug!(
                caller = %identity,
                pid,
                "caller is on the filter list, reporting hv_vmm_present as 1"
            );
        } else {
            debug!(
                caller = %identity,
                pid,
                "caller is not on the filter list, reporting hv_vmm_present as 0"
            );
        }
        req.return_int(present)
    })
}
