// src/interception/kext_info.rs
//! Loaded-extension info interception
//!
//! Hooks the loaded-extension enumeration and returns a freshly built mapping
//! with every bundle identifier containing an excluded-publisher substring
//! removed. This scrub is unconditional — it applies to every caller, not an
//! allow/deny list — because its purpose is to hide tooling fingerprints from
//! all observers alike.
//!
//! Fallbacks: if the filtered map cannot be constructed the original,
//! unfiltered map is returned; if the original handler was never captured an
//! empty map is returned instead of invoking a null reference.

use crate::hook::binding::{reroute, HookBinding};
use crate::hook::patcher::Patcher;
use crate::host::objects::KextInfoDict;
use crate::host::CollectionFactory;
use crate::identity::Classifier;
use crate::interception::ModuleState;
use crate::utils::errors::Result;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Mangled name of the hooked enumeration entry point
pub const SYM_COPY_KEXT_INFO: &str = "__ZN6OSKext18copyLoadedKextInfoEP7OSArrayS1_";

/// Shape of the hooked function: optional identifier filter in, owned info
/// mapping out (ownership of the returned map transfers to the caller)
pub type CopyKextInfoFn =
    Arc<dyn Fn(Option<&[String]>) -> Option<KextInfoDict> + Send + Sync>;

/// Loaded-extension info interception module
pub struct KextInfoModule {
    excluded: Arc<Vec<String>>,
    classifier: Classifier,
    factory: Arc<dyn CollectionFactory>,
    binding: Option<HookBinding<CopyKextInfoFn>>,
    state: ModuleState,
}

impl KextInfoModule {
    pub fn new(
        excluded: Vec<String>,
        classifier: Classifier,
        factory: Arc<dyn CollectionFactory>,
    ) -> Self {
        Self {
            excluded: Arc::new(excluded),
            classifier,
            factory,
            binding: None,
            state: ModuleState::Uninitialized,
        }
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Install the replacement. Required hook: failure is fatal.
    pub fn init(&mut self, patcher: &dyn Patcher) -> Result<()> {
        debug!("kext info module starting");
        self.state = ModuleState::Resolving;

        // The original is captured after routing, so the replacement reads it
        // through a write-once cell.
        let original_cell: Arc<OnceCell<CopyKextInfoFn>> = Arc::new(OnceCell::new());
        let replacement = scrub_handler(
            Arc::clone(&self.excluded),
            self.classifier.clone(),
            Arc::clone(&self.factory),
            Arc::clone(&original_cell),
        );

        match reroute::<CopyKextInfoFn>(patcher, SYM_COPY_KEXT_INFO, replacement) {
            Ok(binding) => {
                if let Some(original) = binding.original() {
                    let _ = original_cell.set(Arc::clone(original));
                }
                self.binding = Some(binding);
                self.state = ModuleState::Installed;
                info!("copyLoadedKextInfo rerouted successfully");
                Ok(())
            }
            Err(e) => {
                self.state = ModuleState::Failed;
                error!(error = %e, "failed to reroute copyLoadedKextInfo");
                Err(e)
            }
        }
    }
}

/// Replacement: rebuild the info map without excluded publishers
fn scrub_handler(
    excluded: Arc<Vec<String>>,
    classifier: Classifier,
    factory: Arc<dyn CollectionFactory>,
    original_cell: Arc<OnceCell<CopyKextInfoFn>>,
) -> CopyKextInfoFn {
    Arc::new(move |identifiers| {
        let (identity, pid) = classifier.current();
        debug!(caller = %identity, pid, "loaded-extension info requested");

        let Some(original_fn) = original_cell.get() else {
            warn!(
                caller = %identity,
                "original copyLoadedKextInfo was never captured, returning empty info"
            );
            return Some(KextInfoDict::new());
        };

        let original = original_fn(identifiers)?;
        let total = original.len();

        let Some(mut filtered) =
            factory.kext_dict_with_capacity(total.saturating_sub(1))
        else {
            warn!(
                caller = %identity,
                "failed to allocate filtered info map, returning original"
            );
            return Some(original);
        };

        let mut removed = 0usize;
        for (bundle_id, info) in &original {
            match excluded.iter().find(|f| bundle_id.contains(f.as_str())) {
                Some(matched) => {
                    debug!(
                        bundle = %bundle_id,
                        filter = %matched,
                        caller = %identity,
                        pid,
                        "filtering out extension"
                    );
                    removed += 1;
                }
                None => {
                    filtered.insert(bundle_id.clone(), Arc::clone(info));
                }
            }
        }

        debug!(
            total,
            kept = filtered.len(),
            removed,
            caller = %identity,
            "returning filtered extension info"
        );
        Some(filtered)
    })
}
