// src/interception/device_registry.rs
//! Device-registry interception
//!
//! Hooks six named entry points of the host's device registry:
//!
//! - property-by-symbol and property-by-string-key lookups (spoofing)
//! - name lookup and iterator-next (observation only, never spoofed)
//! - service matching, singular and plural (class filtering)
//!
//! For in-scope callers the sensitive property key is answered with a fixed
//! constant regardless of the owning class, and matched services whose class
//! is on the hidden list disappear from results. Out-of-scope callers always
//! get the original answer with no logging.
//!
//! The two property replacements are co-located; before routing either, the
//! distance between their resolved targets is checked and the string-key
//! variant is skipped when they sit too close together.

use crate::hook::binding::{reroute, HookBinding};
use crate::hook::patcher::{Patcher, MIN_ROUTE_DISTANCE};
use crate::host::objects::{EntryIterator, MatchingDict, PropKey, PropValue, ServiceEntry};
use crate::host::CollectionFactory;
use crate::identity::{Classifier, ClassFilterSet, FilterSet};
use crate::interception::ModuleState;
use crate::utils::errors::Result;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Mangled names of the hooked entry points
pub const SYM_GET_PROPERTY: &str = "__ZNK15IORegistryEntry11getPropertyEPK8OSSymbol";
pub const SYM_GET_PROPERTY_CSTR: &str = "__ZNK15IORegistryEntry11getPropertyEPKc";
pub const SYM_GET_NAME: &str = "__ZNK15IORegistryEntry7getNameEPK15IORegistryPlane";
pub const SYM_ITER_NEXT: &str = "__ZN20OSCollectionIterator13getNextObjectEv";
pub const SYM_MATCH_SERVICES: &str = "__ZN9IOService19getMatchingServicesEP12OSDictionary";
pub const SYM_MATCH_SERVICE: &str = "__ZN9IOService19copyMatchingServiceEP12OSDictionary";

/// Shapes of the hooked functions
pub type GetPropertyFn =
    Arc<dyn Fn(&ServiceEntry, &PropKey) -> Option<PropValue> + Send + Sync>;
pub type GetPropertyCstrFn =
    Arc<dyn Fn(&ServiceEntry, &str) -> Option<PropValue> + Send + Sync>;
pub type GetNameFn = Arc<dyn Fn(&ServiceEntry) -> String + Send + Sync>;
pub type IterNextFn =
    Arc<dyn Fn(&mut EntryIterator) -> Option<Arc<ServiceEntry>> + Send + Sync>;
pub type MatchServicesFn =
    Arc<dyn Fn(&MatchingDict) -> Option<EntryIterator> + Send + Sync>;
pub type MatchServiceFn =
    Arc<dyn Fn(&MatchingDict) -> Option<Arc<ServiceEntry>> + Send + Sync>;

/// Shared per-call policy state. Originals are write-once: captured at init,
/// read-only afterwards for the life of the process.
struct RegistryPolicy {
    filter: FilterSet,
    hidden: ClassFilterSet,
    classifier: Classifier,
    factory: Arc<dyn CollectionFactory>,
    sensitive_key: String,
    spoof_value: String,
    orig_get_property: OnceCell<GetPropertyFn>,
    orig_get_name: OnceCell<GetNameFn>,
    orig_iter_next: OnceCell<IterNextFn>,
    orig_match_services: OnceCell<MatchServicesFn>,
    orig_match_service: OnceCell<MatchServiceFn>,
}

impl RegistryPolicy {
    /// Property-by-symbol policy: spoof the sensitive key for in-scope
    /// callers, observe everything else they ask.
    fn get_property(&self, entry: &ServiceEntry, key: &PropKey) -> Option<PropValue> {
        // Always compute the true answer first so the log can report it.
        let original = self
            .orig_get_property
            .get()
            .and_then(|f| f(entry, key));

        let (identity, pid) = self.classifier.current();
        if !self.filter.matches(&identity) {
            return original;
        }

        if key.as_str() == self.sensitive_key {
            let was = original
                .as_ref()
                .map(PropValue::summary)
                .unwrap_or_else(|| "<none>".to_string());
            debug!(
                key = %key.as_str(),
                class = %entry.class_name,
                caller = %identity,
                pid,
                "sensitive key spoofed. Was: '{}' -> Now: '{}'",
                was,
                self.spoof_value
            );
            return Some(PropValue::Str(self.spoof_value.clone()));
        }

        match &original {
            Some(value) => debug!(
                key = %key.as_str(),
                class = %entry.class_name,
                caller = %identity,
                pid,
                value = %value.summary(),
                "property observed"
            ),
            None => debug!(
                key = %key.as_str(),
                class = %entry.class_name,
                caller = %identity,
                pid,
                "property observed, no value"
            ),
        }
        original
    }

    /// Property-by-string-key policy: normalize into the symbol key type and
    /// delegate. The temporary key is dropped on every exit path.
    fn get_property_cstr(&self, entry: &ServiceEntry, key: &str) -> Option<PropValue> {
        let symbol_key = PropKey::new(key);
        self.get_property(entry, &symbol_key)
    }

    /// Name lookup: observation only, value passthrough always
    fn get_name(&self, entry: &ServiceEntry) -> String {
        let name = self
            .orig_get_name
            .get()
            .map(|f| f(entry))
            .unwrap_or_default();

        let (identity, pid) = self.classifier.current();
        if self.filter.matches(&identity) {
            debug!(
                class = %entry.class_name,
                caller = %identity,
                pid,
                name = %name,
                "getName observed"
            );
        }
        name
    }

    /// Iterator-next: observation only, passthrough always
    fn iterator_next(&self, iter: &mut EntryIterator) -> Option<Arc<ServiceEntry>> {
        let obj = self.orig_iter_next.get().and_then(|f| f(iter));

        let (identity, pid) = self.classifier.current();
        if self.filter.matches(&identity) {
            let class = obj
                .as_ref()
                .map(|e| e.class_name.as_str())
                .unwrap_or("<none>");
            debug!(class, caller = %identity, pid, "getNextObject observed");
        }
        obj
    }

    /// Plural service match: rebuild the result without hidden classes
    fn match_services(&self, matching: &MatchingDict) -> Option<EntryIterator> {
        let original = self.orig_match_services.get().and_then(|f| f(matching))?;

        let (identity, pid) = self.classifier.current();
        if !self.filter.matches(&identity) {
            return Some(original);
        }

        let total = original.len();
        let Some(mut kept) = self.factory.entry_list_with_capacity(total) else {
            warn!(
                caller = %identity,
                "failed to allocate filtered service list, returning unfiltered iterator"
            );
            return Some(original);
        };

        let mut hidden_count = 0usize;
        for entry in original.remaining() {
            if self.hidden.contains(&entry.class_name) {
                debug!(
                    class = %entry.class_name,
                    caller = %identity,
                    pid,
                    "hiding matched service"
                );
                hidden_count += 1;
            } else {
                kept.push(Arc::clone(entry));
            }
        }

        debug!(
            total,
            kept = kept.len(),
            hidden = hidden_count,
            caller = %identity,
            "returning filtered service iterator"
        );
        // The original iterator is dropped here; the fresh one transfers to
        // the caller.
        Some(EntryIterator::new(kept))
    }

    /// Singular service match: suppress a hidden-class match entirely
    fn match_service(&self, matching: &MatchingDict) -> Option<Arc<ServiceEntry>> {
        let original = self.orig_match_service.get().and_then(|f| f(matching));

        let (identity, pid) = self.classifier.current();
        if !self.filter.matches(&identity) {
            return original;
        }

        match original {
            Some(entry) if self.hidden.contains(&entry.class_name) => {
                debug!(
                    class = %entry.class_name,
                    caller = %identity,
                    pid,
                    "suppressing matched service"
                );
                None
            }
            other => other,
        }
    }
}

/// Device-registry interception module
pub struct DeviceRegistryModule {
    policy: Arc<RegistryPolicy>,
    binding_property: Option<HookBinding<GetPropertyFn>>,
    binding_property_cstr: Option<HookBinding<GetPropertyCstrFn>>,
    binding_name: Option<HookBinding<GetNameFn>>,
    binding_iter: Option<HookBinding<IterNextFn>>,
    binding_match_services: Option<HookBinding<MatchServicesFn>>,
    binding_match_service: Option<HookBinding<MatchServiceFn>>,
    state: ModuleState,
}

impl DeviceRegistryModule {
    pub fn new(
        filter: FilterSet,
        hidden: ClassFilterSet,
        classifier: Classifier,
        factory: Arc<dyn CollectionFactory>,
        sensitive_key: impl Into<String>,
        spoof_value: impl Into<String>,
    ) -> Self {
        Self {
            policy: Arc::new(RegistryPolicy {
                filter,
                hidden,
                classifier,
                factory,
                sensitive_key: sensitive_key.into(),
                spoof_value: spoof_value.into(),
                orig_get_property: OnceCell::new(),
                orig_get_name: OnceCell::new(),
                orig_iter_next: OnceCell::new(),
                orig_match_services: OnceCell::new(),
                orig_match_service: OnceCell::new(),
            }),
            binding_property: None,
            binding_property_cstr: None,
            binding_name: None,
            binding_iter: None,
            binding_match_services: None,
            binding_match_service: None,
            state: ModuleState::Uninitialized,
        }
    }

    pub fn state(&self) -> ModuleState {
        self.state
    }

    /// Whether the string-key property variant was actually routed
    pub fn cstr_variant_installed(&self) -> bool {
        self.binding_property_cstr.is_some()
    }

    /// Install all replacements. The property, singular-match and
    /// plural-match hooks are required; the observation-only taps are
    /// secondary and skippable.
    pub fn init(&mut self, patcher: &dyn Patcher) -> Result<()> {
        debug!("device registry module starting");
        self.state = ModuleState::Resolving;
        match self.install(patcher) {
            Ok(()) => {
                self.state = ModuleState::Installed;
                info!("device registry hooks installed");
                Ok(())
            }
            Err(e) => {
                self.state = ModuleState::Failed;
                error!(error = %e, "device registry module failed to install");
                Err(e)
            }
        }
    }

    fn install(&mut self, patcher: &dyn Patcher) -> Result<()> {
        // Distance policy for the co-located property replacements, decided
        // before either is routed.
        let route_cstr = match (
            patcher.solve_symbol(SYM_GET_PROPERTY),
            patcher.solve_symbol(SYM_GET_PROPERTY_CSTR),
        ) {
            (Some(a), Some(b)) => {
                let gap = patcher.distance(a, b);
                if gap < MIN_ROUTE_DISTANCE {
                    warn!(
                        gap,
                        min = MIN_ROUTE_DISTANCE,
                        "property targets are co-located, installing only the symbol variant"
                    );
                    false
                } else {
                    true
                }
            }
            _ => true,
        };

        let p = Arc::clone(&self.policy);
        let replacement: GetPropertyFn = Arc::new(move |entry, key| p.get_property(entry, key));
        let binding = reroute(patcher, SYM_GET_PROPERTY, replacement)?;
        if let Some(original) = binding.original() {
            let _ = self.policy.orig_get_property.set(Arc::clone(original));
        }
        self.binding_property = Some(binding);

        if route_cstr {
            let p = Arc::clone(&self.policy);
            let replacement: GetPropertyCstrFn =
                Arc::new(move |entry, key| p.get_property_cstr(entry, key));
            let binding = reroute(patcher, SYM_GET_PROPERTY_CSTR, replacement)?;
            self.binding_property_cstr = Some(binding);
        }

        // Observation-only taps are secondary hooks: a failure is logged and
        // skipped rather than failing the module.
        let p = Arc::clone(&self.policy);
        let replacement: GetNameFn = Arc::new(move |entry| p.get_name(entry));
        match reroute(patcher, SYM_GET_NAME, replacement) {
            Ok(binding) => {
                if let Some(original) = binding.original() {
                    let _ = self.policy.orig_get_name.set(Arc::clone(original));
                }
                self.binding_name = Some(binding);
            }
            Err(e) => warn!(error = %e, "skipping optional getName tap"),
        }

        let p = Arc::clone(&self.policy);
        let replacement: IterNextFn = Arc::new(move |iter| p.iterator_next(iter));
        match reroute(patcher, SYM_ITER_NEXT, replacement) {
            Ok(binding) => {
                if let Some(original) = binding.original() {
                    let _ = self.policy.orig_iter_next.set(Arc::clone(original));
                }
                self.binding_iter = Some(binding);
            }
            Err(e) => warn!(error = %e, "skipping optional getNextObject tap"),
        }

        let p = Arc::clone(&self.policy);
        let replacement: MatchServicesFn = Arc::new(move |matching| p.match_services(matching));
        let binding = reroute(patcher, SYM_MATCH_SERVICES, replacement)?;
        if let Some(original) = binding.original() {
            let _ = self.policy.orig_match_services.set(Arc::clone(original));
        }
        self.binding_match_services = Some(binding);

        let p = Arc::clone(&self.policy);
        let replacement: MatchServiceFn = Arc::new(move |matching| p.match_service(matching));
        let binding = reroute(patcher, SYM_MATCH_SERVICE, replacement)?;
        if let Some(original) = binding.original() {
            let _ = self.policy.orig_match_service.set(Arc::clone(original));
        }
        self.binding_match_service = Some(binding);

        Ok(())
    }
}
