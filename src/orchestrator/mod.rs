// src/orchestrator/mod.rs
//! Module orchestrator
//!
//! Owns the boot sequence: gate on the host version, resolve the registry
//! tree once, then bring up each enabled interception module in a fixed
//! order. Any failure along the required path is fatal — a partially armed
//! engine is worse than none, because callers could observe an inconsistent
//! mix of spoofed and truthful answers.
//!
//! There is no teardown. Installed hooks are permanent for the life of the
//! process; `deinit` exists only to log that fact.

use crate::hook::patcher::{MemoryGuard, Patcher};
use crate::host::sim::SimHost;
use crate::host::{version, CollectionFactory, DarwinVersion, SysctlTreeProvider};
use crate::identity::{CallerResolver, ClassFilterSet, Classifier, FilterSet};
use crate::interception::{
    DeviceRegistryModule, HypervisorModule, KextInfoModule, ModuleState, SecureLevelModule,
};
use crate::registry::node::SysctlTree;
use crate::utils::config::EngineConfig;
use crate::utils::errors::{EngineError, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Host services the engine consumes, bundled for construction
pub struct HostBindings {
    pub patcher: Arc<dyn Patcher>,
    pub resolver: Arc<dyn CallerResolver>,
    pub tree_provider: Arc<dyn SysctlTreeProvider>,
    pub factory: Arc<dyn CollectionFactory>,
    pub guard: Arc<dyn MemoryGuard>,
    pub version: DarwinVersion,
}

impl HostBindings {
    /// Bind every service to one simulated host
    pub fn for_sim(host: &Arc<SimHost>) -> Self {
        Self {
            patcher: host.clone(),
            resolver: host.clone(),
            tree_provider: host.clone(),
            factory: host.clone(),
            guard: host.clone(),
            version: host.version(),
        }
    }
}

/// One-time registry-tree resolution. A failed resolution is latched; it is
/// never retried within the same process.
enum TreeResolution {
    Pending,
    Resolved(SysctlTree),
    Failed,
}

/// The assembled engine
pub struct Engine {
    config: EngineConfig,
    host: HostBindings,
    tree: TreeResolution,
    hypervisor: Option<HypervisorModule>,
    securelevel: Option<SecureLevelModule>,
    kext_info: Option<KextInfoModule>,
    device_registry: Option<DeviceRegistryModule>,
    initialized: bool,
}

impl Engine {
    pub fn new(config: EngineConfig, host: HostBindings) -> Self {
        Self {
            config,
            host,
            tree: TreeResolution::Pending,
            hypervisor: None,
            securelevel: None,
            kext_info: None,
            device_registry: None,
            initialized: false,
        }
    }

    /// Boot sequence. Returns `EngineError::Fatal` when a required step
    /// fails; the process should not continue serving after that.
    pub fn init(&mut self) -> Result<()> {
        if self.initialized {
            warn!("engine already initialized, ignoring");
            return Ok(());
        }

        let major = self.host.version.major;
        info!(major, minor = self.host.version.minor, "engine starting");
        if major < version::HIGH_SIERRA {
            return Err(EngineError::Fatal(format!(
                "unsupported host version {major} (minimum {})",
                version::HIGH_SIERRA
            )));
        }

        let tree = self.resolve_tree()?;
        let classifier = Classifier::new(Arc::clone(&self.host.resolver));

        if self.config.skip_hypervisor() {
            info!("hypervisor module disabled by configuration");
        } else if major <= version::BIG_SUR {
            info!(major, "hypervisor module not applicable on this host version");
        } else {
            let filter = FilterSet::from_names(self.config.filters.hypervisor_querents.clone());
            let mut module = HypervisorModule::new(filter, classifier.clone());
            module
                .init(&tree, self.host.guard.as_ref())
                .map_err(|e| fatal("hypervisor", e))?;
            self.hypervisor = Some(module);
        }

        if self.config.modules.kext_info {
            let mut module = KextInfoModule::new(
                self.config.filters.excluded_publishers.clone(),
                classifier.clone(),
                Arc::clone(&self.host.factory),
            );
            module
                .init(self.host.patcher.as_ref())
                .map_err(|e| fatal("kext info", e))?;
            self.kext_info = Some(module);
        }

        if self.config.modules.securelevel {
            let mut module =
                SecureLevelModule::new(self.config.spoof.securelevel, classifier.clone());
            module
                .init(&tree, self.host.guard.as_ref())
                .map_err(|e| fatal("securelevel", e))?;
            self.securelevel = Some(module);
        }

        if self.config.modules.device_registry {
            let filter = FilterSet::from_names(self.config.filters.registry_observers.clone());
            let hidden = ClassFilterSet::from_names(self.config.filters.hidden_classes.clone());
            let mut module = DeviceRegistryModule::new(
                filter,
                hidden,
                classifier,
                Arc::clone(&self.host.factory),
                self.config.spoof.sensitive_key.clone(),
                self.config.spoof.manufacturer.clone(),
            );
            module
                .init(self.host.patcher.as_ref())
                .map_err(|e| fatal("device registry", e))?;
            self.device_registry = Some(module);
        }

        self.initialized = true;
        info!("engine armed");
        Ok(())
    }

    /// Installed hooks cannot be removed; shutdown is a logged no-op.
    pub fn deinit(&self) {
        info!("interception cannot be disabled, ignoring shutdown request");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn hypervisor_state(&self) -> Option<ModuleState> {
        self.hypervisor.as_ref().map(|m| m.state())
    }

    pub fn securelevel_state(&self) -> Option<ModuleState> {
        self.securelevel.as_ref().map(|m| m.state())
    }

    pub fn kext_info_state(&self) -> Option<ModuleState> {
        self.kext_info.as_ref().map(|m| m.state())
    }

    pub fn device_registry_state(&self) -> Option<ModuleState> {
        self.device_registry.as_ref().map(|m| m.state())
    }

    fn resolve_tree(&mut self) -> Result<SysctlTree> {
        match &self.tree {
            TreeResolution::Resolved(tree) => return Ok(Arc::clone(tree)),
            TreeResolution::Failed => {
                return Err(EngineError::Fatal(
                    "registry tree resolution already failed".to_string(),
                ))
            }
            TreeResolution::Pending => {}
        }

        match self.host.tree_provider.sysctl_children() {
            Some(tree) => {
                self.tree = TreeResolution::Resolved(Arc::clone(&tree));
                Ok(tree)
            }
            None => {
                self.tree = TreeResolution::Failed;
                error!("registry tree is unreachable");
                Err(EngineError::Fatal(
                    "failed to resolve the registry tree".to_string(),
                ))
            }
        }
    }
}

fn fatal(module: &str, err: EngineError) -> EngineError {
    error!(module, error = %err, "required module failed to install");
    EngineError::Fatal(format!("{module} module failed: {err}"))
}
