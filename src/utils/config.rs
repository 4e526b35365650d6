// src/utils/config.rs
//! Engine configuration
//!
//! Loads from an optional `mirage.{yaml,json,toml}` file plus `MIRAGE_*`
//! environment overrides. Every field has a built-in default, so a bare
//! `EngineConfig::default()` reproduces the stock behavior without any
//! external configuration present.

use crate::utils::errors::{EngineError, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Values substituted for intercepted answers
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpoofConfig {
    /// Property key treated as sensitive by the device-registry module
    pub sensitive_key: String,

    /// Fixed string returned for the sensitive key to in-scope callers
    pub manufacturer: String,

    /// Fixed value reported for the secure-level read, for every caller
    pub securelevel: i32,
}

impl Default for SpoofConfig {
    fn default() -> Self {
        Self {
            sensitive_key: "manufacturer".to_string(),
            manufacturer: "Apple Inc.".to_string(),
            securelevel: 1,
        }
    }
}

/// Per-module caller and class filter lists
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Callers that receive spoofed device-registry answers
    pub registry_observers: Vec<String>,

    /// Callers told that a hypervisor is present
    pub hypervisor_querents: Vec<String>,

    /// Registry-entry class names hidden from in-scope callers
    pub hidden_classes: Vec<String>,

    /// Bundle-identifier substrings scrubbed from extension listings
    pub excluded_publishers: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            registry_observers: vec![
                "Terminal".to_string(),
                "ioreg".to_string(),
                "LeagueClient".to_string(),
                "LeagueofLegends".to_string(),
                "LeagueClientUx H".to_string(),
                "RiotClientServic".to_string(),
            ],
            hypervisor_querents: vec![
                "SoftwareUpdateNo".to_string(),
                "softwareupdated".to_string(),
                "com.apple.Mobile".to_string(),
                "osinstallersetup".to_string(),
            ],
            hidden_classes: vec![
                "AppleVirtIONetwork".to_string(),
                "AppleVirtIOBlockStorageDevice".to_string(),
                "AppleParavirtGPU".to_string(),
            ],
            excluded_publishers: vec![
                "org.Carnations".to_string(),
                "org.acidanthera".to_string(),
                "as.vit9696".to_string(),
                "com.sn-labs".to_string(),
            ],
        }
    }
}

/// Module on/off toggles; once a module is installed it stays installed
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ModulesConfig {
    pub hypervisor: bool,
    pub securelevel: bool,
    pub kext_info: bool,
    pub device_registry: bool,
}

impl Default for ModulesConfig {
    fn default() -> Self {
        Self {
            hypervisor: true,
            securelevel: true,
            kext_info: true,
            device_registry: true,
        }
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub spoof: SpoofConfig,
    pub filters: FilterConfig,
    pub modules: ModulesConfig,

    /// Free-form patch options. If it contains the substring "sbvmm" the
    /// hypervisor module is skipped at boot.
    pub patch_opts: String,
}

impl EngineConfig {
    /// Load configuration from the default sources
    pub fn load() -> Result<Self> {
        let cfg = Config::builder()
            .add_source(File::with_name("mirage").required(false))
            .add_source(Environment::with_prefix("MIRAGE").separator("__"))
            .build()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        cfg.try_deserialize()
            .map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let cfg = Config::builder()
            .add_source(File::from(path))
            .build()
            .map_err(|e| EngineError::Config(e.to_string()))?;

        cfg.try_deserialize()
            .map_err(|e| EngineError::Config(e.to_string()))
    }

    /// Whether the hypervisor module should be skipped at boot
    pub fn skip_hypervisor(&self) -> bool {
        !self.modules.hypervisor || self.patch_opts.contains("sbvmm")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.spoof.manufacturer, "Apple Inc.");
        assert_eq!(cfg.spoof.securelevel, 1);
        assert!(cfg.filters.registry_observers.contains(&"LeagueClient".to_string()));
        assert!(cfg.filters.excluded_publishers.contains(&"org.acidanthera".to_string()));
        assert!(cfg.modules.hypervisor);
        assert!(!cfg.skip_hypervisor());
    }

    #[test]
    fn test_sbvmm_opt_out() {
        let cfg = EngineConfig {
            patch_opts: "auto,sbvmm".to_string(),
            ..EngineConfig::default()
        };
        assert!(cfg.skip_hypervisor());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "spoof:\n  manufacturer: \"Test Corp.\"\nmodules:\n  hypervisor: false"
        )
        .unwrap();

        let cfg = EngineConfig::load_from(file.path()).unwrap();
        assert_eq!(cfg.spoof.manufacturer, "Test Corp.");
        assert!(!cfg.modules.hypervisor);
        assert!(cfg.skip_hypervisor());
        // Untouched sections keep their defaults
        assert_eq!(cfg.spoof.securelevel, 1);
    }
}
