// src/main.rs
//! Mirage Interception Engine
//!
//! Demo binary: boots the engine against the simulated host, then replays a
//! short script of queries from differently named callers to show the
//! per-caller policies in effect.

use anyhow::Result;
use mirage_engine::host::sim::{SimHost, SimOptions};
use mirage_engine::observability::init_tracing;
use mirage_engine::orchestrator::{Engine, HostBindings};
use mirage_engine::utils::config::EngineConfig;
use mirage_engine::utils::errors::EngineError;
use tracing::{error, info};

fn main() -> Result<()> {
    init_tracing()?;

    info!("Starting Mirage Interception Engine v{}", env!("CARGO_PKG_VERSION"));

    let config = EngineConfig::load()?;
    info!("Configuration loaded: {:?}", config);

    // Ground truth: a virtualized host with no spoofing applied yet.
    let host = SimHost::new(SimOptions {
        hv_present: false,
        securelevel: 0,
        ..SimOptions::default()
    });

    let mut engine = Engine::new(config, HostBindings::for_sim(&host));
    if let Err(e) = engine.init() {
        match e {
            EngineError::Fatal(reason) => {
                error!(reason = %reason, "unrecoverable boot failure");
                std::process::exit(1);
            }
            other => return Err(other.into()),
        }
    }

    showcase(&host);

    engine.deinit();
    Ok(())
}

/// Replay the same queries from in-scope and out-of-scope callers
fn showcase(host: &SimHost) {
    let product = host.device("product");

    for caller in ["LeagueClient", "unrelatedProc"] {
        host.set_caller(caller, 1000);
        if let Some(entry) = &product {
            let value = host
                .get_property(entry, "manufacturer")
                .map(|v| v.summary())
                .unwrap_or_else(|| "<none>".to_string());
            info!(caller, manufacturer = %value, "device registry answer");
        }
    }

    for caller in ["softwareupdated", "randomApp"] {
        host.set_caller(caller, 1001);
        let present = host.sysctl_read(&["kern", "hv_vmm_present"]);
        info!(caller, hv_vmm_present = ?present, "hypervisor presence answer");
    }

    host.set_caller("Terminal", 1002);
    let level = host.sysctl_read(&["kern", "securelevel"]);
    info!(securelevel = ?level, "secure level answer");

    if let Some(kexts) = host.loaded_kext_info(None) {
        info!(count = kexts.len(), "loaded extension listing after scrub");
        for id in kexts.keys() {
            info!(bundle = %id, "listed extension");
        }
    }
}
