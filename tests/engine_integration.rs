// tests/engine_integration.rs
//! End-to-end scenarios: boot the engine against a simulated virtualized
//! host and verify the per-caller answers each interface produces.

use mirage_engine::host::objects::{KextInfo, KextInfoDict, PropValue};
use mirage_engine::host::sim::{SimHost, SimOptions};
use mirage_engine::orchestrator::{Engine, HostBindings};
use mirage_engine::utils::config::EngineConfig;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// A host that would, untouched, reveal its virtualized nature everywhere.
fn virtualized_host() -> Arc<SimHost> {
    SimHost::new(SimOptions {
        hv_present: false,
        securelevel: 0,
        ..SimOptions::default()
    })
}

fn armed(host: &Arc<SimHost>) -> Engine {
    let mut engine = Engine::new(EngineConfig::default(), HostBindings::for_sim(host));
    engine.init().unwrap();
    engine
}

#[test]
fn manufacturer_spoofed_for_observer() {
    let host = virtualized_host();
    let _engine = armed(&host);

    host.set_caller("LeagueClient", 501);
    let product = host.device("product").unwrap();
    assert_eq!(
        host.get_property(&product, "manufacturer"),
        Some(PropValue::Str("Apple Inc.".to_string()))
    );
}

#[test]
fn manufacturer_truthful_for_unrelated_process() {
    let host = virtualized_host();
    let _engine = armed(&host);

    host.set_caller("unrelatedProc", 502);
    let product = host.device("product").unwrap();
    assert_eq!(
        host.get_property(&product, "manufacturer"),
        Some(PropValue::Str("QEMU".to_string()))
    );
}

#[test]
fn non_sensitive_properties_unchanged_for_observer() {
    let host = virtualized_host();
    let _engine = armed(&host);

    host.set_caller("LeagueClient", 503);
    let product = host.device("product").unwrap();
    assert_eq!(
        host.get_property(&product, "model"),
        Some(PropValue::Str("Standard PC (Q35 + ICH9, 2009)".to_string()))
    );
}

#[test]
fn extension_listing_scrubbed_for_every_caller() {
    let mut kexts = KextInfoDict::new();
    kexts.insert("com.apple.foo".to_string(), Arc::new(KextInfo::new("1.0", "/x")));
    kexts.insert(
        "org.acidanthera.bar".to_string(),
        Arc::new(KextInfo::new("1.0", "/y")),
    );
    kexts.insert("com.vendor.baz".to_string(), Arc::new(KextInfo::new("1.0", "/z")));

    let host = SimHost::new(SimOptions {
        kexts,
        ..SimOptions::default()
    });
    let _engine = armed(&host);

    for caller in ["kextstat", "unrelatedProc", "LeagueClient"] {
        host.set_caller(caller, 504);
        let listing = host.loaded_kext_info(None).unwrap();
        let ids: Vec<&str> = listing.keys().map(String::as_str).collect();
        assert_eq!(ids, vec!["com.apple.foo", "com.vendor.baz"], "caller {caller}");
    }
}

#[test]
fn hypervisor_presence_asserted_for_querent_only() {
    let host = virtualized_host();
    let _engine = armed(&host);

    host.set_caller("softwareupdated", 505);
    assert_eq!(host.sysctl_read(&["kern", "hv_vmm_present"]), Some(1));

    host.set_caller("randomApp", 506);
    assert_eq!(host.sysctl_read(&["kern", "hv_vmm_present"]), Some(0));

    // Unknown identities are never told a hypervisor is present.
    host.set_caller_unknown(507);
    assert_eq!(host.sysctl_read(&["kern", "hv_vmm_present"]), Some(0));
}

#[test]
fn securelevel_elevated_for_all_callers() {
    let host = virtualized_host();
    let _engine = armed(&host);

    for caller in ["Terminal", "randomApp", "softwareupdated"] {
        host.set_caller(caller, 508);
        assert_eq!(
            host.sysctl_read(&["kern", "securelevel"]),
            Some(1),
            "caller {caller}"
        );
    }
    host.set_caller_unknown(509);
    assert_eq!(host.sysctl_read(&["kern", "securelevel"]), Some(1));
}

#[test]
fn matched_services_hide_virtual_devices_from_observers() {
    let host = virtualized_host();
    let _engine = armed(&host);

    host.set_caller("ioreg", 510);
    let mut iter = host.matching_services_any().unwrap();
    let mut classes = Vec::new();
    while let Some(entry) = host.next_object(&mut iter) {
        classes.push(entry.class_name.clone());
    }
    assert!(!classes.contains(&"AppleVirtIONetwork".to_string()));
    assert!(!classes.contains(&"AppleVirtIOBlockStorageDevice".to_string()));
    assert!(classes.contains(&"IOPlatformExpertDevice".to_string()));
    assert!(classes.contains(&"IOEthernetInterface".to_string()));

    host.set_caller("unrelatedProc", 511);
    let mut iter = host.matching_services_any().unwrap();
    let mut classes = Vec::new();
    while let Some(entry) = host.next_object(&mut iter) {
        classes.push(entry.class_name.clone());
    }
    assert!(classes.contains(&"AppleVirtIONetwork".to_string()));
}

#[test]
fn truncated_caller_names_match_long_filter_entries() {
    let host = virtualized_host();
    let _engine = armed(&host);

    // The host truncates command names to 16 bytes; the stock filter list
    // carries the already-truncated form.
    host.set_caller("RiotClientServices", 512);
    let product = host.device("product").unwrap();
    assert_eq!(
        host.get_property(&product, "manufacturer"),
        Some(PropValue::Str("Apple Inc.".to_string()))
    );
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl SharedBuf {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl std::io::Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for SharedBuf {
    type Writer = SharedBuf;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn spoofed_lookup_logs_before_and_after_values() {
    let host = virtualized_host();
    let _engine = armed(&host);

    host.set_caller("LeagueClient", 515);
    let product = host.device("product").unwrap();

    let buf = SharedBuf::default();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_writer(buf.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, || {
        host.get_property(&product, "manufacturer");
    });

    let output = buf.contents();
    assert!(
        output.contains("Was: 'QEMU' -> Now: 'Apple Inc.'"),
        "missing before/after record in: {output}"
    );
}

#[test]
fn config_overrides_flow_through_to_policies() {
    let host = virtualized_host();
    let mut config = EngineConfig::default();
    config.spoof.manufacturer = "Contoso Ltd.".to_string();
    config.filters.registry_observers = vec!["probe".to_string()];
    let mut engine = Engine::new(config, HostBindings::for_sim(&host));
    engine.init().unwrap();

    host.set_caller("probe", 513);
    let product = host.device("product").unwrap();
    assert_eq!(
        host.get_property(&product, "manufacturer"),
        Some(PropValue::Str("Contoso Ltd.".to_string()))
    );

    // The stock observer list was replaced, so this caller is out of scope.
    host.set_caller("LeagueClient", 514);
    assert_eq!(
        host.get_property(&product, "manufacturer"),
        Some(PropValue::Str("QEMU".to_string()))
    );
}
