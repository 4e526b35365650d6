// src/host/sim.rs
//! In-memory simulated host
//!
//! `SimHost` stands in for the real host environment: it owns a populated
//! registry tree, a device table, a loaded-extension inventory and a symbol
//! table, and it implements every consumed boundary trait. Hook installation
//! works against the same slot table the dispatch methods read, so routed
//! replacements are exercised exactly like the originals they displace.
//!
//! Used by the test suites and the demo binary; nothing in the engine core
//! depends on it.

use crate::hook::patcher::{Address, MemoryGuard, Patcher, RoutedHandler};
use crate::host::objects::{
    EntryIterator, KextInfo, KextInfoDict, MatchingDict, PropKey, PropValue, ServiceEntry,
};
use crate::host::{CollectionFactory, DarwinVersion, SysctlTreeProvider};
use crate::identity::{CallerContext, CallerResolver};
use crate::interception::device_registry::{
    GetNameFn, GetPropertyCstrFn, GetPropertyFn, IterNextFn, MatchServiceFn, MatchServicesFn,
    SYM_GET_NAME, SYM_GET_PROPERTY, SYM_GET_PROPERTY_CSTR, SYM_ITER_NEXT, SYM_MATCH_SERVICE,
    SYM_MATCH_SERVICES,
};
use crate::interception::kext_info::{CopyKextInfoFn, SYM_COPY_KEXT_INFO};
use crate::registry::navigator::find_node;
use crate::registry::node::{RegistryNode, SysctlTree};
use crate::utils::errors::{EngineError, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Base address the simulated symbol table starts at
const SYMBOL_BASE: Address = 0xffff_ff80_0010_0000;

/// Registration order fixes each symbol's simulated address
const SYMBOLS: [&str; 7] = [
    SYM_GET_PROPERTY,
    SYM_GET_PROPERTY_CSTR,
    SYM_GET_NAME,
    SYM_ITER_NEXT,
    SYM_MATCH_SERVICES,
    SYM_MATCH_SERVICE,
    SYM_COPY_KEXT_INFO,
];

/// Knobs for constructing a simulated host
#[derive(Debug, Clone)]
pub struct SimOptions {
    pub version: DarwinVersion,

    /// Gap between consecutive simulated symbol addresses. Shrinking it below
    /// the routing minimum exercises the co-location policy.
    pub symbol_spacing: u64,

    /// Ground-truth hypervisor presence the registry tree reports
    pub hv_present: bool,

    /// Ground-truth securelevel the registry tree reports
    pub securelevel: i32,

    /// Whether the registry tree is reachable at all
    pub expose_sysctl_tree: bool,

    pub devices: Vec<ServiceEntry>,
    pub kexts: KextInfoDict,
}

impl Default for SimOptions {
    fn default() -> Self {
        Self {
            version: DarwinVersion::new(crate::host::version::SEQUOIA, 0),
            symbol_spacing: 0x100,
            hv_present: true,
            securelevel: 0,
            expose_sysctl_tree: true,
            devices: default_devices(),
            kexts: default_kexts(),
        }
    }
}

fn default_devices() -> Vec<ServiceEntry> {
    vec![
        ServiceEntry::new("product", "IOPlatformExpertDevice")
            .with_property("manufacturer", PropValue::Str("QEMU".to_string()))
            .with_property(
                "model",
                PropValue::Str("Standard PC (Q35 + ICH9, 2009)".to_string()),
            ),
        ServiceEntry::new("virtio-net", "AppleVirtIONetwork"),
        ServiceEntry::new("virtio-blk", "AppleVirtIOBlockStorageDevice"),
        ServiceEntry::new("en0", "IOEthernetInterface")
            .with_property("manufacturer", PropValue::Str("Red Hat, Inc.".to_string())),
    ]
}

fn default_kexts() -> KextInfoDict {
    let mut kexts = KextInfoDict::new();
    kexts.insert(
        "com.apple.driver.AppleHDA".to_string(),
        Arc::new(KextInfo::new("9999.1", "/System/Library/Extensions/AppleHDA.kext")),
    );
    kexts.insert(
        "com.apple.iokit.IOUSBHostFamily".to_string(),
        Arc::new(KextInfo::new("1.2", "/System/Library/Extensions/IOUSBHostFamily.kext")),
    );
    kexts.insert(
        "as.vit9696.Lilu".to_string(),
        Arc::new(KextInfo::new("1.6.8", "/Library/Extensions/Lilu.kext")),
    );
    kexts.insert(
        "org.acidanthera.WhateverGreen".to_string(),
        Arc::new(KextInfo::new("1.6.7", "/Library/Extensions/WhateverGreen.kext")),
    );
    kexts
}

/// Simulated host. Construct with [`SimHost::new`]; hand out the `Arc` to
/// every component that consumes a boundary trait.
pub struct SimHost {
    version: DarwinVersion,
    symbols: HashMap<String, Address>,
    slots: Mutex<HashMap<Address, RoutedHandler>>,
    caller: Mutex<CallerContext>,
    tree: SysctlTree,
    expose_tree: bool,
    devices: Vec<Arc<ServiceEntry>>,
    fail_allocations: AtomicBool,
    window_opens: AtomicU32,
    window_closes: AtomicU32,
}

impl SimHost {
    pub fn new(options: SimOptions) -> Arc<Self> {
        let devices: Vec<Arc<ServiceEntry>> =
            options.devices.into_iter().map(Arc::new).collect();

        let mut symbols = HashMap::new();
        for (i, name) in SYMBOLS.iter().enumerate() {
            symbols.insert(
                (*name).to_string(),
                SYMBOL_BASE + i as u64 * options.symbol_spacing,
            );
        }

        // Seed every slot with its ground-truth implementation; routing swaps
        // these out and hands them back as originals.
        let mut slots: HashMap<Address, RoutedHandler> = HashMap::new();
        let get_property: GetPropertyFn = Arc::new(|entry, key| entry.property(key));
        slots.insert(symbols[SYM_GET_PROPERTY], Box::new(get_property));

        let get_property_cstr: GetPropertyCstrFn =
            Arc::new(|entry, key| entry.property(&PropKey::new(key)));
        slots.insert(symbols[SYM_GET_PROPERTY_CSTR], Box::new(get_property_cstr));

        let get_name: GetNameFn = Arc::new(|entry| entry.name.clone());
        slots.insert(symbols[SYM_GET_NAME], Box::new(get_name));

        let iter_next: IterNextFn = Arc::new(|iter| iter.advance());
        slots.insert(symbols[SYM_ITER_NEXT], Box::new(iter_next));

        let table = devices.clone();
        let match_services: MatchServicesFn = Arc::new(move |dict| {
            Some(EntryIterator::new(
                table.iter().filter(|e| dict.matches(e)).cloned().collect(),
            ))
        });
        slots.insert(symbols[SYM_MATCH_SERVICES], Box::new(match_services));

        let table = devices.clone();
        let match_service: MatchServiceFn =
            Arc::new(move |dict| table.iter().find(|e| dict.matches(e)).cloned());
        slots.insert(symbols[SYM_MATCH_SERVICE], Box::new(match_service));

        let inventory = options.kexts;
        let copy_kext_info: CopyKextInfoFn = Arc::new(move |ids| match ids {
            None => Some(inventory.clone()),
            Some(wanted) => Some(
                inventory
                    .iter()
                    .filter(|(id, _)| wanted.iter().any(|w| w == *id))
                    .map(|(id, info)| (id.clone(), Arc::clone(info)))
                    .collect(),
            ),
        });
        slots.insert(symbols[SYM_COPY_KEXT_INFO], Box::new(copy_kext_info));

        let hv_present = options.hv_present;
        let securelevel = options.securelevel;
        let tree: SysctlTree = Arc::new(RwLock::new(RegistryNode::container(
            "",
            vec![RegistryNode::container(
                "kern",
                vec![
                    RegistryNode::int_leaf(
                        "hv_vmm_present",
                        Arc::new(move |req| req.return_int(i32::from(hv_present))),
                    ),
                    RegistryNode::int_leaf(
                        "securelevel",
                        Arc::new(move |req| req.return_int(securelevel)),
                    ),
                ],
            )],
        )));

        Arc::new(Self {
            version: options.version,
            symbols,
            slots: Mutex::new(slots),
            caller: Mutex::new(CallerContext::unknown(0)),
            tree,
            expose_tree: options.expose_sysctl_tree,
            devices,
            fail_allocations: AtomicBool::new(false),
            window_opens: AtomicU32::new(0),
            window_closes: AtomicU32::new(0),
        })
    }

    pub fn version(&self) -> DarwinVersion {
        self.version
    }

    pub fn as_patcher(&self) -> &dyn Patcher {
        self
    }

    /// Set the process on whose behalf subsequent dispatches run
    pub fn set_caller(&self, name: &str, pid: i32) {
        *self.caller.lock() = CallerContext::new(name, pid);
    }

    /// Subsequent dispatches run on behalf of an unresolvable process
    pub fn set_caller_unknown(&self, pid: i32) {
        *self.caller.lock() = CallerContext::unknown(pid);
    }

    /// Make every collection allocation fail from now on
    pub fn set_fail_allocations(&self, fail: bool) {
        self.fail_allocations.store(fail, Ordering::SeqCst);
    }

    /// (opens, closes) of the writable-memory window so far
    pub fn write_window_counts(&self) -> (u32, u32) {
        (
            self.window_opens.load(Ordering::SeqCst),
            self.window_closes.load(Ordering::SeqCst),
        )
    }

    /// Look up a device by its registry name
    pub fn device(&self, name: &str) -> Option<Arc<ServiceEntry>> {
        self.devices.iter().find(|e| e.name == name).cloned()
    }

    fn handler<T: Clone + 'static>(&self, symbol: &str) -> Option<T> {
        let address = self.symbols.get(symbol)?;
        let slots = self.slots.lock();
        slots.get(address)?.downcast_ref::<T>().cloned()
    }

    // Dispatch entry points. Each one invokes whatever currently occupies the
    // slot for its interface, hooked or not.

    pub fn get_property(&self, entry: &ServiceEntry, key: &str) -> Option<PropValue> {
        self.handler::<GetPropertyCstrFn>(SYM_GET_PROPERTY_CSTR)?(entry, key)
    }

    pub fn get_property_symbol(&self, entry: &ServiceEntry, key: &PropKey) -> Option<PropValue> {
        self.handler::<GetPropertyFn>(SYM_GET_PROPERTY)?(entry, key)
    }

    pub fn get_name(&self, entry: &ServiceEntry) -> Option<String> {
        Some(self.handler::<GetNameFn>(SYM_GET_NAME)?(entry))
    }

    pub fn next_object(&self, iter: &mut EntryIterator) -> Option<Arc<ServiceEntry>> {
        self.handler::<IterNextFn>(SYM_ITER_NEXT)?(iter)
    }

    pub fn matching_services(&self, matching: &MatchingDict) -> Option<EntryIterator> {
        self.handler::<MatchServicesFn>(SYM_MATCH_SERVICES)?(matching)
    }

    pub fn matching_services_any(&self) -> Option<EntryIterator> {
        self.matching_services(&MatchingDict::any())
    }

    pub fn matching_service(&self, class_name: &str) -> Option<Arc<ServiceEntry>> {
        self.handler::<MatchServiceFn>(SYM_MATCH_SERVICE)?(&MatchingDict::class(class_name))
    }

    pub fn loaded_kext_info(&self, ids: Option<&[String]>) -> Option<KextInfoDict> {
        self.handler::<CopyKextInfoFn>(SYM_COPY_KEXT_INFO)?(ids)
    }

    /// Read an integer node through the registry tree, hooked or not
    pub fn sysctl_read(&self, path: &[&str]) -> Option<i32> {
        let root = self.tree.read();
        find_node(&root, path)?.query()?.as_int()
    }
}

impl Patcher for SimHost {
    fn solve_symbol(&self, symbol: &str) -> Option<Address> {
        self.symbols.get(symbol).copied()
    }

    fn route_function(
        &self,
        address: Address,
        replacement: RoutedHandler,
        _wants_trampoline: bool,
    ) -> Result<RoutedHandler> {
        let mut slots = self.slots.lock();
        match slots.insert(address, replacement) {
            Some(original) => Ok(original),
            None => {
                // Nothing lived at that address; undo the stray insert.
                slots.remove(&address);
                Err(EngineError::RouteFailed {
                    symbol: format!("{address:#x}"),
                    reason: "no routable target at address".to_string(),
                })
            }
        }
    }
}

impl CallerResolver for SimHost {
    fn current_caller(&self) -> CallerContext {
        self.caller.lock().clone()
    }
}

impl SysctlTreeProvider for SimHost {
    fn sysctl_children(&self) -> Option<SysctlTree> {
        if self.expose_tree {
            Some(Arc::clone(&self.tree))
        } else {
            None
        }
    }
}

impl CollectionFactory for SimHost {
    fn kext_dict_with_capacity(&self, _capacity: usize) -> Option<KextInfoDict> {
        if self.fail_allocations.load(Ordering::SeqCst) {
            None
        } else {
            Some(KextInfoDict::new())
        }
    }

    fn entry_list_with_capacity(&self, capacity: usize) -> Option<Vec<Arc<ServiceEntry>>> {
        if self.fail_allocations.load(Ordering::SeqCst) {
            None
        } else {
            Some(Vec::with_capacity(capacity))
        }
    }
}

impl MemoryGuard for SimHost {
    fn open(&self) {
        self.window_opens.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.window_closes.fetch_add(1, Ordering::SeqCst);
    }
}
