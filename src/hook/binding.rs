// src/hook/binding.rs
//! Typed hook bindings
//!
//! A `HookBinding` records one installed hook: the symbolic name, the saved
//! original (the sole path back to ground truth) and whether installation
//! succeeded. Bindings live for the rest of the process; there is no
//! uninstall path.

use crate::hook::patcher::Patcher;
use crate::utils::errors::{EngineError, Result};
use tracing::debug;

/// One installed (or attempted) hook
#[derive(Debug)]
pub struct HookBinding<T> {
    /// Symbolic name of the rewired target
    pub symbol: String,

    /// The original implementation, captured before rewiring
    pub original: Option<T>,

    /// Whether the replacement was actually installed
    pub installed: bool,
}

impl<T> HookBinding<T> {
    /// Binding for a hook that was installed, with its captured original
    pub fn installed(symbol: impl Into<String>, original: T) -> Self {
        Self {
            symbol: symbol.into(),
            original: Some(original),
            installed: true,
        }
    }

    pub fn original(&self) -> Option<&T> {
        self.original.as_ref()
    }
}

/// Resolve `symbol`, install `replacement` over it and return the binding
/// holding the original implementation.
pub fn reroute<T>(patcher: &dyn Patcher, symbol: &str, replacement: T) -> Result<HookBinding<T>>
where
    T: Send + Sync + 'static,
{
    let address = patcher
        .solve_symbol(symbol)
        .ok_or_else(|| EngineError::SymbolResolution(symbol.to_string()))?;
    debug!(symbol, address = format_args!("{address:#x}"), "resolved symbol");

    let original = patcher.route_function(address, Box::new(replacement), true)?;
    let original = original
        .downcast::<T>()
        .map_err(|_| EngineError::RouteFailed {
            symbol: symbol.to_string(),
            reason: "original handler had an unexpected type".to_string(),
        })?;

    debug!(symbol, "successfully routed");
    Ok(HookBinding::installed(symbol, *original))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::patcher::{Address, RoutedHandler};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    type IntFn = Arc<dyn Fn() -> i32 + Send + Sync>;

    struct TablePatcher {
        slots: Mutex<HashMap<Address, RoutedHandler>>,
        names: HashMap<String, Address>,
    }

    impl TablePatcher {
        fn new() -> Self {
            let mut slots = HashMap::new();
            let original: IntFn = Arc::new(|| 7);
            slots.insert(0x1000, Box::new(original) as RoutedHandler);
            let mut names = HashMap::new();
            names.insert("_answer".to_string(), 0x1000);
            Self {
                slots: Mutex::new(slots),
                names,
            }
        }
    }

    impl Patcher for TablePatcher {
        fn solve_symbol(&self, symbol: &str) -> Option<Address> {
            self.names.get(symbol).copied()
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
                None => Err(EngineError::RouteFailed {
                    symbol: format!("{address:#x}"),
                    reason: "no slot at address".to_string(),
                }),
            }
        }
    }

    #[test]
    fn test_reroute_returns_original() {
        let patcher = TablePatcher::new();
        let replacement: IntFn = Arc::new(|| 42);
        let binding = reroute(&patcher, "_answer", replacement).unwrap();
        assert!(binding.installed);
        assert_eq!(binding.symbol, "_answer");
        let original = binding.original().unwrap();
        assert_eq!(original(), 7);
    }

    #[test]
    fn test_reroute_unknown_symbol() {
        let patcher = TablePatcher::new();
        let replacement: IntFn = Arc::new(|| 42);
        let err = reroute(&patcher, "_missing", replacement).err().unwrap();
        assert!(matches!(err, EngineError::SymbolResolution(_)));
    }

    #[test]
    fn test_reroute_type_mismatch() {
        let patcher = TablePatcher::new();
        // Slot holds an IntFn; asking for a different type must fail cleanly.
        type StrFn = Arc<dyn Fn() -> String + Send + Sync>;
        let replacement: StrFn = Arc::new(|| "x".to_string());
        let err = reroute(&patcher, "_answer", replacement).err().unwrap();
        assert!(matches!(err, EngineError::RouteFailed { .. }));
    }
}
