// src/host/objects.rs
//! Object model of the intercepted interfaces
//!
//! Rust-side stand-ins for the host's registry objects: entries with a
//! runtime class name and a property bag, symbol-interned property keys,
//! iterators over matched entries, and the loaded-extension info mapping.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Symbol-interned property key (the key type the symbol-lookup interface
/// takes; the string-key interface normalizes into this)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropKey(String);

impl PropKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A property value as stored on a registry entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    Str(String),
    Data(Vec<u8>),
    Int(i64),
}

impl PropValue {
    /// One-line rendering for diagnostic logs
    pub fn summary(&self) -> String {
        match self {
            PropValue::Str(s) => s.clone(),
            PropValue::Data(d) => match std::str::from_utf8(d) {
                Ok(text) => format!("{text} ({} bytes)", d.len()),
                Err(_) => format!("<{} bytes>", d.len()),
            },
            PropValue::Int(i) => i.to_string(),
        }
    }
}

/// One entry in the host's device registry
#[derive(Debug, Clone)]
pub struct ServiceEntry {
    pub name: String,

    /// Runtime class name, the tag class-filtering is keyed on
    pub class_name: String,

    pub properties: HashMap<String, PropValue>,
}

impl ServiceEntry {
    pub fn new(name: impl Into<String>, class_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            class_name: class_name.into(),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: PropValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn property(&self, key: &PropKey) -> Option<PropValue> {
        self.properties.get(key.as_str()).cloned()
    }
}

/// Iterator over matched registry entries. The caller owns it and drives it
/// through the iterator-next interface.
#[derive(Debug, Default)]
pub struct EntryIterator {
    entries: Vec<Arc<ServiceEntry>>,
    pos: usize,
}

impl EntryIterator {
    pub fn new(entries: Vec<Arc<ServiceEntry>>) -> Self {
        Self { entries, pos: 0 }
    }

    /// Next entry, or None when exhausted
    pub fn advance(&mut self) -> Option<Arc<ServiceEntry>> {
        let entry = self.entries.get(self.pos).cloned()?;
        self.pos += 1;
        Some(entry)
    }

    /// Entries not yet yielded
    pub fn remaining(&self) -> &[Arc<ServiceEntry>] {
        &self.entries[self.pos..]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Matching criteria for the service-match interfaces
#[derive(Debug, Clone, Default)]
pub struct MatchingDict {
    /// Match on runtime class name, if set; otherwise match everything
    pub class_name: Option<String>,
}

impl MatchingDict {
    pub fn class(class_name: impl Into<String>) -> Self {
        Self {
            class_name: Some(class_name.into()),
        }
    }

    pub fn any() -> Self {
        Self::default()
    }

    pub fn matches(&self, entry: &ServiceEntry) -> bool {
        match &self.class_name {
            Some(class) => entry.class_name == *class,
            None => true,
        }
    }
}

/// Opaque info record for one loaded extension
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KextInfo {
    pub version: String,
    pub path: String,
}

impl KextInfo {
    pub fn new(version: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            path: path.into(),
        }
    }
}

/// Mapping from bundle identifier to extension info, ordered for stable
/// enumeration. Filtering builds a new map; originals are never mutated.
pub type KextInfoDict = BTreeMap<String, Arc<KextInfo>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_property_lookup() {
        let entry = ServiceEntry::new("product", "IOPlatformExpertDevice")
            .with_property("manufacturer", PropValue::Str("QEMU".to_string()));
        assert_eq!(
            entry.property(&PropKey::new("manufacturer")),
            Some(PropValue::Str("QEMU".to_string()))
        );
        assert_eq!(entry.property(&PropKey::new("model")), None);
    }

    #[test]
    fn test_iterator_advance() {
        let mut iter = EntryIterator::new(vec![
            Arc::new(ServiceEntry::new("a", "ClassA")),
            Arc::new(ServiceEntry::new("b", "ClassB")),
        ]);
        assert_eq!(iter.remaining().len(), 2);
        assert_eq!(iter.advance().unwrap().name, "a");
        assert_eq!(iter.remaining().len(), 1);
        assert_eq!(iter.advance().unwrap().name, "b");
        assert!(iter.advance().is_none());
    }

    #[test]
    fn test_matching_dict() {
        let entry = ServiceEntry::new("virtio-net", "AppleVirtIONetwork");
        assert!(MatchingDict::class("AppleVirtIONetwork").matches(&entry));
        assert!(!MatchingDict::class("AppleVirtIONetworkDevice").matches(&entry));
        assert!(MatchingDict::any().matches(&entry));
    }

    #[test]
    fn test_value_summary() {
        assert_eq!(PropValue::Str("QEMU".into()).summary(), "QEMU");
        assert_eq!(PropValue::Int(3).summary(), "3");
        assert_eq!(PropValue::Data(b"abc".to_vec()).summary(), "abc (3 bytes)");
    }
}
