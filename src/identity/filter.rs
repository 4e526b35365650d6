// src/identity/filter.rs
//! Caller and class filter sets
//!
//! A `FilterSet` is an ordered list of process descriptors; membership is
//! case-sensitive exact equality on the name and nothing else. The pid field
//! is documentation only. A `ClassFilterSet` works the same way for
//! registry-entry class names.

use crate::identity::classifier::truncate_comm;

/// One configured filter entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessDescriptor {
    /// Command name, stored truncated to the host limit
    pub name: String,

    /// Informational pid; never consulted by membership tests
    pub pid: i32,
}

impl ProcessDescriptor {
    pub fn new(name: impl Into<String>, pid: i32) -> Self {
        Self {
            name: truncate_comm(&name.into()),
            pid,
        }
    }
}

/// Ordered set of callers that receive altered behavior for one module
#[derive(Debug, Clone, Default)]
pub struct FilterSet {
    entries: Vec<ProcessDescriptor>,
}

impl FilterSet {
    pub fn new(entries: Vec<ProcessDescriptor>) -> Self {
        Self { entries }
    }

    /// Build from plain names; pids are recorded as 0
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: names
                .into_iter()
                .map(|n| ProcessDescriptor::new(n, 0))
                .collect(),
        }
    }

    /// Exact-match membership test. The empty sentinel identity never
    /// matches, so unresolved callers are never spoofed.
    pub fn matches(&self, identity: &str) -> bool {
        if identity.is_empty() {
            return false;
        }
        self.entries.iter().any(|d| d.name == identity)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Registry-entry class names hidden from in-scope callers
#[derive(Debug, Clone, Default)]
pub struct ClassFilterSet {
    classes: Vec<String>,
}

impl ClassFilterSet {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            classes: names.into_iter().map(Into::into).collect(),
        }
    }

    /// Exact equality against the entry's runtime class name
    pub fn contains(&self, class_name: &str) -> bool {
        self.classes.iter().any(|c| c == class_name)
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_name_match() {
        let set = FilterSet::from_names(["LeagueClient", "ioreg"]);
        assert!(set.matches("LeagueClient"));
        assert!(set.matches("ioreg"));
        assert!(!set.matches("LeagueClientX"));
        assert!(!set.matches("League"));
    }

    #[test]
    fn test_sentinel_never_matches() {
        let set = FilterSet::from_names([""]);
        assert!(!set.matches(""));
    }

    #[test]
    fn test_pid_is_ignored() {
        let set = FilterSet::new(vec![ProcessDescriptor::new("Terminal", 1234)]);
        // Matching is by name only; any caller named Terminal matches.
        assert!(set.matches("Terminal"));
    }

    #[test]
    fn test_truncation_collision_is_filtered() {
        // Entry longer than the host limit collides with the truncated
        // caller name and is treated as the same identity.
        let set = FilterSet::from_names(["RiotClientServices"]);
        assert!(set.matches("RiotClientServic"));
    }

    #[test]
    fn test_class_filter_exactness() {
        let set = ClassFilterSet::from_names(["AppleVirtIONetwork"]);
        assert!(set.contains("AppleVirtIONetwork"));
        assert!(!set.contains("AppleVirtIONetworkDevice"));
        assert!(!set.contains("AppleVirtIO"));
    }
}
