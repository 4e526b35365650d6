// src/identity/classifier.rs
//! Caller-identity classifier
//!
//! Resolves the name of the process currently executing an intercepted call.
//! If the name cannot be determined the classifier returns the empty sentinel
//! identity, which never matches any filter set — an unknown caller is never
//! spoofed.

use std::sync::Arc;
use tracing::debug;

/// Maximum command-name length enforced by the host OS. Names longer than
/// this arrive truncated; filter entries are truncated the same way, so a
/// long name that collides with a filtered name after truncation is treated
/// as filtered (accepted ambiguity).
pub const MAX_COMM_LEN: usize = 16;

/// Identity of the process on whose behalf an intercepted call runs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    /// Resolved command name, if it could be determined
    pub name: Option<String>,

    /// Process id, informational only — never used for matching
    pub pid: i32,
}

impl CallerContext {
    pub fn new(name: impl Into<String>, pid: i32) -> Self {
        Self {
            name: Some(name.into()),
            pid,
        }
    }

    /// A context whose name could not be resolved
    pub fn unknown(pid: i32) -> Self {
        Self { name: None, pid }
    }
}

/// Process-identity lookup, provided by the host (consumed boundary)
pub trait CallerResolver: Send + Sync {
    /// Identity of the process currently executing, not any ancestor
    fn current_caller(&self) -> CallerContext;
}

/// Truncate a command name to the host's maximum length
pub fn truncate_comm(name: &str) -> String {
    if name.len() <= MAX_COMM_LEN {
        return name.to_string();
    }
    let mut end = MAX_COMM_LEN;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

/// Classifies the current caller into a stable identity string
#[derive(Clone)]
pub struct Classifier {
    resolver: Arc<dyn CallerResolver>,
}

impl Classifier {
    pub fn new(resolver: Arc<dyn CallerResolver>) -> Self {
        Self { resolver }
    }

    /// Identity of the current caller: the truncated command name, or the
    /// empty sentinel when the name cannot be determined.
    pub fn classify(&self) -> String {
        self.current().0
    }

    /// Identity plus pid, for diagnostic log lines
    pub fn current(&self) -> (String, i32) {
        let ctx = self.resolver.current_caller();
        match ctx.name {
            Some(ref name) => (truncate_comm(name), ctx.pid),
            None => {
                debug!(pid = ctx.pid, "caller name unresolved, using sentinel identity");
                (String::new(), ctx.pid)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver(CallerContext);

    impl CallerResolver for FixedResolver {
        fn current_caller(&self) -> CallerContext {
            self.0.clone()
        }
    }

    #[test]
    fn test_classify_truncates() {
        let classifier = Classifier::new(Arc::new(FixedResolver(CallerContext::new(
            "RiotClientServices",
            512,
        ))));
        assert_eq!(classifier.classify(), "RiotClientServic");
    }

    #[test]
    fn test_classify_short_name_unchanged() {
        let classifier =
            Classifier::new(Arc::new(FixedResolver(CallerContext::new("ioreg", 99))));
        assert_eq!(classifier.classify(), "ioreg");
    }

    #[test]
    fn test_classify_unknown_is_sentinel() {
        let classifier = Classifier::new(Arc::new(FixedResolver(CallerContext::unknown(7))));
        assert_eq!(classifier.classify(), "");
    }

    #[test]
    fn test_classify_idempotent() {
        let classifier = Classifier::new(Arc::new(FixedResolver(CallerContext::new(
            "softwareupdated",
            314,
        ))));
        assert_eq!(classifier.classify(), classifier.classify());
    }

    #[test]
    fn test_classify_agrees_with_current() {
        // classify is the identity half of current; the two must never drift.
        let resolved = Classifier::new(Arc::new(FixedResolver(CallerContext::new(
            "RiotClientServices",
            512,
        ))));
        assert_eq!(resolved.classify(), resolved.current().0);
        let unresolved = Classifier::new(Arc::new(FixedResolver(CallerContext::unknown(9))));
        assert_eq!(unresolved.classify(), unresolved.current().0);
    }

    #[test]
    fn test_current_reports_pid() {
        let classifier =
            Classifier::new(Arc::new(FixedResolver(CallerContext::new("Terminal", 42))));
        let (identity, pid) = classifier.current();
        assert_eq!(identity, "Terminal");
        assert_eq!(pid, 42);
    }
}
