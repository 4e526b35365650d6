// src/registry/navigator.rs
//! Registry navigation and the guarded handler swap
//!
//! Lookup is depth-first, one step per path segment: linearly scan the
//! current node's children for an exact name match and descend. Any missing
//! segment, or an interior node without children, fails the whole lookup
//! immediately. No backtracking, no caching.

use crate::hook::patcher::{MemoryGuard, WritePermit};
use crate::registry::node::{NodeKind, OidHandler, RegistryNode, SysctlTree};
use crate::utils::errors::{EngineError, Result};
use tracing::debug;

/// Find the node addressed by `path`, starting below `root`
pub fn find_node<'a>(root: &'a RegistryNode, path: &[&str]) -> Option<&'a RegistryNode> {
    let mut current = root;
    for segment in path {
        let children = current.children.as_ref()?;
        current = children.iter().find(|c| c.name == *segment)?;
    }
    Some(current)
}

fn find_node_mut<'a>(root: &'a mut RegistryNode, path: &[&str]) -> Option<&'a mut RegistryNode> {
    let mut current = root;
    for segment in path {
        let children = current.children.as_mut()?;
        current = children.iter_mut().find(|c| c.name == *segment)?;
    }
    Some(current)
}

/// Replace the handler of the node at `path`, returning the saved original.
///
/// Preconditions, checked before anything is written: the node must have the
/// kind the module expects and a non-null existing handler. The single write
/// is bracketed by a scoped writable-memory permit, released unconditionally.
pub fn swap_handler(
    tree: &SysctlTree,
    path: &[&str],
    expected: NodeKind,
    replacement: OidHandler,
    guard: &dyn MemoryGuard,
) -> Result<OidHandler> {
    let dotted = path.join(".");
    let mut root = tree.write();

    let node = find_node_mut(&mut root, path).ok_or_else(|| EngineError::Traversal(dotted.clone()))?;
    debug!(path = %dotted, kind = ?node.kind, "located registry node");

    if node.kind != expected {
        return Err(EngineError::HandlerSwap {
            path: dotted,
            reason: format!("unexpected node kind {:?}, wanted {:?}", node.kind, expected),
        });
    }

    let original = match node.handler.clone() {
        Some(handler) => handler,
        None => {
            return Err(EngineError::HandlerSwap {
                path: dotted,
                reason: "existing handler slot was null".to_string(),
            });
        }
    };

    let _permit = WritePermit::acquire(guard);
    node.handler = Some(replacement);

    debug!(path = %dotted, "registry handler swapped");
    Ok(original)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hook::patcher::NoopGuard;
    use parking_lot::RwLock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn sample_tree() -> SysctlTree {
        let kern = RegistryNode::container(
            "kern",
            vec![
                RegistryNode::int_leaf("hv_vmm_present", Arc::new(|req| req.return_int(1))),
                RegistryNode::int_leaf("securelevel", Arc::new(|req| req.return_int(0))),
                RegistryNode::empty_leaf("hollow"),
            ],
        );
        let hw = RegistryNode::container("hw", vec![]);
        Arc::new(RwLock::new(RegistryNode::container("", vec![kern, hw])))
    }

    #[test]
    fn test_find_nested_node() {
        let tree = sample_tree();
        let root = tree.read();
        let node = find_node(&root, &["kern", "securelevel"]).unwrap();
        assert_eq!(node.name, "securelevel");
        assert_eq!(node.kind, NodeKind::Int);
    }

    #[test]
    fn test_find_missing_segment() {
        let tree = sample_tree();
        let root = tree.read();
        assert!(find_node(&root, &["kern", "nonexistent"]).is_none());
        assert!(find_node(&root, &["net", "anything"]).is_none());
    }

    #[test]
    fn test_find_through_leaf_fails() {
        let tree = sample_tree();
        let root = tree.read();
        // securelevel has no children; descending further must fail.
        assert!(find_node(&root, &["kern", "securelevel", "deeper"]).is_none());
    }

    #[test]
    fn test_swap_returns_original() {
        let tree = sample_tree();
        let replacement: OidHandler = Arc::new(|req| req.return_int(99));
        let original =
            swap_handler(&tree, &["kern", "securelevel"], NodeKind::Int, replacement, &NoopGuard)
                .unwrap();

        let mut req = crate::registry::node::QueryRequest::new();
        original(&mut req);
        assert_eq!(req.as_int(), Some(0));

        let root = tree.read();
        let node = find_node(&root, &["kern", "securelevel"]).unwrap();
        assert_eq!(node.query().and_then(|r| r.as_int()), Some(99));
    }

    #[test]
    fn test_swap_missing_path() {
        let tree = sample_tree();
        let replacement: OidHandler = Arc::new(|req| req.return_int(99));
        let err = swap_handler(&tree, &["kern", "missing"], NodeKind::Int, replacement, &NoopGuard)
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::Traversal(_)));
    }

    #[test]
    fn test_swap_wrong_kind_aborts() {
        let tree = sample_tree();
        let replacement: OidHandler = Arc::new(|req| req.return_int(99));
        let err = swap_handler(&tree, &["kern"], NodeKind::Int, replacement, &NoopGuard)
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::HandlerSwap { .. }));
    }

    #[test]
    fn test_swap_null_handler_aborts() {
        let tree = sample_tree();
        let replacement: OidHandler = Arc::new(|req| req.return_int(99));
        let err = swap_handler(&tree, &["kern", "hollow"], NodeKind::Int, replacement, &NoopGuard)
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::HandlerSwap { .. }));
        // The hollow slot must still be empty after the aborted swap.
        let root = tree.read();
        assert!(find_node(&root, &["kern", "hollow"]).unwrap().handler.is_none());
    }

    #[test]
    fn test_swap_brackets_write_with_permit() {
        #[derive(Default)]
        struct CountingGuard {
            opened: AtomicU32,
            closed: AtomicU32,
        }
        impl MemoryGuard for CountingGuard {
            fn open(&self) {
                self.opened.fetch_add(1, Ordering::SeqCst);
            }
            fn close(&self) {
                self.closed.fetch_add(1, Ordering::SeqCst);
            }
        }

        let tree = sample_tree();
        let guard = CountingGuard::default();
        let replacement: OidHandler = Arc::new(|req| req.return_int(1));
        swap_handler(&tree, &["kern", "hv_vmm_present"], NodeKind::Int, replacement, &guard)
            .unwrap();
        assert_eq!(guard.opened.load(Ordering::SeqCst), 1);
        assert_eq!(guard.closed.load(Ordering::SeqCst), 1);

        // A failed precondition must not open the write window at all.
        let replacement: OidHandler = Arc::new(|req| req.return_int(1));
        let _ = swap_handler(&tree, &["kern", "hollow"], NodeKind::Int, replacement, &guard);
        assert_eq!(guard.opened.load(Ordering::SeqCst), 1);
    }
}
