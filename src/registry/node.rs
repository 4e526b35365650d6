// src/registry/node.rs
//! Registry node representation
//!
//! A `RegistryNode` mirrors one sysctl-style directory entry: a name, a kind
//! tag, an optional child list (containers only) and an optional query
//! handler (leaves only). The whole tree is shared as a `SysctlTree` handle;
//! the host populates it, the engine swaps individual handlers.

use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Query handler attached to a leaf node. Writes its answer into the request
/// and returns a status code (0 on success).
pub type OidHandler = Arc<dyn Fn(&mut QueryRequest) -> i32 + Send + Sync>;

/// Shared handle to a host-owned registry tree
pub type SysctlTree = Arc<RwLock<RegistryNode>>;

/// Output side of one registry query (SYSCTL_OUT analog)
#[derive(Debug, Default)]
pub struct QueryRequest {
    out: Vec<u8>,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy an integer answer out to the caller; returns the success status
    pub fn return_int(&mut self, value: i32) -> i32 {
        self.out = value.to_ne_bytes().to_vec();
        0
    }

    /// The answer as an integer, if one was written
    pub fn as_int(&self) -> Option<i32> {
        let bytes: [u8; 4] = self.out.as_slice().try_into().ok()?;
        Some(i32::from_ne_bytes(bytes))
    }
}

/// Node kind tag (sysctl CTLTYPE analog)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Container holding child nodes
    Node,
    /// Integer-valued leaf
    Int,
    /// String-valued leaf
    Str,
}

/// One entry in the registry tree
pub struct RegistryNode {
    pub name: String,
    pub kind: NodeKind,
    pub children: Option<Vec<RegistryNode>>,
    pub handler: Option<OidHandler>,
}

impl RegistryNode {
    /// Container node owning a child list
    pub fn container(name: impl Into<String>, children: Vec<RegistryNode>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Node,
            children: Some(children),
            handler: None,
        }
    }

    /// Integer leaf with a query handler
    pub fn int_leaf(name: impl Into<String>, handler: OidHandler) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Int,
            children: None,
            handler: Some(handler),
        }
    }

    /// Integer leaf whose handler slot is empty
    pub fn empty_leaf(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: NodeKind::Int,
            children: None,
            handler: None,
        }
    }

    /// Run this node's handler against a fresh request
    pub fn query(&self) -> Option<QueryRequest> {
        let handler = self.handler.as_ref()?;
        let mut req = QueryRequest::new();
        let status = handler(&mut req);
        if status == 0 {
            Some(req)
        } else {
            None
        }
    }
}

impl fmt::Debug for RegistryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryNode")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("children", &self.children.as_ref().map(Vec::len))
            .field("handler", &self.handler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_request_roundtrip() {
        let mut req = QueryRequest::new();
        assert_eq!(req.return_int(1), 0);
        assert_eq!(req.as_int(), Some(1));
    }

    #[test]
    fn test_query_request_empty() {
        let req = QueryRequest::new();
        assert_eq!(req.as_int(), None);
    }

    #[test]
    fn test_leaf_query() {
        let node = RegistryNode::int_leaf("securelevel", Arc::new(|req| req.return_int(0)));
        assert_eq!(node.query().and_then(|r| r.as_int()), Some(0));
    }

    #[test]
    fn test_empty_leaf_has_no_answer() {
        let node = RegistryNode::empty_leaf("stub");
        assert!(node.query().is_none());
    }
}
