//! Graph Nodes
//!
//! Identity and lifecycle types shared by every node in the dependency graph.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Unique identifier for a node in the dependency graph.
///
/// External subscribers get an id from the same counter, so a dependent
/// table can hold nodes and callbacks side by side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(u64);

impl NodeId {
    /// Generate a new unique node ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// The kind of node in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// A leaf wrapping collaborator state (a property or a source sequence).
    /// Leaves have no predecessors inside the graph.
    Leaf,

    /// A node derived from one or more predecessors.
    Derived,
}

/// Lifecycle state of a node.
///
/// ```text
/// Dormant --first dependent--> Attached --last dependent leaves--> Dormant
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Lifecycle {
    /// No dependents. The node holds no subscriptions and recomputes on
    /// every read.
    #[default]
    Dormant,

    /// At least one dependent. The node is subscribed to its predecessors
    /// and serves reads from its push-maintained cache.
    Attached,
}

impl Lifecycle {
    pub fn is_attached(self) -> bool {
        self == Lifecycle::Attached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_ids_are_unique() {
        let id1 = NodeId::new();
        let id2 = NodeId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn node_ids_display_with_prefix() {
        assert_eq!(NodeId::from_raw(7).to_string(), "node#7");
    }

    #[test]
    fn lifecycle_starts_dormant() {
        assert_eq!(Lifecycle::default(), Lifecycle::Dormant);
        assert!(!Lifecycle::Dormant.is_attached());
        assert!(Lifecycle::Attached.is_attached());
    }
}
