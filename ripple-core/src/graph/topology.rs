//! Graph Topology
//!
//! Every node records the full set of nodes upstream of it. The set is fixed
//! at construction because predecessors are handed over when a node is built
//! and never change afterwards.
//!
//! Knowing the ancestry lets `register_dependent` reject an edge that would
//! close a cycle before it is inserted:
//!
//! - `node -> dependent` is a self loop if `dependent == node`
//! - it closes a cycle if `dependent` is already upstream of `node`
//!
//! Dynamically created edges (for example the per-item predicate nodes of a
//! tracked filter) go through the same check.

use std::rc::Rc;

use indexmap::IndexSet;

use super::node::NodeId;
use crate::error::{ConfigurationError, Result};

/// The set of transitive predecessors of a node.
#[derive(Debug, Clone, Default)]
pub struct Ancestry(Rc<IndexSet<NodeId>>);

impl Ancestry {
    /// Ancestry of a leaf: nothing upstream.
    pub fn root() -> Self {
        Self::default()
    }

    /// Ancestry of a node built from the given predecessors.
    ///
    /// Each entry is a predecessor's id with that predecessor's own ancestry.
    pub fn derive<'a, I>(predecessors: I) -> Self
    where
        I: IntoIterator<Item = (NodeId, &'a Ancestry)>,
    {
        let mut set = IndexSet::new();
        for (id, ancestry) in predecessors {
            set.extend(ancestry.0.iter().copied());
            set.insert(id);
        }
        Self(Rc::new(set))
    }

    /// Whether `id` is upstream of the node owning this ancestry.
    pub fn contains(&self, id: NodeId) -> bool {
        self.0.contains(&id)
    }

    /// Number of upstream nodes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Upstream nodes, nearest-declared predecessors last.
    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.0.iter().copied()
    }

    /// Reject an edge `node -> dependent` that would close a cycle.
    pub fn check_edge(&self, node: NodeId, dependent: NodeId) -> Result<()> {
        if dependent == node || self.contains(dependent) {
            return Err(ConfigurationError::Cycle { node, dependent }.into());
        }
        Ok(())
    }
}
