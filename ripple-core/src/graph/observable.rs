//! Observable Interfaces
//!
//! The traits every node in the graph implements. A node is observable over
//! a change type `C`: scalar nodes emit [`ValueChange`]s, sequences emit
//! [`Delta`](crate::sequence::Delta)s.

use std::fmt::Debug;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};

use super::node::{Lifecycle, NodeId};
use super::topology::Ancestry;
use crate::error::Result;

/// Values and items that can flow through the graph.
///
/// `PartialEq` lets nodes suppress changes that do not change anything and
/// `Debug` lets validation report diverging values.
pub trait Data: Clone + PartialEq + Debug + 'static {}

impl<T> Data for T where T: Clone + PartialEq + Debug + 'static {}

/// Change of a scalar node's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueChange<T> {
    pub old: T,
    pub new: T,
}

impl<T> ValueChange<T> {
    pub fn new(old: T, new: T) -> Self {
        Self { old, new }
    }
}

/// A party that wants to hear about changes of type `C`.
///
/// Listeners are held weakly by the node they listen to, so a listener that
/// has been dropped is skipped silently.
pub trait Listener<C> {
    /// Called synchronously after `origin` applied `change` to its own state.
    fn on_change(&self, origin: NodeId, change: &C) -> Result<()>;

    /// Called when `origin` was disposed and dropped this listener.
    ///
    /// Derived nodes dispose themselves in turn, so nothing below a disposed
    /// node keeps serving a cache that no longer receives changes.
    fn on_disposed(&self, _origin: NodeId) {}
}

/// Lifecycle and dependent management shared by every node.
pub trait Observable<C> {
    fn id(&self) -> NodeId;

    /// Transitive predecessors, used for eager cycle rejection.
    fn ancestry(&self) -> Ancestry;

    fn lifecycle(&self) -> Lifecycle;

    /// Number of distinct dependents currently registered.
    fn dependent_count(&self) -> usize;

    /// Number of from-scratch evaluations this node has run.
    fn evaluation_count(&self) -> u64;

    /// Register `dependent` to receive changes.
    ///
    /// The first registration attaches the node. Registering the same
    /// dependent again only bumps its registration count.
    fn register_dependent(&self, dependent: NodeId, listener: Weak<dyn Listener<C>>) -> Result<()>;

    /// Drop one registration of `dependent`. Unknown ids are ignored.
    ///
    /// When no dependents remain the node detaches from its predecessors.
    fn unregister_dependent(&self, dependent: NodeId);

    /// Drop every registration and return the node to dormant state.
    ///
    /// Dependents are told and dispose themselves, down to the subscribers.
    fn dispose(&self);
}

/// A node holding one incrementally maintained value.
pub trait Node<T: Data>: Observable<ValueChange<T>> {
    /// Read the value: cached when attached, recomputed when dormant.
    fn value(&self) -> Result<T>;

    /// Evaluate from scratch against the current state of the predecessors.
    fn evaluate(&self) -> Result<T>;
}

/// Shared handle to a scalar node.
pub type NodeRef<T> = Rc<dyn Node<T>>;
