//! Dependency Graph
//!
//! This module implements the dependency graph that connects leaves
//! (collaborator properties and sequences) to the nodes derived from them.
//!
//! # Overview
//!
//! The dependency graph is a directed acyclic graph (DAG) where:
//!
//! - Nodes hold one incrementally maintained value or sequence
//! - Edges point from a predecessor to its dependents
//!
//! When a leaf changes it pushes a change description to its dependents.
//! Each dependent folds the change into its own cache, computes its own
//! change and pushes that further, depth first, before the mutating call
//! returns.
//!
//! # Design Decisions
//!
//! 1. Edges are distributed: each node owns strong handles to its
//!    predecessors and a table of weak handles to its dependents.
//!
//! 2. Nodes are lazy. A node without dependents is dormant: it holds no
//!    subscriptions and evaluates from scratch when read. The first dependent
//!    attaches it, the last one to leave detaches it again.
//!
//! 3. Every node knows its full ancestry, so an edge closing a cycle is
//!    rejected when it is registered instead of recursing at runtime.

mod node_core;
mod node;
mod observable;
mod topology;

pub use node::{Lifecycle, NodeId, NodeKind};
pub use observable::{Data, Listener, Node, NodeRef, Observable, ValueChange};
pub use topology::Ancestry;

pub(crate) use node_core::{impl_observable, verify, Attach, NodeCore};
