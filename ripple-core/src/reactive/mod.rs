//! Reactive Primitives
//!
//! This module implements the scalar side of the engine: leaf adapters over
//! mutable properties, nodes derived from other nodes, and subscribers.
//!
//! # Concepts
//!
//! ## Properties
//!
//! A property is mutable state owned by a collaborator. It announces every
//! change before and after the value is stored. [`PropertyNode`] turns a
//! property into a leaf of the graph.
//!
//! ## Derived nodes
//!
//! A derived node caches a value computed from its predecessors. While
//! something depends on it, the cache is updated from each predecessor change
//! and a change is pushed on only when the value actually differs. With no
//! dependents it is dormant and every read recomputes from scratch.
//!
//! ## Subscriptions
//!
//! A subscription is a callback registered as a dependent. It keeps the
//! observed pipeline attached until it is disposed or dropped.
//!
//! # Implementation Notes
//!
//! Propagation is push based and synchronous. A mutation reaches every
//! subscriber, depth first, before the setter returns. A thread-local
//! propagation context tracks the dispatch stack of the running pass.

mod context;
mod derived;
mod property;
mod subscriber;

pub use context::PropagationScope;
pub use derived::{combine, constant, Combine, Constant, MapNode, NodeExt};
pub use property::{NotifyProperty, Property, PropertyNode, PropertyObserver, WeakProperty};
pub use subscriber::{subscribe, Subscription};
