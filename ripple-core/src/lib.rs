//! Ripple Core
//!
//! This crate provides an incremental evaluation engine. A graph of derived
//! values and derived sequences stays consistent with mutable source data by
//! pushing small, localized changes through the graph instead of recomputing
//! from scratch. It implements:
//!
//! - Leaf adapters over properties with change notifications
//! - Observable sequences with structural deltas
//! - Sequence operators (projection, filtering, flattening, first item)
//! - Aggregates maintained through invertible accumulators
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `graph`: Node identity, lifecycle and change dispatch
//! - `reactive`: Properties, derived scalar nodes and subscriptions
//! - `sequence`: Observable sequences and their operators
//! - `aggregate`: The accumulator protocol and built-in reducers
//! - `config`: Per-thread engine settings
//!
//! Nodes are lazy. A pipeline does nothing until something subscribes to it;
//! the first subscription attaches every node on the way to the sources and
//! dropping the last one detaches them again.
//!
//! # Example
//!
//! ```rust
//! use ripple_core::prelude::*;
//! use ripple_core::sequence::ObservableVec;
//!
//! let flags = ObservableVec::from_vec(vec![false, true, true]);
//! let all_set = flags.as_sequence().all(|flag| *flag);
//!
//! let _subscription = all_set
//!     .subscribe(|change| println!("all set: {}", change.new))
//!     .unwrap();
//! assert!(!all_set.value().unwrap());
//!
//! flags.replace(0, true).unwrap();
//! assert!(all_set.value().unwrap());
//! ```

pub mod aggregate;
pub mod config;
pub mod error;
pub mod graph;
pub mod reactive;
pub mod sequence;

pub use config::{ConfigGuard, EngineConfig};
pub use error::{ConfigurationError, Error, Result};

/// The traits needed to build and read pipelines.
pub mod prelude {
    pub use crate::graph::{Node, NodeRef, Observable};
    pub use crate::reactive::NodeExt;
    pub use crate::sequence::{Sequence, SequenceExt, SequenceRef};
}
