//! Observable Sequences
//!
//! A sequence is an ordered collection that announces every structural
//! change as a [`Delta`]. [`ObservableVec`] is the mutable source; the
//! operators in this module derive sequences from other sequences and keep
//! them up to date delta by delta.
//!
//! # Operators
//!
//! - [`Select`]: one-to-one projection, positions preserved
//! - [`Filter`]: the items satisfying a predicate, in source order
//! - [`FlatMap`]: the concatenation of one inner sequence per item
//! - [`First`]: the item at position zero, as a scalar node
//!
//! Reducers over sequences live in [`crate::aggregate`]. The construction
//! API for all of them is [`SequenceExt`].

mod collection;
mod delta;
mod ext;
mod filter;
mod first;
mod flat_map;
mod history;
mod select;

use std::rc::Rc;

use crate::error::Result;
use crate::graph::{Data, Observable};

pub use collection::ObservableVec;
pub use delta::{replay, Delta, DeltaKind};
pub use ext::SequenceExt;
pub use filter::{Filter, Predicate};
pub use first::First;
pub use flat_map::FlatMap;
pub use history::DeltaHistory;
pub use select::Select;

/// An ordered collection maintained in the graph.
pub trait Sequence<T: Data>: Observable<Delta<T>> {
    /// Current items: cached when attached, recomputed when dormant.
    fn snapshot(&self) -> Result<Vec<T>>;

    /// Evaluate from scratch against the current state of the predecessors.
    fn evaluate(&self) -> Result<Vec<T>>;

    /// Item at `index`, if any.
    fn item_at(&self, index: usize) -> Result<Option<T>> {
        Ok(self.snapshot()?.into_iter().nth(index))
    }
}

/// Shared handle to a sequence.
pub type SequenceRef<T> = Rc<dyn Sequence<T>>;
