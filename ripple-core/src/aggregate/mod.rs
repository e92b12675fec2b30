//! Aggregate Maintenance
//!
//! An aggregate reduces a sequence to a single value and keeps it up to date
//! from the sequence's deltas instead of folding the whole sequence again.
//!
//! # The accumulator protocol
//!
//! An [`Accumulator`] holds the running state of a fold:
//!
//! - `reset` puts it in the state for an empty sequence
//! - `add` folds in one item
//! - `remove` undoes a previous `add` of an equal item
//! - `value` reads the result without changing the state
//!
//! `reset` followed by `add` for every item must give the same value as any
//! other way of reaching that multiset of items. Aggregates are insensitive
//! to order, so a `Move` costs nothing and a `Replace` is a remove followed
//! by an add.
//!
//! # Accumulators without an inverse
//!
//! Some folds, such as a minimum, cannot undo an `add`. Such an accumulator
//! returns `false` from [`Accumulator::is_invertible`]. On removal the
//! aggregate consults its [`RemovalFallback`]; without one, the removal fails
//! with [`Error::UnsupportedIncrementalOperation`] and the aggregate keeps
//! its state.

mod builtins;

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::trace;

use crate::error::{Error, Result};
use crate::graph::{
    impl_observable, verify, Ancestry, Attach, Data, Listener, Node, NodeCore, NodeId, NodeKind,
    NodeRef, Observable, ValueChange,
};
use crate::sequence::{Delta, Sequence, SequenceRef};

pub use builtins::{AllTrue, AnyTrue, Count, Max, Min, Sum};

/// Running state of an order-insensitive fold.
///
/// Implementations are cloned to evaluate from scratch, so `Clone` should
/// copy configuration, not just state.
pub trait Accumulator: Clone + 'static {
    type Item: Data;
    type Output: Data;

    /// Return to the state for an empty sequence.
    fn reset(&mut self);

    /// Fold in `item`.
    fn add(&mut self, item: &Self::Item);

    /// Undo a previous `add` of an item equal to `item`.
    fn remove(&mut self, item: &Self::Item) -> Result<()>;

    fn value(&self) -> Self::Output;

    /// Whether `remove` is supported.
    fn is_invertible(&self) -> bool {
        true
    }

    /// Name used in errors and logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// What an aggregate does when a non-invertible accumulator must remove an
/// item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalFallback {
    /// Reset and fold the remaining items of the source.
    Recompute,
}

struct AggregateState<A: Accumulator> {
    accumulator: A,
    value: A::Output,
}

/// Node holding the fold of a sequence.
pub struct Aggregate<A: Accumulator> {
    core: NodeCore<ValueChange<A::Output>>,
    source: SequenceRef<A::Item>,
    prototype: A,
    fallback: Option<RemovalFallback>,
    state: RefCell<Option<AggregateState<A>>>,
    this: Weak<Self>,
}

impl<A: Accumulator> Aggregate<A> {
    /// Fold `source` with `accumulator`.
    pub fn new(source: SequenceRef<A::Item>, accumulator: A) -> NodeRef<A::Output> {
        Self::build(source, accumulator, None)
    }

    /// Fold `source`, recovering from removals `accumulator` cannot undo.
    pub fn with_fallback(
        source: SequenceRef<A::Item>,
        accumulator: A,
        fallback: RemovalFallback,
    ) -> NodeRef<A::Output> {
        Self::build(source, accumulator, Some(fallback))
    }

    fn build(
        source: SequenceRef<A::Item>,
        accumulator: A,
        fallback: Option<RemovalFallback>,
    ) -> NodeRef<A::Output> {
        let ancestry = Ancestry::derive([(source.id(), &source.ancestry())]);
        Rc::new_cyclic(|this| Self {
            core: NodeCore::new(NodeKind::Derived, ancestry),
            source,
            prototype: accumulator,
            fallback,
            state: RefCell::new(None),
            this: this.clone(),
        })
    }

    fn fold(&self, items: &[A::Item]) -> A {
        let mut accumulator = self.prototype.clone();
        accumulator.reset();
        for item in items {
            accumulator.add(item);
        }
        accumulator
    }
}

impl<A: Accumulator> Attach for Aggregate<A> {
    fn attach(&self) -> Result<()> {
        let listener: Weak<dyn Listener<Delta<A::Item>>> = self.this.clone();
        self.source.register_dependent(self.core.id(), listener)?;
        match self.source.snapshot() {
            Ok(items) => {
                let accumulator = self.fold(&items);
                let value = accumulator.value();
                *self.state.borrow_mut() = Some(AggregateState { accumulator, value });
                Ok(())
            }
            Err(err) => {
                self.source.unregister_dependent(self.core.id());
                Err(err)
            }
        }
    }

    fn detach(&self) {
        self.source.unregister_dependent(self.core.id());
        *self.state.borrow_mut() = None;
    }
}

impl<A: Accumulator> Listener<Delta<A::Item>> for Aggregate<A> {
    fn on_change(&self, _origin: NodeId, delta: &Delta<A::Item>) -> Result<()> {
        if !self.core.is_attached() {
            return Ok(());
        }
        let (removed, added) = match delta {
            Delta::Add { item, .. } => (None, Some(item)),
            Delta::Remove { item, .. } => (Some(item), None),
            Delta::Replace { old, new, .. } => (Some(old), Some(new)),
            Delta::Move { .. } => return Ok(()),
        };

        // The source has already applied the delta, so a recompute folds
        // its current items and needs no separate add.
        let remaining = match removed {
            Some(_) if !self.prototype.is_invertible() => match self.fallback {
                Some(RemovalFallback::Recompute) => Some(self.source.snapshot()?),
                None => {
                    return Err(Error::UnsupportedIncrementalOperation {
                        aggregate: self.prototype.name(),
                    })
                }
            },
            _ => None,
        };

        let (old, new) = {
            let mut state = self.state.borrow_mut();
            let Some(state) = state.as_mut() else {
                return Ok(());
            };
            match remaining {
                Some(items) => {
                    trace!(node = %self.core.id(), items = items.len(), "aggregate recompute");
                    state.accumulator = self.fold(&items);
                }
                None => {
                    if let Some(item) = removed {
                        state.accumulator.remove(item)?;
                    }
                    if let Some(item) = added {
                        state.accumulator.add(item);
                    }
                }
            }
            let new = state.accumulator.value();
            if new == state.value {
                return Ok(());
            }
            (std::mem::replace(&mut state.value, new.clone()), new)
        };
        verify(self.core.id(), &new, || self.evaluate())?;
        self.core.dispatch(&ValueChange::new(old, new))
    }

    fn on_disposed(&self, _origin: NodeId) {
        self.core.dispose(self);
    }
}

impl_observable!(impl[A: Accumulator] Aggregate<A> => ValueChange<A::Output>);

impl<A: Accumulator> Node<A::Output> for Aggregate<A> {
    fn value(&self) -> Result<A::Output> {
        if let Some(state) = self.state.borrow().as_ref() {
            return Ok(state.value.clone());
        }
        self.evaluate()
    }

    fn evaluate(&self) -> Result<A::Output> {
        self.core.record_evaluation();
        Ok(self.fold(&self.source.snapshot()?).value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::NodeExt;
    use crate::sequence::ObservableVec;

    #[test]
    fn invertible_aggregate_follows_deltas() {
        let items = ObservableVec::from_vec(vec![1, 2, 3]);
        let total = Aggregate::new(items.as_sequence(), Sum::new());
        let _subscription = total.subscribe(|_| {}).unwrap();

        items.push(4).unwrap();
        items.replace(0, 10).unwrap();
        items.move_item(0, 3).unwrap();
        items.remove(1).unwrap();

        assert_eq!(total.value().unwrap(), 16);
        assert_eq!(total.value().unwrap(), total.evaluate().unwrap());
        assert_eq!(total.evaluation_count(), 1);
    }

    #[test]
    fn removal_without_fallback_is_rejected() {
        let items = ObservableVec::from_vec(vec![3, 1, 2]);
        let smallest = Aggregate::new(items.as_sequence(), Min::new());
        let _subscription = smallest.subscribe(|_| {}).unwrap();

        items.push(0).unwrap();
        assert_eq!(smallest.value().unwrap(), Some(0));

        let err = items.remove(3).unwrap_err();
        assert!(matches!(err, Error::UnsupportedIncrementalOperation { .. }));
        assert_eq!(smallest.value().unwrap(), Some(0));
    }

    #[test]
    fn recompute_fallback_handles_removal() {
        let items = ObservableVec::from_vec(vec![3, 1, 2]);
        let smallest =
            Aggregate::with_fallback(items.as_sequence(), Min::new(), RemovalFallback::Recompute);
        let _subscription = smallest.subscribe(|_| {}).unwrap();

        items.remove(1).unwrap();
        assert_eq!(smallest.value().unwrap(), Some(2));
        items.replace(0, 0).unwrap();
        assert_eq!(smallest.value().unwrap(), Some(0));
        items.clear().unwrap();
        assert_eq!(smallest.value().unwrap(), None);
    }
}
