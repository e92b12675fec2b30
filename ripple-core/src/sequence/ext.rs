//! Construction API for sequence pipelines.

use std::ops::{Add, Sub};

use super::{Delta, Filter, First, FlatMap, Predicate, Select, Sequence, SequenceRef};
use crate::aggregate::{
    Accumulator, Aggregate, AllTrue, AnyTrue, Count, Max, Min, RemovalFallback, Sum,
};
use crate::error::Result;
use crate::graph::{Data, NodeRef};
use crate::reactive::{subscribe, Subscription};

/// Operators available on every [`SequenceRef`].
///
/// Building an operator does no work. The returned node stays dormant and
/// evaluates from scratch on each read until something depends on it.
pub trait SequenceExt<T: Data> {
    /// Project every item.
    fn map<U, F>(&self, f: F) -> SequenceRef<U>
    where
        U: Data,
        F: Fn(&T) -> U + 'static;

    /// Project every item with a function that may fail.
    fn try_map<U, F>(&self, f: F) -> SequenceRef<U>
    where
        U: Data,
        F: Fn(&T) -> Result<U> + 'static;

    /// Keep the items for which `predicate` holds.
    fn filter<F>(&self, predicate: F) -> SequenceRef<T>
    where
        F: Fn(&T) -> bool + 'static;

    /// Keep the items whose predicate node is `true`, following changes of
    /// those nodes while attached.
    fn filter_by<F>(&self, predicate: F) -> SequenceRef<T>
    where
        F: Fn(&T) -> NodeRef<bool> + 'static;

    /// Expand every item into a sequence and concatenate them, following
    /// changes of the inner sequences while attached.
    fn flat_map<U, F>(&self, f: F) -> SequenceRef<U>
    where
        U: Data,
        F: Fn(&T) -> SequenceRef<U> + 'static;

    /// Fold the items with `accumulator`.
    fn aggregate<A>(&self, accumulator: A) -> NodeRef<A::Output>
    where
        A: Accumulator<Item = T>;

    /// Fold the items, recovering from removals `accumulator` cannot undo.
    fn aggregate_with_fallback<A>(
        &self,
        accumulator: A,
        fallback: RemovalFallback,
    ) -> NodeRef<A::Output>
    where
        A: Accumulator<Item = T>;

    fn count(&self) -> NodeRef<usize>;

    fn sum(&self) -> NodeRef<T>
    where
        T: Default + Add<Output = T> + Sub<Output = T>;

    /// `true` when `predicate` holds for every item, including when empty.
    fn all<F>(&self, predicate: F) -> NodeRef<bool>
    where
        F: Fn(&T) -> bool + 'static;

    /// `true` when `predicate` holds for at least one item.
    fn any<F>(&self, predicate: F) -> NodeRef<bool>
    where
        F: Fn(&T) -> bool + 'static;

    /// Smallest item. Removals fold the remaining items again.
    fn minimum(&self) -> NodeRef<Option<T>>
    where
        T: Ord;

    /// Largest item. Removals fold the remaining items again.
    fn maximum(&self) -> NodeRef<Option<T>>
    where
        T: Ord;

    fn first(&self) -> NodeRef<Option<T>>;

    /// Call `notify` with every delta until the subscription is disposed.
    fn subscribe<F>(&self, notify: F) -> Result<Subscription>
    where
        F: Fn(&Delta<T>) + 'static;
}

impl<T: Data> SequenceExt<T> for SequenceRef<T> {
    fn map<U, F>(&self, f: F) -> SequenceRef<U>
    where
        U: Data,
        F: Fn(&T) -> U + 'static,
    {
        Select::new(self.clone(), move |item| Ok(f(item)))
    }

    fn try_map<U, F>(&self, f: F) -> SequenceRef<U>
    where
        U: Data,
        F: Fn(&T) -> Result<U> + 'static,
    {
        Select::new(self.clone(), f)
    }

    fn filter<F>(&self, predicate: F) -> SequenceRef<T>
    where
        F: Fn(&T) -> bool + 'static,
    {
        Filter::new(self.clone(), Predicate::Static(Box::new(predicate)))
    }

    fn filter_by<F>(&self, predicate: F) -> SequenceRef<T>
    where
        F: Fn(&T) -> NodeRef<bool> + 'static,
    {
        Filter::new(self.clone(), Predicate::Tracked(Box::new(predicate)))
    }

    fn flat_map<U, F>(&self, f: F) -> SequenceRef<U>
    where
        U: Data,
        F: Fn(&T) -> SequenceRef<U> + 'static,
    {
        FlatMap::new(self.clone(), f)
    }

    fn aggregate<A>(&self, accumulator: A) -> NodeRef<A::Output>
    where
        A: Accumulator<Item = T>,
    {
        Aggregate::new(self.clone(), accumulator)
    }

    fn aggregate_with_fallback<A>(
        &self,
        accumulator: A,
        fallback: RemovalFallback,
    ) -> NodeRef<A::Output>
    where
        A: Accumulator<Item = T>,
    {
        Aggregate::with_fallback(self.clone(), accumulator, fallback)
    }

    fn count(&self) -> NodeRef<usize> {
        self.aggregate(Count::new())
    }

    fn sum(&self) -> NodeRef<T>
    where
        T: Default + Add<Output = T> + Sub<Output = T>,
    {
        self.aggregate(Sum::new())
    }

    fn all<F>(&self, predicate: F) -> NodeRef<bool>
    where
        F: Fn(&T) -> bool + 'static,
    {
        self.map(predicate).aggregate(AllTrue::default())
    }

    fn any<F>(&self, predicate: F) -> NodeRef<bool>
    where
        F: Fn(&T) -> bool + 'static,
    {
        self.map(predicate).aggregate(AnyTrue::default())
    }

    fn minimum(&self) -> NodeRef<Option<T>>
    where
        T: Ord,
    {
        self.aggregate_with_fallback(Min::new(), RemovalFallback::Recompute)
    }

    fn maximum(&self) -> NodeRef<Option<T>>
    where
        T: Ord,
    {
        self.aggregate_with_fallback(Max::new(), RemovalFallback::Recompute)
    }

    fn first(&self) -> NodeRef<Option<T>> {
        First::new(self.clone())
    }

    fn subscribe<F>(&self, notify: F) -> Result<Subscription>
    where
        F: Fn(&Delta<T>) + 'static,
    {
        subscribe::<Delta<T>, dyn Sequence<T>, F>(self.clone(), notify)
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use crate::sequence::ObservableVec;

    #[test]
    fn reducers_over_one_source() {
        let items = ObservableVec::from_vec(vec![4, 9, 2]);
        let source = items.as_sequence();
        let count = source.count();
        let smallest = source.minimum();
        let largest = source.maximum();
        let all_positive = source.all(|v| *v > 0);
        let any_big = source.any(|v| *v > 8);
        let _subscriptions = [
            count.subscribe(|_| {}).unwrap(),
            smallest.subscribe(|_| {}).unwrap(),
            largest.subscribe(|_| {}).unwrap(),
            all_positive.subscribe(|_| {}).unwrap(),
            any_big.subscribe(|_| {}).unwrap(),
        ];

        items.remove(1).unwrap();
        items.push(-3).unwrap();

        assert_eq!(count.value().unwrap(), 3);
        assert_eq!(smallest.value().unwrap(), Some(-3));
        assert_eq!(largest.value().unwrap(), Some(4));
        assert!(!all_positive.value().unwrap());
        assert!(!any_big.value().unwrap());
    }

    #[test]
    fn dormant_pipeline_does_no_work_until_read() {
        let items = ObservableVec::from_vec(vec![1, 2, 3]);
        let total = items.as_sequence().map(|v| v * 2).sum();
        items.push(4).unwrap();

        assert_eq!(total.evaluation_count(), 0);
        assert_eq!(total.value().unwrap(), 20);
        assert_eq!(total.evaluation_count(), 1);
    }
}
