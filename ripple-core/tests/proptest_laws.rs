//! Property-based tests for the propagation laws.

use proptest::prelude::*;
use ripple_core::aggregate::{Accumulator, AllTrue, AnyTrue, Count, Sum};
use ripple_core::prelude::*;
use ripple_core::sequence::{DeltaHistory, ObservableVec};
use ripple_core::Result;

#[derive(Debug, Clone)]
enum Op {
    Push(i32),
    Insert(usize, i32),
    Remove(usize),
    Replace(usize, i32),
    Move(usize, usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (-100i32..100).prop_map(Op::Push),
        (any::<usize>(), -100i32..100).prop_map(|(i, v)| Op::Insert(i, v)),
        any::<usize>().prop_map(Op::Remove),
        (any::<usize>(), -100i32..100).prop_map(|(i, v)| Op::Replace(i, v)),
        (any::<usize>(), any::<usize>()).prop_map(|(from, to)| Op::Move(from, to)),
    ]
}

/// Apply `op` with its positions wrapped into range.
fn apply(items: &ObservableVec<i32>, op: &Op) -> Result<()> {
    let len = items.len();
    match *op {
        Op::Push(v) => items.push(v),
        Op::Insert(i, v) => items.insert(i % (len + 1), v),
        Op::Remove(i) if len > 0 => items.remove(i % len).map(|_| ()),
        Op::Replace(i, v) if len > 0 => items.replace(i % len, v),
        Op::Move(from, to) if len > 0 => items.move_item(from % len, to % len),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone)]
enum Stage {
    Offset(i32),
    Scale(i32),
    KeepMultiples(i32),
    KeepAbove(i32),
    /// Each item repeated `v mod m` times.
    Repeat(i32),
}

fn stage() -> impl Strategy<Value = Stage> {
    prop_oneof![
        (-10i32..10).prop_map(Stage::Offset),
        (-3i32..=3).prop_map(Stage::Scale),
        (2i32..5).prop_map(Stage::KeepMultiples),
        (-50i32..50).prop_map(Stage::KeepAbove),
        (2i32..4).prop_map(Stage::Repeat),
    ]
}

/// The source followed by one node per stage.
fn build(source: SequenceRef<i32>, stages: &[Stage]) -> Vec<SequenceRef<i32>> {
    let mut nodes = vec![source];
    for stage in stages {
        let last = nodes[nodes.len() - 1].clone();
        let next = match *stage {
            Stage::Offset(c) => last.map(move |v| v + c),
            Stage::Scale(k) => last.map(move |v| v * k),
            Stage::KeepMultiples(m) => last.filter(move |v| v % m == 0),
            Stage::KeepAbove(t) => last.filter(move |v| *v > t),
            Stage::Repeat(m) => last.flat_map(move |v: &i32| {
                ObservableVec::from_vec(vec![*v; v.rem_euclid(m) as usize]).as_sequence()
            }),
        };
        nodes.push(next);
    }
    nodes
}

fn fold_value<A: Accumulator>(mut accumulator: A, items: &[A::Item]) -> A::Output {
    accumulator.reset();
    for item in items {
        accumulator.add(item);
    }
    accumulator.value()
}

proptest! {
    /// Replaying the recorded deltas rebuilds the source after every step.
    #[test]
    fn replay_reproduces_snapshot(
        initial in prop::collection::vec(-100i32..100, 0..20),
        ops in prop::collection::vec(op(), 1..40)
    ) {
        let items = ObservableVec::from_vec(initial);
        let history = DeltaHistory::record(&items.as_sequence()).unwrap();
        for op in &ops {
            apply(&items, op).unwrap();
            prop_assert_eq!(history.replay().unwrap(), items.to_vec());
        }
    }

    /// Every attached node in a pipeline of depth up to five matches a
    /// from-scratch evaluation after each mutation.
    #[test]
    fn incremental_matches_batch(
        initial in prop::collection::vec(-100i32..100, 0..20),
        stages in prop::collection::vec(stage(), 0..=4),
        ops in prop::collection::vec(op(), 1..40)
    ) {
        let items = ObservableVec::from_vec(initial);
        let nodes = build(items.as_sequence(), &stages);
        let tail = nodes[nodes.len() - 1].clone();

        let sum = tail.sum();
        let count = tail.count();
        let smallest = tail.minimum();
        let head = tail.first();
        let _subscriptions = [
            sum.subscribe(|_| {}).unwrap(),
            count.subscribe(|_| {}).unwrap(),
            smallest.subscribe(|_| {}).unwrap(),
            head.subscribe(|_| {}).unwrap(),
        ];
        let history = DeltaHistory::record(&tail).unwrap();

        for op in &ops {
            apply(&items, op).unwrap();
            for node in &nodes {
                prop_assert_eq!(node.snapshot().unwrap(), node.evaluate().unwrap());
            }
            prop_assert_eq!(sum.value().unwrap(), sum.evaluate().unwrap());
            prop_assert_eq!(count.value().unwrap(), count.evaluate().unwrap());
            prop_assert_eq!(smallest.value().unwrap(), smallest.evaluate().unwrap());
            prop_assert_eq!(head.value().unwrap(), head.evaluate().unwrap());
            prop_assert_eq!(history.replay().unwrap(), tail.snapshot().unwrap());
        }
    }

    /// `add(a); add(b); remove(a)` ends where `add(b)` alone does.
    #[test]
    fn invertible_accumulators_undo_adds(a in -1000i64..1000, b in -1000i64..1000) {
        let mut sum = Sum::new();
        sum.reset();
        sum.add(&a);
        sum.add(&b);
        sum.remove(&a).unwrap();
        prop_assert_eq!(sum.value(), fold_value(Sum::new(), &[b]));

        let mut count = Count::new();
        count.reset();
        count.add(&a);
        count.add(&b);
        count.remove(&a).unwrap();
        prop_assert_eq!(count.value(), fold_value(Count::new(), &[b]));
    }

    #[test]
    fn predicate_counters_undo_adds(a: bool, b: bool) {
        let mut all = AllTrue::default();
        all.reset();
        all.add(&a);
        all.add(&b);
        all.remove(&a).unwrap();
        prop_assert_eq!(all.value(), fold_value(AllTrue::default(), &[b]));

        let mut any = AnyTrue::default();
        any.reset();
        any.add(&a);
        any.add(&b);
        any.remove(&a).unwrap();
        prop_assert_eq!(any.value(), fold_value(AnyTrue::default(), &[b]));
    }
}
