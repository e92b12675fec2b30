//! Filtered view of a sequence.
//!
//! The filter keeps one slot per source item recording whether the item
//! passes. The output index of a passing item is the number of passing
//! slots before it, so every source delta translates to at most one output
//! delta. Slots are stored in chunks that carry their own passing count, so
//! that number is found by summing whole chunks and scanning only one.
//!
//! With a tracked predicate each item gets its own `Node<bool>`. While the
//! filter is attached it listens to every one of them and turns a flip of an
//! item that is already present into an `Add` or a `Remove`.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::{Delta, Sequence, SequenceRef};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::graph::{
    impl_observable, verify, Ancestry, Attach, Data, Listener, Node, NodeCore, NodeId, NodeKind,
    NodeRef, Observable, ValueChange,
};

/// How a filter decides whether an item passes.
pub enum Predicate<T> {
    /// A plain function of the item.
    Static(Box<dyn Fn(&T) -> bool>),
    /// A node per item whose value may change while the item is present.
    Tracked(Box<dyn Fn(&T) -> NodeRef<bool>>),
}

struct Slot<T> {
    item: T,
    passes: bool,
    tracker: Option<NodeRef<bool>>,
}

/// Sequence of the source items that satisfy a predicate.
pub struct Filter<T: Data> {
    core: NodeCore<Delta<T>>,
    source: SequenceRef<T>,
    predicate: Predicate<T>,
    slots: RefCell<Option<SlotTable<T>>>,
    this: Weak<Self>,
}

const CHUNK: usize = 64;

struct Chunk<T> {
    slots: Vec<Slot<T>>,
    passing: usize,
}

impl<T> Chunk<T> {
    fn new(slots: Vec<Slot<T>>) -> Self {
        let passing = slots.iter().filter(|slot| slot.passes).count();
        Self { slots, passing }
    }
}

/// Slots in source order, split into chunks of `CHUNK` to `2 * CHUNK`.
///
/// Chunks below a quarter of `CHUNK` are merged into a neighbour when the
/// result still fits.
struct SlotTable<T> {
    chunks: Vec<Chunk<T>>,
    len: usize,
}

impl<T> SlotTable<T> {
    fn from_slots(slots: Vec<Slot<T>>) -> Self {
        let len = slots.len();
        let mut chunks = Vec::with_capacity(len / CHUNK + 1);
        let mut rest = slots.into_iter().peekable();
        while rest.peek().is_some() {
            chunks.push(Chunk::new(rest.by_ref().take(CHUNK).collect()));
        }
        Self { chunks, len }
    }

    fn len(&self) -> usize {
        self.len
    }

    /// Chunk and offset of `index`. `len` maps past the end of the last chunk.
    fn locate(&self, mut index: usize) -> (usize, usize) {
        for (position, chunk) in self.chunks.iter().enumerate() {
            if index < chunk.slots.len() {
                return (position, index);
            }
            index -= chunk.slots.len();
        }
        match self.chunks.last() {
            Some(last) => (self.chunks.len() - 1, last.slots.len()),
            None => (0, 0),
        }
    }

    fn get(&self, index: usize) -> &Slot<T> {
        let (chunk, offset) = self.locate(index);
        &self.chunks[chunk].slots[offset]
    }

    /// Number of passing slots before `index`.
    fn passing_before(&self, mut index: usize) -> usize {
        let mut passing = 0;
        for chunk in &self.chunks {
            if index < chunk.slots.len() {
                return passing + chunk.slots[..index].iter().filter(|s| s.passes).count();
            }
            passing += chunk.passing;
            index -= chunk.slots.len();
        }
        passing
    }

    /// The `n`th passing slot.
    fn nth_passing(&self, mut n: usize) -> Option<&Slot<T>> {
        for chunk in &self.chunks {
            if n < chunk.passing {
                return chunk.slots.iter().filter(|slot| slot.passes).nth(n);
            }
            n -= chunk.passing;
        }
        None
    }

    fn iter(&self) -> impl Iterator<Item = &Slot<T>> {
        self.chunks.iter().flat_map(|chunk| chunk.slots.iter())
    }

    fn insert(&mut self, index: usize, slot: Slot<T>) {
        if self.chunks.is_empty() {
            self.chunks.push(Chunk::new(Vec::new()));
        }
        let (position, offset) = self.locate(index);
        let chunk = &mut self.chunks[position];
        chunk.passing += usize::from(slot.passes);
        chunk.slots.insert(offset, slot);
        self.len += 1;

        if chunk.slots.len() > 2 * CHUNK {
            let tail = Chunk::new(chunk.slots.split_off(CHUNK));
            chunk.passing -= tail.passing;
            self.chunks.insert(position + 1, tail);
        }
    }

    fn remove(&mut self, index: usize) -> Slot<T> {
        let (position, offset) = self.locate(index);
        let chunk = &mut self.chunks[position];
        let slot = chunk.slots.remove(offset);
        chunk.passing -= usize::from(slot.passes);
        self.len -= 1;

        if chunk.slots.is_empty() {
            self.chunks.remove(position);
        } else if chunk.slots.len() < CHUNK / 4 {
            self.merge_around(position);
        }
        slot
    }

    fn merge_around(&mut self, position: usize) {
        let size = |at: usize| self.chunks.get(at).map(|chunk| chunk.slots.len());
        let small = self.chunks[position].slots.len();
        let fits = |at: Option<usize>| {
            at.and_then(size).is_some_and(|other| small + other <= 2 * CHUNK)
        };
        let target = if fits(Some(position + 1)) {
            position
        } else if fits(position.checked_sub(1)) {
            position - 1
        } else {
            return;
        };
        let next = self.chunks.remove(target + 1);
        let chunk = &mut self.chunks[target];
        chunk.passing += next.passing;
        chunk.slots.extend(next.slots);
    }

    fn replace(&mut self, index: usize, slot: Slot<T>) -> Slot<T> {
        let (position, offset) = self.locate(index);
        let chunk = &mut self.chunks[position];
        chunk.passing += usize::from(slot.passes);
        let old = std::mem::replace(&mut chunk.slots[offset], slot);
        chunk.passing -= usize::from(old.passes);
        old
    }

    fn set_passes(&mut self, index: usize, passes: bool) {
        let (position, offset) = self.locate(index);
        let chunk = &mut self.chunks[position];
        let slot = &mut chunk.slots[offset];
        if slot.passes != passes {
            slot.passes = passes;
            if passes {
                chunk.passing += 1;
            } else {
                chunk.passing -= 1;
            }
        }
    }

    fn into_slots(self) -> Vec<Slot<T>> {
        self.chunks
            .into_iter()
            .flat_map(|chunk| chunk.slots)
            .collect()
    }
}

impl<T: Data> Filter<T> {
    pub fn new(source: SequenceRef<T>, predicate: Predicate<T>) -> SequenceRef<T> {
        let ancestry = Ancestry::derive([(source.id(), &source.ancestry())]);
        Rc::new_cyclic(|this| Self {
            core: NodeCore::new(NodeKind::Derived, ancestry),
            source,
            predicate,
            slots: RefCell::new(None),
            this: this.clone(),
        })
    }

    /// Build the slot for `item`, listening to its tracker if it has one.
    fn admit(&self, item: T) -> Result<Slot<T>> {
        match &self.predicate {
            Predicate::Static(predicate) => Ok(Slot {
                passes: predicate(&item),
                item,
                tracker: None,
            }),
            Predicate::Tracked(track) => {
                let tracker = track(&item);
                let listener: Weak<dyn Listener<ValueChange<bool>>> = self.this.clone();
                tracker.register_dependent(self.core.id(), listener)?;
                match tracker.value() {
                    Ok(passes) => Ok(Slot {
                        item,
                        passes,
                        tracker: Some(tracker),
                    }),
                    Err(err) => {
                        tracker.unregister_dependent(self.core.id());
                        Err(err)
                    }
                }
            }
        }
    }

    fn release(&self, slot: &Slot<T>) {
        if let Some(tracker) = &slot.tracker {
            tracker.unregister_dependent(self.core.id());
        }
    }

    fn release_all(&self, slots: &[Slot<T>]) {
        for slot in slots.iter().rev() {
            self.release(slot);
        }
    }

    fn passes(&self, item: &T) -> Result<bool> {
        match &self.predicate {
            Predicate::Static(predicate) => Ok(predicate(item)),
            Predicate::Tracked(track) => track(item).value(),
        }
    }

    fn out_of_range(&self, index: usize, len: usize) -> Error {
        Error::ConsistencyViolation {
            node: self.core.id(),
            detail: format!("delta addresses slot {index} of {len}"),
        }
    }

    /// Fold a source delta into the slots and return the output delta.
    fn translate(&self, delta: &Delta<T>) -> Result<Option<Delta<T>>> {
        match delta {
            Delta::Add { index, item } => {
                let slot = self.admit(item.clone())?;
                let mut state = self.slots.borrow_mut();
                let Some(slots) = state.as_mut() else {
                    drop(state);
                    self.release(&slot);
                    return Ok(None);
                };
                if *index > slots.len() {
                    let err = self.out_of_range(*index, slots.len());
                    drop(state);
                    self.release(&slot);
                    return Err(err);
                }
                let out = slots.passing_before(*index);
                let passes = slot.passes;
                slots.insert(*index, slot);
                Ok(passes.then(|| Delta::Add {
                    index: out,
                    item: item.clone(),
                }))
            }
            Delta::Remove { index, .. } => {
                let (out, slot) = {
                    let mut state = self.slots.borrow_mut();
                    let Some(slots) = state.as_mut() else {
                        return Ok(None);
                    };
                    if *index >= slots.len() {
                        return Err(self.out_of_range(*index, slots.len()));
                    }
                    (slots.passing_before(*index), slots.remove(*index))
                };
                self.release(&slot);
                Ok(slot.passes.then_some(Delta::Remove {
                    index: out,
                    item: slot.item,
                }))
            }
            Delta::Replace { index, new, .. } => {
                let slot = self.admit(new.clone())?;
                let mut state = self.slots.borrow_mut();
                let Some(slots) = state.as_mut() else {
                    drop(state);
                    self.release(&slot);
                    return Ok(None);
                };
                if *index >= slots.len() {
                    let err = self.out_of_range(*index, slots.len());
                    drop(state);
                    self.release(&slot);
                    return Err(err);
                }
                let out = slots.passing_before(*index);
                let now_passes = slot.passes;
                let old = slots.replace(*index, slot);
                drop(state);
                self.release(&old);

                let index = out;
                Ok(match (old.passes, now_passes) {
                    (true, true) if old.item == *new => None,
                    (true, true) => Some(Delta::Replace {
                        index,
                        old: old.item,
                        new: new.clone(),
                    }),
                    (true, false) => Some(Delta::Remove {
                        index,
                        item: old.item,
                    }),
                    (false, true) => Some(Delta::Add {
                        index,
                        item: new.clone(),
                    }),
                    (false, false) => None,
                })
            }
            Delta::Move { from, to, .. } => {
                let mut state = self.slots.borrow_mut();
                let Some(slots) = state.as_mut() else {
                    return Ok(None);
                };
                let len = slots.len();
                if *from >= len || *to >= len {
                    return Err(self.out_of_range((*from).max(*to), len));
                }
                let out_from = slots.passing_before(*from);
                let slot = slots.remove(*from);
                slots.insert(*to, slot);
                let out_to = slots.passing_before(*to);
                let moved = slots.get(*to);
                Ok((moved.passes && out_from != out_to).then(|| Delta::Move {
                    from: out_from,
                    to: out_to,
                    item: moved.item.clone(),
                }))
            }
        }
    }

    fn passing(&self) -> Vec<T> {
        self.slots
            .borrow()
            .iter()
            .flat_map(SlotTable::iter)
            .filter(|slot| slot.passes)
            .map(|slot| slot.item.clone())
            .collect()
    }

    fn publish(&self, out: &Delta<T>) -> Result<()> {
        if EngineConfig::current().validate_consistency {
            verify(self.core.id(), &self.passing(), || self.evaluate())?;
        }
        self.core.dispatch(out)
    }
}

impl<T: Data> Attach for Filter<T> {
    fn attach(&self) -> Result<()> {
        let listener: Weak<dyn Listener<Delta<T>>> = self.this.clone();
        self.source.register_dependent(self.core.id(), listener)?;

        let items = match self.source.snapshot() {
            Ok(items) => items,
            Err(err) => {
                self.source.unregister_dependent(self.core.id());
                return Err(err);
            }
        };
        let mut slots = Vec::with_capacity(items.len());
        for item in items {
            match self.admit(item) {
                Ok(slot) => slots.push(slot),
                Err(err) => {
                    self.release_all(&slots);
                    self.source.unregister_dependent(self.core.id());
                    return Err(err);
                }
            }
        }
        *self.slots.borrow_mut() = Some(SlotTable::from_slots(slots));
        Ok(())
    }

    fn detach(&self) {
        self.source.unregister_dependent(self.core.id());
        let slots = self.slots.borrow_mut().take();
        if let Some(slots) = slots {
            self.release_all(&slots.into_slots());
        }
    }
}

impl<T: Data> Listener<Delta<T>> for Filter<T> {
    fn on_change(&self, _origin: NodeId, delta: &Delta<T>) -> Result<()> {
        if !self.core.is_attached() {
            return Ok(());
        }
        match self.translate(delta)? {
            Some(out) => self.publish(&out),
            None => Ok(()),
        }
    }

    fn on_disposed(&self, _origin: NodeId) {
        self.core.dispose(self);
    }
}

impl<T: Data> Listener<ValueChange<bool>> for Filter<T> {
    /// A tracker flipped. Every slot listening to it is updated and
    /// published in turn, so no borrow is held while dependents run.
    fn on_change(&self, origin: NodeId, change: &ValueChange<bool>) -> Result<()> {
        if !self.core.is_attached() {
            return Ok(());
        }
        let mut first_error = None;
        let mut position = 0;
        loop {
            let out = {
                let mut state = self.slots.borrow_mut();
                let Some(slots) = state.as_mut() else {
                    break;
                };
                let flipped = slots.iter().enumerate().skip(position).find(|(_, slot)| {
                    slot.passes != change.new
                        && slot.tracker.as_ref().is_some_and(|t| t.id() == origin)
                });
                let Some((index, slot)) = flipped else {
                    break;
                };
                position = index + 1;

                let item = slot.item.clone();
                let out = slots.passing_before(index);
                slots.set_passes(index, change.new);
                if change.new {
                    Delta::Add { index: out, item }
                } else {
                    Delta::Remove { index: out, item }
                }
            };
            if let Err(err) = self.publish(&out) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn on_disposed(&self, _origin: NodeId) {
        self.core.dispose(self);
    }
}

impl_observable!(impl[T: Data] Filter<T> => Delta<T>);

impl<T: Data> Sequence<T> for Filter<T> {
    fn snapshot(&self) -> Result<Vec<T>> {
        if self.slots.borrow().is_some() {
            return Ok(self.passing());
        }
        self.evaluate()
    }

    fn evaluate(&self) -> Result<Vec<T>> {
        self.core.record_evaluation();
        let mut passing = Vec::new();
        for item in self.source.snapshot()? {
            if self.passes(&item)? {
                passing.push(item);
            }
        }
        Ok(passing)
    }

    fn item_at(&self, index: usize) -> Result<Option<T>> {
        {
            let state = self.slots.borrow();
            if let Some(slots) = state.as_ref() {
                return Ok(slots.nth_passing(index).map(|slot| slot.item.clone()));
            }
        }
        Ok(self.evaluate()?.into_iter().nth(index))
    }
}
