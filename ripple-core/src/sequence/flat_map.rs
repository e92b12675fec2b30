//! Flattening projection.
//!
//! `FlatMap` expands every source item into an inner sequence and presents
//! their concatenation. It keeps one segment per source item with the inner
//! node and its length. The output offset of a segment is the total length
//! of the segments before it.
//!
//! While attached the operator listens to the source and to every inner
//! sequence:
//!
//! - a source `Add` splices the new inner sequence in as a run of `Add`s
//! - a source `Remove` takes its segment out as a run of `Remove`s, last
//!   item first
//! - a source `Replace` is a `Remove` run followed by an `Add` run
//! - a source `Move` moves the segment's items one by one
//! - an inner delta is re-emitted shifted by its segment's offset
//!
//! The concatenated items are cached and every emitted delta is applied to
//! the cache just before it is dispatched, so a dependent reading the
//! snapshot mid-run sees exactly the deltas delivered so far.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::{Delta, Sequence, SequenceRef};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::graph::{
    impl_observable, verify, Ancestry, Attach, Data, Listener, NodeCore, NodeId, NodeKind,
    Observable,
};

type Expansion<T, U> = Box<dyn Fn(&T) -> SequenceRef<U>>;

struct Segment<U: Data> {
    inner: SequenceRef<U>,
    len: usize,
}

struct Expanded<U: Data> {
    segments: Vec<Segment<U>>,
    items: Vec<U>,
}

/// Concatenation of the sequences produced for every source item.
pub struct FlatMap<T: Data, U: Data> {
    core: NodeCore<Delta<U>>,
    source: SequenceRef<T>,
    expand: Expansion<T, U>,
    state: RefCell<Option<Expanded<U>>>,
    link: Rc<dyn Listener<Delta<U>>>,
    this: Weak<Self>,
}

/// Listener registered on the inner sequences.
///
/// Kept apart from `FlatMap` so the source and inner listeners stay distinct
/// when both sequences carry the same item type.
struct InnerLink<T: Data, U: Data> {
    owner: Weak<FlatMap<T, U>>,
}

impl<T: Data, U: Data> Listener<Delta<U>> for InnerLink<T, U> {
    fn on_change(&self, origin: NodeId, delta: &Delta<U>) -> Result<()> {
        match self.owner.upgrade() {
            Some(owner) => owner.on_inner_change(origin, delta),
            None => Ok(()),
        }
    }

    fn on_disposed(&self, _origin: NodeId) {
        if let Some(owner) = self.owner.upgrade() {
            owner.core.dispose(&*owner);
        }
    }
}

fn offset_of<U: Data>(segments: &[Segment<U>]) -> usize {
    segments.iter().map(|segment| segment.len).sum()
}

fn added<U: Clone>(offset: usize, items: &[U]) -> Vec<Delta<U>> {
    items
        .iter()
        .enumerate()
        .map(|(k, item)| Delta::Add {
            index: offset + k,
            item: item.clone(),
        })
        .collect()
}

fn removed<U: Clone>(offset: usize, items: &[U]) -> Vec<Delta<U>> {
    items
        .iter()
        .enumerate()
        .rev()
        .map(|(k, item)| Delta::Remove {
            index: offset + k,
            item: item.clone(),
        })
        .collect()
}

/// Move the block `items` from output offset `from` to `to`, where `to` is
/// the block's offset once the move is done.
fn moved<U: Clone>(from: usize, to: usize, items: &[U]) -> Vec<Delta<U>> {
    let len = items.len();
    if from < to {
        // the head of the block goes to the far end, len times
        items
            .iter()
            .map(|item| Delta::Move {
                from,
                to: to + len - 1,
                item: item.clone(),
            })
            .collect()
    } else if from > to {
        items
            .iter()
            .rev()
            .map(|item| Delta::Move {
                from: from + len - 1,
                to,
                item: item.clone(),
            })
            .collect()
    } else {
        Vec::new()
    }
}

impl<T: Data, U: Data> FlatMap<T, U> {
    pub fn new<F>(source: SequenceRef<T>, expand: F) -> SequenceRef<U>
    where
        F: Fn(&T) -> SequenceRef<U> + 'static,
    {
        let ancestry = Ancestry::derive([(source.id(), &source.ancestry())]);
        Rc::new_cyclic(|this: &Weak<Self>| {
            let link: Rc<dyn Listener<Delta<U>>> = Rc::new(InnerLink {
                owner: this.clone(),
            });
            Self {
                core: NodeCore::new(NodeKind::Derived, ancestry),
                source,
                expand: Box::new(expand),
                state: RefCell::new(None),
                link,
                this: this.clone(),
            }
        })
    }

    /// Expand `item` and start listening to the inner sequence.
    fn admit(&self, item: &T) -> Result<(Segment<U>, Vec<U>)> {
        let inner = (self.expand)(item);
        inner.register_dependent(self.core.id(), Rc::downgrade(&self.link))?;
        match inner.snapshot() {
            Ok(items) => Ok((
                Segment {
                    inner,
                    len: items.len(),
                },
                items,
            )),
            Err(err) => {
                inner.unregister_dependent(self.core.id());
                Err(err)
            }
        }
    }

    fn release(&self, segment: &Segment<U>) {
        segment.inner.unregister_dependent(self.core.id());
    }

    fn release_all(&self, segments: &[Segment<U>]) {
        for segment in segments.iter().rev() {
            self.release(segment);
        }
    }

    fn out_of_range(&self, index: usize, len: usize) -> Error {
        Error::ConsistencyViolation {
            node: self.core.id(),
            detail: format!("delta addresses segment {index} of {len}"),
        }
    }

    /// Fold a source delta into the segments and return the output run.
    ///
    /// The cached items are left alone; `emit` applies the run.
    fn translate(&self, delta: &Delta<T>) -> Result<Vec<Delta<U>>> {
        match delta {
            Delta::Add { index, item } => {
                let (segment, items) = self.admit(item)?;
                let mut state = self.state.borrow_mut();
                let Some(state) = state.as_mut() else {
                    self.release(&segment);
                    return Ok(Vec::new());
                };
                if *index > state.segments.len() {
                    self.release(&segment);
                    return Err(self.out_of_range(*index, state.segments.len()));
                }
                let offset = offset_of(&state.segments[..*index]);
                state.segments.insert(*index, segment);
                Ok(added(offset, &items))
            }
            Delta::Remove { index, .. } => {
                let (out, segment) = {
                    let mut state = self.state.borrow_mut();
                    let Some(state) = state.as_mut() else {
                        return Ok(Vec::new());
                    };
                    if *index >= state.segments.len() {
                        return Err(self.out_of_range(*index, state.segments.len()));
                    }
                    let offset = offset_of(&state.segments[..*index]);
                    let segment = state.segments.remove(*index);
                    let out = removed(offset, &state.items[offset..offset + segment.len]);
                    (out, segment)
                };
                self.release(&segment);
                Ok(out)
            }
            Delta::Replace { index, new, .. } => {
                let (segment, items) = self.admit(new)?;
                let (out, old) = {
                    let mut state = self.state.borrow_mut();
                    let Some(state) = state.as_mut() else {
                        self.release(&segment);
                        return Ok(Vec::new());
                    };
                    if *index >= state.segments.len() {
                        self.release(&segment);
                        return Err(self.out_of_range(*index, state.segments.len()));
                    }
                    let offset = offset_of(&state.segments[..*index]);
                    let same = state.segments[*index].inner.id() == segment.inner.id();
                    let old = std::mem::replace(&mut state.segments[*index], segment);
                    let mut out = Vec::new();
                    if !same {
                        out = removed(offset, &state.items[offset..offset + old.len]);
                        out.extend(added(offset, &items));
                    }
                    (out, old)
                };
                self.release(&old);
                Ok(out)
            }
            Delta::Move { from, to, .. } => {
                let mut state = self.state.borrow_mut();
                let Some(state) = state.as_mut() else {
                    return Ok(Vec::new());
                };
                let len = state.segments.len();
                if *from >= len || *to >= len {
                    return Err(self.out_of_range((*from).max(*to), len));
                }
                let old_offset = offset_of(&state.segments[..*from]);
                let segment = state.segments.remove(*from);
                let block = segment.len;
                state.segments.insert(*to, segment);
                let new_offset = offset_of(&state.segments[..*to]);
                Ok(moved(
                    old_offset,
                    new_offset,
                    &state.items[old_offset..old_offset + block],
                ))
            }
        }
    }

    /// Apply and dispatch `run` one delta at a time.
    fn emit(&self, run: Vec<Delta<U>>) -> Result<()> {
        let last = run.len().saturating_sub(1);
        let mut first_error = None;
        for (position, out) in run.into_iter().enumerate() {
            {
                let mut state = self.state.borrow_mut();
                let Some(state) = state.as_mut() else {
                    return Ok(());
                };
                out.apply_to(&mut state.items)?;
            }
            if position == last && EngineConfig::current().validate_consistency {
                verify(self.core.id(), &self.items(), || self.evaluate())?;
            }
            if let Err(err) = self.core.dispatch(&out) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn items(&self) -> Vec<U> {
        self.state
            .borrow()
            .as_ref()
            .map(|state| state.items.clone())
            .unwrap_or_default()
    }

    /// An inner sequence changed. Every segment holding it is updated and
    /// emitted in turn.
    fn on_inner_change(&self, origin: NodeId, delta: &Delta<U>) -> Result<()> {
        if !self.core.is_attached() {
            return Ok(());
        }
        let mut first_error = None;
        let mut position = 0;
        loop {
            let out = {
                let mut state = self.state.borrow_mut();
                let Some(state) = state.as_mut() else {
                    break;
                };
                let found = (position..state.segments.len())
                    .find(|&index| state.segments[index].inner.id() == origin);
                let Some(index) = found else {
                    break;
                };
                position = index + 1;

                let offset = offset_of(&state.segments[..index]);
                let segment = &mut state.segments[index];
                let in_range = match delta {
                    Delta::Add { index, .. } => *index <= segment.len,
                    Delta::Remove { index, .. } | Delta::Replace { index, .. } => {
                        *index < segment.len
                    }
                    Delta::Move { from, to, .. } => *from < segment.len && *to < segment.len,
                };
                if !in_range {
                    return Err(Error::ConsistencyViolation {
                        node: self.core.id(),
                        detail: format!("inner delta outside a segment of {}", segment.len),
                    });
                }
                match delta {
                    Delta::Add { .. } => segment.len += 1,
                    Delta::Remove { .. } => segment.len -= 1,
                    Delta::Replace { .. } | Delta::Move { .. } => {}
                }
                delta.offset_by(offset)
            };
            if let Err(err) = self.emit(vec![out]) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<T: Data, U: Data> Attach for FlatMap<T, U> {
    fn attach(&self) -> Result<()> {
        let listener: Weak<dyn Listener<Delta<T>>> = self.this.clone();
        self.source.register_dependent(self.core.id(), listener)?;

        let sources = match self.source.snapshot() {
            Ok(items) => items,
            Err(err) => {
                self.source.unregister_dependent(self.core.id());
                return Err(err);
            }
        };
        let mut segments = Vec::with_capacity(sources.len());
        let mut items = Vec::new();
        for item in &sources {
            match self.admit(item) {
                Ok((segment, inner)) => {
                    segments.push(segment);
                    items.extend(inner);
                }
                Err(err) => {
                    self.release_all(&segments);
                    self.source.unregister_dependent(self.core.id());
                    return Err(err);
                }
            }
        }
        *self.state.borrow_mut() = Some(Expanded { segments, items });
        Ok(())
    }

    fn detach(&self) {
        self.source.unregister_dependent(self.core.id());
        let state = self.state.borrow_mut().take();
        if let Some(state) = state {
            self.release_all(&state.segments);
        }
    }
}

impl<T: Data, U: Data> Listener<Delta<T>> for FlatMap<T, U> {
    fn on_change(&self, _origin: NodeId, delta: &Delta<T>) -> Result<()> {
        if !self.core.is_attached() {
            return Ok(());
        }
        let run = self.translate(delta)?;
        self.emit(run)
    }

    fn on_disposed(&self, _origin: NodeId) {
        self.core.dispose(self);
    }
}

impl_observable!(impl[T: Data, U: Data] FlatMap<T, U> => Delta<U>);

impl<T: Data, U: Data> Sequence<U> for FlatMap<T, U> {
    fn snapshot(&self) -> Result<Vec<U>> {
        if let Some(state) = self.state.borrow().as_ref() {
            return Ok(state.items.clone());
        }
        self.evaluate()
    }

    fn evaluate(&self) -> Result<Vec<U>> {
        self.core.record_evaluation();
        let mut items = Vec::new();
        for item in self.source.snapshot()? {
            items.extend((self.expand)(&item).snapshot()?);
        }
        Ok(items)
    }
}
