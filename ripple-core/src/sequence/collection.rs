//! The mutable source sequence.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::{Delta, Sequence, SequenceRef};
use crate::error::{Error, Result};
use crate::graph::{impl_observable, Attach, Data, NodeCore, NodeId, Observable};

struct VecSource<T: Data> {
    core: NodeCore<Delta<T>>,
    items: RefCell<Vec<T>>,
}

impl<T: Data> VecSource<T> {
    /// Apply `delta` to the items, then push it to the dependents.
    ///
    /// A dependent error does not undo the mutation.
    fn apply(&self, delta: Delta<T>) -> Result<()> {
        delta.apply_to(&mut self.items.borrow_mut())?;
        trace!(node = %self.core.id(), kind = ?delta.kind(), "sequence changed");
        self.core.dispatch(&delta)
    }

    fn len(&self) -> usize {
        self.items.borrow().len()
    }

    fn get(&self, index: usize) -> Result<T> {
        let items = self.items.borrow();
        items.get(index).cloned().ok_or(Error::IndexOutOfRange {
            index,
            len: items.len(),
        })
    }
}

impl<T: Data> Attach for VecSource<T> {
    fn attach(&self) -> Result<()> {
        Ok(())
    }

    fn detach(&self) {}
}

impl_observable!(impl[T: Data] VecSource<T> => Delta<T>);

impl<T: Data> Sequence<T> for VecSource<T> {
    fn snapshot(&self) -> Result<Vec<T>> {
        Ok(self.items.borrow().clone())
    }

    fn evaluate(&self) -> Result<Vec<T>> {
        self.core.record_evaluation();
        self.snapshot()
    }

    fn item_at(&self, index: usize) -> Result<Option<T>> {
        Ok(self.items.borrow().get(index).cloned())
    }
}

/// A vector that announces every structural change.
///
/// Each mutation changes the items first and then delivers exactly one
/// [`Delta`] per structural change to the dependents, before returning.
/// Errors raised by dependents are returned after the mutation has been
/// applied. Clones share the same storage.
///
/// # Example
///
/// ```rust
/// use ripple_core::prelude::*;
/// use ripple_core::sequence::ObservableVec;
///
/// let items = ObservableVec::from_vec(vec![1, 2, 3]);
/// let total = items.as_sequence().sum();
/// let _subscription = total.subscribe(|_| {}).unwrap();
///
/// items.push(4).unwrap();
/// assert_eq!(total.value().unwrap(), 10);
/// ```
pub struct ObservableVec<T: Data> {
    source: Rc<VecSource<T>>,
}

impl<T: Data> ObservableVec<T> {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            source: Rc::new(VecSource {
                core: NodeCore::leaf(),
                items: RefCell::new(items),
            }),
        }
    }

    pub fn id(&self) -> NodeId {
        self.source.core.id()
    }

    /// This collection as a graph node.
    pub fn as_sequence(&self) -> SequenceRef<T> {
        self.source.clone()
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.source.items.borrow().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.source.items.borrow().clone()
    }

    /// Number of dependents of the underlying node.
    pub fn dependent_count(&self) -> usize {
        self.source.dependent_count()
    }

    /// Append `item`.
    pub fn push(&self, item: T) -> Result<()> {
        let index = self.len();
        self.source.apply(Delta::Add { index, item })
    }

    /// Insert `item` at `index`, shifting later items back.
    pub fn insert(&self, index: usize, item: T) -> Result<()> {
        self.source.apply(Delta::Add { index, item })
    }

    /// Remove and return the item at `index`.
    pub fn remove(&self, index: usize) -> Result<T> {
        let item = self.source.get(index)?;
        self.source.apply(Delta::Remove {
            index,
            item: item.clone(),
        })?;
        Ok(item)
    }

    /// Replace the item at `index`. Replacing with an equal item does nothing.
    pub fn replace(&self, index: usize, item: T) -> Result<()> {
        let old = self.source.get(index)?;
        if old == item {
            return Ok(());
        }
        self.source.apply(Delta::Replace {
            index,
            old,
            new: item,
        })
    }

    /// Move the item at `from` so that it ends up at `to`.
    pub fn move_item(&self, from: usize, to: usize) -> Result<()> {
        let item = self.source.get(from)?;
        let len = self.len();
        if to >= len {
            return Err(Error::IndexOutOfRange { index: to, len });
        }
        if from == to {
            return Ok(());
        }
        self.source.apply(Delta::Move { from, to, item })
    }

    /// Remove every item, last to first, one delta per item.
    pub fn clear(&self) -> Result<()> {
        let mut first_error = None;
        while let Some(index) = self.len().checked_sub(1) {
            if let Err(err) = self.remove(index) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Append every item of `items`, one delta each.
    pub fn extend<I: IntoIterator<Item = T>>(&self, items: I) -> Result<()> {
        let mut first_error = None;
        for item in items {
            if let Err(err) = self.push(item) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl<T: Data> Default for ObservableVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Data> Clone for ObservableVec<T> {
    fn clone(&self) -> Self {
        Self {
            source: Rc::clone(&self.source),
        }
    }
}

impl<T: Data> FromIterator<T> for ObservableVec<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_vec(iter.into_iter().collect())
    }
}

impl<T: Data> fmt::Debug for ObservableVec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservableVec")
            .field("id", &self.id())
            .field("items", &*self.source.items.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::{subscribe, Subscription};
    use crate::sequence::replay;

    type Log<T> = Rc<RefCell<Vec<Delta<T>>>>;

    fn record<T: Data>(items: &ObservableVec<T>) -> (Log<T>, Subscription) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let subscription = subscribe(items.as_sequence(), move |delta: &Delta<T>| {
            sink.borrow_mut().push(delta.clone())
        })
        .unwrap();
        (log, subscription)
    }

    #[test]
    fn mutations_emit_one_delta_each() {
        let items = ObservableVec::from_vec(vec!['a', 'b']);
        let (log, _subscription) = record(&items);

        items.push('c').unwrap();
        items.insert(0, 'z').unwrap();
        assert_eq!(items.remove(1).unwrap(), 'a');
        items.replace(0, 'y').unwrap();
        items.move_item(0, 2).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                Delta::Add { index: 2, item: 'c' },
                Delta::Add { index: 0, item: 'z' },
                Delta::Remove { index: 1, item: 'a' },
                Delta::Replace {
                    index: 0,
                    old: 'z',
                    new: 'y'
                },
                Delta::Move {
                    from: 0,
                    to: 2,
                    item: 'y'
                },
            ]
        );
        assert_eq!(items.to_vec(), vec!['b', 'c', 'y']);
    }

    #[test]
    fn history_replays_to_snapshot() {
        let items = ObservableVec::new();
        let (log, _subscription) = record(&items);

        items.extend([3, 1, 4, 1, 5]).unwrap();
        items.move_item(4, 0).unwrap();
        items.replace(2, 9).unwrap();
        items.remove(3).unwrap();

        assert_eq!(replay(&log.borrow()).unwrap(), items.to_vec());
    }

    #[test]
    fn no_op_mutations_emit_nothing() {
        let items = ObservableVec::from_vec(vec![1, 2]);
        let (log, _subscription) = record(&items);

        items.replace(0, 1).unwrap();
        items.move_item(1, 1).unwrap();
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn out_of_range_changes_nothing() {
        let items = ObservableVec::from_vec(vec![1, 2]);
        let (log, _subscription) = record(&items);

        assert_eq!(
            items.insert(3, 0).unwrap_err(),
            Error::IndexOutOfRange { index: 3, len: 2 }
        );
        assert_eq!(
            items.move_item(0, 2).unwrap_err(),
            Error::IndexOutOfRange { index: 2, len: 2 }
        );
        assert!(items.remove(5).is_err());
        assert!(items.replace(2, 0).is_err());
        assert!(log.borrow().is_empty());
        assert_eq!(items.to_vec(), vec![1, 2]);
    }

    #[test]
    fn clear_removes_from_the_back() {
        let items: ObservableVec<i32> = (1..=3).collect();
        let (log, _subscription) = record(&items);

        items.clear().unwrap();
        assert!(items.is_empty());
        let removed: Vec<usize> = log
            .borrow()
            .iter()
            .map(|delta| match delta {
                Delta::Remove { index, .. } => *index,
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(removed, vec![2, 1, 0]);
    }
}
