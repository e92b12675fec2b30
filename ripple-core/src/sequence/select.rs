//! Positional projection.
//!
//! `Select` keeps one projected item per source item, at the same index.
//! The projection runs only for items carried by an incoming delta; removes
//! and moves reuse the cached projection.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::{Delta, Sequence, SequenceRef};
use crate::error::{Error, Result};
use crate::graph::{
    impl_observable, verify, Ancestry, Attach, Data, Listener, NodeCore, NodeId, NodeKind,
    Observable,
};

type Projection<T, U> = Box<dyn Fn(&T) -> Result<U>>;

/// Sequence of `f(item)` for every item of the source.
pub struct Select<T: Data, U: Data> {
    core: NodeCore<Delta<U>>,
    source: SequenceRef<T>,
    project: Projection<T, U>,
    cache: RefCell<Option<Vec<U>>>,
    this: Weak<Self>,
}

impl<T: Data, U: Data> Select<T, U> {
    /// Build a projection whose function may fail.
    ///
    /// A failure while attached leaves the cache as it was and nothing is
    /// pushed to the dependents.
    pub fn new<F>(source: SequenceRef<T>, project: F) -> SequenceRef<U>
    where
        F: Fn(&T) -> Result<U> + 'static,
    {
        let ancestry = Ancestry::derive([(source.id(), &source.ancestry())]);
        Rc::new_cyclic(|this| Self {
            core: NodeCore::new(NodeKind::Derived, ancestry),
            source,
            project: Box::new(project),
            cache: RefCell::new(None),
            this: this.clone(),
        })
    }

    fn project(&self, item: &T) -> Result<U> {
        (self.project)(item).map_err(|err| err.at(self.core.id()))
    }

    fn project_all(&self, items: &[T]) -> Result<Vec<U>> {
        items.iter().map(|item| self.project(item)).collect()
    }

    fn cached(&self, index: usize) -> Result<U> {
        let cache = self.cache.borrow();
        let items = cache.as_deref().unwrap_or_default();
        items.get(index).cloned().ok_or_else(|| Error::ConsistencyViolation {
            node: self.core.id(),
            detail: format!("delta addresses index {index} of {} cached items", items.len()),
        })
    }

    /// The delta this node emits for an incoming source delta, if any.
    fn translate(&self, delta: &Delta<T>) -> Result<Option<Delta<U>>> {
        let out = match delta {
            Delta::Add { index, item } => Delta::Add {
                index: *index,
                item: self.project(item)?,
            },
            Delta::Remove { index, .. } => Delta::Remove {
                index: *index,
                item: self.cached(*index)?,
            },
            Delta::Replace { index, new, .. } => {
                let new = self.project(new)?;
                let old = self.cached(*index)?;
                if old == new {
                    return Ok(None);
                }
                Delta::Replace {
                    index: *index,
                    old,
                    new,
                }
            }
            Delta::Move { from, to, .. } => Delta::Move {
                from: *from,
                to: *to,
                item: self.cached(*from)?,
            },
        };
        Ok(Some(out))
    }
}

impl<T: Data, U: Data> Attach for Select<T, U> {
    fn attach(&self) -> Result<()> {
        let listener: Weak<dyn Listener<Delta<T>>> = self.this.clone();
        self.source.register_dependent(self.core.id(), listener)?;
        let projected = self
            .source
            .snapshot()
            .and_then(|items| self.project_all(&items));
        match projected {
            Ok(items) => {
                *self.cache.borrow_mut() = Some(items);
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
        *self.cache.borrow_mut() = None;
    }
}

impl<T: Data, U: Data> Listener<Delta<T>> for Select<T, U> {
    fn on_change(&self, _origin: NodeId, delta: &Delta<T>) -> Result<()> {
        if !self.core.is_attached() {
            return Ok(());
        }
        let Some(out) = self.translate(delta)? else {
            return Ok(());
        };
        {
            let mut cache = self.cache.borrow_mut();
            let Some(items) = cache.as_mut() else {
                return Ok(());
            };
            out.apply_to(items)?;
        }
        {
            let cache = self.cache.borrow();
            if let Some(items) = cache.as_ref() {
                verify(self.core.id(), items, || self.evaluate())?;
            }
        }
        self.core.dispatch(&out)
    }

    fn on_disposed(&self, _origin: NodeId) {
        self.core.dispose(self);
    }
}

impl_observable!(impl[T: Data, U: Data] Select<T, U> => Delta<U>);

impl<T: Data, U: Data> Sequence<U> for Select<T, U> {
    fn snapshot(&self) -> Result<Vec<U>> {
        if let Some(items) = self.cache.borrow().as_ref() {
            return Ok(items.clone());
        }
        self.evaluate()
    }

    fn evaluate(&self) -> Result<Vec<U>> {
        self.core.record_evaluation();
        self.project_all(&self.source.snapshot()?)
    }

    fn item_at(&self, index: usize) -> Result<Option<U>> {
        if let Some(items) = self.cache.borrow().as_ref() {
            return Ok(items.get(index).cloned());
        }
        Ok(self.evaluate()?.into_iter().nth(index))
    }
}
