//! The head of a sequence as a scalar node.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::{Delta, Sequence, SequenceRef};
use crate::error::Result;
use crate::graph::{
    impl_observable, verify, Ancestry, Attach, Data, Listener, Node, NodeCore, NodeId, NodeKind,
    NodeRef, Observable, ValueChange,
};

/// Node holding the first item of a sequence, or `None` when it is empty.
///
/// Only deltas touching position zero cause a read of the source.
pub struct First<T: Data> {
    core: NodeCore<ValueChange<Option<T>>>,
    source: SequenceRef<T>,
    cache: RefCell<Option<Option<T>>>,
    this: Weak<Self>,
}

impl<T: Data> First<T> {
    pub fn new(source: SequenceRef<T>) -> NodeRef<Option<T>> {
        let ancestry = Ancestry::derive([(source.id(), &source.ancestry())]);
        Rc::new_cyclic(|this| Self {
            core: NodeCore::new(NodeKind::Derived, ancestry),
            source,
            cache: RefCell::new(None),
            this: this.clone(),
        })
    }
}

fn touches_head<T>(delta: &Delta<T>) -> bool {
    match delta {
        Delta::Add { index, .. } | Delta::Remove { index, .. } | Delta::Replace { index, .. } => {
            *index == 0
        }
        Delta::Move { from, to, .. } => *from == 0 || *to == 0,
    }
}

impl<T: Data> Attach for First<T> {
    fn attach(&self) -> Result<()> {
        let listener: Weak<dyn Listener<Delta<T>>> = self.this.clone();
        self.source.register_dependent(self.core.id(), listener)?;
        match self.source.item_at(0) {
            Ok(head) => {
                *self.cache.borrow_mut() = Some(head);
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

impl<T: Data> Listener<Delta<T>> for First<T> {
    fn on_change(&self, _origin: NodeId, delta: &Delta<T>) -> Result<()> {
        if !self.core.is_attached() || !touches_head(delta) {
            return Ok(());
        }
        let head = self.source.item_at(0)?;
        let old = {
            let mut cache = self.cache.borrow_mut();
            let Some(current) = cache.as_mut() else {
                return Ok(());
            };
            if *current == head {
                return Ok(());
            }
            std::mem::replace(current, head.clone())
        };
        verify(self.core.id(), &head, || self.evaluate())?;
        self.core.dispatch(&ValueChange::new(old, head))
    }

    fn on_disposed(&self, _origin: NodeId) {
        self.core.dispose(self);
    }
}

impl_observable!(impl[T: Data] First<T> => ValueChange<Option<T>>);

impl<T: Data> Node<Option<T>> for First<T> {
    fn value(&self) -> Result<Option<T>> {
        if let Some(head) = self.cache.borrow().as_ref() {
            return Ok(head.clone());
        }
        self.evaluate()
    }

    fn evaluate(&self) -> Result<Option<T>> {
        self.core.record_evaluation();
        Ok(self.source.snapshot()?.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use crate::prelude::*;
    use crate::sequence::ObservableVec;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn follows_the_head() {
        let items = ObservableVec::from_vec(vec![3, 4]);
        let head = items.as_sequence().first();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let _subscription = head
            .subscribe(move |change| sink.borrow_mut().push(change.new))
            .unwrap();

        items.push(5).unwrap();
        items.insert(0, 1).unwrap();
        items.move_item(0, 2).unwrap();
        items.clear().unwrap();

        assert_eq!(*seen.borrow(), vec![Some(1), Some(3), None]);
        assert_eq!(head.value().unwrap(), None);
    }

    #[test]
    fn first_of_filtered_sequence() {
        let items = ObservableVec::from_vec(vec![1, 3, 4, 6]);
        let first_even = items.as_sequence().filter(|v| v % 2 == 0).first();
        let _subscription = first_even.subscribe(|_| {}).unwrap();
        assert_eq!(first_even.value().unwrap(), Some(4));

        items.remove(2).unwrap();
        assert_eq!(first_even.value().unwrap(), Some(6));
        assert_eq!(first_even.value().unwrap(), first_even.evaluate().unwrap());
    }
}
