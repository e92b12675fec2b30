//! External subscribers.
//!
//! A subscriber is a callback registered as a dependent of a node. It is the
//! sink end of the graph: it receives changes and emits nothing.
//!
//! Subscribing returns a [`Subscription`]. The subscription owns the
//! callback and a strong handle to the observed node, so the node and its
//! predecessors stay alive while it exists. Disposing (or dropping) it
//! unregisters the callback, which detaches the node once nothing else
//! depends on it.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::debug;

use crate::error::Result;
use crate::graph::{Listener, NodeId, Observable};

/// A callback registered as a dependent.
struct Callback<C> {
    notify: Box<dyn Fn(&C)>,
    active: Rc<Cell<bool>>,
}

impl<C> Listener<C> for Callback<C> {
    fn on_change(&self, _origin: NodeId, change: &C) -> Result<()> {
        // A dispatch snapshot may still reach a callback disposed mid-pass.
        if self.active.get() {
            (self.notify)(change);
        }
        Ok(())
    }

    fn on_disposed(&self, origin: NodeId) {
        debug!(source = %origin, "subscription ended by dispose");
        self.active.set(false);
    }
}

/// Handle to a registered callback.
///
/// Dropping the handle unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: NodeId,
    active: Rc<Cell<bool>>,
    release: Option<Box<dyn FnOnce()>>,
}

impl Subscription {
    /// Get the subscriber's unique ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// `false` once disposed, or once the observed node was disposed.
    pub fn is_active(&self) -> bool {
        self.release.is_some() && self.active.get()
    }

    /// Unsubscribe. Calling this more than once has no further effect.
    pub fn dispose(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Register `notify` as a dependent of `source`.
pub fn subscribe<C, S, F>(source: Rc<S>, notify: F) -> Result<Subscription>
where
    C: 'static,
    S: Observable<C> + ?Sized + 'static,
    F: Fn(&C) + 'static,
{
    let id = NodeId::new();
    let active = Rc::new(Cell::new(true));
    let callback = Rc::new(Callback {
        notify: Box::new(notify),
        active: active.clone(),
    });
    let listener: Rc<dyn Listener<C>> = callback.clone();
    source.register_dependent(id, Rc::downgrade(&listener))?;

    Ok(Subscription {
        id,
        active,
        release: Some(Box::new(move || {
            callback.active.set(false);
            source.unregister_dependent(id);
            drop(listener);
        })),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Lifecycle, ValueChange};
    use crate::reactive::{NodeExt, Property, PropertyNode};
    use std::cell::RefCell;

    #[test]
    fn subscription_receives_changes_until_disposed() {
        let property = Property::new(1);
        let node = PropertyNode::new(property.clone());
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();

        let mut subscription = node
            .subscribe(move |change: &ValueChange<i32>| sink.borrow_mut().push(change.new))
            .unwrap();
        assert!(subscription.is_active());

        property.set(2).unwrap();
        subscription.dispose();
        assert!(!subscription.is_active());
        property.set(3).unwrap();

        assert_eq!(*seen.borrow(), vec![2]);
    }

    #[test]
    fn dispose_is_idempotent() {
        let property = Property::new(0);
        let node = PropertyNode::new(property);

        let mut first = node.subscribe(|_| {}).unwrap();
        let _second = node.subscribe(|_| {}).unwrap();
        assert_eq!(node.dependent_count(), 2);

        first.dispose();
        first.dispose();
        assert_eq!(node.dependent_count(), 1);
        assert_eq!(node.lifecycle(), Lifecycle::Attached);
    }

    #[test]
    fn disposing_the_source_ends_the_subscription() {
        let property = Property::new(0);
        let node = PropertyNode::new(property.clone());
        let seen = Rc::new(Cell::new(0));
        let counter = seen.clone();
        let subscription = node
            .subscribe(move |_| counter.set(counter.get() + 1))
            .unwrap();

        node.dispose();
        property.set(1).unwrap();
        assert!(!subscription.is_active());
        assert_eq!(seen.get(), 0);
        assert_eq!(node.lifecycle(), Lifecycle::Dormant);
    }

    #[test]
    fn drop_unsubscribes() {
        let property = Property::new(0);
        let node = PropertyNode::new(property);

        {
            let _subscription = node.subscribe(|_| {}).unwrap();
            assert_eq!(node.lifecycle(), Lifecycle::Attached);
        }
        assert_eq!(node.lifecycle(), Lifecycle::Dormant);
    }
}
