//! Properties and the leaf adapter.
//!
//! A property is collaborator state: a single mutable value that announces
//! each change twice, once before it is written ("changing") and once after
//! ("changed"), both times with the old and the new value. Model layers
//! implement [`NotifyProperty`] for their own storage; [`Property`] is a
//! ready-made implementation.
//!
//! [`PropertyNode`] adapts a property into the graph. While attached it
//! watches the property and, on "changed", updates its cache and notifies
//! its dependents before the setter returns. While dormant it holds no
//! watch and reads straight through to the property.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::error::{ConfigurationError, Result};
use crate::graph::{impl_observable, Attach, Data, Node, NodeCore, NodeId, NodeRef, ValueChange};

/// Receives the change notifications of a property.
pub trait PropertyObserver<T> {
    /// Called before the new value is stored.
    fn changing(&self, _old: &T, _new: &T) {}

    /// Called after the new value is stored.
    fn changed(&self, old: &T, new: &T) -> Result<()>;
}

/// The notification contract a collaborator property must satisfy.
pub trait NotifyProperty<T> {
    /// Current value.
    fn get(&self) -> T;

    /// Start delivering notifications to `observer` under `id`.
    fn watch(&self, id: NodeId, observer: Weak<dyn PropertyObserver<T>>);

    /// Stop delivering notifications registered under `id`.
    fn unwatch(&self, id: NodeId);
}

struct PropertyInner<T> {
    value: RefCell<T>,
    observers: RefCell<IndexMap<NodeId, Weak<dyn PropertyObserver<T>>>>,
}

/// A mutable value with changing/changed notifications.
///
/// Clones share the same storage.
///
/// # Example
///
/// ```rust
/// use ripple_core::prelude::*;
/// use ripple_core::reactive::{Property, PropertyNode};
///
/// let price = Property::new(10);
/// let doubled = PropertyNode::new(price.clone()).map(|p| p * 2);
/// assert_eq!(doubled.value().unwrap(), 20);
///
/// price.set(21).unwrap();
/// assert_eq!(doubled.value().unwrap(), 42);
/// ```
pub struct Property<T> {
    inner: Rc<PropertyInner<T>>,
}

impl<T: Data> Property<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Rc::new(PropertyInner {
                value: RefCell::new(value),
                observers: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Get the current value.
    pub fn get(&self) -> T {
        self.inner.value.borrow().clone()
    }

    /// Store `value` and notify observers.
    ///
    /// Setting an equal value does nothing. Errors raised while the change
    /// propagates are returned after every observer has been notified.
    pub fn set(&self, value: T) -> Result<()> {
        let old = self.get();
        if old == value {
            return Ok(());
        }

        let observers = self.observers();
        for observer in &observers {
            observer.changing(&old, &value);
        }

        *self.inner.value.borrow_mut() = value.clone();

        let mut first_error = None;
        for observer in &observers {
            if let Err(err) = observer.changed(&old, &value) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.inner.value.borrow());
        self.set(next)
    }

    /// Number of observers currently watching.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.borrow().len()
    }

    /// A handle that does not keep the property alive.
    pub fn downgrade(&self) -> WeakProperty<T> {
        WeakProperty {
            inner: Rc::downgrade(&self.inner),
        }
    }

    fn observers(&self) -> SmallVec<[Rc<dyn PropertyObserver<T>>; 2]> {
        self.inner
            .observers
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect()
    }
}

impl<T: Data> NotifyProperty<T> for Property<T> {
    fn get(&self) -> T {
        Property::get(self)
    }

    fn watch(&self, id: NodeId, observer: Weak<dyn PropertyObserver<T>>) {
        self.inner.observers.borrow_mut().insert(id, observer);
    }

    fn unwatch(&self, id: NodeId) {
        self.inner.observers.borrow_mut().shift_remove(&id);
    }
}

impl<T> Clone for Property<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: Data> Debug for Property<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Property")
            .field("value", &self.get())
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

/// Non-owning handle to a [`Property`].
pub struct WeakProperty<T> {
    inner: Weak<PropertyInner<T>>,
}

impl<T> WeakProperty<T> {
    pub fn upgrade(&self) -> Option<Property<T>> {
        self.inner.upgrade().map(|inner| Property { inner })
    }
}

impl<T> Clone for WeakProperty<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Leaf adapter exposing a property as a [`Node`].
pub struct PropertyNode<T: Data, P: NotifyProperty<T>> {
    core: NodeCore<ValueChange<T>>,
    property: P,
    cache: RefCell<Option<T>>,
    this: Weak<Self>,
}

impl<T: Data, P: NotifyProperty<T> + 'static> PropertyNode<T, P> {
    /// Wrap `property`. The node starts dormant.
    pub fn new(property: P) -> NodeRef<T> {
        Rc::new_cyclic(|this| Self {
            core: NodeCore::leaf(),
            property,
            cache: RefCell::new(None),
            this: this.clone(),
        })
    }
}

impl<T: Data> PropertyNode<T, Property<T>> {
    /// Wrap a property that may already have been dropped by its owner.
    pub fn bind(property: &WeakProperty<T>) -> Result<NodeRef<T>> {
        let property = property
            .upgrade()
            .ok_or(ConfigurationError::PropertyGone)?;
        Ok(Self::new(property))
    }
}

impl<T: Data, P: NotifyProperty<T> + 'static> Attach for PropertyNode<T, P> {
    fn attach(&self) -> Result<()> {
        let observer: Weak<dyn PropertyObserver<T>> = self.this.clone();
        self.property.watch(self.core.id(), observer);
        *self.cache.borrow_mut() = Some(self.property.get());
        Ok(())
    }

    fn detach(&self) {
        self.property.unwatch(self.core.id());
        *self.cache.borrow_mut() = None;
    }
}

impl<T: Data, P: NotifyProperty<T> + 'static> PropertyObserver<T> for PropertyNode<T, P> {
    fn changing(&self, old: &T, new: &T) {
        trace!(node = %self.core.id(), ?old, ?new, "property changing");
    }

    fn changed(&self, _old: &T, new: &T) -> Result<()> {
        let old = {
            let mut cache = self.cache.borrow_mut();
            let Some(current) = cache.as_mut() else {
                return Ok(());
            };
            if current == new {
                return Ok(());
            }
            std::mem::replace(current, new.clone())
        };
        trace!(node = %self.core.id(), ?old, ?new, "property changed");
        self.core.dispatch(&ValueChange::new(old, new.clone()))
    }
}

impl_observable!(impl[T: Data, P: NotifyProperty<T> + 'static] PropertyNode<T, P> => ValueChange<T>);

impl<T: Data, P: NotifyProperty<T> + 'static> Node<T> for PropertyNode<T, P> {
    fn value(&self) -> Result<T> {
        if let Some(value) = self.cache.borrow().as_ref() {
            return Ok(value.clone());
        }
        self.evaluate()
    }

    fn evaluate(&self) -> Result<T> {
        self.core.record_evaluation();
        Ok(self.property.get())
    }
}
