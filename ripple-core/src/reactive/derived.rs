//! Derived scalar nodes.
//!
//! A derived node caches a value computed from its predecessors. While
//! attached, every predecessor change is folded into the cache and a
//! [`ValueChange`] is pushed to dependents only if the result actually
//! differs. While dormant, reads evaluate from scratch.
//!
//! - [`MapNode`]: `f(source)`
//! - [`Combine`]: `f(&[p0, p1, ..])` over same-typed predecessors, slots
//!   kept in declared order. Predecessor changes only update the slots; the
//!   node recomputes once when the pass settles, so a diamond never shows a
//!   half-updated combination.
//! - [`Constant`]: a value that never changes

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::context::{PropagationScope, Settle};
use super::subscriber::{subscribe, Subscription};
use crate::error::{ConfigurationError, Result};
use crate::graph::{
    impl_observable, verify, Ancestry, Attach, Data, Listener, Node, NodeCore, NodeId, NodeKind,
    NodeRef, Observable, ValueChange,
};

/// Combinators available on every [`NodeRef`].
pub trait NodeExt<T: Data> {
    /// Derive a node holding `f(value)`.
    fn map<U, F>(&self, f: F) -> NodeRef<U>
    where
        U: Data,
        F: Fn(&T) -> U + 'static;

    /// Call `notify` on every change until the subscription is disposed.
    fn subscribe<F>(&self, notify: F) -> Result<Subscription>
    where
        F: Fn(&ValueChange<T>) + 'static;
}

impl<T: Data> NodeExt<T> for NodeRef<T> {
    fn map<U, F>(&self, f: F) -> NodeRef<U>
    where
        U: Data,
        F: Fn(&T) -> U + 'static,
    {
        MapNode::new(self.clone(), f)
    }

    fn subscribe<F>(&self, notify: F) -> Result<Subscription>
    where
        F: Fn(&ValueChange<T>) + 'static,
    {
        subscribe::<ValueChange<T>, dyn Node<T>, F>(self.clone(), notify)
    }
}

/// Node holding a projection of another node's value.
pub struct MapNode<T: Data, U: Data> {
    core: NodeCore<ValueChange<U>>,
    source: NodeRef<T>,
    project: Box<dyn Fn(&T) -> U>,
    cache: RefCell<Option<U>>,
    this: Weak<Self>,
}

impl<T: Data, U: Data> MapNode<T, U> {
    pub fn new<F>(source: NodeRef<T>, project: F) -> NodeRef<U>
    where
        F: Fn(&T) -> U + 'static,
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
}

impl<T: Data, U: Data> Attach for MapNode<T, U> {
    fn attach(&self) -> Result<()> {
        let listener: Weak<dyn Listener<ValueChange<T>>> = self.this.clone();
        self.source.register_dependent(self.core.id(), listener)?;
        match self.source.value() {
            Ok(input) => {
                *self.cache.borrow_mut() = Some((self.project)(&input));
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

impl<T: Data, U: Data> Listener<ValueChange<T>> for MapNode<T, U> {
    fn on_change(&self, _origin: NodeId, change: &ValueChange<T>) -> Result<()> {
        if !self.core.is_attached() {
            return Ok(());
        }
        let new = (self.project)(&change.new);
        let old = {
            let mut cache = self.cache.borrow_mut();
            let Some(current) = cache.as_mut() else {
                return Ok(());
            };
            if *current == new {
                return Ok(());
            }
            std::mem::replace(current, new.clone())
        };
        verify(self.core.id(), &new, || self.evaluate())?;
        self.core.dispatch(&ValueChange::new(old, new))
    }

    fn on_disposed(&self, _origin: NodeId) {
        self.core.dispose(self);
    }
}

impl<T: Data, U: Data> Node<U> for MapNode<T, U> {
    fn value(&self) -> Result<U> {
        if let Some(value) = self.cache.borrow().as_ref() {
            return Ok(value.clone());
        }
        self.evaluate()
    }

    fn evaluate(&self) -> Result<U> {
        self.core.record_evaluation();
        Ok((self.project)(&self.source.value()?))
    }
}

/// Node computed from several same-typed predecessors.
pub struct Combine<T: Data, U: Data> {
    core: NodeCore<ValueChange<U>>,
    predecessors: SmallVec<[NodeRef<T>; 2]>,
    combine: Box<dyn Fn(&[T]) -> U>,
    state: RefCell<Option<CombineState<T, U>>>,
    this: Weak<Self>,
}

struct CombineState<T, U> {
    inputs: Vec<T>,
    output: U,
}

/// Build a node holding `f(&[values of predecessors])`.
///
/// The slice passed to `f` follows the order of `predecessors`.
pub fn combine<T, U, F>(predecessors: Vec<NodeRef<T>>, f: F) -> Result<NodeRef<U>>
where
    T: Data,
    U: Data,
    F: Fn(&[T]) -> U + 'static,
{
    if predecessors.is_empty() {
        return Err(ConfigurationError::MissingPredecessor { operator: "combine" }.into());
    }
    let ancestries: Vec<(NodeId, Ancestry)> = predecessors
        .iter()
        .map(|p| (p.id(), p.ancestry()))
        .collect();
    let ancestry = Ancestry::derive(ancestries.iter().map(|(id, a)| (*id, a)));

    let node: NodeRef<U> = Rc::new_cyclic(|this| Combine {
        core: NodeCore::new(NodeKind::Derived, ancestry),
        predecessors: predecessors.into_iter().collect(),
        combine: Box::new(f),
        state: RefCell::new(None),
        this: this.clone(),
    });
    Ok(node)
}

impl<T: Data, U: Data> Combine<T, U> {
    fn read_inputs(&self) -> Result<Vec<T>> {
        self.predecessors.iter().map(|p| p.value()).collect()
    }

    fn release(&self, count: usize) {
        for predecessor in self.predecessors[..count].iter().rev() {
            predecessor.unregister_dependent(self.core.id());
        }
    }
}

impl<T: Data, U: Data> Attach for Combine<T, U> {
    fn attach(&self) -> Result<()> {
        for (registered, predecessor) in self.predecessors.iter().enumerate() {
            let listener: Weak<dyn Listener<ValueChange<T>>> = self.this.clone();
            if let Err(err) = predecessor.register_dependent(self.core.id(), listener) {
                self.release(registered);
                return Err(err);
            }
        }
        let inputs = match self.read_inputs() {
            Ok(inputs) => inputs,
            Err(err) => {
                self.release(self.predecessors.len());
                return Err(err);
            }
        };
        let output = (self.combine)(&inputs);
        *self.state.borrow_mut() = Some(CombineState { inputs, output });
        Ok(())
    }

    fn detach(&self) {
        self.release(self.predecessors.len());
        *self.state.borrow_mut() = None;
    }
}

impl<T: Data, U: Data> Listener<ValueChange<T>> for Combine<T, U> {
    fn on_change(&self, origin: NodeId, change: &ValueChange<T>) -> Result<()> {
        {
            let mut state = self.state.borrow_mut();
            let Some(state) = state.as_mut() else {
                return Ok(());
            };
            // The same predecessor may be declared in several slots.
            for (slot, predecessor) in self.predecessors.iter().enumerate() {
                if predecessor.id() == origin {
                    state.inputs[slot] = change.new.clone();
                }
            }
        }
        let target: Weak<dyn Settle> = self.this.clone();
        PropagationScope::defer(self.core.id(), self.core.ancestry().len(), target);
        Ok(())
    }

    fn on_disposed(&self, _origin: NodeId) {
        self.core.dispose(self);
    }
}

impl<T: Data, U: Data> Settle for Combine<T, U> {
    fn settle(&self) -> Result<()> {
        let (old, new) = {
            let mut state = self.state.borrow_mut();
            let Some(state) = state.as_mut() else {
                return Ok(());
            };
            let new = (self.combine)(&state.inputs);
            if new == state.output {
                return Ok(());
            }
            (std::mem::replace(&mut state.output, new.clone()), new)
        };
        verify(self.core.id(), &new, || self.evaluate())?;
        self.core.dispatch(&ValueChange::new(old, new))
    }
}

impl<T: Data, U: Data> Node<U> for Combine<T, U> {
    fn value(&self) -> Result<U> {
        if let Some(state) = self.state.borrow().as_ref() {
            return Ok(state.output.clone());
        }
        self.evaluate()
    }

    fn evaluate(&self) -> Result<U> {
        self.core.record_evaluation();
        Ok((self.combine)(&self.read_inputs()?))
    }
}

/// A node whose value never changes.
pub struct Constant<T: Data> {
    core: NodeCore<ValueChange<T>>,
    value: T,
}

/// Build a constant node.
pub fn constant<T: Data>(value: T) -> NodeRef<T> {
    Rc::new(Constant {
        core: NodeCore::leaf(),
        value,
    })
}

impl<T: Data> Attach for Constant<T> {
    fn attach(&self) -> Result<()> {
        Ok(())
    }

    fn detach(&self) {}
}

impl<T: Data> Node<T> for Constant<T> {
    fn value(&self) -> Result<T> {
        Ok(self.value.clone())
    }

    fn evaluate(&self) -> Result<T> {
        Ok(self.value.clone())
    }
}

impl_observable!(impl[T: Data, U: Data] MapNode<T, U> => ValueChange<U>);
impl_observable!(impl[T: Data, U: Data] Combine<T, U> => ValueChange<U>);
impl_observable!(impl[T: Data] Constant<T> => ValueChange<T>);
