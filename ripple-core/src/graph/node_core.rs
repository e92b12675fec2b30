//! Node Core
//!
//! Bookkeeping every node shares: identity, lifecycle, the dependent table
//! and change dispatch. Operators embed a `NodeCore` and supply the
//! attach/detach hooks that subscribe to their own predecessors.
//!
//! # Dependent table
//!
//! Dependents are stored as `Weak` handles keyed by id in an `IndexMap`, so
//! dispatch order is the registration order. Each entry carries a
//! registration count: registering twice needs two unregistrations but the
//! dependent is notified once per change.
//!
//! # Dispatch
//!
//! The table is copied before any listener runs. A listener may register or
//! unregister dependents (itself included) while it is being notified
//! without disturbing the delivery in progress. When the outermost dispatch
//! of a pass finishes, nodes that deferred their recompute settle in
//! topological order (see [`PropagationScope`]).

use std::cell::{Cell, RefCell};
use std::fmt::Debug;
use std::rc::Weak;

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::{debug, error, trace, warn};

use super::node::{Lifecycle, NodeId, NodeKind};
use super::observable::Listener;
use super::topology::Ancestry;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::reactive::PropagationScope;

/// Hooks run on lifecycle transitions.
pub(crate) trait Attach {
    /// Subscribe to predecessors and build the cache.
    ///
    /// On failure the implementation must undo any registration it made.
    fn attach(&self) -> Result<()>;

    /// Unsubscribe from predecessors and drop the cache.
    fn detach(&self);
}

struct DependentEntry<C> {
    listener: Weak<dyn Listener<C>>,
    registrations: usize,
}

pub(crate) struct NodeCore<C> {
    id: NodeId,
    kind: NodeKind,
    ancestry: Ancestry,
    lifecycle: Cell<Lifecycle>,
    dependents: RefCell<IndexMap<NodeId, DependentEntry<C>>>,
    evaluations: Cell<u64>,
}

impl<C: 'static> NodeCore<C> {
    pub fn new(kind: NodeKind, ancestry: Ancestry) -> Self {
        Self {
            id: NodeId::new(),
            kind,
            ancestry,
            lifecycle: Cell::new(Lifecycle::Dormant),
            dependents: RefCell::new(IndexMap::new()),
            evaluations: Cell::new(0),
        }
    }

    pub fn leaf() -> Self {
        Self::new(NodeKind::Leaf, Ancestry::root())
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn ancestry(&self) -> Ancestry {
        self.ancestry.clone()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.get()
    }

    pub fn is_attached(&self) -> bool {
        self.lifecycle.get().is_attached()
    }

    pub fn dependent_count(&self) -> usize {
        self.dependents.borrow().len()
    }

    pub fn evaluation_count(&self) -> u64 {
        self.evaluations.get()
    }

    /// Count one from-scratch evaluation.
    pub fn record_evaluation(&self) {
        self.evaluations.set(self.evaluations.get() + 1);
    }

    /// Add a registration for `dependent`, attaching `host` if it was dormant.
    pub fn register<H: Attach + ?Sized>(
        &self,
        host: &H,
        dependent: NodeId,
        listener: Weak<dyn Listener<C>>,
    ) -> Result<()> {
        self.ancestry.check_edge(self.id, dependent)?;

        let inserted = {
            let mut dependents = self.dependents.borrow_mut();
            match dependents.get_mut(&dependent) {
                Some(entry) => {
                    entry.registrations += 1;
                    false
                }
                None => {
                    dependents.insert(
                        dependent,
                        DependentEntry {
                            listener,
                            registrations: 1,
                        },
                    );
                    true
                }
            }
        };

        if inserted && !self.is_attached() {
            if let Err(err) = host.attach() {
                self.dependents.borrow_mut().shift_remove(&dependent);
                return Err(err);
            }
            self.lifecycle.set(Lifecycle::Attached);
            debug!(node = %self.id, kind = ?self.kind, "attached");
        }
        Ok(())
    }

    /// Drop one registration of `dependent`, detaching `host` when the table
    /// becomes empty.
    pub fn unregister<H: Attach + ?Sized>(&self, host: &H, dependent: NodeId) {
        let emptied = {
            let mut dependents = self.dependents.borrow_mut();
            let Some(entry) = dependents.get_mut(&dependent) else {
                return;
            };
            entry.registrations -= 1;
            if entry.registrations == 0 {
                dependents.shift_remove(&dependent);
            }
            dependents.is_empty()
        };

        if emptied && self.is_attached() {
            self.detach(host);
        }
    }

    /// Drop every registration, detach, then tell the dropped dependents.
    pub fn dispose<H: Attach + ?Sized>(&self, host: &H) {
        let dropped: SmallVec<[Weak<dyn Listener<C>>; 4]> = self
            .dependents
            .borrow_mut()
            .drain(..)
            .map(|(_, entry)| entry.listener)
            .collect();
        if !dropped.is_empty() {
            warn!(node = %self.id, dropped = dropped.len(), "disposed node with live dependents");
        }
        if self.is_attached() {
            self.detach(host);
        }
        for listener in dropped {
            if let Some(listener) = listener.upgrade() {
                listener.on_disposed(self.id);
            }
        }
    }

    fn detach<H: Attach + ?Sized>(&self, host: &H) {
        // Dormant first so late notifications from a snapshot are ignored.
        self.lifecycle.set(Lifecycle::Dormant);
        host.detach();
        debug!(node = %self.id, kind = ?self.kind, "detached");
    }

    /// Deliver `change` to every dependent registered when the call starts.
    ///
    /// A failing dependent does not stop delivery to its siblings; the first
    /// error is returned once every dependent has been visited.
    pub fn dispatch(&self, change: &C) -> Result<()> {
        let targets: SmallVec<[Weak<dyn Listener<C>>; 4]> = self
            .dependents
            .borrow()
            .values()
            .map(|entry| entry.listener.clone())
            .collect();
        if targets.is_empty() {
            return Ok(());
        }

        let scope = PropagationScope::enter(self.id)?;
        trace!(node = %self.id, dependents = targets.len(), "dispatch");

        let mut first_error = None;
        for target in targets {
            let Some(listener) = target.upgrade() else {
                continue;
            };
            if let Err(err) = listener.on_change(self.id, change) {
                debug!(node = %self.id, error = %err, "dependent failed");
                first_error.get_or_insert(err);
            }
        }
        drop(scope);

        // Only the outermost dispatch gets past the guard inside.
        if let Err(err) = PropagationScope::settle_deferred() {
            first_error.get_or_insert(err);
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Compare a maintained value against a from-scratch evaluation when
/// validation is enabled.
pub(crate) fn verify<V, F>(node: NodeId, maintained: &V, evaluate: F) -> Result<()>
where
    V: PartialEq + Debug,
    F: FnOnce() -> Result<V>,
{
    if !EngineConfig::current().validate_consistency {
        return Ok(());
    }
    let expected = evaluate()?;
    if &expected != maintained {
        error!(node = %node, ?maintained, ?expected, "maintained value diverged");
        return Err(Error::ConsistencyViolation {
            node,
            detail: format!("maintained {maintained:?}, from scratch {expected:?}"),
        });
    }
    Ok(())
}

/// Implement `Observable` by forwarding to the type's `core` field.
///
/// The type must implement [`Attach`]; its hooks run on lifecycle
/// transitions.
macro_rules! impl_observable {
    (impl[$($generics:tt)*] $ty:ty => $change:ty) => {
        impl<$($generics)*> $crate::graph::Observable<$change> for $ty {
            fn id(&self) -> $crate::graph::NodeId {
                self.core.id()
            }

            fn ancestry(&self) -> $crate::graph::Ancestry {
                self.core.ancestry()
            }

            fn lifecycle(&self) -> $crate::graph::Lifecycle {
                self.core.lifecycle()
            }

            fn dependent_count(&self) -> usize {
                self.core.dependent_count()
            }

            fn evaluation_count(&self) -> u64 {
                self.core.evaluation_count()
            }

            fn register_dependent(
                &self,
                dependent: $crate::graph::NodeId,
                listener: ::std::rc::Weak<dyn $crate::graph::Listener<$change>>,
            ) -> $crate::error::Result<()> {
                self.core.register(self, dependent, listener)
            }

            fn unregister_dependent(&self, dependent: $crate::graph::NodeId) {
                self.core.unregister(self, dependent)
            }

            fn dispose(&self) {
                self.core.dispose(self)
            }
        }
    };
}

pub(crate) use impl_observable;

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[derive(Default)]
    struct Hooks {
        attached: Cell<usize>,
        detached: Cell<usize>,
        fail: Cell<bool>,
    }

    impl Attach for Hooks {
        fn attach(&self) -> Result<()> {
            if self.fail.get() {
                return Err(Error::evaluation("attach refused"));
            }
            self.attached.set(self.attached.get() + 1);
            Ok(())
        }

        fn detach(&self) {
            self.detached.set(self.detached.get() + 1);
        }
    }

    struct Recorder {
        seen: RefCell<Vec<i32>>,
        fail: bool,
    }

    impl Listener<i32> for Recorder {
        fn on_change(&self, _origin: NodeId, change: &i32) -> Result<()> {
            self.seen.borrow_mut().push(*change);
            if self.fail {
                return Err(Error::evaluation("listener failed"));
            }
            Ok(())
        }
    }

    fn recorder(fail: bool) -> Rc<Recorder> {
        Rc::new(Recorder {
            seen: RefCell::new(Vec::new()),
            fail,
        })
    }

    fn weak(recorder: &Rc<Recorder>) -> Weak<dyn Listener<i32>> {
        let listener: Rc<dyn Listener<i32>> = recorder.clone();
        Rc::downgrade(&listener)
    }

    #[test]
    fn first_registration_attaches_and_last_detaches() {
        let core = NodeCore::<i32>::leaf();
        let hooks = Hooks::default();
        let a = recorder(false);
        let b = recorder(false);
        let (a_id, b_id) = (NodeId::new(), NodeId::new());

        core.register(&hooks, a_id, weak(&a)).unwrap();
        core.register(&hooks, b_id, weak(&b)).unwrap();
        assert_eq!(hooks.attached.get(), 1);
        assert_eq!(core.lifecycle(), Lifecycle::Attached);

        core.unregister(&hooks, a_id);
        assert_eq!(hooks.detached.get(), 0);
        core.unregister(&hooks, b_id);
        assert_eq!(hooks.detached.get(), 1);
        assert_eq!(core.lifecycle(), Lifecycle::Dormant);
    }

    #[test]
    fn repeated_registration_counts_but_delivers_once() {
        let core = NodeCore::<i32>::leaf();
        let hooks = Hooks::default();
        let listener = recorder(false);
        let id = NodeId::new();

        core.register(&hooks, id, weak(&listener)).unwrap();
        core.register(&hooks, id, weak(&listener)).unwrap();
        assert_eq!(core.dependent_count(), 1);

        core.dispatch(&5).unwrap();
        assert_eq!(*listener.seen.borrow(), vec![5]);

        core.unregister(&hooks, id);
        assert!(core.is_attached());
        core.unregister(&hooks, id);
        assert!(!core.is_attached());

        // unknown ids are ignored
        core.unregister(&hooks, id);
        assert_eq!(hooks.detached.get(), 1);
    }

    #[test]
    fn failed_attach_rolls_back_registration() {
        let core = NodeCore::<i32>::leaf();
        let hooks = Hooks::default();
        hooks.fail.set(true);
        let listener = recorder(false);

        assert!(core.register(&hooks, NodeId::new(), weak(&listener)).is_err());
        assert_eq!(core.dependent_count(), 0);
        assert_eq!(core.lifecycle(), Lifecycle::Dormant);
    }

    #[test]
    fn self_registration_is_a_cycle() {
        let core = NodeCore::<i32>::leaf();
        let hooks = Hooks::default();
        let listener = recorder(false);

        assert!(core.register(&hooks, core.id(), weak(&listener)).is_err());
        assert_eq!(core.dependent_count(), 0);
    }

    #[test]
    fn failing_dependent_does_not_block_siblings() {
        let core = NodeCore::<i32>::leaf();
        let hooks = Hooks::default();
        let failing = recorder(true);
        let healthy = recorder(false);

        core.register(&hooks, NodeId::new(), weak(&failing)).unwrap();
        core.register(&hooks, NodeId::new(), weak(&healthy)).unwrap();

        assert!(core.dispatch(&1).is_err());
        assert_eq!(*healthy.seen.borrow(), vec![1]);
    }

    #[test]
    fn dropped_listeners_are_skipped() {
        let core = NodeCore::<i32>::leaf();
        let hooks = Hooks::default();
        let listener = recorder(false);
        core.register(&hooks, NodeId::new(), weak(&listener)).unwrap();
        drop(listener);

        assert!(core.dispatch(&1).is_ok());
    }

    #[test]
    fn dispose_clears_and_detaches() {
        let core = NodeCore::<i32>::leaf();
        let hooks = Hooks::default();
        let listener = recorder(false);
        core.register(&hooks, NodeId::new(), weak(&listener)).unwrap();

        core.dispose(&hooks);
        core.dispose(&hooks);
        assert_eq!(core.dependent_count(), 0);
        assert_eq!(hooks.detached.get(), 1);
    }
}
