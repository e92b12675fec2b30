//! Propagation Context
//!
//! The propagation context tracks which nodes are currently dispatching on
//! this thread. Dispatch is depth first, so the stack mirrors the path from
//! the mutated leaf to the node being notified.
//!
//! # Implementation
//!
//! We use a thread-local stack. Entering a dispatch pushes the dispatching
//! node, dropping the guard pops it. An entry at depth zero starts a new
//! propagation pass.
//!
//! The acyclic graph bounds the depth on its own. The configured limit is a
//! backstop for listeners outside the graph that mutate sources from inside
//! a notification.
//!
//! # Settling
//!
//! A node with several predecessors may hear from more than one of them in a
//! single pass. Instead of recomputing on each notification it records the
//! new input and defers itself. When the outermost dispatch returns, the
//! deferred nodes settle one at a time, lowest rank first, where the rank is
//! the size of the node's ancestry. A node's ancestry strictly contains the
//! ancestry of each predecessor, so this is a topological order and every
//! deferred node recomputes once, after all of its inputs are final.

use std::cell::{Cell, RefCell};
use std::rc::Weak;

use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::graph::NodeId;

thread_local! {
    static PROPAGATION_STACK: RefCell<Vec<NodeId>> = const { RefCell::new(Vec::new()) };
    static PASSES: Cell<u64> = const { Cell::new(0) };
    static DEFERRED: RefCell<Vec<Deferred>> = const { RefCell::new(Vec::new()) };
    static SETTLING: Cell<bool> = const { Cell::new(false) };
}

/// A node that recomputes once per pass after its inputs are final.
pub(crate) trait Settle {
    fn settle(&self) -> Result<()>;
}

struct Deferred {
    node: NodeId,
    rank: usize,
    target: Weak<dyn Settle>,
}

/// Clears the settling flag even if a node panics while settling.
struct SettlingGuard;

impl Drop for SettlingGuard {
    fn drop(&mut self) {
        SETTLING.with(|settling| settling.set(false));
    }
}

/// Guard that pops the dispatching node when dropped.
///
/// This keeps the stack balanced even if a listener panics.
pub struct PropagationScope {
    node: NodeId,
}

impl PropagationScope {
    /// Enter a dispatch from `node`.
    pub fn enter(node: NodeId) -> Result<Self> {
        let limit = EngineConfig::current().max_propagation_depth;
        PROPAGATION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.len() >= limit {
                return Err(Error::PropagationDepthExceeded { limit });
            }
            if stack.is_empty() && !SETTLING.with(Cell::get) {
                PASSES.with(|passes| passes.set(passes.get() + 1));
            }
            stack.push(node);
            Ok(())
        })?;
        Ok(Self { node })
    }

    /// Check if a propagation pass is running.
    pub fn is_active() -> bool {
        PROPAGATION_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Number of nested dispatches currently running.
    pub fn depth() -> usize {
        PROPAGATION_STACK.with(|stack| stack.borrow().len())
    }

    /// The leaf that started the running pass, if any.
    pub fn origin() -> Option<NodeId> {
        PROPAGATION_STACK.with(|stack| stack.borrow().first().copied())
    }

    /// Number of propagation passes started on this thread.
    pub fn passes() -> u64 {
        PASSES.with(Cell::get)
    }

    /// Settle `node` once the running pass has delivered every change.
    ///
    /// Deferring a node that is already pending has no effect.
    pub(crate) fn defer(node: NodeId, rank: usize, target: Weak<dyn Settle>) {
        DEFERRED.with(|deferred| {
            let mut deferred = deferred.borrow_mut();
            if deferred.iter().all(|entry| entry.node != node) {
                deferred.push(Deferred { node, rank, target });
            }
        });
    }

    /// Settle every deferred node, lowest rank first.
    ///
    /// Does nothing while a dispatch is running or another settle loop is
    /// already draining the queue. Every deferred node settles even if an
    /// earlier one fails; the first error is returned.
    pub(crate) fn settle_deferred() -> Result<()> {
        if Self::is_active() || SETTLING.with(Cell::get) {
            return Ok(());
        }
        SETTLING.with(|settling| settling.set(true));
        let _guard = SettlingGuard;

        let mut first_error = None;
        while let Some(next) = DEFERRED.with(|deferred| {
            let mut deferred = deferred.borrow_mut();
            let lowest = deferred
                .iter()
                .enumerate()
                .min_by_key(|(_, entry)| entry.rank)
                .map(|(index, _)| index)?;
            Some(deferred.remove(lowest))
        }) {
            let Some(target) = next.target.upgrade() else {
                continue;
            };
            if let Err(err) = target.settle() {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for PropagationScope {
    fn drop(&mut self) {
        PROPAGATION_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();

            // Verify we're popping the right scope.
            if let Some(node) = popped {
                debug_assert_eq!(
                    node, self.node,
                    "PropagationScope mismatch: expected {:?}, got {:?}",
                    self.node, node
                );
            }
        });
    }
}
