//! Delta recording.

use std::cell::RefCell;
use std::rc::Rc;

use super::{replay, Delta, Sequence, SequenceRef};
use crate::error::Result;
use crate::graph::Data;
use crate::reactive::{subscribe, Subscription};

/// Records the delta stream of a sequence.
///
/// Recording starts from the items present when the recorder attaches, so
/// [`DeltaHistory::full_history`] replayed against an empty sequence always
/// reproduces the current snapshot of the recorded sequence.
pub struct DeltaHistory<T> {
    baseline: Vec<T>,
    deltas: Rc<RefCell<Vec<Delta<T>>>>,
    subscription: Subscription,
}

impl<T: Data> DeltaHistory<T> {
    /// Subscribe to `sequence` and start recording.
    pub fn record(sequence: &SequenceRef<T>) -> Result<Self> {
        let deltas = Rc::new(RefCell::new(Vec::new()));
        let sink = deltas.clone();
        let subscription = subscribe(sequence.clone(), move |delta: &Delta<T>| {
            sink.borrow_mut().push(delta.clone())
        })?;
        let baseline = sequence.snapshot()?;
        Ok(Self {
            baseline,
            deltas,
            subscription,
        })
    }

    /// Items present when recording started.
    pub fn baseline(&self) -> &[T] {
        &self.baseline
    }

    /// Deltas received since recording started.
    pub fn deltas(&self) -> Vec<Delta<T>> {
        self.deltas.borrow().clone()
    }

    pub fn len(&self) -> usize {
        self.deltas.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.deltas.borrow().is_empty()
    }

    pub fn is_recording(&self) -> bool {
        self.subscription.is_active()
    }

    /// The baseline as a run of adds, followed by the recorded deltas.
    pub fn full_history(&self) -> Vec<Delta<T>> {
        self.baseline
            .iter()
            .enumerate()
            .map(|(index, item)| Delta::Add {
                index,
                item: item.clone(),
            })
            .chain(self.deltas.borrow().iter().cloned())
            .collect()
    }

    /// Rebuild the recorded sequence from its history.
    pub fn replay(&self) -> Result<Vec<T>> {
        replay(&self.full_history())
    }

    /// Stop recording. The recorded deltas are kept.
    pub fn stop(&mut self) {
        self.subscription.dispose();
    }
}
