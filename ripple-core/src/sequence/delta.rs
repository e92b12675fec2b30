//! Structural deltas.
//!
//! A delta describes one structural change of an ordered sequence. Indices
//! always refer to the sequence state right before the delta is applied, so
//! replaying a delta history in order against an empty sequence rebuilds
//! every intermediate snapshot.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One structural change of a sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Delta<T> {
    /// `item` was inserted at `index`.
    Add { index: usize, item: T },
    /// `item` was removed from `index`.
    Remove { index: usize, item: T },
    /// The item at `index` was replaced.
    Replace { index: usize, old: T, new: T },
    /// `item` moved from `from` to `to`. `to` is the position after removal.
    Move { from: usize, to: usize, item: T },
}

/// Discriminant of a [`Delta`], for logging and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeltaKind {
    Add,
    Remove,
    Replace,
    Move,
}

impl<T> Delta<T> {
    pub fn kind(&self) -> DeltaKind {
        match self {
            Self::Add { .. } => DeltaKind::Add,
            Self::Remove { .. } => DeltaKind::Remove,
            Self::Replace { .. } => DeltaKind::Replace,
            Self::Move { .. } => DeltaKind::Move,
        }
    }

    /// Transform the carried items, keeping positions.
    pub fn map_items<U, F>(&self, mut f: F) -> Delta<U>
    where
        F: FnMut(&T) -> U,
    {
        match self {
            Self::Add { index, item } => Delta::Add {
                index: *index,
                item: f(item),
            },
            Self::Remove { index, item } => Delta::Remove {
                index: *index,
                item: f(item),
            },
            Self::Replace { index, old, new } => Delta::Replace {
                index: *index,
                old: f(old),
                new: f(new),
            },
            Self::Move { from, to, item } => Delta::Move {
                from: *from,
                to: *to,
                item: f(item),
            },
        }
    }
}

impl<T: Clone> Delta<T> {
    /// Apply this delta to `items`.
    ///
    /// Positions are checked before anything is changed.
    pub fn apply_to(&self, items: &mut Vec<T>) -> Result<()> {
        let len = items.len();
        match self {
            Self::Add { index, item } => {
                check(*index, len, true)?;
                items.insert(*index, item.clone());
            }
            Self::Remove { index, .. } => {
                check(*index, len, false)?;
                items.remove(*index);
            }
            Self::Replace { index, new, .. } => {
                check(*index, len, false)?;
                items[*index] = new.clone();
            }
            Self::Move { from, to, .. } => {
                check(*from, len, false)?;
                check(*to, len, false)?;
                let item = items.remove(*from);
                items.insert(*to, item);
            }
        }
        Ok(())
    }

    /// The same change, `offset` positions further along.
    pub fn offset_by(&self, offset: usize) -> Self {
        match self {
            Self::Add { index, item } => Self::Add {
                index: index + offset,
                item: item.clone(),
            },
            Self::Remove { index, item } => Self::Remove {
                index: index + offset,
                item: item.clone(),
            },
            Self::Replace { index, old, new } => Self::Replace {
                index: index + offset,
                old: old.clone(),
                new: new.clone(),
            },
            Self::Move { from, to, item } => Self::Move {
                from: from + offset,
                to: to + offset,
                item: item.clone(),
            },
        }
    }
}

fn check(index: usize, len: usize, allow_end: bool) -> Result<()> {
    let in_range = if allow_end { index <= len } else { index < len };
    if !in_range {
        return Err(Error::IndexOutOfRange { index, len });
    }
    Ok(())
}

/// Rebuild a sequence by applying `history` to an empty one.
pub fn replay<T: Clone>(history: &[Delta<T>]) -> Result<Vec<T>> {
    let mut items = Vec::new();
    for delta in history {
        delta.apply_to(&mut items)?;
    }
    Ok(items)
}
