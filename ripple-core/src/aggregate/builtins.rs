//! Built-in accumulators.
//!
//! `Count`, `Sum`, `AllTrue` and `AnyTrue` are invertible and cost O(1) per
//! change. `Min` and `Max` are not: removing the current extremum would need
//! the rest of the sequence, so they are paired with a recompute fallback.

use std::fmt::Debug;
use std::marker::PhantomData;
use std::ops::{Add, Sub};

use super::Accumulator;
use crate::error::{Error, Result};
use crate::graph::Data;

/// Number of items.
#[derive(Debug)]
pub struct Count<T> {
    count: usize,
    item: PhantomData<fn(&T)>,
}

impl<T> Count<T> {
    pub fn new() -> Self {
        Self {
            count: 0,
            item: PhantomData,
        }
    }
}

impl<T> Default for Count<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Count<T> {
    fn clone(&self) -> Self {
        Self {
            count: self.count,
            item: PhantomData,
        }
    }
}

impl<T: Data> Accumulator for Count<T> {
    type Item = T;
    type Output = usize;

    fn reset(&mut self) {
        self.count = 0;
    }

    fn add(&mut self, _item: &T) {
        self.count += 1;
    }

    fn remove(&mut self, _item: &T) -> Result<()> {
        self.count = self.count.saturating_sub(1);
        Ok(())
    }

    fn value(&self) -> usize {
        self.count
    }

    fn name(&self) -> &'static str {
        "count"
    }
}

/// Sum of the items.
#[derive(Debug, Clone, Default)]
pub struct Sum<T> {
    total: T,
}

impl<T: Default> Sum<T> {
    pub fn new() -> Self {
        Self {
            total: T::default(),
        }
    }
}

impl<T> Accumulator for Sum<T>
where
    T: Data + Default + Add<Output = T> + Sub<Output = T>,
{
    type Item = T;
    type Output = T;

    fn reset(&mut self) {
        self.total = T::default();
    }

    fn add(&mut self, item: &T) {
        self.total = self.total.clone() + item.clone();
    }

    fn remove(&mut self, item: &T) -> Result<()> {
        self.total = self.total.clone() - item.clone();
        Ok(())
    }

    fn value(&self) -> T {
        self.total.clone()
    }

    fn name(&self) -> &'static str {
        "sum"
    }
}

/// `true` when no item is `false`.
///
/// Keeps the number of `false` items, so removing an item is exact.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllTrue {
    falses: usize,
}

impl Accumulator for AllTrue {
    type Item = bool;
    type Output = bool;

    fn reset(&mut self) {
        self.falses = 0;
    }

    fn add(&mut self, item: &bool) {
        if !item {
            self.falses += 1;
        }
    }

    fn remove(&mut self, item: &bool) -> Result<()> {
        if !item {
            self.falses = self.falses.saturating_sub(1);
        }
        Ok(())
    }

    fn value(&self) -> bool {
        self.falses == 0
    }

    fn name(&self) -> &'static str {
        "all"
    }
}

/// `true` when at least one item is `true`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnyTrue {
    trues: usize,
}

impl Accumulator for AnyTrue {
    type Item = bool;
    type Output = bool;

    fn reset(&mut self) {
        self.trues = 0;
    }

    fn add(&mut self, item: &bool) {
        if *item {
            self.trues += 1;
        }
    }

    fn remove(&mut self, item: &bool) -> Result<()> {
        if *item {
            self.trues = self.trues.saturating_sub(1);
        }
        Ok(())
    }

    fn value(&self) -> bool {
        self.trues > 0
    }

    fn name(&self) -> &'static str {
        "any"
    }
}

macro_rules! extremum {
    ($name:ident, $label:literal, $keep:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone)]
        pub struct $name<T> {
            current: Option<T>,
        }

        impl<T> $name<T> {
            pub fn new() -> Self {
                Self { current: None }
            }
        }

        impl<T> Default for $name<T> {
            fn default() -> Self {
                Self::new()
            }
        }

        impl<T: Data + Ord> Accumulator for $name<T> {
            type Item = T;
            type Output = Option<T>;

            fn reset(&mut self) {
                self.current = None;
            }

            fn add(&mut self, item: &T) {
                self.current = Some(match self.current.take() {
                    Some(current) => current.$keep(item.clone()),
                    None => item.clone(),
                });
            }

            fn remove(&mut self, _item: &T) -> Result<()> {
                Err(Error::UnsupportedIncrementalOperation {
                    aggregate: $label,
                })
            }

            fn value(&self) -> Option<T> {
                self.current.clone()
            }

            fn is_invertible(&self) -> bool {
                false
            }

            fn name(&self) -> &'static str {
                $label
            }
        }
    };
}

extremum!(Min, "min", min, "Smallest item, `None` for an empty sequence.");
extremum!(Max, "max", max, "Largest item, `None` for an empty sequence.");
