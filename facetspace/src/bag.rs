//! Delta-counted multiset.
//!
//! Every mutation is classified by whether the key was present before and
//! after. Callers use that classification to decide whether a change is
//! observable (a fact appearing or disappearing) or merely a refcount bump
//! from a duplicate source.

use std::collections::btree_map::{self, BTreeMap};

/// Outcome of a [`Bag::change`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    AbsentToAbsent,
    AbsentToPresent,
    PresentToPresent,
    PresentToAbsent,
}

impl Transition {
    fn classify(old: i64, new: i64) -> Self {
        match (old == 0, new == 0) {
            (true, true) => Transition::AbsentToAbsent,
            (true, false) => Transition::AbsentToPresent,
            (false, false) => Transition::PresentToPresent,
            (false, true) => Transition::PresentToAbsent,
        }
    }

    /// True when presence flipped in either direction.
    pub fn is_visible(self) -> bool {
        matches!(
            self,
            Transition::AbsentToPresent | Transition::PresentToAbsent
        )
    }
}

/// Multiset from keys to signed counts. Zero counts are never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bag<K: Ord> {
    counts: BTreeMap<K, i64>,
}

impl<K: Ord> Default for Bag<K> {
    fn default() -> Self {
        Self {
            counts: BTreeMap::new(),
        }
    }
}

impl<K: Ord> Bag<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` to the count of `key`.
    pub fn change(&mut self, key: K, delta: i64) -> Transition {
        self.apply(key, delta, false)
    }

    /// Like [`change`](Self::change), but the resulting count never drops below zero.
    pub fn change_clamped(&mut self, key: K, delta: i64) -> Transition {
        self.apply(key, delta, true)
    }

    fn apply(&mut self, key: K, delta: i64, clamp: bool) -> Transition {
        let old = self.get(&key);
        let mut new = old + delta;
        if clamp && new < 0 {
            new = 0;
        }
        if new == 0 {
            self.counts.remove(&key);
        } else {
            self.counts.insert(key, new);
        }
        Transition::classify(old, new)
    }

    pub fn get(&self, key: &K) -> i64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn includes(&self, key: &K) -> bool {
        self.counts.contains_key(key)
    }

    /// Number of distinct keys with a non-zero count.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Keys and counts in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, i64)> {
        self.counts.iter().map(|(key, count)| (key, *count))
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.counts.keys()
    }

    /// Remove and return every entry, leaving the bag empty.
    pub fn drain(&mut self) -> btree_map::IntoIter<K, i64> {
        std::mem::take(&mut self.counts).into_iter()
    }
}

impl<K: Ord> FromIterator<K> for Bag<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut bag = Bag::new();
        for key in iter {
            bag.change(key, 1);
        }
        bag
    }
}

impl<K: Ord> IntoIterator for Bag<K> {
    type Item = (K, i64);
    type IntoIter = btree_map::IntoIter<K, i64>;

    fn into_iter(self) -> Self::IntoIter {
        self.counts.into_iter()
    }
}
