//! Reactive property graph.
//!
//! Subjects (computations) observe objects (properties). Reading an object
//! while a subject is current records an edge; writing an object marks it
//! damaged. Repair reruns every subject with an edge from a damaged object,
//! after forgetting that subject's old edges so it re-records only what it
//! reads this time.
//!
//! A repair pass runs in rounds. An object damaged again after it was
//! already repaired in the same pass indicates a cycle: it is logged,
//! reported in [`RepairReport::cycles`] and not repaired again, so the pass
//! always terminates. Subjects depending on such an object can be left
//! stale.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::warn;

/// Dependency graph between subjects `S` and objects `O`.
#[derive(Debug)]
pub struct Graph<S, O> {
    forward: BTreeMap<O, BTreeSet<S>>,
    reverse: BTreeMap<S, BTreeSet<O>>,
    damaged: BTreeSet<O>,
    current_subject: Option<S>,
}

impl<S, O> Default for Graph<S, O> {
    fn default() -> Self {
        Self {
            forward: BTreeMap::new(),
            reverse: BTreeMap::new(),
            damaged: BTreeSet::new(),
            current_subject: None,
        }
    }
}

impl<S: Ord + Clone, O: Ord + Clone> Graph<S, O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with `subject` current, restoring the previous subject after.
    pub fn with_subject<R>(&mut self, subject: S, f: impl FnOnce(&mut Self) -> R) -> R {
        let previous = self.swap_subject(Some(subject));
        let result = f(self);
        self.swap_subject(previous);
        result
    }

    /// Replace the current subject, returning the old one.
    ///
    /// For owners that need to run a subject with access to more than the
    /// graph; pair every call with one restoring the returned value.
    pub fn swap_subject(&mut self, subject: Option<S>) -> Option<S> {
        std::mem::replace(&mut self.current_subject, subject)
    }

    pub fn current_subject(&self) -> Option<&S> {
        self.current_subject.as_ref()
    }

    /// Record that the current subject, if any, read `object`.
    pub fn record_observation(&mut self, object: O) {
        let Some(subject) = self.current_subject.clone() else {
            return;
        };
        self.reverse
            .entry(subject.clone())
            .or_default()
            .insert(object.clone());
        self.forward.entry(object).or_default().insert(subject);
    }

    pub fn record_damage(&mut self, object: O) {
        self.damaged.insert(object);
    }

    /// Drop every edge for which `subject` is the observer.
    pub fn forget_subject(&mut self, subject: &S) {
        let Some(objects) = self.reverse.remove(subject) else {
            return;
        };
        for object in objects {
            if let Some(subjects) = self.forward.get_mut(&object) {
                subjects.remove(subject);
                if subjects.is_empty() {
                    self.forward.remove(&object);
                }
            }
        }
    }

    /// Subjects that observed `object` during their last run.
    pub fn observers_of(&self, object: &O) -> impl Iterator<Item = &S> {
        self.forward.get(object).into_iter().flatten()
    }

    pub fn has_damage(&self) -> bool {
        !self.damaged.is_empty()
    }

    /// Repair all damage, calling `repair` once per affected subject per
    /// round with that subject current.
    pub fn repair_damage(&mut self, mut repair: impl FnMut(&mut Self, &S)) -> RepairReport<O>
    where
        O: fmt::Debug,
    {
        let mut round = RepairRound::new();
        while let Some(batch) = round.next_batch(self) {
            for subject in batch {
                let previous = self.swap_subject(Some(subject.clone()));
                repair(self, &subject);
                self.swap_subject(previous);
            }
        }
        round.finish()
    }
}

/// Outcome of a full repair pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairReport<O> {
    pub rounds: usize,
    /// Objects damaged again after being repaired in the same pass.
    pub cycles: Vec<O>,
}

impl<O> RepairReport<O> {
    pub fn is_clean(&self) -> bool {
        self.cycles.is_empty()
    }
}

/// Stepwise repair driver.
///
/// Each [`next_batch`](Self::next_batch) hands back the subjects to rerun
/// for one round, already detached from their old edges. The caller reruns
/// them with the subject swapped in, then asks for the next batch until
/// none is left.
#[derive(Debug)]
pub struct RepairRound<O> {
    repaired: BTreeSet<O>,
    cycles: Vec<O>,
    rounds: usize,
}

impl<O: Ord + Clone + fmt::Debug> Default for RepairRound<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: Ord + Clone + fmt::Debug> RepairRound<O> {
    pub fn new() -> Self {
        Self {
            repaired: BTreeSet::new(),
            cycles: Vec::new(),
            rounds: 0,
        }
    }

    pub fn next_batch<S: Ord + Clone>(&mut self, graph: &mut Graph<S, O>) -> Option<Vec<S>> {
        let work = std::mem::take(&mut graph.damaged);

        let cyclic: Vec<O> = work.intersection(&self.repaired).cloned().collect();
        if !cyclic.is_empty() {
            warn!(objects = ?cyclic, "dataflow: cyclic dependency during repair");
            self.cycles.extend(cyclic);
        }

        let work: BTreeSet<O> = work.difference(&self.repaired).cloned().collect();
        if work.is_empty() {
            return None;
        }
        self.rounds += 1;

        let subjects: BTreeSet<S> = work
            .iter()
            .filter_map(|object| graph.forward.get(object))
            .flatten()
            .cloned()
            .collect();
        self.repaired.extend(work);
        for subject in &subjects {
            graph.forget_subject(subject);
        }
        Some(subjects.into_iter().collect())
    }

    pub fn finish(self) -> RepairReport<O> {
        RepairReport {
            rounds: self.rounds,
            cycles: self.cycles,
        }
    }
}

/// A value whose reads and writes are tracked by a [`Graph`].
#[derive(Debug, Clone)]
pub struct ObservableProperty<O, T> {
    object_id: O,
    value: T,
    noop_guard: Option<fn(&T, &T) -> bool>,
}

impl<O: Ord + Clone, T> ObservableProperty<O, T> {
    /// Install the property. It starts damaged so its first reader is
    /// (re)computed on the next repair.
    pub fn define<S: Ord + Clone>(
        graph: &mut Graph<S, O>,
        object_id: O,
        initial: T,
        noop_guard: Option<fn(&T, &T) -> bool>,
    ) -> Self {
        graph.record_damage(object_id.clone());
        Self {
            object_id,
            value: initial,
            noop_guard,
        }
    }

    /// A property whose writes of an equal value cause no damage.
    pub fn with_equality<S: Ord + Clone>(graph: &mut Graph<S, O>, object_id: O, initial: T) -> Self
    where
        T: PartialEq,
    {
        Self::define(
            graph,
            object_id,
            initial,
            Some(values_equal::<T> as fn(&T, &T) -> bool),
        )
    }

    pub fn object_id(&self) -> &O {
        &self.object_id
    }

    pub fn get<S: Ord + Clone>(&self, graph: &mut Graph<S, O>) -> &T {
        graph.record_observation(self.object_id.clone());
        &self.value
    }

    /// Read without recording an observation.
    pub fn peek(&self) -> &T {
        &self.value
    }

    /// Store `value`. Returns whether the write damaged the property.
    pub fn set<S: Ord + Clone>(&mut self, graph: &mut Graph<S, O>, value: T) -> bool {
        let noop = self
            .noop_guard
            .is_some_and(|guard| guard(&self.value, &value));
        self.value = value;
        if !noop {
            graph.record_damage(self.object_id.clone());
        }
        !noop
    }
}

fn values_equal<T: PartialEq>(old: &T, new: &T) -> bool {
    old == new
}
