//! Skeleton index: incremental structural matching of assertions against
//! registered interests.
//!
//! Interests are compiled patterns ([`Analysis`]). Their skeletons are
//! linearised into chains of nodes in a discrimination tree keyed on term
//! shape, so patterns with common structural prefixes share nodes and an
//! assertion only visits edges that some registered pattern actually uses.
//!
//! Each node caches the assertions that reach it. Constant filters and
//! capture projections hang off the node's continuation as leaves and
//! handlers, each with its own cache, which is what lets a handler
//! installed late be replayed everything already present.
//!
//! Events are not delivered by calling back into subscribers directly.
//! Every mutating operation takes a sink, invoked once per
//! `(subscriber, kind, captures)` after the corresponding cache update.

mod node;

use crate::bag::{Bag, Transition};
use crate::pattern::{Analysis, Skeleton};
use crate::term::{Assertion, Path, Shape, Term};
use node::{Leaf, Node, NodeId, Selector};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::trace;

/// Kind of event delivered to a subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Added,
    Removed,
    Message,
}

/// Discrimination tree over assertions, parameterised by subscriber identity.
#[derive(Debug)]
pub struct Index<S: Ord + Clone> {
    all_assertions: Bag<Assertion>,
    nodes: HashMap<NodeId, Node<S>>,
    root: NodeId,
    next_node: NodeId,
}

impl<S: Ord + Clone> Default for Index<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Ord + Clone> Index<S> {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(0, Node::new(BTreeSet::new(), None));
        Self {
            all_assertions: Bag::new(),
            nodes,
            root: 0,
            next_node: 1,
        }
    }

    /// Register `subscriber` for `analysis`, replaying every cached capture
    /// tuple to it (and only it) as [`EventKind::Added`].
    pub fn add_handler(
        &mut self,
        analysis: &Analysis,
        subscriber: S,
        mut deliver: impl FnMut(&S, EventKind, &[Term]),
    ) {
        let node_id = self.extend(&analysis.skeleton);
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        let Node { continuation, .. } = node;
        let cached = &continuation.cached;

        let table = continuation
            .leaf_map
            .entry(analysis.const_paths.clone())
            .or_insert_with(|| {
                let mut table: BTreeMap<Vec<Term>, Leaf<S>> = BTreeMap::new();
                for assertion in cached {
                    if let Some(key) = assertion.term().project_paths(&analysis.const_paths) {
                        table.entry(key).or_default().cached.insert(assertion.clone());
                    }
                }
                table
            });

        let Leaf {
            cached: leaf_cached,
            handler_map,
        } = table.entry(analysis.const_vals.clone()).or_default();

        let capture_paths = &analysis.capture_paths;
        let handler = handler_map
            .entry(capture_paths.clone())
            .or_insert_with(|| {
                let mut handler = node::Handler::default();
                for assertion in leaf_cached.iter() {
                    if !assertion.is_visible_to(capture_paths) {
                        continue;
                    }
                    if let Some(captures) = assertion.term().project_paths(capture_paths) {
                        handler.cached_captures.change(captures, 1);
                    }
                }
                handler
            });

        if !handler.subscribers.insert(subscriber.clone()) {
            return;
        }
        trace!(
            captures = handler.cached_captures.len(),
            "skeleton: handler registered for {}",
            analysis.assertion
        );
        for (captures, _) in handler.cached_captures.iter() {
            deliver(&subscriber, EventKind::Added, captures);
        }
    }

    /// Unregister `subscriber`, pruning everything that becomes unused.
    ///
    /// Unknown registrations are ignored.
    pub fn remove_handler(&mut self, analysis: &Analysis, subscriber: &S) {
        let Some(node_id) = self.locate(&analysis.skeleton) else {
            return;
        };
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        let leaf_map = &mut node.continuation.leaf_map;
        let Some(table) = leaf_map.get_mut(&analysis.const_paths) else {
            return;
        };
        let Some(leaf) = table.get_mut(&analysis.const_vals) else {
            return;
        };
        let Some(handler) = leaf.handler_map.get_mut(&analysis.capture_paths) else {
            return;
        };
        if !handler.subscribers.remove(subscriber) {
            return;
        }
        if handler.subscribers.is_empty() {
            leaf.handler_map.remove(&analysis.capture_paths);
        }
        if leaf.is_empty() {
            table.remove(&analysis.const_vals);
        }
        // Leaf caches are rebuilt from the continuation when the table is
        // next needed, so a table with no handlers left can go entirely.
        if table.values().all(|leaf| leaf.handler_map.is_empty()) {
            leaf_map.remove(&analysis.const_paths);
        }
        trace!("skeleton: handler removed for {}", analysis.assertion);
        self.prune_from(node_id);
    }

    /// Change the count of `assertion` by `delta`.
    ///
    /// Handlers hear [`EventKind::Added`] when the assertion's count becomes
    /// positive and [`EventKind::Removed`] when it stops being positive, and
    /// then only on their own capture tuple's first appearance or last
    /// disappearance.
    ///
    /// Events follow the sign of the count, not the returned [`Transition`],
    /// which tracks whether the count is nonzero. A retraction that arrives
    /// before its assertion drives the count negative: the bag reports that
    /// as a transition, but observers stay silent until the count turns
    /// positive.
    pub fn adjust_assertion(
        &mut self,
        assertion: &Assertion,
        delta: i64,
        mut deliver: impl FnMut(&S, EventKind, &[Term]),
    ) -> Transition {
        let old = self.all_assertions.get(assertion);
        let transition = self.all_assertions.change(assertion.clone(), delta);
        let new = old + delta;
        trace!(
            "skeleton: adjust {} by {} ({} -> {})",
            assertion,
            delta,
            old,
            new
        );
        if old <= 0 && new > 0 {
            self.modify(EventKind::Added, assertion, &mut deliver);
        } else if old > 0 && new <= 0 {
            self.modify(EventKind::Removed, assertion, &mut deliver);
        }
        transition
    }

    /// Deliver `term` as a message to every matching handler.
    pub fn send_message(&mut self, term: &Term, mut deliver: impl FnMut(&S, EventKind, &[Term])) {
        trace!("skeleton: message {}", term);
        self.modify(EventKind::Message, &Assertion::new(term.clone()), &mut deliver);
    }

    /// Number of distinct assertions currently present.
    pub fn assertion_count(&self) -> usize {
        self.all_assertions.len()
    }

    pub fn contains_assertion(&self, assertion: &Assertion) -> bool {
        self.all_assertions.get(assertion) > 0
    }

    /// Number of distinct `(pattern, capture paths)` handlers registered.
    pub fn handler_count(&self) -> usize {
        self.nodes
            .values()
            .flat_map(|node| node.continuation.leaf_map.values())
            .flat_map(|table| table.values())
            .map(|leaf| leaf.handler_map.len())
            .sum()
    }

    /// Number of tree nodes, root included.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn modify(
        &mut self,
        kind: EventKind,
        assertion: &Assertion,
        deliver: &mut dyn FnMut(&S, EventKind, &[Term]),
    ) {
        let term = assertion.term();
        for node_id in self.reached_nodes(term) {
            let Some(node) = self.nodes.get_mut(&node_id) else {
                continue;
            };
            let continuation = &mut node.continuation;
            match kind {
                EventKind::Added => {
                    continuation.cached.insert(assertion.clone());
                }
                EventKind::Removed => {
                    continuation.cached.remove(assertion);
                }
                EventKind::Message => {}
            }

            let mut emptied = Vec::new();
            for (const_paths, table) in continuation.leaf_map.iter_mut() {
                let Some(const_vals) = term.project_paths(const_paths) else {
                    continue;
                };
                if kind == EventKind::Added {
                    table.entry(const_vals.clone()).or_default();
                }
                let Some(leaf) = table.get_mut(&const_vals) else {
                    continue;
                };
                match kind {
                    EventKind::Added => {
                        leaf.cached.insert(assertion.clone());
                    }
                    EventKind::Removed => {
                        leaf.cached.remove(assertion);
                    }
                    EventKind::Message => {}
                }
                for (capture_paths, handler) in leaf.handler_map.iter_mut() {
                    if !assertion.is_visible_to(capture_paths) {
                        continue;
                    }
                    let Some(captures) = term.project_paths(capture_paths) else {
                        continue;
                    };
                    let fire = match kind {
                        EventKind::Added => {
                            handler.cached_captures.change(captures.clone(), 1)
                                == Transition::AbsentToPresent
                        }
                        EventKind::Removed => {
                            handler.cached_captures.change(captures.clone(), -1)
                                == Transition::PresentToAbsent
                        }
                        EventKind::Message => true,
                    };
                    if fire {
                        for subscriber in &handler.subscribers {
                            deliver(subscriber, kind, &captures);
                        }
                    }
                }
                if kind == EventKind::Removed && leaf.is_empty() {
                    table.remove(&const_vals);
                    if table.is_empty() {
                        emptied.push(const_paths.clone());
                    }
                }
            }
            for const_paths in emptied {
                continuation.leaf_map.remove(&const_paths);
            }
        }
    }

    /// Every node `term` reaches, in pre-order.
    fn reached_nodes(&self, term: &Term) -> Vec<NodeId> {
        let mut reached = Vec::new();
        self.walk_term(self.root, &[std::slice::from_ref(term)], &mut reached);
        reached
    }

    fn walk_term<'t>(&self, node_id: NodeId, stack: &[&'t [Term]], reached: &mut Vec<NodeId>) {
        let Some(node) = self.nodes.get(&node_id) else {
            return;
        };
        reached.push(node_id);
        for (selector, table) in &node.edges {
            if selector.pop_count >= stack.len() {
                continue;
            }
            let keep = stack.len() - selector.pop_count;
            let frame: &'t [Term] = stack[keep - 1];
            let Some(next) = frame.get(selector.index) else {
                continue;
            };
            let Some(shape) = next.shape() else {
                continue;
            };
            if let Some(&child) = table.get(&shape) {
                let mut next_stack = stack[..keep].to_vec();
                next_stack.push(next.children());
                self.walk_term(child, &next_stack, reached);
            }
        }
    }

    /// Find or create the node at the end of `skeleton`'s chain.
    fn extend(&mut self, skeleton: &Skeleton) -> NodeId {
        let mut path = Vec::new();
        match self.walk_skeleton(self.root, 0, 0, skeleton, &mut path, true) {
            Some((_, node)) => node,
            None => self.root,
        }
    }

    /// Find the node at the end of `skeleton`'s chain without creating any.
    fn locate(&mut self, skeleton: &Skeleton) -> Option<NodeId> {
        let mut path = Vec::new();
        self.walk_skeleton(self.root, 0, 0, skeleton, &mut path, false)
            .map(|(_, node)| node)
    }

    fn walk_skeleton(
        &mut self,
        node_id: NodeId,
        pop_count: usize,
        index: usize,
        skeleton: &Skeleton,
        path: &mut Path,
        create: bool,
    ) -> Option<(usize, NodeId)> {
        let (shape, members) = match skeleton {
            Skeleton::Hole => return Some((pop_count, node_id)),
            Skeleton::Shape { shape, members } => (shape, members),
        };
        let selector = Selector { pop_count, index };
        let existing = self
            .nodes
            .get(&node_id)?
            .edges
            .get(&selector)
            .and_then(|table| table.get(shape))
            .copied();
        let mut next = match existing {
            Some(child) => child,
            None if create => self.add_child(node_id, selector, shape, path)?,
            None => return None,
        };

        let mut pop = 0;
        for (i, member) in members.iter().enumerate() {
            path.push(i);
            let walked = self.walk_skeleton(next, pop, i, member, path, create);
            path.pop();
            (pop, next) = walked?;
        }
        Some((pop + 1, next))
    }

    fn add_child(
        &mut self,
        parent: NodeId,
        selector: Selector,
        shape: &Shape,
        path: &[usize],
    ) -> Option<NodeId> {
        let cached: BTreeSet<Assertion> = self
            .nodes
            .get(&parent)?
            .continuation
            .cached
            .iter()
            .filter(|a| a.term().project(path).is_some_and(|t| t.has_shape(shape)))
            .cloned()
            .collect();
        let id = self.next_node;
        self.next_node += 1;
        self.nodes
            .insert(id, Node::new(cached, Some((parent, selector, shape.clone()))));
        self.nodes
            .get_mut(&parent)?
            .edges
            .entry(selector)
            .or_default()
            .insert(shape.clone(), id);
        Some(id)
    }

    /// Remove unused nodes from `node_id` up towards the root.
    fn prune_from(&mut self, mut node_id: NodeId) {
        while node_id != self.root {
            let Some(node) = self.nodes.get(&node_id) else {
                return;
            };
            if !node.is_unused() {
                return;
            }
            let parent = node.parent.clone();
            self.nodes.remove(&node_id);
            let Some((parent_id, selector, shape)) = parent else {
                return;
            };
            if let Some(parent_node) = self.nodes.get_mut(&parent_id) {
                if let Some(table) = parent_node.edges.get_mut(&selector) {
                    table.remove(&shape);
                    if table.is_empty() {
                        parent_node.edges.remove(&selector);
                    }
                }
            }
            node_id = parent_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::{analyze, Pattern, PatternBuilder as P};
    use proptest::prelude::*;

    type Event = (u32, EventKind, Vec<Term>);

    #[derive(Default)]
    struct Harness {
        index: Index<u32>,
        events: Vec<Event>,
    }

    impl Harness {
        fn watch(&mut self, pattern: &Pattern, subscriber: u32) -> Analysis {
            let analysis = analyze(pattern);
            let events = &mut self.events;
            self.index.add_handler(&analysis, subscriber, |s, kind, captures| {
                events.push((*s, kind, captures.to_vec()))
            });
            analysis
        }

        fn adjust(&mut self, term: Term, delta: i64) -> Transition {
            let events = &mut self.events;
            self.index
                .adjust_assertion(&Assertion::new(term), delta, |s, kind, captures| {
                    events.push((*s, kind, captures.to_vec()))
                })
        }

        fn send(&mut self, term: Term) {
            let events = &mut self.events;
            self.index.send_message(&term, |s, kind, captures| {
                events.push((*s, kind, captures.to_vec()))
            });
        }

        fn take(&mut self) -> Vec<Event> {
            std::mem::take(&mut self.events)
        }
    }

    fn s(text: &str) -> Term {
        Term::from(text)
    }

    fn i(value: i64) -> Term {
        Term::from(value)
    }

    fn c(value: i64) -> Term {
        Term::record("C", vec![i(value)])
    }

    #[test]
    fn test_late_subscriber_is_replayed() {
        let mut h = Harness::default();
        h.adjust(Term::array(vec![s("hi"), i(123), i(234)]), 1);
        h.watch(&P::array(vec![P::literal("hi"), P::capture(), P::capture()]), 1);
        assert_eq!(h.take(), vec![(1, EventKind::Added, vec![i(123), i(234)])]);
    }

    #[test]
    fn test_replay_goes_only_to_new_subscriber() {
        let mut h = Harness::default();
        let pattern = P::array(vec![P::capture()]);
        h.watch(&pattern, 1);
        h.adjust(Term::array(vec![i(1)]), 1);
        h.take();
        h.watch(&pattern, 2);
        assert_eq!(h.take(), vec![(2, EventKind::Added, vec![i(1)])]);
    }

    #[test]
    fn test_nested_capture_scenario() {
        let mut h = Harness::default();
        // A(B($x), $y)
        h.watch(
            &P::record("A", vec![P::record("B", vec![P::capture()]), P::capture()]),
            1,
        );
        for (label, n) in [("x", 1), ("y", 2), ("z", 3)] {
            h.adjust(
                Term::record("A", vec![Term::record("B", vec![s(label)]), c(n)]),
                1,
            );
        }
        assert_eq!(
            h.take(),
            vec![
                (1, EventKind::Added, vec![s("x"), c(1)]),
                (1, EventKind::Added, vec![s("y"), c(2)]),
                (1, EventKind::Added, vec![s("z"), c(3)]),
            ]
        );
    }

    #[test]
    fn test_captureless_handler_dedups_on_shape() {
        let mut h = Harness::default();
        h.watch(&P::array(vec![P::discard(), P::discard()]), 1);
        h.adjust(Term::array(vec![s("hi"), i(123)]), 1);
        h.adjust(Term::array(vec![s("hi"), i(234)]), 1);
        h.adjust(Term::array(vec![s("hi"), i(123)]), -1);
        h.adjust(Term::array(vec![s("hi"), i(234)]), -1);
        assert_eq!(
            h.take(),
            vec![
                (1, EventKind::Added, vec![]),
                (1, EventKind::Removed, vec![]),
            ]
        );
    }

    #[test]
    fn test_duplicate_sources_fire_once() {
        let mut h = Harness::default();
        h.watch(&P::record("fact", vec![P::capture()]), 1);
        let fact = Term::record("fact", vec![i(1)]);
        assert_eq!(h.adjust(fact.clone(), 1), Transition::AbsentToPresent);
        assert_eq!(h.adjust(fact.clone(), 1), Transition::PresentToPresent);
        assert_eq!(h.adjust(fact.clone(), -1), Transition::PresentToPresent);
        assert_eq!(h.take(), vec![(1, EventKind::Added, vec![i(1)])]);
        assert_eq!(h.adjust(fact, -1), Transition::PresentToAbsent);
        assert_eq!(h.take(), vec![(1, EventKind::Removed, vec![i(1)])]);
    }

    #[test]
    fn test_constants_filter_matches() {
        let mut h = Harness::default();
        h.watch(&P::record("temp", vec![P::literal("kitchen"), P::capture()]), 1);
        h.adjust(Term::record("temp", vec![s("hall"), i(18)]), 1);
        h.adjust(Term::record("temp", vec![s("kitchen"), i(21)]), 1);
        assert_eq!(h.take(), vec![(1, EventKind::Added, vec![i(21)])]);
    }

    #[test]
    fn test_compound_constant_matches_structurally() {
        let mut h = Harness::default();
        h.watch(&P::array(vec![P::literal(c(1)), P::capture()]), 1);
        h.adjust(Term::array(vec![c(2), i(0)]), 1);
        h.adjust(Term::array(vec![c(1), i(9)]), 1);
        assert_eq!(h.take(), vec![(1, EventKind::Added, vec![i(9)])]);
    }

    #[test]
    fn test_removing_one_handler_leaves_other_intact() {
        let mut h = Harness::default();
        let first = h.watch(&P::array(vec![P::capture(), P::discard()]), 1);
        h.watch(&P::array(vec![P::capture(), P::capture()]), 2);
        h.adjust(Term::array(vec![i(1), i(2)]), 1);
        h.index.remove_handler(&first, &1);
        h.adjust(Term::array(vec![i(3), i(4)]), 1);
        h.adjust(Term::array(vec![i(1), i(2)]), -1);
        let seen: Vec<_> = h.take().into_iter().filter(|e| e.0 == 2).collect();
        assert_eq!(
            seen,
            vec![
                (2, EventKind::Added, vec![i(1), i(2)]),
                (2, EventKind::Added, vec![i(3), i(4)]),
                (2, EventKind::Removed, vec![i(1), i(2)]),
            ]
        );
    }

    #[test]
    fn test_messages_bypass_caches() {
        let mut h = Harness::default();
        h.watch(&P::record("ping", vec![P::capture()]), 1);
        h.send(Term::record("ping", vec![i(1)]));
        h.send(Term::record("ping", vec![i(1)]));
        assert_eq!(h.take().len(), 2);
        assert_eq!(h.index.assertion_count(), 0);
        h.watch(&P::record("ping", vec![P::capture()]), 2);
        assert!(h.take().is_empty());
    }

    #[test]
    fn test_unused_structure_is_pruned() {
        let mut h = Harness::default();
        let analysis = h.watch(
            &P::record("A", vec![P::record("B", vec![P::capture()]), P::literal(1i64)]),
            1,
        );
        h.adjust(
            Term::record("A", vec![Term::record("B", vec![i(5)]), i(1)]),
            1,
        );
        assert_eq!(h.index.node_count(), 3);
        assert_eq!(h.index.handler_count(), 1);

        h.index.remove_handler(&analysis, &1);
        assert_eq!(h.index.node_count(), 1);
        assert_eq!(h.index.handler_count(), 0);

        // Unknown registration is a no-op.
        h.index.remove_handler(&analysis, &1);
        assert_eq!(h.index.node_count(), 1);
        assert_eq!(h.index.assertion_count(), 1);
    }

    #[test]
    fn test_visibility_restriction_limits_handlers() {
        let mut h = Harness::default();
        h.watch(&P::record("A", vec![P::capture(), P::discard()]), 1);
        h.watch(&P::record("A", vec![P::discard(), P::capture()]), 2);
        let restricted = Assertion::restricted(Term::record("A", vec![i(1), i(2)]), vec![vec![0]]);
        let events = &mut h.events;
        h.index.adjust_assertion(&restricted, 1, |s, kind, captures| {
            events.push((*s, kind, captures.to_vec()))
        });
        assert_eq!(h.take(), vec![(1, EventKind::Added, vec![i(1)])]);

        // Restriction also applies to replay.
        h.watch(&P::record("A", vec![P::discard(), P::capture()]), 3);
        h.watch(&P::record("A", vec![P::capture(), P::discard()]), 4);
        assert_eq!(h.take(), vec![(4, EventKind::Added, vec![i(1)])]);
    }

    #[test]
    fn test_retraction_before_assertion_is_silent() {
        let mut h = Harness::default();
        h.watch(&P::capture(), 1);
        assert_eq!(h.adjust(i(1), -1), Transition::AbsentToPresent);
        assert_eq!(h.adjust(i(1), 1), Transition::PresentToAbsent);
        assert!(h.take().is_empty());
        assert_eq!(h.adjust(i(1), 1), Transition::AbsentToPresent);
        assert_eq!(h.take(), vec![(1, EventKind::Added, vec![i(1)])]);
    }

    proptest! {
        #[test]
        fn prop_added_and_removed_balance(ops in proptest::collection::vec((0i64..3, any::<bool>()), 0..60)) {
            let mut h = Harness::default();
            h.watch(&P::array(vec![P::capture()]), 1);
            h.watch(&P::array(vec![P::discard()]), 2);
            let mut counts = [0i64; 3];
            for (n, add) in ops {
                let slot = n as usize;
                if add {
                    counts[slot] += 1;
                    h.adjust(Term::array(vec![i(n)]), 1);
                } else if counts[slot] > 0 {
                    counts[slot] -= 1;
                    h.adjust(Term::array(vec![i(n)]), -1);
                }
            }
            for (slot, count) in counts.iter().enumerate() {
                if *count > 0 {
                    h.adjust(Term::array(vec![i(slot as i64)]), -count);
                }
            }
            let events = h.take();
            for subscriber in [1, 2] {
                let added = events.iter().filter(|e| e.0 == subscriber && e.1 == EventKind::Added).count();
                let removed = events.iter().filter(|e| e.0 == subscriber && e.1 == EventKind::Removed).count();
                prop_assert_eq!(added, removed);
            }
            prop_assert_eq!(h.index.assertion_count(), 0);
        }
    }
}
