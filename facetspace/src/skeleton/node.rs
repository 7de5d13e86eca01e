//! Discrimination-tree storage.

use crate::bag::Bag;
use crate::term::{Assertion, Path, Shape, Term};
use std::collections::{BTreeMap, BTreeSet};

pub(crate) type NodeId = u64;

/// How to reach the next position from the current frame stack: discard
/// `pop_count` frames, then step into child `index` of the top frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Selector {
    pub pop_count: usize,
    pub index: usize,
}

#[derive(Debug)]
pub(crate) struct Node<S> {
    pub continuation: Continuation<S>,
    pub edges: BTreeMap<Selector, BTreeMap<Shape, NodeId>>,
    /// Back-link used when pruning: parent node, and the edge leading here.
    pub parent: Option<(NodeId, Selector, Shape)>,
}

impl<S> Node<S> {
    pub fn new(cached: BTreeSet<Assertion>, parent: Option<(NodeId, Selector, Shape)>) -> Self {
        Self {
            continuation: Continuation {
                cached,
                leaf_map: BTreeMap::new(),
            },
            edges: BTreeMap::new(),
            parent,
        }
    }

    /// Nothing is registered at or below this node.
    pub fn is_unused(&self) -> bool {
        self.edges.is_empty() && self.continuation.leaf_map.is_empty()
    }
}

/// Assertions whose shape reaches a node, split by constant positions.
#[derive(Debug)]
pub(crate) struct Continuation<S> {
    pub cached: BTreeSet<Assertion>,
    pub leaf_map: BTreeMap<Vec<Path>, BTreeMap<Vec<Term>, Leaf<S>>>,
}

/// Assertions that also match one set of constant values.
#[derive(Debug)]
pub(crate) struct Leaf<S> {
    pub cached: BTreeSet<Assertion>,
    pub handler_map: BTreeMap<Vec<Path>, Handler<S>>,
}

impl<S> Default for Leaf<S> {
    fn default() -> Self {
        Self {
            cached: BTreeSet::new(),
            handler_map: BTreeMap::new(),
        }
    }
}

impl<S> Leaf<S> {
    pub fn is_empty(&self) -> bool {
        self.cached.is_empty() && self.handler_map.is_empty()
    }
}

/// Capture tuples seen so far and who wants to hear about them.
#[derive(Debug)]
pub(crate) struct Handler<S> {
    pub cached_captures: Bag<Vec<Term>>,
    pub subscribers: BTreeSet<S>,
}

impl<S> Default for Handler<S> {
    fn default() -> Self {
        Self {
            cached_captures: Bag::new(),
            subscribers: BTreeSet::new(),
        }
    }
}
