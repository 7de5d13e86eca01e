//! Actor model primitives
//!
//! This module holds the per-actor state the dataspace drives:
//! - `Actor`: script queues, buffered actions and assertion bookkeeping
//! - `Facet`: a node in the actor's facet tree, owning endpoints and fields
//! - `Endpoint`, `Interest`, `Observer`: what a facet publishes and watches
//! - `Action`: the effects a turn commits

mod action;
mod endpoint;
mod facet;

pub(crate) use action::Action;
pub use endpoint::{EventCallback, Interest, Observer};
pub(crate) use endpoint::{Endpoint, UpdateFn};
pub(crate) use facet::Facet;
pub use facet::FacetState;

use crate::bag::{Bag, Transition};
use crate::dataspace::{Dataspace, Turn};
use crate::runtime::ActorResult;
use crate::term::Assertion;
use crate::types::{ActorId, FacetId};
use std::collections::VecDeque;

/// Scheduling priority of a script.
///
/// Lower variants run first. An actor drains every queue before its
/// buffered actions are committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Priority {
    QueryHigh,
    Query,
    QueryHandler,
    #[default]
    Normal,
    Gc,
    Idle,
}

impl Priority {
    pub const COUNT: usize = 6;

    fn index(self) -> usize {
        self as usize
    }
}

/// Application code run in the context of a facet.
pub type FacetScript = Box<dyn FnOnce(&mut Turn<'_>) -> ActorResult>;

/// Boot procedure of an actor or facet.
pub type Boot = FacetScript;

pub(crate) type SystemScript = Box<dyn FnOnce(&mut Dataspace, ActorId) -> ActorResult>;

/// A queued unit of work for one actor.
pub(crate) enum Script {
    /// Runs with a [`Turn`] for `facet`, in script mode.
    Facet { facet: FacetId, body: FacetScript },
    /// Runtime bookkeeping with direct access to the dataspace.
    System(SystemScript),
}

impl Script {
    pub(crate) fn facet(facet: FacetId, body: impl FnOnce(&mut Turn<'_>) -> ActorResult + 'static) -> Self {
        Script::Facet {
            facet,
            body: Box::new(body),
        }
    }

    pub(crate) fn system(body: impl FnOnce(&mut Dataspace, ActorId) -> ActorResult + 'static) -> Self {
        Script::System(Box::new(body))
    }
}

/// An actor: a facet tree plus the queues and multisets driving it.
pub(crate) struct Actor {
    pub id: ActorId,
    pub name: String,
    pub parent: Option<ActorId>,
    pub root_facet: Option<FacetId>,
    /// Whether the actor is in the dataspace's runnable queue.
    pub runnable: bool,
    pending_scripts: [VecDeque<Script>; Priority::COUNT],
    pub pending_actions: Vec<Action>,
    /// Ad-hoc assertions currently held; never negative.
    pub adhoc_assertions: Bag<Assertion>,
    /// Net deltas that undo everything committed on this actor's behalf.
    pub cleanup_changes: Bag<Assertion>,
}

impl Actor {
    pub fn new(
        id: ActorId,
        name: String,
        parent: Option<ActorId>,
        adhoc_assertions: Bag<Assertion>,
    ) -> Self {
        Self {
            id,
            name,
            parent,
            root_facet: None,
            runnable: false,
            pending_scripts: std::array::from_fn(|_| VecDeque::new()),
            pending_actions: Vec::new(),
            adhoc_assertions,
            cleanup_changes: Bag::new(),
        }
    }

    pub fn push_script(&mut self, priority: Priority, script: Script) {
        self.pending_scripts[priority.index()].push_back(script);
    }

    /// Next script from the most urgent non-empty queue.
    pub fn pop_next_script(&mut self) -> Option<Script> {
        self.pending_scripts
            .iter_mut()
            .find_map(|queue| queue.pop_front())
    }

    /// Drop every queued script and uncommitted action.
    pub fn abandon_queued_work(&mut self) {
        for queue in &mut self.pending_scripts {
            queue.clear();
        }
        self.pending_actions.clear();
    }

    /// Apply `delta` to the patch at the end of the action buffer, appending
    /// a patch if the last action is something else. Consecutive assertion
    /// changes within a turn merge here.
    fn change_pending_patch(&mut self, assertion: Assertion, delta: i64) {
        if let Some(Action::Patch(patch)) = self.pending_actions.last_mut() {
            patch.change(assertion, delta);
            return;
        }
        let mut patch = Bag::new();
        patch.change(assertion, delta);
        self.pending_actions.push(Action::Patch(patch));
    }

    pub fn assert(&mut self, assertion: Assertion) {
        self.change_pending_patch(assertion, 1);
    }

    pub fn retract(&mut self, assertion: Assertion) {
        self.change_pending_patch(assertion, -1);
    }

    pub fn adhoc_assert(&mut self, assertion: Assertion) {
        if self.adhoc_assertions.change(assertion.clone(), 1) == Transition::AbsentToPresent {
            self.assert(assertion);
        }
    }

    pub fn adhoc_retract(&mut self, assertion: Assertion) {
        if self.adhoc_assertions.change_clamped(assertion.clone(), -1)
            == Transition::PresentToAbsent
        {
            self.retract(assertion);
        }
    }
}
