//! Effects buffered during a turn and committed afterwards.

use super::{Boot, FacetScript};
use crate::bag::Bag;
use crate::term::{Assertion, Term};
use crate::types::FacetId;
use std::any::TypeId;
use std::fmt;

/// One entry of an actor's pending-action buffer.
pub(crate) enum Action {
    /// Net assertion changes, merged within a turn.
    Patch(Bag<Assertion>),
    Message(Term),
    Spawn {
        name: String,
        boot: Boot,
        initial: Vec<Assertion>,
    },
    /// Spawn once per distinct `key` for the lifetime of the dataspace.
    Activation {
        key: TypeId,
        name: String,
        boot: Boot,
    },
    /// Schedule `body` on the committing actor once this action is performed.
    DeferredTurn { facet: FacetId, body: FacetScript },
    /// Apply the actor's cleanup patch and remove it.
    Quit,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Patch(patch) => f.debug_tuple("Patch").field(patch).finish(),
            Action::Message(term) => f.debug_tuple("Message").field(term).finish(),
            Action::Spawn { name, initial, .. } => f
                .debug_struct("Spawn")
                .field("name", name)
                .field("initial", initial)
                .finish_non_exhaustive(),
            Action::Activation { name, .. } => f
                .debug_struct("Activation")
                .field("name", name)
                .finish_non_exhaustive(),
            Action::DeferredTurn { facet, .. } => f
                .debug_struct("DeferredTurn")
                .field("facet", facet)
                .finish_non_exhaustive(),
            Action::Quit => write!(f, "Quit"),
        }
    }
}

impl Action {
    /// Short name used in trace output.
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Action::Patch(_) => "patch",
            Action::Message(_) => "message",
            Action::Spawn { .. } => "spawn",
            Action::Activation { .. } => "activation",
            Action::DeferredTurn { .. } => "deferred-turn",
            Action::Quit => "quit",
        }
    }
}
