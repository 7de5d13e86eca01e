//! Endpoints: a facet's live contributions to the index.
//!
//! An endpoint's update function computes an [`Interest`]: an optional
//! assertion to publish and an optional [`Observer`] to register. Dynamic
//! endpoints run their update function as a dataflow subject, so a write to
//! any field it read recomputes the interest.

use super::Priority;
use crate::dataspace::Turn;
use crate::pattern::{analyze, Analysis, Pattern};
use crate::runtime::ActorResult;
use crate::skeleton::EventKind;
use crate::term::{Assertion, Term};
use crate::types::EndpointId;
use std::fmt;
use std::rc::Rc;

/// Event callback; receives the capture tuple of the matching assertion.
pub type EventCallback = Rc<dyn Fn(&mut Turn<'_>, &[Term]) -> ActorResult>;

pub(crate) type UpdateFn = Box<dyn FnMut(&mut Turn<'_>) -> ActorResult<Interest>>;

/// A pattern plus the callbacks to schedule when it matches.
///
/// Callbacks do not run inside the index. Each event is queued as a script
/// on the observing facet's actor at `priority`, and skipped if the facet
/// has stopped by the time it runs.
#[derive(Clone)]
pub struct Observer {
    analysis: Analysis,
    on_added: Option<EventCallback>,
    on_removed: Option<EventCallback>,
    on_message: Option<EventCallback>,
    priority: Priority,
}

impl Observer {
    pub fn new(pattern: &Pattern) -> Self {
        Self {
            analysis: analyze(pattern),
            on_added: None,
            on_removed: None,
            on_message: None,
            priority: Priority::Normal,
        }
    }

    pub fn on_added(
        mut self,
        callback: impl Fn(&mut Turn<'_>, &[Term]) -> ActorResult + 'static,
    ) -> Self {
        self.on_added = Some(Rc::new(callback));
        self
    }

    pub fn on_removed(
        mut self,
        callback: impl Fn(&mut Turn<'_>, &[Term]) -> ActorResult + 'static,
    ) -> Self {
        self.on_removed = Some(Rc::new(callback));
        self
    }

    pub fn on_message(
        mut self,
        callback: impl Fn(&mut Turn<'_>, &[Term]) -> ActorResult + 'static,
    ) -> Self {
        self.on_message = Some(Rc::new(callback));
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn analysis(&self) -> &Analysis {
        &self.analysis
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn callback_for(&self, kind: EventKind) -> Option<EventCallback> {
        match kind {
            EventKind::Added => self.on_added.clone(),
            EventKind::Removed => self.on_removed.clone(),
            EventKind::Message => self.on_message.clone(),
        }
    }
}

impl fmt::Debug for Observer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("interest", &self.analysis.assertion)
            .field("priority", &self.priority)
            .field("on_added", &self.on_added.is_some())
            .field("on_removed", &self.on_removed.is_some())
            .field("on_message", &self.on_message.is_some())
            .finish()
    }
}

/// What an endpoint currently contributes.
#[derive(Debug, Clone, Default)]
pub struct Interest {
    pub assertion: Option<Assertion>,
    pub observer: Option<Observer>,
}

impl Interest {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn assert(assertion: impl Into<Assertion>) -> Self {
        Self {
            assertion: Some(assertion.into()),
            observer: None,
        }
    }

    /// Register `observer` and publish its `observe(...)` assertion.
    pub fn observe(observer: Observer) -> Self {
        Self {
            assertion: Some(Assertion::new(observer.analysis.assertion.clone())),
            observer: Some(observer),
        }
    }

    /// Whether `other` publishes the same assertion and registers the same
    /// pattern. Callbacks are not compared.
    pub(crate) fn publishes_same(&self, other: &Interest) -> bool {
        self.assertion == other.assertion
            && self.observer.as_ref().map(Observer::analysis)
                == other.observer.as_ref().map(Observer::analysis)
    }
}

/// An endpoint record, owned by its facet.
pub(crate) struct Endpoint {
    pub id: EndpointId,
    /// The interest last installed in the index.
    pub interest: Interest,
    /// Taken out while running, so the closure can borrow the dataspace.
    pub update: Option<UpdateFn>,
    pub dynamic: bool,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("interest", &self.interest)
            .field("dynamic", &self.dynamic)
            .finish_non_exhaustive()
    }
}
