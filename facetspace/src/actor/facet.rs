//! Facet - unit of structured concurrency within an actor
//!
//! Facets form a tree per actor:
//! - Stopping a facet stops its children first, then runs its own stop
//!   scripts, then retracts everything its endpoints published
//! - A facet left with no endpoints and no children is inert and stops
//! - Fields declared in a facet are visible to its descendants

use super::{Endpoint, FacetScript};
use crate::types::{ActorId, EndpointId, FacetId, FieldId};
use std::collections::{BTreeMap, BTreeSet};

/// State of a facet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetState {
    /// The facet is running and may receive events
    Live,
    /// Stop requested; teardown scripts are queued
    Terminating,
    /// Endpoints destroyed; the record is about to be collected
    Terminated,
}

/// Field environment of one facet.
///
/// Lookups of names not declared here continue in the parent facet's scope.
#[derive(Debug, Default)]
pub(crate) struct Scope {
    names: BTreeMap<String, FieldId>,
    parent: Option<FacetId>,
}

impl Scope {
    pub fn new(parent: Option<FacetId>) -> Self {
        Self {
            names: BTreeMap::new(),
            parent,
        }
    }

    pub fn declare(&mut self, name: &str, field: FieldId) {
        self.names.insert(name.to_string(), field);
    }

    /// Field declared in this scope itself.
    pub fn lookup_local(&self, name: &str) -> Option<FieldId> {
        self.names.get(name).copied()
    }

    pub fn parent(&self) -> Option<FacetId> {
        self.parent
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldId> + '_ {
        self.names.values().copied()
    }
}

/// A facet record in the dataspace's facet arena.
pub(crate) struct Facet {
    pub id: FacetId,
    pub actor: ActorId,
    pub parent: Option<FacetId>,
    pub children: BTreeSet<FacetId>,
    pub endpoints: BTreeMap<EndpointId, Endpoint>,
    pub stop_scripts: Vec<FacetScript>,
    pub scope: Scope,
    pub state: FacetState,
    /// External handles created by this facet.
    pub externals: BTreeSet<u64>,
}

impl Facet {
    pub fn new(id: FacetId, actor: ActorId, parent: Option<FacetId>) -> Self {
        Self {
            id,
            actor,
            parent,
            children: BTreeSet::new(),
            endpoints: BTreeMap::new(),
            stop_scripts: Vec::new(),
            scope: Scope::new(parent),
            state: FacetState::Live,
            externals: BTreeSet::new(),
        }
    }

    pub fn is_live(&self) -> bool {
        self.state == FacetState::Live
    }

    /// No endpoints and no children: nothing left to keep the facet alive.
    pub fn is_inert(&self) -> bool {
        self.endpoints.is_empty() && self.children.is_empty()
    }
}
