//! Core identity types for the facetspace runtime
//!
//! Actors, facets, endpoints and fields live in arenas owned by the
//! [`Dataspace`](crate::dataspace::Dataspace). Everything that refers to
//! them across the runtime does so through these small copyable ids, never
//! through pointers, so teardown is a matter of removing arena entries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Actor identifier
///
/// Unique within one dataspace; allocated from the dataspace's id counter
/// when a `Spawn` or `Activation` action is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId(pub u64);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "actor:{}", self.0)
    }
}

/// Facet identifier
///
/// Facets are allocated from the same counter as actors, so ids grow in
/// creation order. Child sets are ordered by id, which makes teardown visit
/// children in the order they were created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FacetId(pub u64);

impl fmt::Display for FacetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "facet:{}", self.0)
    }
}

/// Endpoint identifier, unique within the dataspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId(pub u64);

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ep:{}", self.0)
    }
}

/// Identifier of an observable field declared in a facet scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(pub u64);

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field:{}", self.0)
    }
}

/// A fully qualified endpoint: the facet that owns it plus its id.
///
/// This is the subscriber identity registered in the skeleton index and the
/// subject identity used by the dataflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointRef {
    pub facet: FacetId,
    pub endpoint: EndpointId,
}

impl EndpointRef {
    pub fn new(facet: FacetId, endpoint: EndpointId) -> Self {
        Self { facet, endpoint }
    }
}

impl fmt::Display for EndpointRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.facet, self.endpoint)
    }
}

/// Turn identifier for causality tracking
///
/// Each committed turn is numbered in commit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TurnId(pub u64);

impl TurnId {
    /// The genesis turn (before any computation)
    pub fn genesis() -> Self {
        Self(0)
    }

    /// The turn after this one
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for TurnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "turn:{}", self.0)
    }
}

/// Monotonic id source shared by actors, facets, endpoints and fields.
#[derive(Debug, Default)]
pub(crate) struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub(crate) fn next(&mut self) -> u64 {
        let id = self.next;
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_allocation_is_monotonic() {
        let mut ids = IdAllocator::default();
        let a = FacetId(ids.next());
        let b = FacetId(ids.next());
        assert!(a < b);
    }

    #[test]
    fn test_turn_ordering() {
        let t1 = TurnId::genesis();
        let t2 = t1.next();
        assert!(t1 < t2);
        assert_eq!(format!("{}", t2), "turn:1");
    }

    #[test]
    fn test_endpoint_ref_display() {
        let r = EndpointRef::new(FacetId(3), EndpointId(7));
        assert_eq!(r.to_string(), "facet:3/ep:7");
    }
}
