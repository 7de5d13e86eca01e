//! Error types for the facetspace runtime

use crate::types::{FacetId, FieldId};
use thiserror::Error;

/// Top-level runtime error
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Actor-related errors
    #[error("Actor error: {0}")]
    Actor(#[from] ActorError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for RuntimeError {
    fn from(err: serde_json::Error) -> Self {
        RuntimeError::Config(err.to_string())
    }
}

/// Errors raised by actor code or by misuse of the [`Turn`](crate::Turn) API.
///
/// Any of these returned from a script aborts the owning actor.
#[derive(Debug, Error)]
pub enum ActorError {
    /// Endpoint or script registration attempted outside facet setup
    #[error("{what} is only permitted while a facet is being set up")]
    NotInSetup { what: &'static str },

    /// Turn primitive used during facet setup
    #[error("cannot {what} during facet setup; use {keyword} to schedule it")]
    NotInScript {
        what: &'static str,
        keyword: &'static str,
    },

    /// Facet not found
    #[error("Facet {0} not found")]
    FacetNotFound(FacetId),

    /// Field name not visible from the facet's scope
    #[error("Field {name} not declared in the scope of {facet}")]
    FieldNotFound { facet: FacetId, name: String },

    /// Field id no longer (or never) allocated
    #[error("{0} is not a live field")]
    StaleField(FieldId),

    /// A second root facet was added to an actor
    #[error("Actor already has a root facet")]
    DuplicateRootFacet,

    /// Script failed
    #[error("Script failed: {0}")]
    Failed(String),

    /// Failure bubbled up from application code
    #[error(transparent)]
    Application(#[from] anyhow::Error),
}

impl ActorError {
    pub fn failed(message: impl Into<String>) -> Self {
        ActorError::Failed(message.into())
    }
}

/// Result type using RuntimeError
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Result type using ActorError
pub type ActorResult<T = ()> = std::result::Result<T, ActorError>;
