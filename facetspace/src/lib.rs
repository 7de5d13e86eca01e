//! Facetspace - a dataspace engine with facet-structured actors
//!
//! Actors publish assertions into a shared dataspace and observe it through
//! patterns. Each actor's behaviour is organised as a tree of facets; a
//! facet owns endpoints (what it asserts and what it watches), fields and
//! stop scripts, and stopping it retracts everything it published.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Ground                              │
//! │  (driver - fuel-bounded steps, external event channel)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                       Dataspace                             │
//! │                                                             │
//! │  ┌──────────────────────┐     ┌──────────────────────────┐  │
//! │  │   Actors & Facets    │────▶│  Skeleton index          │  │
//! │  │  turns, priorities,  │patch│  shape trie, const maps, │  │
//! │  │  endpoints, fields   │◀────│  capture caches          │  │
//! │  └──────────┬───────────┘event└──────────────────────────┘  │
//! │             │ reads/writes                                  │
//! │             ▼                                               │
//! │  ┌──────────────────────┐                                   │
//! │  │  Dataflow graph      │ damaged fields refresh endpoints  │
//! │  └──────────────────────┘                                   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Core Concepts
//!
//! ## Assertions and patterns
//!
//! An assertion is a [`Term`]. The index counts every assertion, so two
//! actors asserting the same term produce one appearance for observers.
//! Observers describe interest with a [`Pattern`]: discards, captures and
//! literals nested inside records and arrays.
//!
//! ## Turns
//!
//! Scripts run with an explicit [`Turn`]. Effects are buffered and committed
//! when the actor has run all its queued scripts, so observers never see a
//! state in the middle of a turn.
//!
//! ## Facets
//!
//! A facet stops when asked to, or when it has no endpoints and no children
//! left. Children stop before their parent; a root facet stopping ends the
//! actor.
//!
//! # Example
//!
//! ```rust
//! use facetspace::{Assertion, Ground, EngineConfig, Observer, PatternBuilder as P, Term};
//!
//! let mut ground = Ground::new(EngineConfig::default(), |turn| {
//!     turn.add_observer(
//!         Observer::new(&P::record("greeting", vec![P::capture()]))
//!             .on_added(|_, captures| {
//!                 println!("hello, {}", captures[0]);
//!                 Ok(())
//!             }),
//!     )?;
//!     turn.add_assertion(|_| Ok(Some(Assertion::new(Term::record("greeting", vec!["world".into()])))))?;
//!     Ok(())
//! })?;
//! ground.run_until_quiescent();
//! assert_eq!(ground.stats().actor_count, 1);
//! # Ok::<(), facetspace::RuntimeError>(())
//! ```

pub mod actor;
pub mod bag;
pub mod dataflow;
pub mod dataspace;
pub mod pattern;
pub mod runtime;
pub mod skeleton;
pub mod term;
pub mod types;

// Re-export commonly used types
pub use actor::{EventCallback, FacetState, Interest, Observer, Priority};
pub use bag::{Bag, Transition};
pub use dataspace::{Activatable, BackgroundTask, Dataspace, DataspaceStats, ExternalHandle, Turn};
pub use pattern::{analyze, Analysis, Pattern, PatternBuilder};
pub use runtime::{ActorError, ActorResult, EngineConfig, Ground, RuntimeError};
pub use term::{Assertion, Path, Record, Shape, Term};
pub use types::{ActorId, EndpointId, EndpointRef, FacetId, FieldId, TurnId};
