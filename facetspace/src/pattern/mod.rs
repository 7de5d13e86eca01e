//! Patterns over terms.
//!
//! A [`Pattern`] is a term shape with two extra markers: `Discard` matches
//! anything and binds nothing, `Capture` binds whatever its inner pattern
//! matches. Patterns are compiled once with [`analyze`] into the
//! [`Analysis`] the skeleton index is keyed on.
//!
//! The labels [`DISCARD_LABEL`] and [`CAPTURE_LABEL`] are reserved. A
//! literal record carrying one of them publishes the same `observe(..)`
//! assertion as the corresponding wildcard, so observers of observers
//! cannot tell the two apart.

mod analysis;

pub use analysis::{analyze, Analysis, Skeleton};

use crate::term::Term;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Label of the record wrapping a pattern when it is published as an interest.
pub const OBSERVE_LABEL: &str = "observe";
/// Reserved label encoding [`Pattern::Discard`] inside published interests.
pub const DISCARD_LABEL: &str = "discard";
/// Reserved label encoding [`Pattern::Capture`] inside published interests.
pub const CAPTURE_LABEL: &str = "capture";

/// Term pattern with wildcards and captures.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Pattern {
    Discard,
    Capture(Box<Pattern>),
    Literal(Term),
    Record {
        label: String,
        fields: Vec<Pattern>,
    },
    Array(Vec<Pattern>),
}

impl Pattern {
    /// Encode the pattern as an ordinary term.
    ///
    /// `Discard` becomes `discard()` and `Capture(p)` becomes `capture(p)`.
    /// Literals are not escaped, so a literal `discard()` record encodes
    /// exactly like `Discard`.
    pub fn to_term(&self) -> Term {
        match self {
            Pattern::Discard => Term::record(DISCARD_LABEL, Vec::new()),
            Pattern::Capture(inner) => Term::record(CAPTURE_LABEL, vec![inner.to_term()]),
            Pattern::Literal(term) => term.clone(),
            Pattern::Record { label, fields } => {
                Term::record(label.clone(), fields.iter().map(Pattern::to_term).collect())
            }
            Pattern::Array(items) => Term::array(items.iter().map(Pattern::to_term).collect()),
        }
    }

    /// Number of capture positions, nested captures included.
    pub fn capture_count(&self) -> usize {
        match self {
            Pattern::Discard | Pattern::Literal(_) => 0,
            Pattern::Capture(inner) => 1 + inner.capture_count(),
            Pattern::Record { fields: items, .. } | Pattern::Array(items) => {
                items.iter().map(Pattern::capture_count).sum()
            }
        }
    }

    /// Build the term this pattern describes, filling captures from `captures`
    /// in fringe order.
    ///
    /// A capture consumes one value and the slots of any captures nested
    /// inside it. Returns `None` if the pattern contains a discard outside a
    /// capture or if too few values are given.
    pub fn instantiate(&self, captures: &[Term]) -> Option<Term> {
        let mut cursor = 0;
        let term = self.instantiate_at(captures, &mut cursor)?;
        Some(term)
    }

    fn instantiate_at(&self, captures: &[Term], cursor: &mut usize) -> Option<Term> {
        match self {
            Pattern::Discard => None,
            Pattern::Capture(inner) => {
                let value = captures.get(*cursor)?.clone();
                *cursor += 1 + inner.capture_count();
                Some(value)
            }
            Pattern::Literal(term) => Some(term.clone()),
            Pattern::Record { label, fields } => {
                let fields = fields
                    .iter()
                    .map(|field| field.instantiate_at(captures, cursor))
                    .collect::<Option<Vec<_>>>()?;
                Some(Term::record(label.clone(), fields))
            }
            Pattern::Array(items) => {
                let items = items
                    .iter()
                    .map(|item| item.instantiate_at(captures, cursor))
                    .collect::<Option<Vec<_>>>()?;
                Some(Term::array(items))
            }
        }
    }

    /// Replace every capture with the corresponding literal value.
    ///
    /// Discards are kept, so the result matches exactly the assertions the
    /// original pattern matched with this capture tuple. Missing values
    /// leave the capture in place.
    pub fn bind_captures(&self, captures: &[Term]) -> Pattern {
        let mut cursor = 0;
        self.bind_at(captures, &mut cursor)
    }

    fn bind_at(&self, captures: &[Term], cursor: &mut usize) -> Pattern {
        match self {
            Pattern::Discard | Pattern::Literal(_) => self.clone(),
            Pattern::Capture(inner) => {
                let slot = *cursor;
                *cursor += 1 + inner.capture_count();
                match captures.get(slot) {
                    Some(value) => Pattern::Literal(value.clone()),
                    None => self.clone(),
                }
            }
            Pattern::Record { label, fields } => Pattern::Record {
                label: label.clone(),
                fields: fields.iter().map(|f| f.bind_at(captures, cursor)).collect(),
            },
            Pattern::Array(items) => {
                Pattern::Array(items.iter().map(|i| i.bind_at(captures, cursor)).collect())
            }
        }
    }
}

impl From<Term> for Pattern {
    fn from(term: Term) -> Self {
        Pattern::Literal(term)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Discard => write!(f, "_"),
            Pattern::Capture(inner) if **inner == Pattern::Discard => write!(f, "$"),
            Pattern::Capture(inner) => write!(f, "${}", inner),
            _ => write!(f, "{}", self.to_term()),
        }
    }
}

/// Fluent helpers for building patterns in code.
pub struct PatternBuilder;

impl PatternBuilder {
    pub fn discard() -> Pattern {
        Pattern::Discard
    }

    /// `$`: capture anything.
    pub fn capture() -> Pattern {
        Pattern::Capture(Box::new(Pattern::Discard))
    }

    /// `$inner`: capture whatever `inner` matches.
    pub fn bind(inner: Pattern) -> Pattern {
        Pattern::Capture(Box::new(inner))
    }

    pub fn literal(value: impl Into<Term>) -> Pattern {
        Pattern::Literal(value.into())
    }

    pub fn record(label: impl Into<String>, fields: Vec<Pattern>) -> Pattern {
        Pattern::Record {
            label: label.into(),
            fields,
        }
    }

    pub fn array(items: Vec<Pattern>) -> Pattern {
        Pattern::Array(items)
    }
}
