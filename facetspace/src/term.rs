//! Terms: the only values ever asserted, matched or sent.
//!
//! A [`Term`] is an atom, a labelled fixed-arity record, or a fixed-length
//! array of terms. Equality, ordering and hashing are structural. The
//! [`Assertion`] wrapper pairs a term with an optional visibility
//! restriction, which is what the skeleton index actually stores.

use crate::pattern::{analyze, Pattern};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A position inside a term: the child indices stepped through from the root.
pub type Path = Vec<usize>;

/// Immutable, structurally comparable value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Term {
    Boolean(bool),
    Integer(i64),
    String(String),
    Symbol(String),
    Bytes(Vec<u8>),
    Record(Record),
    Array(Vec<Term>),
}

/// A labelled record with a fixed number of fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Record {
    pub label: String,
    pub fields: Vec<Term>,
}

/// The shape of a compound term, used to key discrimination-tree edges.
///
/// Atoms have no shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Shape {
    Record { label: String, arity: usize },
    Array(usize),
}

impl Shape {
    /// Number of children a term of this shape has.
    pub fn arity(&self) -> usize {
        match self {
            Shape::Record { arity, .. } => *arity,
            Shape::Array(len) => *len,
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shape::Record { label, arity } => write!(f, "{}/{}", label, arity),
            Shape::Array(len) => write!(f, "[{}]", len),
        }
    }
}

impl Term {
    pub fn record(label: impl Into<String>, fields: Vec<Term>) -> Self {
        Term::Record(Record {
            label: label.into(),
            fields,
        })
    }

    pub fn symbol(name: impl Into<String>) -> Self {
        Term::Symbol(name.into())
    }

    pub fn array(items: Vec<Term>) -> Self {
        Term::Array(items)
    }

    /// Shape of this term, or `None` for atoms.
    pub fn shape(&self) -> Option<Shape> {
        match self {
            Term::Record(record) => Some(Shape::Record {
                label: record.label.clone(),
                arity: record.fields.len(),
            }),
            Term::Array(items) => Some(Shape::Array(items.len())),
            _ => None,
        }
    }

    /// True if this term has exactly the given shape.
    pub fn has_shape(&self, shape: &Shape) -> bool {
        match (self, shape) {
            (Term::Record(record), Shape::Record { label, arity }) => {
                record.label == *label && record.fields.len() == *arity
            }
            (Term::Array(items), Shape::Array(len)) => items.len() == *len,
            _ => false,
        }
    }

    /// Children of a compound term; empty for atoms.
    pub fn children(&self) -> &[Term] {
        match self {
            Term::Record(record) => &record.fields,
            Term::Array(items) => items,
            _ => &[],
        }
    }

    /// Step into the child at `index`.
    pub fn step(&self, index: usize) -> Option<&Term> {
        self.children().get(index)
    }

    /// Follow `path` from this term.
    pub fn project(&self, path: &[usize]) -> Option<&Term> {
        path.iter().try_fold(self, |term, &index| term.step(index))
    }

    /// Project every path, failing if any of them leads nowhere.
    pub fn project_paths(&self, paths: &[Path]) -> Option<Vec<Term>> {
        paths
            .iter()
            .map(|path| self.project(path).cloned())
            .collect()
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Term::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Term::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Term::String(text) | Term::Symbol(text) => Some(text),
            _ => None,
        }
    }

    /// True if this is a record with the given label.
    pub fn is_record_labelled(&self, label: &str) -> bool {
        matches!(self, Term::Record(record) if record.label == label)
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn write_items(f: &mut fmt::Formatter<'_>, items: &[Term]) -> fmt::Result {
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", item)?;
            }
            Ok(())
        }

        match self {
            Term::Boolean(value) => write!(f, "{}", value),
            Term::Integer(value) => write!(f, "{}", value),
            Term::String(text) => write!(f, "{:?}", text),
            Term::Symbol(name) => write!(f, "{}", name),
            Term::Bytes(bytes) => write!(f, "#[{} bytes]", bytes.len()),
            Term::Record(record) => {
                write!(f, "{}(", record.label)?;
                write_items(f, &record.fields)?;
                write!(f, ")")
            }
            Term::Array(items) => {
                write!(f, "[")?;
                write_items(f, items)?;
                write!(f, "]")
            }
        }
    }
}

impl From<bool> for Term {
    fn from(value: bool) -> Self {
        Term::Boolean(value)
    }
}

impl From<i64> for Term {
    fn from(value: i64) -> Self {
        Term::Integer(value)
    }
}

impl From<i32> for Term {
    fn from(value: i32) -> Self {
        Term::Integer(i64::from(value))
    }
}

impl From<&str> for Term {
    fn from(value: &str) -> Self {
        Term::String(value.to_string())
    }
}

impl From<String> for Term {
    fn from(value: String) -> Self {
        Term::String(value)
    }
}

impl From<Vec<Term>> for Term {
    fn from(items: Vec<Term>) -> Self {
        Term::Array(items)
    }
}

/// A term as published into the index, optionally visibility-restricted.
///
/// A restricted assertion only fires handlers whose capture paths are an
/// ordered subset of `restriction`. Both lists are in fringe (pre-order)
/// order, so the subset check is a single merge pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Assertion {
    term: Term,
    restriction: Option<Vec<Path>>,
}

impl Assertion {
    pub fn new(term: Term) -> Self {
        Self {
            term,
            restriction: None,
        }
    }

    /// Wrap `term`, restricting visibility to handlers capturing within `paths`.
    pub fn restricted(term: Term, paths: Vec<Path>) -> Self {
        Self {
            term,
            restriction: Some(paths),
        }
    }

    /// Instantiate `pattern` with `captures`, restricted to the pattern's
    /// capture positions.
    ///
    /// Handlers that would capture somewhere the pattern did not are not
    /// fired by the result. `None` if the pattern cannot be instantiated.
    pub fn visibility_restricted(pattern: &Pattern, captures: &[Term]) -> Option<Self> {
        let term = pattern.instantiate(captures)?;
        Some(Self::restricted(term, analyze(pattern).capture_paths))
    }

    pub fn term(&self) -> &Term {
        &self.term
    }

    pub fn restriction(&self) -> Option<&[Path]> {
        self.restriction.as_deref()
    }

    /// Whether a handler capturing `capture_paths` may see this assertion.
    pub fn is_visible_to(&self, capture_paths: &[Path]) -> bool {
        match &self.restriction {
            None => true,
            Some(paths) => is_ordered_subset(capture_paths, paths),
        }
    }

    pub fn into_term(self) -> Term {
        self.term
    }
}

impl From<Term> for Assertion {
    fn from(term: Term) -> Self {
        Assertion::new(term)
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.restriction {
            None => write!(f, "{}", self.term),
            Some(paths) => write!(f, "{} (visible at {:?})", self.term, paths),
        }
    }
}

/// `small ⊆ large`, where both are sorted in the same fringe order.
fn is_ordered_subset(small: &[Path], large: &[Path]) -> bool {
    let mut remaining = large.iter();
    small
        .iter()
        .all(|path| remaining.by_ref().any(|candidate| candidate == path))
}
