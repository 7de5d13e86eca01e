//! Compile a pattern into the key the skeleton index is organised by.

use super::{Pattern, OBSERVE_LABEL};
use crate::term::{Path, Shape, Term};

/// Shape outline of a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Skeleton {
    /// Discard, capture of discard, or atomic constant.
    Hole,
    Shape { shape: Shape, members: Vec<Skeleton> },
}

/// Result of [`analyze`].
///
/// All path lists are in fringe order: depth first, pre-order, with a
/// capture's own path ahead of any paths inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Analysis {
    pub skeleton: Skeleton,
    pub const_paths: Vec<Path>,
    pub const_vals: Vec<Term>,
    pub capture_paths: Vec<Path>,
    /// `observe(<pattern>)`, published so that others can see the interest.
    pub assertion: Term,
}

#[derive(Default)]
struct Walker {
    const_paths: Vec<Path>,
    const_vals: Vec<Term>,
    capture_paths: Vec<Path>,
    path: Path,
}

impl Walker {
    fn walk(&mut self, pattern: &Pattern) -> Skeleton {
        match pattern {
            Pattern::Discard => Skeleton::Hole,
            Pattern::Capture(inner) => {
                self.capture_paths.push(self.path.clone());
                self.walk(inner)
            }
            Pattern::Literal(term) => self.walk_literal(term),
            Pattern::Record { label, fields } => {
                let shape = Shape::Record {
                    label: label.clone(),
                    arity: fields.len(),
                };
                let members = self.walk_members(fields);
                Skeleton::Shape { shape, members }
            }
            Pattern::Array(items) => {
                let shape = Shape::Array(items.len());
                let members = self.walk_members(items);
                Skeleton::Shape { shape, members }
            }
        }
    }

    fn walk_members(&mut self, members: &[Pattern]) -> Vec<Skeleton> {
        let mut out = Vec::with_capacity(members.len());
        for (index, member) in members.iter().enumerate() {
            self.path.push(index);
            out.push(self.walk(member));
            self.path.pop();
        }
        out
    }

    // Compound literals are matched structurally so they share tree nodes
    // with equivalent non-literal patterns.
    fn walk_literal(&mut self, term: &Term) -> Skeleton {
        match term.shape() {
            Some(shape) => {
                let mut members = Vec::with_capacity(shape.arity());
                for (index, child) in term.children().iter().enumerate() {
                    self.path.push(index);
                    members.push(self.walk_literal(child));
                    self.path.pop();
                }
                Skeleton::Shape { shape, members }
            }
            None => {
                self.const_paths.push(self.path.clone());
                self.const_vals.push(term.clone());
                Skeleton::Hole
            }
        }
    }
}

/// Compile `pattern`. Pure and deterministic.
pub fn analyze(pattern: &Pattern) -> Analysis {
    let mut walker = Walker::default();
    let skeleton = walker.walk(pattern);
    Analysis {
        skeleton,
        const_paths: walker.const_paths,
        const_vals: walker.const_vals,
        capture_paths: walker.capture_paths,
        assertion: Term::record(OBSERVE_LABEL, vec![pattern.to_term()]),
    }
}
