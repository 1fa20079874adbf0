//! Layout filters.
//!
//! A [`Filter`] is a predicate over an archetype's [`Layout`]. Filters are
//! built either with the builder methods here or by compiling a CQL string
//! (see the `engine_cql` crate); both produce the same tree.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};

use serde::{Deserialize, Serialize};

use crate::archetype::Layout;
use crate::component::ComponentTypeId;

/// A boolean predicate over layouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Filter {
    /// Matches every layout.
    All,
    /// Layout is set-equal to the listed components.
    Exact(Vec<ComponentTypeId>),
    /// Layout is a superset of the listed components.
    Contains(Vec<ComponentTypeId>),
    /// Negation.
    Not(Box<Filter>),
    /// Both sides match.
    And(Box<Filter>, Box<Filter>),
    /// Either side matches.
    Or(Box<Filter>, Box<Filter>),
}

impl Filter {
    /// `EXACT(types...)`.
    pub fn exact(types: impl IntoIterator<Item = ComponentTypeId>) -> Self {
        Self::Exact(types.into_iter().collect())
    }

    /// `CONTAINS(types...)`.
    pub fn contains(types: impl IntoIterator<Item = ComponentTypeId>) -> Self {
        Self::Contains(types.into_iter().collect())
    }

    /// `self & other`.
    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    /// `self | other`.
    #[must_use]
    pub fn or(self, other: Filter) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    /// Evaluate the predicate against a layout.
    #[must_use]
    pub fn matches(&self, layout: &Layout) -> bool {
        match self {
            Filter::All => true,
            Filter::Exact(types) => layout.is_exactly(types),
            Filter::Contains(types) => layout.contains_all(types),
            Filter::Not(inner) => !inner.matches(layout),
            Filter::And(a, b) => a.matches(layout) && b.matches(layout),
            Filter::Or(a, b) => a.matches(layout) || b.matches(layout),
        }
    }
}

impl Not for Filter {
    type Output = Filter;

    fn not(self) -> Filter {
        Filter::Not(Box::new(self))
    }
}

impl BitAnd for Filter {
    type Output = Filter;

    fn bitand(self, rhs: Filter) -> Filter {
        self.and(rhs)
    }
}

impl BitOr for Filter {
    type Output = Filter;

    fn bitor(self, rhs: Filter) -> Filter {
        self.or(rhs)
    }
}

/// Renders the fully parenthesised form, e.g. `((EXACT(0) & !CONTAINS(1)) | ALL)`.
impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::All => write!(f, "ALL"),
            Filter::Exact(types) => write_list(f, "EXACT", types),
            Filter::Contains(types) => write_list(f, "CONTAINS", types),
            Filter::Not(inner) => write!(f, "!{inner}"),
            Filter::And(a, b) => write!(f, "({a} & {b})"),
            Filter::Or(a, b) => write!(f, "({a} | {b})"),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, name: &str, types: &[ComponentTypeId]) -> fmt::Result {
    write!(f, "{name}(")?;
    for (i, t) in types.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{t}")?;
    }
    write!(f, ")")
}
