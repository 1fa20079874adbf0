/// Unresolved CQL syntax tree.
use std::fmt;

/// A parsed CQL expression. Component names are kept as written; resolving
/// them against a registry happens in [`crate::compile`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CqlExpr {
    Exact(Vec<String>),
    Contains(Vec<String>),
    Not(Box<CqlExpr>),
    And(Box<CqlExpr>, Box<CqlExpr>),
    Or(Box<CqlExpr>, Box<CqlExpr>),
}

impl CqlExpr {
    /// Every component name referenced, in source order, duplicates included.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            CqlExpr::Exact(names) | CqlExpr::Contains(names) => {
                out.extend(names.iter().map(String::as_str));
            }
            CqlExpr::Not(inner) => inner.collect_names(out),
            CqlExpr::And(a, b) | CqlExpr::Or(a, b) => {
                a.collect_names(out);
                b.collect_names(out);
            }
        }
    }
}

impl fmt::Display for CqlExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CqlExpr::Exact(names) => write!(f, "EXACT({})", names.join(", ")),
            CqlExpr::Contains(names) => write!(f, "CONTAINS({})", names.join(", ")),
            CqlExpr::Not(inner) => write!(f, "!{inner}"),
            CqlExpr::And(a, b) => write!(f, "({a} & {b})"),
            CqlExpr::Or(a, b) => write!(f, "({a} | {b})"),
        }
    }
}
