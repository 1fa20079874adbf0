//! CQL, the component query language.
//!
//! CQL is the text front end to [`engine_component::Filter`]:
//!
//! ```text
//! CONTAINS(Health) & !EXACT(Health, Attack)
//! ```
//!
//! `EXACT(..)` matches archetypes whose layout is exactly the listed set,
//! `CONTAINS(..)` those whose layout includes it. `!`, `&` and `|` combine
//! terms; `&` and `|` have no relative precedence and are applied strictly left
//! to right.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::CqlExpr;
pub use lexer::LexError;
pub use parser::ParseError;

use engine_component::{ComponentRegistry, ComponentTypeId, Filter};
use tracing::trace;

/// Errors from parsing or compiling a CQL expression.
#[derive(Debug, thiserror::Error)]
pub enum CqlError {
    #[error("CQL syntax error at column {0}")]
    Parse(#[from] ParseError),

    #[error("CQL references unknown component '{0}'")]
    UnknownComponent(String),
}

/// Parse `src` without resolving component names.
///
/// # Errors
///
/// Returns [`CqlError::Parse`] if `src` is not a well-formed expression.
pub fn parse(src: &str) -> Result<CqlExpr, CqlError> {
    Ok(parser::Parser::parse(src)?)
}

/// Parse `src` and resolve its component names through `registry`.
///
/// # Errors
///
/// Returns [`CqlError::Parse`] for malformed input and
/// [`CqlError::UnknownComponent`] for names not in `registry`.
pub fn compile(src: &str, registry: &ComponentRegistry) -> Result<Filter, CqlError> {
    let expr = parse(src)?;
    let filter = resolve(&expr, registry)?;
    trace!(query = src, %filter, "compiled CQL");
    Ok(filter)
}

/// Resolve an already-parsed expression through `registry`.
///
/// # Errors
///
/// Returns [`CqlError::UnknownComponent`] for names not in `registry`.
pub fn resolve(expr: &CqlExpr, registry: &ComponentRegistry) -> Result<Filter, CqlError> {
    Ok(match expr {
        CqlExpr::Exact(names) => Filter::Exact(resolve_names(names, registry)?),
        CqlExpr::Contains(names) => Filter::Contains(resolve_names(names, registry)?),
        CqlExpr::Not(inner) => !resolve(inner, registry)?,
        CqlExpr::And(a, b) => resolve(a, registry)?.and(resolve(b, registry)?),
        CqlExpr::Or(a, b) => resolve(a, registry)?.or(resolve(b, registry)?),
    })
}

fn resolve_names(
    names: &[String],
    registry: &ComponentRegistry,
) -> Result<Vec<ComponentTypeId>, CqlError> {
    names
        .iter()
        .map(|name| {
            registry
                .lookup(name)
                .ok_or_else(|| CqlError::UnknownComponent(name.clone()))
        })
        .collect()
}
