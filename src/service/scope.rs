//! Query scoping: restrict a route's rows to those reachable from the ancestors bound in the URL.

use crate::case::LOOKUP_SEP;
use crate::error::{AppError, ConfigError};
use crate::routing::{FlattenedRoute, PathVars};
use crate::schema::ModelSchema;
use crate::store::Filter;

/// One term per ancestor, innermost first, each path extending the previous one.
/// Every ancestor must be bound.
pub fn scope(schema: &ModelSchema, route: &FlattenedRoute, vars: &PathVars) -> Result<Filter, AppError> {
    let mut filter = Filter::new();
    let mut path = String::new();
    for ancestor in route.ancestry.iter().rev() {
        let raw = vars.get(&ancestor.name).ok_or_else(|| ConfigError::MissingPathVariable {
            route: route.name.clone(),
            variable: ancestor.name.clone(),
        })?;
        if !path.is_empty() {
            path.push_str(LOOKUP_SEP);
        }
        path.push_str(ancestor.lookup.filter_path());
        filter.push(path.clone(), schema.parse_id(&ancestor.model, raw)?);
    }
    tracing::debug!(route = %route.name, filter = ?filter.terms, "scoped queryset");
    Ok(filter)
}
