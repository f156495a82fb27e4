//! Name handling for resource declarations: normalization of resource names, identifier checks, and relationship-path splitting.

use crate::error::ConfigError;
use regex::Regex;

/// Separator between hops of a relationship path ("language__author").
pub const LOOKUP_SEP: &str = "__";

pub const LIST_SUFFIX: &str = "-list";
pub const DETAIL_SUFFIX: &str = "-detail";

const IDENTIFIER_PATTERN: &str = r"(?i)^[a-z_]\w*$";

/// Normalize a declared resource name: hyphens become underscores and the result must be a valid identifier.
/// e.g. "software-developer" -> "software_developer"; "2015developer" is rejected.
pub fn normalize_resource_name(name: &str) -> Result<String, ConfigError> {
    let formatted = name.replace('-', "_");
    let re = Regex::new(IDENTIFIER_PATTERN).map_err(|e| ConfigError::Validation(e.to_string()))?;
    if re.is_match(&formatted) {
        Ok(formatted)
    } else {
        Err(ConfigError::InvalidResourceName(name.to_string()))
    }
}

/// A collection must be a single literal URL segment.
pub fn check_collection(resource: &str, collection: &str) -> Result<(), ConfigError> {
    if collection.is_empty() || collection.contains(['/', ':', '*', '?', '#', '{', '}']) {
        return Err(ConfigError::Validation(format!(
            "resource '{}' has an invalid collection segment '{}'",
            resource, collection
        )));
    }
    Ok(())
}

/// Split a relationship path into hops. Accepts "__" and "." as separators.
/// e.g. "website__language" -> ["website", "language"], "language.author" -> ["language", "author"]
pub fn split_lookup(path: &str) -> Vec<&str> {
    path.split(LOOKUP_SEP)
        .flat_map(|part| part.split('.'))
        .filter(|hop| !hop.is_empty())
        .collect()
}

/// Join hops with the canonical separator.
pub fn join_lookup<S: AsRef<str>>(hops: &[S]) -> String {
    hops.iter().map(|h| h.as_ref()).collect::<Vec<_>>().join(LOOKUP_SEP)
}

/// Convert a model name to the lowercase form used for default accessor and column names.
/// e.g. "ProgrammingLanguage" -> "programminglanguage"
pub fn model_key(model: &str) -> String {
    model.to_lowercase()
}

/// Route name for a resource and view kind.
pub fn view_name(resource: &str, suffix: &str) -> String {
    format!("{}{}", resource, suffix)
}
