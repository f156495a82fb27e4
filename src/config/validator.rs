//! Config validation: references between declarations and URL-safe collection segments.

use crate::case::check_collection;
use crate::config::{FullConfig, ResourceConfig};
use crate::error::ConfigError;
use std::collections::HashSet;

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    if config.resources.is_empty() {
        return Err(ConfigError::Validation("at least one resource required".into()));
    }
    let models: HashSet<&str> = config.models.iter().map(|m| m.name.as_str()).collect();
    for resource in &config.resources {
        if resource.parent_lookup.is_some() {
            return Err(ConfigError::OrphanNestedResource(resource.name.clone()));
        }
        validate_resource(resource, &models)?;
    }
    Ok(())
}

fn validate_resource(resource: &ResourceConfig, models: &HashSet<&str>) -> Result<(), ConfigError> {
    if !models.contains(resource.model.as_str()) {
        return Err(ConfigError::UnknownModel {
            resource: resource.name.clone(),
            model: resource.model.clone(),
        });
    }
    check_collection(&resource.name, resource.collection())?;
    if resource.operations.is_empty() {
        return Err(ConfigError::Validation(format!("resource '{}' exposes no operations", resource.name)));
    }
    for child in &resource.children {
        validate_resource(child, models)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(resources: serde_json::Value) -> FullConfig {
        serde_json::from_value(json!({
            "models": [{"name": "Developer", "fields": [{"name": "name", "kind": "scalar"}]}],
            "resources": resources
        }))
        .unwrap()
    }

    #[test]
    fn accepts_a_plain_resource() {
        let c = config(json!([{"name": "developer", "collection": "developers", "model": "Developer"}]));
        assert!(validate(&c).is_ok());
        assert_eq!(c.resources[0].operations.len(), 6);
    }

    #[test]
    fn rejects_unknown_models_and_bad_segments() {
        let c = config(json!([{"name": "robot", "model": "Robot"}]));
        assert!(matches!(validate(&c), Err(ConfigError::UnknownModel { .. })));
        let c = config(json!([{"name": "developer", "collection": "a/b", "model": "Developer"}]));
        assert!(matches!(validate(&c), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn rejects_top_level_parent_lookup() {
        let c = config(json!([{"name": "developer", "model": "Developer", "parent_lookup": "author"}]));
        assert!(matches!(validate(&c), Err(ConfigError::OrphanNestedResource(_))));
    }
}
