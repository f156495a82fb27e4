//! Load declarations from a directory (`models.json`, `resources.json`) and turn them into a
//! model schema and a resource forest.

use crate::config::{validate, FullConfig, ParentLookupConfig, ResourceConfig};
use crate::error::ConfigError;
use crate::resource::{ParentLookup, ResourceNode, ResourceView};
use crate::schema::ModelSchema;
use crate::service::permission::PolicyRegistry;
use std::path::Path;

pub const MODELS_FILE: &str = "models.json";
pub const RESOURCES_FILE: &str = "resources.json";

/// Schema and forest ready for `NestedApi::new`.
#[derive(Debug)]
pub struct ResolvedConfig {
    pub schema: ModelSchema,
    pub forest: Vec<ResourceNode>,
}

pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let dir = dir.as_ref();
    let read = |name: &'static str| {
        let path = dir.join(name);
        async move {
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))
        }
    };
    let models = serde_json::from_str(&read(MODELS_FILE).await?)
        .map_err(|e| ConfigError::Load(format!("{}: {}", MODELS_FILE, e)))?;
    let resources = serde_json::from_str(&read(RESOURCES_FILE).await?)
        .map_err(|e| ConfigError::Load(format!("{}: {}", RESOURCES_FILE, e)))?;
    Ok(FullConfig { models, resources })
}

/// Validate, then build the schema and the forest. Policy names are looked up in `policies`.
pub fn resolve(config: &FullConfig, policies: &PolicyRegistry) -> Result<ResolvedConfig, ConfigError> {
    validate(config)?;
    let schema = ModelSchema::new(config.models.clone())?;
    let forest = config
        .resources
        .iter()
        .map(|r| build_node(r, policies))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ResolvedConfig { schema, forest })
}

fn build_node(config: &ResourceConfig, policies: &PolicyRegistry) -> Result<ResourceNode, ConfigError> {
    let mut view = ResourceView::new(config.model.clone()).operations(&config.operations);
    if let Some(fields) = &config.fields {
        view = view.fields(fields.iter().cloned());
    }
    for name in &config.permissions {
        view = view.permission(policies.get(name)?);
    }
    for (path, value) in &config.filter {
        view = view.filter(path.clone(), value.clone());
    }
    if let Some(field) = &config.force_ancestor_field {
        view = view.force_ancestor_field(field.clone());
    }
    for (field, rule) in &config.validation {
        view = view.validate(field.clone(), rule.clone());
    }

    let mut node = match &config.parent_lookup {
        None => ResourceNode::new(config.name.clone(), config.collection(), view),
        Some(ParentLookupConfig::Path(path)) => {
            ResourceNode::nested(config.name.clone(), config.collection(), view, ParentLookup::path(path.clone()))
        }
        Some(ParentLookupConfig::RequestKey { field, request_key }) => ResourceNode::nested(
            config.name.clone(),
            config.collection(),
            view,
            ParentLookup::request_key(field.clone(), request_key.clone()),
        ),
    };
    for (field, target) in &config.cross_links {
        node = node.cross_link(field.clone(), target.clone());
    }
    for child in &config.children {
        node = node.child(build_node(child, policies)?);
    }
    Ok(node)
}
