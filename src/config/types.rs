//! Declarations as they appear in `models.json` and `resources.json`.

use crate::resource::Operation;
use crate::schema::ModelDef;
use crate::service::validation::ValidationRule;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// How a nested resource reaches its parent: a relationship path, or a request-key resolver.
/// `"author"` or `{"field": "websites", "request_key": "website"}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParentLookupConfig {
    Path(String),
    RequestKey { field: String, request_key: String },
}

fn all_operations() -> Vec<Operation> {
    Operation::ALL.to_vec()
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub name: String,
    /// URL segment of the collection; defaults to the name.
    #[serde(default)]
    pub collection: Option<String>,
    pub model: String,
    #[serde(default)]
    pub parent_lookup: Option<ParentLookupConfig>,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
    #[serde(default = "all_operations")]
    pub operations: Vec<Operation>,
    /// Policy names resolved through the `PolicyRegistry`.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Static filter terms, path -> value.
    #[serde(default)]
    pub filter: BTreeMap<String, Value>,
    #[serde(default)]
    pub force_ancestor_field: Option<String>,
    #[serde(default)]
    pub validation: HashMap<String, ValidationRule>,
    /// Relationship field -> resource name.
    #[serde(default)]
    pub cross_links: BTreeMap<String, String>,
    #[serde(default)]
    pub children: Vec<ResourceConfig>,
}

impl ResourceConfig {
    pub fn collection(&self) -> &str {
        self.collection.as_deref().unwrap_or(&self.name)
    }
}

/// Everything needed to build an API without code.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FullConfig {
    pub models: Vec<ModelDef>,
    pub resources: Vec<ResourceConfig>,
}
