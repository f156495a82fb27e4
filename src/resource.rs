//! Declaration model: resource tree nodes, their views, and parent lookups.

use crate::error::{AppError, ConfigError};
use crate::schema::{ModelSchema, RelationKind};
use crate::service::permission::Permission;
use crate::service::validation::ValidationRule;
use crate::service::RequestContext;
use crate::store::{Filter, Record, Store};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

/// Operations a resource can expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    List,
    Create,
    Retrieve,
    Update,
    PartialUpdate,
    Destroy,
}

impl Operation {
    pub const ALL: [Operation; 6] = [
        Operation::List,
        Operation::Create,
        Operation::Retrieve,
        Operation::Update,
        Operation::PartialUpdate,
        Operation::Destroy,
    ];
}

/// What a single request does. `Head` is the existence and permission check on a detail route.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    List,
    Create,
    Retrieve,
    Head,
    Update,
    PartialUpdate,
    Destroy,
}

impl Action {
    pub fn operation(self) -> Operation {
        match self {
            Action::List => Operation::List,
            Action::Create => Operation::Create,
            Action::Retrieve | Action::Head => Operation::Retrieve,
            Action::Update => Operation::Update,
            Action::PartialUpdate => Operation::PartialUpdate,
            Action::Destroy => Operation::Destroy,
        }
    }

    pub fn is_safe(self) -> bool {
        matches!(self, Action::List | Action::Retrieve | Action::Head)
    }
}

/// The handler half of a resource: which model it serves and how.
#[derive(Clone, Debug)]
pub struct ResourceView {
    pub model: String,
    /// Exposed fields; None exposes every field of the model.
    pub fields: Option<Vec<String>>,
    pub operations: Vec<Operation>,
    pub permissions: Vec<Arc<dyn Permission>>,
    /// Static filter applied before scoping, e.g. to hide rows from every caller.
    pub base_filter: Filter,
    /// Relational field whose value is always the ancestor bound in the URL.
    pub forced_ancestor_field: Option<String>,
    pub validation: HashMap<String, ValidationRule>,
}

impl ResourceView {
    pub fn new(model: impl Into<String>) -> Self {
        ResourceView {
            model: model.into(),
            fields: None,
            operations: Operation::ALL.to_vec(),
            permissions: Vec::new(),
            base_filter: Filter::new(),
            forced_ancestor_field: None,
            validation: HashMap::new(),
        }
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn operations(mut self, operations: &[Operation]) -> Self {
        self.operations = operations.to_vec();
        self
    }

    pub fn permission(mut self, permission: Arc<dyn Permission>) -> Self {
        self.permissions.push(permission);
        self
    }

    pub fn filter(mut self, path: impl Into<String>, value: Value) -> Self {
        self.base_filter.push(path, value);
        self
    }

    pub fn force_ancestor_field(mut self, field: impl Into<String>) -> Self {
        self.forced_ancestor_field = Some(field.into());
        self
    }

    pub fn validate(mut self, field: impl Into<String>, rule: ValidationRule) -> Self {
        self.validation.insert(field.into(), rule);
        self
    }

    pub fn allows(&self, operation: Operation) -> bool {
        self.operations.contains(&operation)
    }
}

/// Resolves a parent object when no plain relationship path reaches it.
#[async_trait]
pub trait ParentResolver: Send + Sync + fmt::Debug {
    /// Relationship field on the child model used to scope queries to the parent.
    fn field(&self) -> &str;

    /// Reject declarations this resolver cannot serve. Called once when routes are compiled.
    fn check(&self, _schema: &ModelSchema, _model: &str) -> Result<(), ConfigError> {
        Ok(())
    }

    async fn resolve(&self, current: &Record, ctx: &RequestContext, store: &dyn Store) -> Result<Record, AppError>;
}

/// Parent of a many-to-many child, taken from a URL variable of the current request.
/// The child has many parents, so only the request knows which one is meant.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestKeyLookup {
    pub field: String,
    pub request_key: String,
}

impl RequestKeyLookup {
    pub fn new(field: impl Into<String>, request_key: impl Into<String>) -> Self {
        RequestKeyLookup {
            field: field.into(),
            request_key: request_key.into(),
        }
    }

    fn parent_model(&self, schema: &ModelSchema, model: &str) -> Result<String, ConfigError> {
        match schema.relation(model, &self.field) {
            Some(r) if r.kind == RelationKind::ManyToMany => Ok(r.target),
            Some(_) => Err(ConfigError::UnsupportedParentLookup {
                field: self.field.clone(),
                reason: "request-key lookups require a many-to-many relation".into(),
            }),
            None => Err(ConfigError::UnresolvableRelationship {
                model: model.to_string(),
                path: self.field.clone(),
            }),
        }
    }
}

#[async_trait]
impl ParentResolver for RequestKeyLookup {
    fn field(&self) -> &str {
        &self.field
    }

    fn check(&self, schema: &ModelSchema, model: &str) -> Result<(), ConfigError> {
        self.parent_model(schema, model).map(|_| ())
    }

    async fn resolve(&self, current: &Record, ctx: &RequestContext, store: &dyn Store) -> Result<Record, AppError> {
        let raw = ctx
            .path_vars
            .get(&self.request_key)
            .ok_or_else(|| ConfigError::MissingRequestKey(self.request_key.clone()))?;
        let parent_model = self.parent_model(store.schema(), &current.model)?;
        let id = store.schema().parse_id(&parent_model, raw)?;
        store
            .get(&parent_model, &id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("{} {}", parent_model, raw)))
    }
}

/// How a nested resource reaches its parent.
#[derive(Clone, Debug)]
pub enum ParentLookup {
    /// Relationship path from the child model, e.g. "author" or "language__author".
    Path(String),
    Resolver(Arc<dyn ParentResolver>),
}

impl ParentLookup {
    pub fn path(path: impl Into<String>) -> Self {
        ParentLookup::Path(path.into())
    }

    pub fn request_key(field: impl Into<String>, request_key: impl Into<String>) -> Self {
        ParentLookup::Resolver(Arc::new(RequestKeyLookup::new(field, request_key)))
    }

    /// Relationship path used to scope the child's queries.
    pub fn filter_path(&self) -> &str {
        match self {
            ParentLookup::Path(p) => p,
            ParentLookup::Resolver(r) => r.field(),
        }
    }
}

/// One declared resource and its sub-resources.
#[derive(Clone, Debug)]
pub struct ResourceNode {
    pub name: String,
    pub collection: String,
    pub view: Arc<ResourceView>,
    /// Present on nested resources only.
    pub parent_lookup: Option<ParentLookup>,
    pub children: Vec<ResourceNode>,
    /// Relationship field -> name of a resource elsewhere in the forest.
    pub cross_links: BTreeMap<String, String>,
}

impl ResourceNode {
    pub fn new(name: impl Into<String>, collection: impl Into<String>, view: ResourceView) -> Self {
        ResourceNode {
            name: name.into(),
            collection: collection.into(),
            view: Arc::new(view),
            parent_lookup: None,
            children: Vec::new(),
            cross_links: BTreeMap::new(),
        }
    }

    pub fn nested(
        name: impl Into<String>,
        collection: impl Into<String>,
        view: ResourceView,
        parent_lookup: ParentLookup,
    ) -> Self {
        ResourceNode {
            parent_lookup: Some(parent_lookup),
            ..ResourceNode::new(name, collection, view)
        }
    }

    pub fn child(mut self, child: ResourceNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn cross_link(mut self, field: impl Into<String>, target: impl Into<String>) -> Self {
        self.cross_links.insert(field.into(), target.into());
        self
    }

    pub fn is_nested(&self) -> bool {
        self.parent_lookup.is_some()
    }
}
