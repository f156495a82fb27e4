//! Persistence collaborator: filtering by relationship path, keyed lookups, and relation traversal.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use crate::error::{AppError, ConfigError};
use crate::schema::{Direction, ModelSchema};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

pub type Fields = serde_json::Map<String, Value>;

/// Default number of rows returned by a list.
pub const DEFAULT_PAGE_LIMIT: u32 = 100;
pub const MAX_PAGE_LIMIT: u32 = 1000;

/// One row of a model. Forward to-one relations are stored under the field name as the related key.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Record {
    pub model: String,
    pub id: Option<Value>,
    pub fields: Fields,
}

impl Record {
    /// A record that has not been persisted yet.
    pub fn unsaved(model: impl Into<String>, fields: Fields) -> Self {
        Record {
            model: model.into(),
            id: None,
            fields,
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FilterTerm {
    pub path: String,
    pub value: Value,
}

/// Conjunction of relationship-path terms, kept in the order they were added.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    pub terms: Vec<FilterTerm>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, path: impl Into<String>, value: Value) -> Self {
        self.push(path, value);
        self
    }

    pub fn push(&mut self, path: impl Into<String>, value: Value) {
        self.terms.push(FilterTerm {
            path: path.into(),
            value,
        });
    }

    pub fn extend(&mut self, other: &Filter) {
        self.terms.extend(other.terms.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub limit: u32,
    pub offset: u32,
}

impl Page {
    pub fn new(limit: Option<u32>, offset: Option<u32>, default_limit: u32) -> Self {
        Page {
            limit: limit.unwrap_or(default_limit).min(MAX_PAGE_LIMIT),
            offset: offset.unwrap_or(0),
        }
    }

    pub fn first() -> Self {
        Page { limit: 1, offset: 0 }
    }

    /// Every row, used for relation traversal.
    pub fn unbounded() -> Self {
        Page {
            limit: u32::MAX,
            offset: 0,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Page {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    fn schema(&self) -> &ModelSchema;

    /// Rows of `model` matching every term, ordered by primary key.
    async fn filter(&self, model: &str, filter: &Filter, page: Page) -> Result<Vec<Record>, AppError>;

    async fn get(&self, model: &str, id: &Value) -> Result<Option<Record>, AppError>;

    async fn insert(&self, model: &str, fields: Fields) -> Result<Record, AppError>;

    /// Merge `fields` into the row. Returns None when the row does not exist.
    async fn update(&self, model: &str, id: &Value, fields: Fields) -> Result<Option<Record>, AppError>;

    async fn delete(&self, model: &str, id: &Value) -> Result<bool, AppError>;

    /// Add a many-to-many link from `model.field` of row `from` to row `to`.
    async fn link(&self, model: &str, field: &str, from: &Value, to: &Value) -> Result<(), AppError>;

    async fn ping(&self) -> Result<(), AppError>;
}

/// Result of following one relation from a record.
#[derive(Clone, Debug, PartialEq)]
pub enum Related {
    One(Option<Record>),
    Many(Vec<Record>),
}

/// Follow `field` (forward field or reverse accessor) from `record`.
pub async fn related(store: &dyn Store, record: &Record, field: &str) -> Result<Related, AppError> {
    let relation = store
        .schema()
        .relation(&record.model, field)
        .ok_or_else(|| ConfigError::UnresolvableRelationship {
            model: record.model.clone(),
            path: field.to_string(),
        })?;

    if relation.direction == Direction::Forward && !relation.to_many {
        return match record.get(field) {
            Some(key) => Ok(Related::One(store.get(&relation.target, key).await?)),
            None => Ok(Related::One(None)),
        };
    }

    let Some(id) = &record.id else {
        return Ok(if relation.to_many {
            Related::Many(Vec::new())
        } else {
            Related::One(None)
        });
    };
    let filter = Filter::new().and(relation.reverse_name.clone(), id.clone());
    let rows = store.filter(&relation.target, &filter, Page::unbounded()).await?;
    Ok(if relation.to_many {
        Related::Many(rows)
    } else {
        Related::One(rows.into_iter().next())
    })
}

/// Loose equality for keys: numbers compare by value, everything else structurally.
pub(crate) fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => n.to_string() == *s,
        _ => a == b,
    }
}

/// Render a key the way it appears in a URL.
pub fn key_to_string(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
