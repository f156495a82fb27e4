//! Persistence metadata: models, their fields, and the relationship graph between them.
//! Resolves forward fields and reverse accessors so lookups like "language__author" can be walked from either end.

use crate::case::{model_key, split_lookup};
use crate::error::{AppError, ConfigError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Primary key type for parsing path ids.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PkType {
    #[default]
    Int,
    BigInt,
    Uuid,
    Text,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ModelDef {
    pub name: String,
    /// Table name; defaults to the lowercased model name.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub pk_type: PkType,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

fn default_primary_key() -> String {
    "id".into()
}

impl ModelDef {
    pub fn new(name: impl Into<String>) -> Self {
        ModelDef {
            name: name.into(),
            table: None,
            primary_key: default_primary_key(),
            pk_type: PkType::Int,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn table_name(&self) -> String {
        self.table.clone().unwrap_or_else(|| model_key(&self.name))
    }

    pub fn field_def(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(flatten)]
    pub kind: FieldKind,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldKind {
    Scalar {
        /// PostgreSQL column type; defaults to text.
        #[serde(default)]
        sql_type: Option<String>,
    },
    ForeignKey {
        to: String,
        #[serde(default)]
        related_name: Option<String>,
        #[serde(default)]
        column: Option<String>,
        #[serde(default)]
        nullable: bool,
    },
    OneToOne {
        to: String,
        #[serde(default)]
        related_name: Option<String>,
        #[serde(default)]
        column: Option<String>,
        #[serde(default)]
        nullable: bool,
    },
    ManyToMany {
        to: String,
        #[serde(default)]
        related_name: Option<String>,
        /// Link table; defaults to "<model>_<field>".
        #[serde(default)]
        through: Option<String>,
    },
}

impl FieldDef {
    pub fn scalar(name: impl Into<String>) -> Self {
        FieldDef {
            name: name.into(),
            kind: FieldKind::Scalar { sql_type: None },
        }
    }

    pub fn foreign_key(name: impl Into<String>, to: impl Into<String>, related_name: impl Into<String>) -> Self {
        FieldDef {
            name: name.into(),
            kind: FieldKind::ForeignKey {
                to: to.into(),
                related_name: Some(related_name.into()),
                column: None,
                nullable: false,
            },
        }
    }

    pub fn one_to_one(name: impl Into<String>, to: impl Into<String>, related_name: impl Into<String>) -> Self {
        FieldDef {
            name: name.into(),
            kind: FieldKind::OneToOne {
                to: to.into(),
                related_name: Some(related_name.into()),
                column: None,
                nullable: true,
            },
        }
    }

    pub fn many_to_many(name: impl Into<String>, to: impl Into<String>, related_name: impl Into<String>) -> Self {
        FieldDef {
            name: name.into(),
            kind: FieldKind::ManyToMany {
                to: to.into(),
                related_name: Some(related_name.into()),
                through: None,
            },
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self.kind, FieldKind::Scalar { .. })
    }

    /// Column holding the related key for forward to-one relations ("author" -> "author_id").
    pub fn column(&self) -> Option<String> {
        match &self.kind {
            FieldKind::ForeignKey { column, .. } | FieldKind::OneToOne { column, .. } => {
                Some(column.clone().unwrap_or_else(|| format!("{}_id", self.name)))
            }
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationKind {
    ForeignKey,
    OneToOne,
    ManyToMany,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// How rows of `source` and `target` are joined.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Join {
    /// source.column = target.pk
    Local { column: String },
    /// target.column = source.pk
    Remote { column: String },
    /// link.source_column = source.pk AND link.target_column = target.pk
    Link {
        table: String,
        source_column: String,
        target_column: String,
    },
}

/// One hop of the relationship graph, seen from `source`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relation {
    pub field: String,
    pub source: String,
    pub target: String,
    pub kind: RelationKind,
    pub direction: Direction,
    /// Accessor on `target` that leads back to `source`.
    pub reverse_name: String,
    pub to_many: bool,
    pub join: Join,
}

/// Reverse accessor registered on a target model: (source model, source field).
type ReverseKey = (String, String);

#[derive(Clone, Debug, Default)]
pub struct ModelSchema {
    models: Vec<ModelDef>,
    by_name: HashMap<String, usize>,
    reverse: HashMap<ReverseKey, ReverseKey>,
}

impl ModelSchema {
    pub fn new(models: Vec<ModelDef>) -> Result<Self, ConfigError> {
        let by_name: HashMap<String, usize> = models
            .iter()
            .enumerate()
            .map(|(i, m)| (m.name.clone(), i))
            .collect();
        if by_name.len() != models.len() {
            return Err(ConfigError::Validation("duplicate model name".into()));
        }

        let mut reverse = HashMap::new();
        for model in &models {
            for field in &model.fields {
                let Some(to) = related_model(&field.kind) else { continue };
                let Some(target) = by_name.get(to).map(|i| &models[*i]) else {
                    return Err(ConfigError::Validation(format!(
                        "field '{}.{}' points to unknown model '{}'",
                        model.name, field.name, to
                    )));
                };
                let accessor = reverse_accessor(&model.name, field);
                if target.field_def(&accessor).is_some() {
                    return Err(ConfigError::Validation(format!(
                        "reverse accessor '{}' of '{}.{}' clashes with a field of '{}'",
                        accessor, model.name, field.name, target.name
                    )));
                }
                let key = (target.name.clone(), accessor.clone());
                if reverse.insert(key, (model.name.clone(), field.name.clone())).is_some() {
                    return Err(ConfigError::Validation(format!(
                        "reverse accessor '{}' is declared twice on '{}'",
                        accessor, target.name
                    )));
                }
            }
        }

        Ok(ModelSchema {
            models,
            by_name,
            reverse,
        })
    }

    pub fn models(&self) -> &[ModelDef] {
        &self.models
    }

    pub fn model(&self, name: &str) -> Option<&ModelDef> {
        self.by_name.get(name).map(|i| &self.models[*i])
    }

    pub fn require_model(&self, name: &str) -> Result<&ModelDef, ConfigError> {
        self.model(name).ok_or_else(|| ConfigError::MissingModel(name.to_string()))
    }

    /// Every relation reachable from `model`: its relational fields, then reverse accessors pointing at it.
    pub fn relations_of(&self, model: &str) -> Vec<Relation> {
        let Some(def) = self.model(model) else { return Vec::new() };
        let mut out: Vec<Relation> = def
            .fields
            .iter()
            .filter_map(|f| self.forward_relation(def, f))
            .collect();
        let mut accessors: Vec<&String> = self
            .reverse
            .keys()
            .filter(|(target, _)| target == model)
            .map(|(_, accessor)| accessor)
            .collect();
        accessors.sort();
        out.extend(accessors.into_iter().filter_map(|a| self.relation(model, a)));
        out
    }

    /// True when `field` is a plain column of `model`.
    pub fn is_scalar(&self, model: &str, field: &str) -> bool {
        self.model(model)
            .and_then(|m| m.field_def(field))
            .map(FieldDef::is_scalar)
            .unwrap_or(false)
    }

    /// Resolve one hop: a forward relational field of `model` or a reverse accessor pointing at it.
    pub fn relation(&self, model: &str, field: &str) -> Option<Relation> {
        let source = self.model(model)?;
        if let Some(def) = source.field_def(field) {
            return self.forward_relation(source, def);
        }
        let (origin_model, origin_field) = self.reverse.get(&(model.to_string(), field.to_string()))?;
        let origin = self.model(origin_model)?;
        let origin_def = origin.field_def(origin_field)?;
        let forward = self.forward_relation(origin, origin_def)?;
        let join = match forward.join {
            Join::Local { column } => Join::Remote { column },
            Join::Remote { column } => Join::Local { column },
            Join::Link {
                table,
                source_column,
                target_column,
            } => Join::Link {
                table,
                source_column: target_column,
                target_column: source_column,
            },
        };
        Some(Relation {
            field: field.to_string(),
            source: model.to_string(),
            target: origin.name.clone(),
            kind: forward.kind,
            direction: Direction::Reverse,
            reverse_name: origin_field.clone(),
            to_many: forward.kind != RelationKind::OneToOne,
            join,
        })
    }

    fn forward_relation(&self, source: &ModelDef, def: &FieldDef) -> Option<Relation> {
        let (kind, to) = match &def.kind {
            FieldKind::Scalar { .. } => return None,
            FieldKind::ForeignKey { to, .. } => (RelationKind::ForeignKey, to),
            FieldKind::OneToOne { to, .. } => (RelationKind::OneToOne, to),
            FieldKind::ManyToMany { to, .. } => (RelationKind::ManyToMany, to),
        };
        let join = match &def.kind {
            FieldKind::ManyToMany { through, .. } => {
                let (source_column, target_column) = link_columns(&source.name, to);
                Join::Link {
                    table: through
                        .clone()
                        .unwrap_or_else(|| format!("{}_{}", model_key(&source.name), def.name)),
                    source_column,
                    target_column,
                }
            }
            _ => Join::Local {
                column: def.column()?,
            },
        };
        Some(Relation {
            field: def.name.clone(),
            source: source.name.clone(),
            target: to.clone(),
            kind,
            direction: Direction::Forward,
            reverse_name: reverse_accessor(&source.name, def),
            to_many: kind == RelationKind::ManyToMany,
            join,
        })
    }

    /// Resolve every hop of a relationship path starting at `model`.
    pub fn resolve_path(&self, model: &str, path: &str) -> Result<Vec<Relation>, ConfigError> {
        let mut current = model.to_string();
        let mut hops = Vec::new();
        for hop in split_lookup(path) {
            let relation = self
                .relation(&current, hop)
                .ok_or_else(|| ConfigError::UnresolvableRelationship {
                    model: current.clone(),
                    path: path.to_string(),
                })?;
            current = relation.target.clone();
            hops.push(relation);
        }
        if hops.is_empty() {
            return Err(ConfigError::UnresolvableRelationship {
                model: model.to_string(),
                path: path.to_string(),
            });
        }
        Ok(hops)
    }

    /// Name of the relationship leading back along `path`, taken from its last hop:
    /// a forward reference yields its declared reverse accessor, a reverse accessor yields itself.
    pub fn reverse_name_of(&self, model: &str, path: &str) -> Result<String, ConfigError> {
        let hops = split_lookup(path);
        let Some((first, rest)) = hops.split_first() else {
            return Err(ConfigError::UnresolvableRelationship {
                model: model.to_string(),
                path: path.to_string(),
            });
        };
        let relation = self
            .relation(model, first)
            .ok_or_else(|| ConfigError::UnresolvableRelationship {
                model: model.to_string(),
                path: path.to_string(),
            })?;
        if rest.is_empty() {
            return Ok(match relation.direction {
                Direction::Forward => relation.reverse_name,
                Direction::Reverse => relation.field,
            });
        }
        self.reverse_name_of(&relation.target, &rest.join(crate::case::LOOKUP_SEP))
    }

    /// Convert a raw path segment to the key type of `model`. Unparsable ids address nothing.
    pub fn parse_id(&self, model: &str, raw: &str) -> Result<Value, AppError> {
        let pk_type = self.require_model(model)?.pk_type.clone();
        Ok(match pk_type {
            PkType::Uuid => {
                let u = uuid::Uuid::parse_str(raw).map_err(|_| AppError::NotFound(raw.to_string()))?;
                Value::String(u.to_string())
            }
            PkType::BigInt | PkType::Int => {
                let n: i64 = raw.parse().map_err(|_| AppError::NotFound(raw.to_string()))?;
                Value::Number(n.into())
            }
            PkType::Text => Value::String(raw.to_string()),
        })
    }
}

fn related_model(kind: &FieldKind) -> Option<&String> {
    match kind {
        FieldKind::Scalar { .. } => None,
        FieldKind::ForeignKey { to, .. } | FieldKind::OneToOne { to, .. } | FieldKind::ManyToMany { to, .. } => Some(to),
    }
}

/// Declared reverse accessor, or the conventional default ("<model>_set"; "<model>" for one-to-one).
fn reverse_accessor(model: &str, field: &FieldDef) -> String {
    match &field.kind {
        FieldKind::Scalar { .. } => String::new(),
        FieldKind::OneToOne { related_name, .. } => related_name.clone().unwrap_or_else(|| model_key(model)),
        FieldKind::ForeignKey { related_name, .. } | FieldKind::ManyToMany { related_name, .. } => {
            related_name.clone().unwrap_or_else(|| format!("{}_set", model_key(model)))
        }
    }
}

fn link_columns(source: &str, target: &str) -> (String, String) {
    let (s, t) = (model_key(source), model_key(target));
    if s == t {
        (format!("from_{}_id", s), format!("to_{}_id", t))
    } else {
        (format!("{}_id", s), format!("{}_id", t))
    }
}
