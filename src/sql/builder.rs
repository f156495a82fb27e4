//! Builds parameterized SELECT, INSERT, UPDATE, DELETE for a model.
//! Relationship-path filters compile to nested `IN (SELECT ...)` sub-selects, one per hop.

use crate::case::split_lookup;
use crate::error::ConfigError;
use crate::schema::{FieldKind, Join, ModelDef, ModelSchema, PkType, Relation};
use crate::store::{Fields, Filter, Page};
use serde_json::Value;

/// Quote identifier for PostgreSQL (safe: only from the schema).
pub fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub fn qualified_table(db_schema: &str, table: &str) -> String {
    format!("{}.{}", quoted(db_schema), quoted(table))
}

#[derive(Debug, Default)]
pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        Self::default()
    }

    /// Push a value and return its placeholder with a cast ("$2::bigint").
    fn placeholder(&mut self, v: Value, sql_type: &str) -> String {
        self.params.push(v);
        format!("${}::{}", self.params.len(), sql_type)
    }
}

pub fn pk_sql_type(pk: &PkType) -> &'static str {
    match pk {
        PkType::Int => "integer",
        PkType::BigInt => "bigint",
        PkType::Uuid => "uuid",
        PkType::Text => "text",
    }
}

/// Column type of a stored field; relation columns take the key type of their target.
fn field_sql_type(schema: &ModelSchema, def: &ModelDef, field: &str) -> Result<String, ConfigError> {
    if field == def.primary_key {
        return Ok(pk_sql_type(&def.pk_type).to_string());
    }
    let fd = def.field_def(field).ok_or_else(|| ConfigError::UnknownField {
        model: def.name.clone(),
        field: field.to_string(),
    })?;
    Ok(match &fd.kind {
        FieldKind::Scalar { sql_type } => sql_type.clone().unwrap_or_else(|| "text".into()),
        FieldKind::ForeignKey { to, .. } | FieldKind::OneToOne { to, .. } => {
            pk_sql_type(&schema.require_model(to)?.pk_type).to_string()
        }
        FieldKind::ManyToMany { .. } => {
            return Err(ConfigError::UnknownField {
                model: def.name.clone(),
                field: field.to_string(),
            })
        }
    })
}

/// Primary key, scalar columns, and forward to-one columns aliased to their field names.
fn select_column_list(def: &ModelDef) -> String {
    let mut cols = vec![quoted(&def.primary_key)];
    for f in &def.fields {
        match &f.kind {
            FieldKind::Scalar { sql_type } => {
                let q = quoted(&f.name);
                if sql_type.as_deref() == Some("numeric") {
                    cols.push(format!("{}::text AS {}", q, q));
                } else {
                    cols.push(q);
                }
            }
            FieldKind::ForeignKey { .. } | FieldKind::OneToOne { .. } => {
                if let Some(col) = f.column() {
                    cols.push(format!("{} AS {}", quoted(&col), quoted(&f.name)));
                }
            }
            FieldKind::ManyToMany { .. } => {}
        }
    }
    cols.join(", ")
}

/// Physical column for a storable field ("author" -> "author_id"); None for many-to-many.
fn storage_column(def: &ModelDef, field: &str) -> Option<String> {
    let fd = def.field_def(field)?;
    match fd.kind {
        FieldKind::Scalar { .. } => Some(fd.name.clone()),
        FieldKind::ForeignKey { .. } | FieldKind::OneToOne { .. } => fd.column(),
        FieldKind::ManyToMany { .. } => None,
    }
}

struct PathCompiler<'a> {
    schema: &'a ModelSchema,
    db_schema: &'a str,
}

impl PathCompiler<'_> {
    fn table(&self, def: &ModelDef) -> String {
        qualified_table(self.db_schema, &def.table_name())
    }

    /// Predicate over the columns of `def` for one term.
    fn predicate(&self, q: &mut QueryBuf, def: &ModelDef, hops: &[&str], value: &Value) -> Result<String, ConfigError> {
        let Some((hop, rest)) = hops.split_first() else {
            return Err(ConfigError::UnresolvableRelationship {
                model: def.name.clone(),
                path: String::new(),
            });
        };
        let Some(relation) = self.schema.relation(&def.name, hop) else {
            if !rest.is_empty() {
                return Err(ConfigError::UnresolvableRelationship {
                    model: def.name.clone(),
                    path: hops.join("__"),
                });
            }
            let col = if *hop == def.primary_key {
                def.primary_key.clone()
            } else {
                storage_column(def, hop).ok_or_else(|| ConfigError::UnknownField {
                    model: def.name.clone(),
                    field: hop.to_string(),
                })?
            };
            if value.is_null() {
                return Ok(format!("{} IS NULL", quoted(&col)));
            }
            let ty = field_sql_type(self.schema, def, hop)?;
            return Ok(format!("{} = {}", quoted(&col), q.placeholder(value.clone(), &ty)));
        };
        self.hop(q, def, &relation, rest, value)
    }

    fn hop(&self, q: &mut QueryBuf, def: &ModelDef, relation: &Relation, rest: &[&str], value: &Value) -> Result<String, ConfigError> {
        let target = self.schema.require_model(&relation.target)?;
        let target_pk = quoted(&target.primary_key);
        let own_pk = quoted(&def.primary_key);

        if let (Join::Local { column }, true) = (&relation.join, rest.is_empty()) {
            if value.is_null() {
                return Ok(format!("{} IS NULL", quoted(column)));
            }
            let ph = q.placeholder(value.clone(), pk_sql_type(&target.pk_type));
            return Ok(format!("{} = {}", quoted(column), ph));
        }

        let inner = if rest.is_empty() {
            let ph = q.placeholder(value.clone(), pk_sql_type(&target.pk_type));
            format!("{} = {}", target_pk, ph)
        } else {
            self.predicate(q, target, rest, value)?
        };
        let target_table = self.table(target);
        Ok(match &relation.join {
            Join::Local { column } => format!(
                "{} IN (SELECT {} FROM {} WHERE {})",
                quoted(column),
                target_pk,
                target_table,
                inner
            ),
            Join::Remote { column } => format!(
                "{} IN (SELECT {} FROM {} WHERE {})",
                own_pk,
                quoted(column),
                target_table,
                inner
            ),
            Join::Link {
                table,
                source_column,
                target_column,
            } => format!(
                "{} IN (SELECT {} FROM {} WHERE {} IN (SELECT {} FROM {} WHERE {}))",
                own_pk,
                quoted(source_column),
                qualified_table(self.db_schema, table),
                quoted(target_column),
                target_pk,
                target_table,
                inner
            ),
        })
    }
}

/// SELECT rows matching every filter term, ORDER BY pk, with LIMIT/OFFSET.
pub fn select_filtered(
    schema: &ModelSchema,
    db_schema: &str,
    model: &str,
    filter: &Filter,
    page: Page,
) -> Result<QueryBuf, ConfigError> {
    let def = schema.require_model(model)?;
    let compiler = PathCompiler { schema, db_schema };
    let mut q = QueryBuf::new();
    let mut where_parts = Vec::new();
    for term in &filter.terms {
        let hops = split_lookup(&term.path);
        where_parts.push(compiler.predicate(&mut q, def, &hops, &term.value)?);
    }
    let where_clause = if where_parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", where_parts.join(" AND "))
    };
    let limit_clause = if page.limit == u32::MAX {
        String::new()
    } else {
        format!(" LIMIT {}", page.limit)
    };
    let offset_clause = if page.offset > 0 {
        format!(" OFFSET {}", page.offset)
    } else {
        String::new()
    };
    q.sql = format!(
        "SELECT {} FROM {}{} ORDER BY {}{}{}",
        select_column_list(def),
        compiler.table(def),
        where_clause,
        quoted(&def.primary_key),
        limit_clause,
        offset_clause
    );
    Ok(q)
}

pub fn select_by_id(schema: &ModelSchema, db_schema: &str, model: &str, id: &Value) -> Result<QueryBuf, ConfigError> {
    let def = schema.require_model(model)?;
    let mut q = QueryBuf::new();
    let ph = q.placeholder(id.clone(), pk_sql_type(&def.pk_type));
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = {}",
        select_column_list(def),
        qualified_table(db_schema, &def.table_name()),
        quoted(&def.primary_key),
        ph
    );
    Ok(q)
}

/// INSERT storable fields; the key is included only when provided.
pub fn insert(schema: &ModelSchema, db_schema: &str, model: &str, fields: &Fields) -> Result<QueryBuf, ConfigError> {
    let def = schema.require_model(model)?;
    let mut q = QueryBuf::new();
    let mut cols = Vec::new();
    let mut placeholders = Vec::new();
    if let Some(id) = fields.get(&def.primary_key).filter(|v| !v.is_null()) {
        cols.push(quoted(&def.primary_key));
        placeholders.push(q.placeholder(id.clone(), pk_sql_type(&def.pk_type)));
    }
    for f in &def.fields {
        let Some(v) = fields.get(&f.name) else { continue };
        let Some(col) = storage_column(def, &f.name) else { continue };
        let ty = field_sql_type(schema, def, &f.name)?;
        cols.push(quoted(&col));
        placeholders.push(q.placeholder(v.clone(), &ty));
    }
    let table = qualified_table(db_schema, &def.table_name());
    q.sql = if cols.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES RETURNING {}", table, select_column_list(def))
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
            table,
            cols.join(", "),
            placeholders.join(", "),
            select_column_list(def)
        )
    };
    Ok(q)
}

/// UPDATE by id: SET only storable fields present in `fields`.
pub fn update(
    schema: &ModelSchema,
    db_schema: &str,
    model: &str,
    id: &Value,
    fields: &Fields,
) -> Result<QueryBuf, ConfigError> {
    let def = schema.require_model(model)?;
    let mut q = QueryBuf::new();
    let mut sets = Vec::new();
    for f in &def.fields {
        let Some(v) = fields.get(&f.name) else { continue };
        let Some(col) = storage_column(def, &f.name) else { continue };
        let ty = field_sql_type(schema, def, &f.name)?;
        let ph = q.placeholder(v.clone(), &ty);
        sets.push(format!("{} = {}", quoted(&col), ph));
    }
    if sets.is_empty() {
        return select_by_id(schema, db_schema, model, id);
    }
    let id_ph = q.placeholder(id.clone(), pk_sql_type(&def.pk_type));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = {} RETURNING {}",
        qualified_table(db_schema, &def.table_name()),
        sets.join(", "),
        quoted(&def.primary_key),
        id_ph,
        select_column_list(def)
    );
    Ok(q)
}

pub fn delete(schema: &ModelSchema, db_schema: &str, model: &str, id: &Value) -> Result<QueryBuf, ConfigError> {
    let def = schema.require_model(model)?;
    let mut q = QueryBuf::new();
    let ph = q.placeholder(id.clone(), pk_sql_type(&def.pk_type));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = {} RETURNING {}",
        qualified_table(db_schema, &def.table_name()),
        quoted(&def.primary_key),
        ph,
        quoted(&def.primary_key)
    );
    Ok(q)
}

/// INSERT one many-to-many link row; `from` is the row owning `relation.field`.
pub fn link(
    schema: &ModelSchema,
    db_schema: &str,
    relation: &Relation,
    from: &Value,
    to: &Value,
) -> Result<QueryBuf, ConfigError> {
    let Join::Link {
        table,
        source_column,
        target_column,
    } = &relation.join
    else {
        return Err(ConfigError::UnsupportedParentLookup {
            field: relation.field.clone(),
            reason: "not a many-to-many relation".into(),
        });
    };
    let source = schema.require_model(&relation.source)?;
    let target = schema.require_model(&relation.target)?;
    let mut q = QueryBuf::new();
    let a = q.placeholder(from.clone(), pk_sql_type(&source.pk_type));
    let b = q.placeholder(to.clone(), pk_sql_type(&target.pk_type));
    q.sql = format!(
        "INSERT INTO {} ({}, {}) VALUES ({}, {}) ON CONFLICT DO NOTHING",
        qualified_table(db_schema, table),
        quoted(source_column),
        quoted(target_column),
        a,
        b
    );
    Ok(q)
}
