//! In-process store backed by `RwLock`ed tables. Used by tests and the demo server.

use super::{value_eq, Fields, Filter, Page, Record, Store};
use crate::case::split_lookup;
use crate::error::{AppError, ConfigError};
use crate::schema::{Direction, FieldKind, Join, ModelDef, ModelSchema, PkType, Relation, RelationKind};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct Tables {
    rows: HashMap<String, Vec<Record>>,
    next_id: HashMap<String, i64>,
    /// Link table name -> (forward source key, forward target key).
    links: HashMap<String, Vec<(Value, Value)>>,
}

#[derive(Debug)]
pub struct MemoryStore {
    schema: ModelSchema,
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new(schema: ModelSchema) -> Self {
        MemoryStore {
            schema,
            tables: RwLock::new(Tables::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>, AppError> {
        self.tables
            .read()
            .map_err(|_| AppError::Internal("memory store lock poisoned".into()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>, AppError> {
        self.tables
            .write()
            .map_err(|_| AppError::Internal("memory store lock poisoned".into()))
    }

    fn matches(&self, t: &Tables, record: &Record, hops: &[&str], value: &Value) -> bool {
        let Some((hop, rest)) = hops.split_first() else { return false };
        let Some(def) = self.schema.model(&record.model) else { return false };
        if *hop == def.primary_key {
            return rest.is_empty() && record.id.as_ref().map_or(false, |id| value_eq(id, value));
        }
        let Some(relation) = self.schema.relation(&record.model, hop) else {
            return rest.is_empty() && record.get(hop).map_or(value.is_null(), |v| value_eq(v, value));
        };
        if rest.is_empty() && relation.direction == Direction::Forward && !relation.to_many {
            return record.get(hop).map_or(value.is_null(), |k| value_eq(k, value));
        }
        let related = self.traverse(t, record, &relation);
        if rest.is_empty() {
            related
                .iter()
                .any(|r| r.id.as_ref().map_or(false, |id| value_eq(id, value)))
        } else {
            related.iter().any(|r| self.matches(t, r, rest, value))
        }
    }

    fn traverse<'t>(&self, t: &'t Tables, record: &Record, relation: &Relation) -> Vec<&'t Record> {
        let rows = t.rows.get(&relation.target).map(Vec::as_slice).unwrap_or(&[]);
        let same_id = |r: &&Record, key: &Value| r.id.as_ref().map_or(false, |id| value_eq(id, key));
        match &relation.join {
            Join::Local { .. } => match record.get(&relation.field) {
                Some(key) => rows.iter().filter(|r| same_id(r, key)).collect(),
                None => Vec::new(),
            },
            Join::Remote { .. } => {
                let Some(id) = &record.id else { return Vec::new() };
                rows.iter()
                    .filter(|r| r.get(&relation.reverse_name).map_or(false, |k| value_eq(k, id)))
                    .collect()
            }
            Join::Link { table, .. } => {
                let Some(id) = &record.id else { return Vec::new() };
                let keys: Vec<&Value> = t
                    .links
                    .get(table)
                    .map(Vec::as_slice)
                    .unwrap_or(&[])
                    .iter()
                    .filter_map(|(a, b)| match relation.direction {
                        Direction::Forward => value_eq(a, id).then_some(b),
                        Direction::Reverse => value_eq(b, id).then_some(a),
                    })
                    .collect();
                rows.iter()
                    .filter(|r| keys.iter().any(|k| same_id(r, k)))
                    .collect()
            }
        }
    }
}

/// Keep scalar columns and forward to-one keys; drop anything else.
fn storable(def: &ModelDef, fields: Fields) -> Fields {
    fields
        .into_iter()
        .filter(|(name, _)| {
            def.field_def(name).map_or(false, |f| {
                matches!(
                    f.kind,
                    FieldKind::Scalar { .. } | FieldKind::ForeignKey { .. } | FieldKind::OneToOne { .. }
                )
            })
        })
        .collect()
}

#[async_trait]
impl Store for MemoryStore {
    fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    async fn filter(&self, model: &str, filter: &Filter, page: Page) -> Result<Vec<Record>, AppError> {
        self.schema.require_model(model)?;
        let t = self.read()?;
        let terms: Vec<(Vec<&str>, &Value)> = filter
            .terms
            .iter()
            .map(|term| (split_lookup(&term.path), &term.value))
            .collect();
        let rows = t.rows.get(model).map(Vec::as_slice).unwrap_or(&[]);
        Ok(rows
            .iter()
            .filter(|r| terms.iter().all(|(hops, value)| self.matches(&t, r, hops, value)))
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .cloned()
            .collect())
    }

    async fn get(&self, model: &str, id: &Value) -> Result<Option<Record>, AppError> {
        self.schema.require_model(model)?;
        let t = self.read()?;
        Ok(t.rows.get(model).and_then(|rows| {
            rows.iter()
                .find(|r| r.id.as_ref().map_or(false, |k| value_eq(k, id)))
                .cloned()
        }))
    }

    async fn insert(&self, model: &str, mut fields: Fields) -> Result<Record, AppError> {
        let def = self.schema.require_model(model)?;
        let given = fields.remove(&def.primary_key).filter(|v| !v.is_null());
        let mut t = self.write()?;
        let counter = t.next_id.entry(model.to_string()).or_insert(0);
        let id = match (&def.pk_type, given) {
            (PkType::Int | PkType::BigInt, Some(v)) => {
                let n = v
                    .as_i64()
                    .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
                    .ok_or_else(|| AppError::Validation(format!("{} key must be an integer, got {}", model, v)))?;
                *counter = (*counter).max(n);
                Value::from(n)
            }
            (PkType::Int | PkType::BigInt, None) => {
                *counter += 1;
                Value::from(*counter)
            }
            (_, Some(v)) => v,
            (_, None) => Value::String(uuid::Uuid::new_v4().to_string()),
        };
        let exists = t
            .rows
            .get(model)
            .map_or(false, |rows| rows.iter().any(|r| r.id.as_ref().map_or(false, |k| value_eq(k, &id))));
        if exists {
            return Err(AppError::Validation(format!("{} {} already exists", model, id)));
        }
        let record = Record {
            model: model.to_string(),
            id: Some(id),
            fields: storable(def, fields),
        };
        t.rows.entry(model.to_string()).or_default().push(record.clone());
        Ok(record)
    }

    async fn update(&self, model: &str, id: &Value, fields: Fields) -> Result<Option<Record>, AppError> {
        let def = self.schema.require_model(model)?;
        let mut t = self.write()?;
        let Some(row) = t.rows.get_mut(model).and_then(|rows| {
            rows.iter_mut()
                .find(|r| r.id.as_ref().map_or(false, |k| value_eq(k, id)))
        }) else {
            return Ok(None);
        };
        for (k, v) in storable(def, fields) {
            row.fields.insert(k, v);
        }
        Ok(Some(row.clone()))
    }

    async fn delete(&self, model: &str, id: &Value) -> Result<bool, AppError> {
        self.schema.require_model(model)?;
        let link_sides: Vec<(String, Direction)> = self
            .schema
            .relations_of(model)
            .into_iter()
            .filter_map(|r| match r.join {
                Join::Link { table, .. } => Some((table, r.direction)),
                _ => None,
            })
            .collect();
        let mut t = self.write()?;
        let Some(rows) = t.rows.get_mut(model) else { return Ok(false) };
        let before = rows.len();
        rows.retain(|r| !r.id.as_ref().map_or(false, |k| value_eq(k, id)));
        let removed = rows.len() != before;
        for (table, direction) in link_sides {
            if let Some(pairs) = t.links.get_mut(&table) {
                pairs.retain(|(a, b)| match direction {
                    Direction::Forward => !value_eq(a, id),
                    Direction::Reverse => !value_eq(b, id),
                });
            }
        }
        Ok(removed)
    }

    async fn link(&self, model: &str, field: &str, from: &Value, to: &Value) -> Result<(), AppError> {
        let relation = self
            .schema
            .relation(model, field)
            .filter(|r| r.kind == RelationKind::ManyToMany)
            .ok_or_else(|| ConfigError::UnsupportedParentLookup {
                field: field.to_string(),
                reason: format!("'{}.{}' is not a many-to-many relation", model, field),
            })?;
        let Join::Link { table, .. } = relation.join else {
            return Err(AppError::Internal(format!("'{}.{}' has no link table", model, field)));
        };
        let pair = match relation.direction {
            Direction::Forward => (from.clone(), to.clone()),
            Direction::Reverse => (to.clone(), from.clone()),
        };
        let mut t = self.write()?;
        let pairs = t.links.entry(table).or_default();
        if !pairs.iter().any(|(a, b)| value_eq(a, &pair.0) && value_eq(b, &pair.1)) {
            pairs.push(pair);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        self.read().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::languages_schema;
    use crate::store::{related, Related};
    use serde_json::json;

    fn fields(v: Value) -> Fields {
        v.as_object().cloned().unwrap_or_default()
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new(languages_schema());
        store.insert("Developer", fields(json!({"name": "Guido"}))).await.unwrap();
        store.insert("Developer", fields(json!({"name": "Rob"}))).await.unwrap();
        store
            .insert("Website", fields(json!({"base_url": "https://python.org"})))
            .await
            .unwrap();
        store
            .insert("ProgrammingLanguage", fields(json!({"name": "Python", "author": 1, "website": 1})))
            .await
            .unwrap();
        store
            .insert("ProgrammingLanguage", fields(json!({"name": "Go", "author": 2})))
            .await
            .unwrap();
        store
            .insert("ProgrammingLanguageVersion", fields(json!({"name": "3.12", "language": 1})))
            .await
            .unwrap();
        store
            .insert("WebsiteVisit", fields(json!({"timestamp": "2015-01-01", "website": 1})))
            .await
            .unwrap();
        store.insert("WebsiteHost", fields(json!({"name": "fastly"}))).await.unwrap();
        store.link("Website", "hosts", &json!(1), &json!(1)).await.unwrap();
        store
    }

    #[tokio::test]
    async fn explicit_integer_keys_are_checked() {
        let store = seeded().await;

        let err = store.insert("Developer", fields(json!({"id": "1", "name": "Ken"}))).await;
        assert!(matches!(err, Err(AppError::Validation(_))));
        let err = store.insert("Developer", fields(json!({"id": "abc", "name": "Ken"}))).await;
        assert!(matches!(err, Err(AppError::Validation(_))));
        let err = store.insert("Developer", fields(json!({"id": 1.5, "name": "Ken"}))).await;
        assert!(matches!(err, Err(AppError::Validation(_))));

        let ken = store.insert("Developer", fields(json!({"id": "7", "name": "Ken"}))).await.unwrap();
        assert_eq!(ken.id, Some(json!(7)));
        let next = store.insert("Developer", fields(json!({"name": "Dennis"}))).await.unwrap();
        assert_eq!(next.id, Some(json!(8)));
    }

    #[tokio::test]
    async fn multi_hop_filters_follow_foreign_keys() {
        let store = seeded().await;
        let rows = store
            .filter(
                "ProgrammingLanguageVersion",
                &Filter::new().and("language", json!(1)).and("language__author", json!(1)),
                Page::default(),
            )
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let none = store
            .filter(
                "ProgrammingLanguageVersion",
                &Filter::new().and("language__author", json!(2)),
                Page::default(),
            )
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn reverse_one_to_one_and_many_to_many_terms_match() {
        let store = seeded().await;
        let visits = store
            .filter("WebsiteVisit", &Filter::new().and("website__language", json!(1)), Page::default())
            .await
            .unwrap();
        assert_eq!(visits.len(), 1);

        let hosts = store
            .filter("WebsiteHost", &Filter::new().and("websites", json!(1)), Page::default())
            .await
            .unwrap();
        assert_eq!(hosts.len(), 1);
        let sites = store
            .filter("Website", &Filter::new().and("hosts", json!(1)), Page::default())
            .await
            .unwrap();
        assert_eq!(sites.len(), 1);
    }

    #[tokio::test]
    async fn related_follows_both_directions() {
        let store = seeded().await;
        let guido = store.get("Developer", &json!(1)).await.unwrap().unwrap();
        match related(&store, &guido, "programming_languages").await.unwrap() {
            Related::Many(rows) => assert_eq!(rows.len(), 1),
            other => panic!("expected many, got {:?}", other),
        }
        let go = store.get("ProgrammingLanguage", &json!(2)).await.unwrap().unwrap();
        assert_eq!(related(&store, &go, "website").await.unwrap(), Related::One(None));
    }

    #[tokio::test]
    async fn delete_drops_links() {
        let store = seeded().await;
        assert!(store.delete("WebsiteHost", &json!(1)).await.unwrap());
        let hosts = store
            .filter("WebsiteHost", &Filter::new().and("websites", json!(1)), Page::default())
            .await
            .unwrap();
        assert!(hosts.is_empty());
        let sites = store
            .filter("Website", &Filter::new().and("hosts", json!(1)), Page::default())
            .await
            .unwrap();
        assert!(sites.is_empty());
    }

    #[tokio::test]
    async fn pages_are_applied_after_filtering() {
        let store = seeded().await;
        let page = store
            .filter("Developer", &Filter::new(), Page { limit: 1, offset: 1 })
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, Some(json!(2)));
    }
}
