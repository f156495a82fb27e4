//! PostgreSQL store: executes queries from the SQL builder and decodes rows to JSON.

use super::{Fields, Filter, Page, Record, Store};
use crate::error::{AppError, ConfigError};
use crate::schema::{ModelSchema, RelationKind};
use crate::sql::{self, PgBindValue, QueryBuf};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
    schema: ModelSchema,
    db_schema: String,
}

impl PgStore {
    pub fn new(pool: PgPool, schema: ModelSchema, db_schema: impl Into<String>) -> Self {
        PgStore {
            pool,
            schema,
            db_schema: db_schema.into(),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn query_many(&self, model: &str, q: &QueryBuf) -> Result<Vec<Record>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let rows = query.fetch_all(&self.pool).await?;
        rows.iter().map(|r| self.to_record(model, r)).collect()
    }

    async fn query_one(&self, model: &str, q: &QueryBuf) -> Result<Option<Record>, AppError> {
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        let row = query.fetch_optional(&self.pool).await?;
        row.map(|r| self.to_record(model, &r)).transpose()
    }

    fn to_record(&self, model: &str, row: &sqlx::postgres::PgRow) -> Result<Record, AppError> {
        let def = self.schema.require_model(model)?;
        let mut fields = row_to_json(row);
        let id = fields.remove(&def.primary_key).filter(|v| !v.is_null());
        Ok(Record {
            model: model.to_string(),
            id,
            fields,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    fn schema(&self) -> &ModelSchema {
        &self.schema
    }

    async fn filter(&self, model: &str, filter: &Filter, page: Page) -> Result<Vec<Record>, AppError> {
        let q = sql::select_filtered(&self.schema, &self.db_schema, model, filter, page)?;
        self.query_many(model, &q).await
    }

    async fn get(&self, model: &str, id: &Value) -> Result<Option<Record>, AppError> {
        let q = sql::select_by_id(&self.schema, &self.db_schema, model, id)?;
        self.query_one(model, &q).await
    }

    async fn insert(&self, model: &str, fields: Fields) -> Result<Record, AppError> {
        let q = sql::insert(&self.schema, &self.db_schema, model, &fields)?;
        self.query_one(model, &q)
            .await?
            .ok_or(AppError::Db(sqlx::Error::RowNotFound))
    }

    async fn update(&self, model: &str, id: &Value, fields: Fields) -> Result<Option<Record>, AppError> {
        let q = sql::update(&self.schema, &self.db_schema, model, id, &fields)?;
        self.query_one(model, &q).await
    }

    async fn delete(&self, model: &str, id: &Value) -> Result<bool, AppError> {
        let q = sql::delete(&self.schema, &self.db_schema, model, id)?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        Ok(query.fetch_optional(&self.pool).await?.is_some())
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
        let q = sql::link(&self.schema, &self.db_schema, &relation, from, to)?;
        tracing::debug!(sql = %q.sql, params = ?q.params, "query");
        let mut query = sqlx::query(&q.sql);
        for p in &q.params {
            query = query.bind(PgBindValue::from_json(p));
        }
        query.execute(&self.pool).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

fn row_to_json(row: &sqlx::postgres::PgRow) -> Fields {
    use sqlx::{Column, Row};
    row.columns()
        .iter()
        .map(|col| (col.name().to_string(), cell_to_value(row, col.name())))
        .collect()
}

/// Decode one cell by trying the column types the builder can produce, most specific first.
fn cell_to_value(row: &sqlx::postgres::PgRow, name: &str) -> Value {
    use sqlx::Row;
    if let Ok(Some(n)) = row.try_get::<Option<i32>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i64>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<i16>, _>(name) {
        return Value::from(n);
    }
    if let Ok(Some(n)) = row.try_get::<Option<f64>, _>(name) {
        return serde_json::Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null);
    }
    if let Ok(Some(b)) = row.try_get::<Option<bool>, _>(name) {
        return Value::Bool(b);
    }
    if let Ok(Some(u)) = row.try_get::<Option<uuid::Uuid>, _>(name) {
        return Value::String(u.to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(name) {
        return Value::String(d.to_rfc3339());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDateTime>, _>(name) {
        return Value::String(d.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
    }
    if let Ok(Some(d)) = row.try_get::<Option<chrono::NaiveDate>, _>(name) {
        return Value::String(d.format("%Y-%m-%d").to_string());
    }
    if let Ok(Some(s)) = row.try_get::<Option<String>, _>(name) {
        return Value::String(s);
    }
    if let Ok(Some(j)) = row.try_get::<Option<Value>, _>(name) {
        return j;
    }
    Value::Null
}
