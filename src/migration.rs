//! Apply a model schema to the database: CREATE SCHEMA, tables with key columns, link tables, then foreign keys.

use crate::error::{AppError, ConfigError};
use crate::schema::{FieldKind, Join, ModelSchema, PkType, RelationKind};
use crate::sql::{pk_sql_type, qualified_table, quoted};
use sqlx::PgPool;

/// DDL in dependency order. `constraints` may fail when they already exist.
#[derive(Debug, Default)]
pub struct MigrationPlan {
    pub tables: Vec<String>,
    pub constraints: Vec<String>,
}

fn pk_column_def(pk: &str, ty: &PkType) -> String {
    let ty = match ty {
        PkType::Int => "SERIAL PRIMARY KEY",
        PkType::BigInt => "BIGSERIAL PRIMARY KEY",
        PkType::Uuid => "UUID PRIMARY KEY DEFAULT gen_random_uuid()",
        PkType::Text => "TEXT PRIMARY KEY",
    };
    format!("{} {}", quoted(pk), ty)
}

fn foreign_key(db_schema: &str, table: &str, column: &str, target_table: &str, target_pk: &str) -> String {
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE CASCADE",
        qualified_table(db_schema, table),
        quoted(&format!("{}_{}_fkey", table, column)),
        quoted(column),
        qualified_table(db_schema, target_table),
        quoted(target_pk)
    )
}

pub fn migration_plan(schema: &ModelSchema, db_schema: &str) -> Result<MigrationPlan, ConfigError> {
    let mut plan = MigrationPlan::default();
    plan.tables.push(format!("CREATE SCHEMA IF NOT EXISTS {}", quoted(db_schema)));

    for model in schema.models() {
        let table = model.table_name();
        let mut col_defs = vec![pk_column_def(&model.primary_key, &model.pk_type)];
        for f in &model.fields {
            match &f.kind {
                FieldKind::Scalar { sql_type } => {
                    col_defs.push(format!("{} {}", quoted(&f.name), sql_type.as_deref().unwrap_or("TEXT")));
                }
                FieldKind::ForeignKey { to, nullable, .. } | FieldKind::OneToOne { to, nullable, .. } => {
                    let target = schema.require_model(to)?;
                    let Some(column) = f.column() else { continue };
                    let mut def = format!("{} {}", quoted(&column), pk_sql_type(&target.pk_type).to_uppercase());
                    if !nullable {
                        def.push_str(" NOT NULL");
                    }
                    if matches!(f.kind, FieldKind::OneToOne { .. }) {
                        def.push_str(" UNIQUE");
                    }
                    col_defs.push(def);
                    plan.constraints.push(foreign_key(
                        db_schema,
                        &table,
                        &column,
                        &target.table_name(),
                        &target.primary_key,
                    ));
                }
                FieldKind::ManyToMany { .. } => {}
            }
        }
        plan.tables.push(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n  {}\n)",
            qualified_table(db_schema, &table),
            col_defs.join(",\n  ")
        ));
    }

    for model in schema.models() {
        for f in &model.fields {
            let Some(relation) = schema.relation(&model.name, &f.name) else { continue };
            if relation.kind != RelationKind::ManyToMany {
                continue;
            }
            let Join::Link {
                table,
                source_column,
                target_column,
            } = &relation.join
            else {
                continue;
            };
            let target = schema.require_model(&relation.target)?;
            plan.tables.push(format!(
                "CREATE TABLE IF NOT EXISTS {} (\n  {} {} NOT NULL,\n  {} {} NOT NULL,\n  PRIMARY KEY ({}, {})\n)",
                qualified_table(db_schema, table),
                quoted(source_column),
                pk_sql_type(&model.pk_type).to_uppercase(),
                quoted(target_column),
                pk_sql_type(&target.pk_type).to_uppercase(),
                quoted(source_column),
                quoted(target_column)
            ));
            plan.constraints.push(foreign_key(
                db_schema,
                table,
                source_column,
                &model.table_name(),
                &model.primary_key,
            ));
            plan.constraints.push(foreign_key(
                db_schema,
                table,
                target_column,
                &target.table_name(),
                &target.primary_key,
            ));
        }
    }
    Ok(plan)
}

/// Create schema, tables and link tables (IF NOT EXISTS), then add foreign keys.
/// Foreign keys that already exist are left in place.
pub async fn apply_migrations(pool: &PgPool, schema: &ModelSchema, db_schema: &str) -> Result<(), AppError> {
    let plan = migration_plan(schema, db_schema)?;
    for sql in &plan.tables {
        tracing::debug!(sql = %sql, "migration");
        sqlx::query(sql).execute(pool).await?;
    }
    for sql in &plan.constraints {
        tracing::debug!(sql = %sql, "migration");
        let _ = sqlx::query(sql).execute(pool).await;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests::languages_schema;

    #[test]
    fn plan_creates_key_columns_and_link_tables() {
        let plan = migration_plan(&languages_schema(), "public").unwrap();
        assert_eq!(plan.tables[0], "CREATE SCHEMA IF NOT EXISTS \"public\"");
        let language = plan
            .tables
            .iter()
            .find(|s| s.contains("\"public\".\"programminglanguage\" ("))
            .unwrap();
        assert!(language.contains("\"author_id\" INTEGER NOT NULL"));
        assert!(language.contains("\"website_id\" INTEGER UNIQUE"));
        assert!(plan
            .tables
            .iter()
            .any(|s| s.contains("\"public\".\"website_hosts\"") && s.contains("PRIMARY KEY (\"website_id\", \"websitehost_id\")")));
        assert!(plan
            .constraints
            .iter()
            .any(|s| s.contains("FOREIGN KEY (\"author_id\") REFERENCES \"public\".\"developer\" (\"id\")")));
    }
}
