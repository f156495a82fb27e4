//! Example server: loads models.json and resources.json from NESTED_CONFIG_PATH (default
//! demos/languages), stores rows in PostgreSQL when DATABASE_URL is set and in memory otherwise,
//! and serves the nested resources next to the common routes.

use axum::Router;
use nested_resources::{
    apply_migrations, common_routes_with_ready, load_from_dir, resolve, MemoryStore, NestedApi, PgStore,
    PolicyRegistry, Settings, Store,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("nested_resources=info".parse()?))
        .init();

    let settings = Settings::from_env();
    let config_dir = settings.config_path.clone().unwrap_or_else(|| "demos/languages".into());
    let config = load_from_dir(&config_dir).await?;
    let resolved = resolve(&config, &PolicyRegistry::default())?;

    let store: Arc<dyn Store> = match &settings.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(5)
                .connect(url)
                .await?;
            apply_migrations(&pool, &resolved.schema, &settings.db_schema).await?;
            Arc::new(PgStore::new(pool, resolved.schema, settings.db_schema.clone()))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; rows are kept in memory");
            Arc::new(MemoryStore::new(resolved.schema))
        }
    };

    let api = NestedApi::new(&resolved.forest, store, settings)?;
    let app = Router::new()
        .merge(common_routes_with_ready(api.state().clone()))
        .merge(api.router());

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
