//! Example consumer: a separate Rust project that declares its resource tree in code.
//!
//! Run from repo root: `cargo run -p example-consumer`
//! Then try `curl http://127.0.0.1:3000/developers/1/languages/1/versions/`.

use nested_resources::schema::FieldDef;
use nested_resources::service::permission::ReadOnly;
use nested_resources::store::Fields;
use nested_resources::{
    common_routes, MemoryStore, ModelDef, ModelSchema, NestedApi, ParentLookup, ResourceNode, ResourceView, Settings,
    Store,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;

fn schema() -> Result<ModelSchema, nested_resources::ConfigError> {
    ModelSchema::new(vec![
        ModelDef::new("Developer").field(FieldDef::scalar("name")),
        ModelDef::new("ProgrammingLanguage")
            .field(FieldDef::scalar("name"))
            .field(FieldDef::foreign_key("author", "Developer", "programming_languages")),
        ModelDef::new("ProgrammingLanguageVersion")
            .field(FieldDef::scalar("name"))
            .field(FieldDef::foreign_key("language", "ProgrammingLanguage", "versions")),
    ])
}

fn forest() -> Vec<ResourceNode> {
    vec![ResourceNode::new("developer", "developers", ResourceView::new("Developer")).child(
        ResourceNode::nested(
            "language",
            "languages",
            ResourceView::new("ProgrammingLanguage").permission(Arc::new(ReadOnly)),
            ParentLookup::path("author"),
        )
        .child(ResourceNode::nested(
            "version",
            "versions",
            ResourceView::new("ProgrammingLanguageVersion"),
            ParentLookup::path("language"),
        )),
    )]
}

fn row(v: serde_json::Value) -> Fields {
    v.as_object().cloned().unwrap_or_default()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("nested_resources=info")),
        )
        .init();

    let store = Arc::new(MemoryStore::new(schema()?));
    store.insert("Developer", row(json!({"name": "Guido"}))).await?;
    store
        .insert("ProgrammingLanguage", row(json!({"name": "Python", "author": 1})))
        .await?;
    store
        .insert("ProgrammingLanguageVersion", row(json!({"name": "3.12", "language": 1})))
        .await?;

    let api = NestedApi::new(&forest(), store, Settings::from_env())?;
    let app = common_routes().merge(api.router());
    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app).await?;
    Ok(())
}
