mod common;

use axum::http::{Method, StatusCode};
use common::{get, request, send};
use nested_resources::store::Fields;
use nested_resources::{load_from_dir, resolve, ConfigError, MemoryStore, NestedApi, PolicyRegistry, Settings, Store};
use serde_json::json;
use std::sync::Arc;

const DEMO_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/languages");

fn row(v: serde_json::Value) -> Fields {
    v.as_object().cloned().unwrap_or_default()
}

async fn demo_app() -> axum::Router {
    let config = load_from_dir(DEMO_DIR).await.unwrap();
    let resolved = resolve(&config, &PolicyRegistry::default()).unwrap();
    let store = Arc::new(MemoryStore::new(resolved.schema));
    store.insert("Developer", row(json!({"name": "Guido"}))).await.unwrap();
    store.insert("Developer", row(json!({"name": "Rob"}))).await.unwrap();
    store
        .insert("Website", row(json!({"base_url": "https://python.org"})))
        .await
        .unwrap();
    store
        .insert("ProgrammingLanguage", row(json!({"name": "Python", "author": 1, "website": 1})))
        .await
        .unwrap();
    store
        .insert("WebsiteVisit", row(json!({"timestamp": "2015-01-01T00:00:00Z", "website": 1})))
        .await
        .unwrap();
    NestedApi::new(&resolved.forest, store, Settings::default()).unwrap().router()
}

#[tokio::test]
async fn demo_declarations_compile_and_serve() {
    let app = demo_app().await;

    let (status, body) = get(&app, "/developers/1/languages/1/visits/1/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["url"], "/developers/1/languages/1/visits/1/");

    let (_, body) = get(&app, "/developers/1/languages/1/").await;
    assert_eq!(body["data"]["website"], "/websites/1/");
    assert_eq!(body["data"]["versions"], "/developers/1/languages/1/versions/");

    let req = request(Method::DELETE, "/developers/1/languages/1/visits/1/", None, None);
    assert_eq!(send(&app, req).await.0, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn policies_and_validation_come_from_the_declarations() {
    let app = demo_app().await;

    assert_eq!(get(&app, "/website-visits/1/").await.0, StatusCode::UNAUTHORIZED);
    let req = request(Method::GET, "/website-visits/1/", None, Some("alice"));
    assert_eq!(send(&app, req).await.0, StatusCode::OK);

    let req = request(Method::POST, "/developers/", Some(json!({})), None);
    assert_eq!(send(&app, req).await.0, StatusCode::UNPROCESSABLE_ENTITY);
    let req = request(Method::POST, "/developers/", Some(json!({"name": "Brendan"})), None);
    assert_eq!(send(&app, req).await.0, StatusCode::CREATED);
}

#[tokio::test]
async fn forced_author_ignores_the_body() {
    let app = demo_app().await;
    let req = request(
        Method::POST,
        "/developers/1/languages/",
        Some(json!({"name": "Jython", "author": "/developers/2/"})),
        None,
    );
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["author"], "/developers/1/");
}

#[tokio::test]
async fn missing_directory_is_a_load_error() {
    let err = load_from_dir("/nonexistent/nested-resources").await.unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}
