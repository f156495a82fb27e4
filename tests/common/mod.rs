#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use nested_resources::store::Fields;
use nested_resources::{
    FieldDef, MemoryStore, ModelDef, ModelSchema, NestedApi, ParentLookup, ResourceNode, ResourceView, Settings, Store,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub fn languages_schema() -> ModelSchema {
    ModelSchema::new(vec![
        ModelDef::new("Developer").field(FieldDef::scalar("name")),
        ModelDef::new("ProgrammingLanguage")
            .field(FieldDef::scalar("name"))
            .field(FieldDef::foreign_key("author", "Developer", "programming_languages"))
            .field(FieldDef::one_to_one("website", "Website", "language")),
        ModelDef::new("ProgrammingLanguageVersion")
            .field(FieldDef::scalar("name"))
            .field(FieldDef::foreign_key("language", "ProgrammingLanguage", "versions")),
        ModelDef::new("ProgrammingLanguageImplementation")
            .field(FieldDef::scalar("name"))
            .field(FieldDef::foreign_key("language", "ProgrammingLanguage", "implementations")),
        ModelDef::new("Website")
            .field(FieldDef::scalar("base_url"))
            .field(FieldDef::many_to_many("hosts", "WebsiteHost", "websites")),
        ModelDef::new("WebsiteVisit")
            .field(FieldDef::scalar("timestamp"))
            .field(FieldDef::foreign_key("website", "Website", "visits")),
        ModelDef::new("WebsiteHost").field(FieldDef::scalar("name")),
    ])
    .expect("languages schema")
}

fn fields(v: Value) -> Fields {
    v.as_object().cloned().unwrap_or_default()
}

/// Two developers, three languages (Python and Jython share an author), two websites with one
/// visit and one host each.
pub async fn seeded_store() -> Arc<MemoryStore> {
    let store = MemoryStore::new(languages_schema());
    let rows = [
        ("Developer", json!({"name": "Guido"})),
        ("Developer", json!({"name": "Rob"})),
        ("Website", json!({"base_url": "https://python.org"})),
        ("Website", json!({"base_url": "https://go.dev"})),
        ("ProgrammingLanguage", json!({"name": "Python", "author": 1, "website": 1})),
        ("ProgrammingLanguage", json!({"name": "Go", "author": 2, "website": 2})),
        ("ProgrammingLanguage", json!({"name": "Jython", "author": 1})),
        ("ProgrammingLanguageVersion", json!({"name": "2.7", "language": 1})),
        ("ProgrammingLanguageVersion", json!({"name": "1.22", "language": 2})),
        ("ProgrammingLanguageImplementation", json!({"name": "CPython", "language": 1})),
        ("WebsiteVisit", json!({"timestamp": "2015-01-01T00:00:00Z", "website": 1})),
        ("WebsiteVisit", json!({"timestamp": "2016-01-01T00:00:00Z", "website": 2})),
        ("WebsiteHost", json!({"name": "fastly"})),
        ("WebsiteHost", json!({"name": "google"})),
    ];
    for (model, row) in rows {
        store.insert(model, fields(row)).await.expect("seed row");
    }
    store.link("Website", "hosts", &json!(1), &json!(1)).await.expect("link");
    store.link("Website", "hosts", &json!(2), &json!(2)).await.expect("link");
    Arc::new(store)
}

pub fn language_view() -> ResourceView {
    ResourceView::new("ProgrammingLanguage")
}

/// developer > language > {version, implementation}; website-visit and website at the top level.
pub fn languages_forest_with(developer: ResourceView, language: ResourceView, version: ResourceView) -> Vec<ResourceNode> {
    vec![
        ResourceNode::new("developer", "developers", developer).child(
            ResourceNode::nested("language", "languages", language, ParentLookup::path("author"))
                .cross_link("website", "website")
                .child(ResourceNode::nested(
                    "version",
                    "versions",
                    version,
                    ParentLookup::path("language"),
                ))
                .child(ResourceNode::nested(
                    "implementation",
                    "implementations",
                    ResourceView::new("ProgrammingLanguageImplementation"),
                    ParentLookup::path("language"),
                )),
        ),
        ResourceNode::new("website-visit", "website-visits", ResourceView::new("WebsiteVisit"))
            .cross_link("website", "website"),
        ResourceNode::new("website", "websites", ResourceView::new("Website")),
    ]
}

pub fn languages_forest() -> Vec<ResourceNode> {
    languages_forest_with(
        ResourceView::new("Developer"),
        language_view(),
        ResourceView::new("ProgrammingLanguageVersion"),
    )
}

pub async fn api(forest: &[ResourceNode], settings: Settings) -> NestedApi {
    let store: Arc<dyn Store> = seeded_store().await;
    NestedApi::new(forest, store, settings).expect("routes compile")
}

pub async fn app(forest: &[ResourceNode]) -> Router {
    api(forest, Settings::default()).await.router()
}

pub fn request(method: Method, uri: &str, body: Option<Value>, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("X-User-Id", user);
    }
    let body = match body {
        Some(v) => {
            builder = builder.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    builder.body(body).expect("request")
}

/// Status and parsed JSON body (Null when the body is empty).
pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.expect("infallible router");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, request(Method::GET, uri, None, None)).await
}
