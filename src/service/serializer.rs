//! Hyperlinked serialization of records for one route.
//!
//! Output carries a `url` identity field. Relational fields that the relationship index maps to a
//! resource become links: to-one fields to that resource's detail view, to-many fields to its list
//! view owned by the record. Relational fields the index does not know are rendered as raw keys.

use crate::error::{AppError, ConfigError};
use crate::routing::{parse_view_name, FlattenedRoute, RelationshipIndex, RouteTable, ViewKind};
use crate::schema::{Direction, ModelSchema, Relation};
use crate::service::urls::{path_of, LinkTarget, UrlGenerator};
use crate::service::RequestContext;
use crate::store::{related, Fields, Record, Related, Store};
use serde_json::{Map, Value};

pub const URL_FIELD: &str = "url";

pub struct Serializer<'a> {
    route: &'a FlattenedRoute,
    index: &'a RelationshipIndex,
    routes: &'a RouteTable,
    store: &'a dyn Store,
    urls: UrlGenerator<'a>,
    mount: &'a str,
}

impl<'a> Serializer<'a> {
    pub fn new(
        route: &'a FlattenedRoute,
        index: &'a RelationshipIndex,
        routes: &'a RouteTable,
        store: &'a dyn Store,
        urls: UrlGenerator<'a>,
        mount: &'a str,
    ) -> Self {
        Serializer {
            route,
            index,
            routes,
            store,
            urls,
            mount,
        }
    }

    fn schema(&self) -> &ModelSchema {
        self.store.schema()
    }

    /// Exposed field names: the declared list, or every model field plus the reverse accessors the index knows.
    pub fn field_names(&self) -> Result<Vec<String>, ConfigError> {
        if let Some(fields) = &self.route.view.fields {
            return Ok(fields.clone());
        }
        let def = self.schema().require_model(self.route.model())?;
        let mut names: Vec<String> = def.fields.iter().map(|f| f.name.clone()).collect();
        for relation in self.schema().relations_of(self.route.model()) {
            if relation.direction == Direction::Reverse && self.index.target(&self.route.name, &relation.field).is_some() {
                names.push(relation.field);
            }
        }
        Ok(names)
    }

    pub async fn to_json(&self, record: &Record, ctx: &RequestContext) -> Result<Value, AppError> {
        let mut out = Map::new();
        let identity = self
            .urls
            .generate(&self.route.view_name(ViewKind::Detail), LinkTarget::Object(record), ctx)
            .await?;
        out.insert(URL_FIELD.to_string(), identity.map(Value::String).unwrap_or(Value::Null));

        let pk = &self.schema().require_model(&record.model)?.primary_key;
        for name in self.field_names()? {
            if name == URL_FIELD {
                continue;
            }
            if &name == pk {
                out.insert(name, record.id.clone().unwrap_or(Value::Null));
                continue;
            }
            let value = match self.schema().relation(&record.model, &name) {
                None => record.fields.get(&name).cloned().unwrap_or(Value::Null),
                Some(relation) => match self.relational_value(record, &relation, ctx).await? {
                    Some(v) => v,
                    None => continue,
                },
            };
            out.insert(name, value);
        }
        Ok(Value::Object(out))
    }

    /// None omits the field.
    async fn relational_value(
        &self,
        record: &Record,
        relation: &Relation,
        ctx: &RequestContext,
    ) -> Result<Option<Value>, AppError> {
        let Some(target) = self.index.target(&self.route.name, &relation.field) else {
            return self.raw_keys(record, relation).await;
        };
        if relation.to_many {
            let view = format!("{}-list", target);
            let url = self
                .urls
                .generate(&view, LinkTarget::Collection { owner: record }, ctx)
                .await?;
            return Ok(Some(url.map(Value::String).unwrap_or(Value::Null)));
        }
        let view = format!("{}-detail", target);
        let value = match related(self.store, record, &relation.field).await? {
            Related::One(Some(other)) => self
                .urls
                .generate(&view, LinkTarget::Object(&other), ctx)
                .await?
                .map(Value::String)
                .unwrap_or(Value::Null),
            _ => Value::Null,
        };
        Ok(Some(value))
    }

    async fn raw_keys(&self, record: &Record, relation: &Relation) -> Result<Option<Value>, AppError> {
        if relation.direction == Direction::Forward && !relation.to_many {
            return Ok(Some(record.fields.get(&relation.field).cloned().unwrap_or(Value::Null)));
        }
        Ok(Some(match related(self.store, record, &relation.field).await? {
            Related::One(other) => other.and_then(|r| r.id).unwrap_or(Value::Null),
            Related::Many(rows) => Value::Array(rows.into_iter().filter_map(|r| r.id).collect()),
        }))
    }

    /// Writable fields of a request body. Hyperlinks on to-one fields are resolved to keys.
    /// `url`, the primary key, to-many fields and unknown keys are ignored.
    pub async fn from_json(&self, body: &Value) -> Result<Fields, AppError> {
        let Value::Object(input) = body else {
            return Err(AppError::BadRequest("request body must be a JSON object".into()));
        };
        let exposed = self.field_names()?;
        let def = self.schema().require_model(self.route.model())?;
        let mut fields = Fields::new();
        for (name, value) in input {
            if name == URL_FIELD || *name == def.primary_key || !exposed.contains(name) {
                continue;
            }
            if self.schema().is_scalar(&def.name, name) {
                fields.insert(name.clone(), value.clone());
                continue;
            }
            let Some(relation) = self.schema().relation(&def.name, name) else { continue };
            if relation.direction != Direction::Forward || relation.to_many {
                continue;
            }
            let key = match (self.index.target(&self.route.name, name), value) {
                (_, Value::Null) => Value::Null,
                (Some(target), Value::String(url)) => self.resolve_link(name, target, url).await?,
                (Some(_), _) => {
                    return Err(AppError::Validation(format!("{}: expected a URL", name)));
                }
                (None, raw) => raw.clone(),
            };
            fields.insert(name.clone(), key);
        }
        Ok(fields)
    }

    async fn resolve_link(&self, field: &str, target: &str, url: &str) -> Result<Value, AppError> {
        let invalid = |reason: &str| AppError::Validation(format!("{}: invalid hyperlink - {}", field, reason));
        let path = path_of(url, self.mount).ok_or_else(|| invalid("no URL match"))?;
        let (view, vars) = self.routes.resolve_path(path).ok_or_else(|| invalid("no URL match"))?;
        let (name, kind) = parse_view_name(&view)?;
        if name != target || kind != ViewKind::Detail {
            return Err(invalid("incorrect URL match"));
        }
        let target_route = self.routes.require(target)?;
        let raw = vars.get(target).ok_or_else(|| invalid("incorrect URL match"))?;
        let id = self
            .schema()
            .parse_id(target_route.model(), raw)
            .map_err(|_| invalid("object does not exist"))?;
        match self.store.get(target_route.model(), &id).await? {
            Some(_) => Ok(id),
            None => Err(invalid("object does not exist")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::extractors::AuthContext;
    use crate::routing::flatten::{flatten, tests::languages_forest};
    use crate::routing::PathVars;
    use crate::schema::tests::languages_schema;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn fields(v: Value) -> Fields {
        v.as_object().cloned().unwrap_or_default()
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new(languages_schema());
        store.insert("Developer", fields(json!({"name": "Guido"}))).await.unwrap();
        store.insert("Website", fields(json!({"base_url": "https://python.org"}))).await.unwrap();
        store
            .insert("ProgrammingLanguage", fields(json!({"name": "Python", "author": 1, "website": 1})))
            .await
            .unwrap();
        store
            .insert("WebsiteVisit", fields(json!({"timestamp": "2015-01-01", "website": 1})))
            .await
            .unwrap();
        store
    }

    struct Fixture {
        store: MemoryStore,
        table: RouteTable,
        index: RelationshipIndex,
        settings: Settings,
    }

    impl Fixture {
        async fn new() -> Self {
            let store = seeded().await;
            let routes = flatten(&languages_forest()).unwrap();
            let index = RelationshipIndex::build(&routes, store.schema()).unwrap();
            Fixture {
                store,
                table: RouteTable::new(routes).unwrap(),
                index,
                settings: Settings::default(),
            }
        }

        fn serializer(&self, resource: &str) -> Serializer<'_> {
            Serializer::new(
                self.table.get(resource).unwrap(),
                &self.index,
                &self.table,
                &self.store,
                UrlGenerator::new(&self.table, &self.store, &self.settings),
                "",
            )
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new("language", PathVars::new(), AuthContext::anonymous()).with_host("testserver")
    }

    #[tokio::test]
    async fn relational_fields_become_links() {
        let fx = Fixture::new().await;
        let language = fx.store.get("ProgrammingLanguage", &json!(1)).await.unwrap().unwrap();
        let out = fx.serializer("language").to_json(&language, &ctx()).await.unwrap();
        assert_eq!(out["url"], json!("http://testserver/developers/1/languages/1/"));
        assert_eq!(out["name"], json!("Python"));
        assert_eq!(out["author"], json!("http://testserver/developers/1/"));
        assert_eq!(out["website"], json!("http://testserver/websites/1/"));
        assert_eq!(out["versions"], json!("http://testserver/developers/1/languages/1/versions/"));
    }

    #[tokio::test]
    async fn reverse_one_to_one_links_to_detail() {
        let fx = Fixture::new().await;
        let website = fx.store.get("Website", &json!(1)).await.unwrap().unwrap();
        let out = fx.serializer("website").to_json(&website, &ctx()).await.unwrap();
        assert_eq!(out["language"], json!("http://testserver/developers/1/languages/1/"));
        assert_eq!(out["visits"], json!("http://testserver/website-visits/"));
        assert_eq!(out["hosts"], json!([]));
    }

    #[tokio::test]
    async fn unsaved_record_has_null_identity() {
        let fx = Fixture::new().await;
        let unsaved = Record::unsaved("WebsiteVisit", fields(json!({"timestamp": "x", "website": 1})));
        let out = fx.serializer("website_visit").to_json(&unsaved, &ctx()).await.unwrap();
        assert_eq!(out["url"], Value::Null);
        assert_eq!(out["website"], json!("http://testserver/websites/1/"));
    }

    #[tokio::test]
    async fn hyperlinks_are_resolved_on_write() {
        let fx = Fixture::new().await;
        let serializer = fx.serializer("website_visit");
        let parsed = serializer
            .from_json(&json!({
                "url": "ignored",
                "timestamp": "2016-01-01",
                "website": "http://testserver/websites/1/?format=json",
                "unknown": 1
            }))
            .await
            .unwrap();
        assert_eq!(parsed.get("website"), Some(&json!(1)));
        assert_eq!(parsed.get("timestamp"), Some(&json!("2016-01-01")));
        assert!(parsed.get("url").is_none());
        assert!(parsed.get("unknown").is_none());

        let wrong = serializer.from_json(&json!({"website": "/developers/1/"})).await;
        assert!(matches!(wrong, Err(AppError::Validation(m)) if m.contains("incorrect URL match")));
        let missing = serializer.from_json(&json!({"website": "/websites/9/"})).await;
        assert!(matches!(missing, Err(AppError::Validation(m)) if m.contains("does not exist")));
        assert!(matches!(serializer.from_json(&json!([1])).await, Err(AppError::BadRequest(_))));
    }
}
