//! Route compilation: validate declarations against the model schema and produce the axum router.

use super::flatten::{flatten, FlattenedRoute, RouteTable, ViewKind};
use super::index::RelationshipIndex;
use crate::case::split_lookup;
use crate::config::Settings;
use crate::error::ConfigError;
use crate::handlers::{self, RouteState};
use crate::resource::{ParentLookup, ResourceNode};
use crate::schema::ModelSchema;
use crate::service::serializer::URL_FIELD;
use crate::service::Dispatcher;
use crate::state::ApiState;
use crate::store::Store;
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

/// A compiled set of nested resources. Build once at startup.
#[derive(Clone, Debug)]
pub struct NestedApi {
    state: ApiState,
}

impl NestedApi {
    pub fn new(forest: &[ResourceNode], store: Arc<dyn Store>, settings: Settings) -> Result<Self, ConfigError> {
        let routes = flatten(forest)?;
        let schema = store.schema();
        let index = RelationshipIndex::build(&routes, schema)?;
        for route in &routes {
            check_route(schema, route)?;
        }
        let table = RouteTable::new(routes)?;
        tracing::info!(
            routes = table.routes().len(),
            mount = %settings.mount_path,
            "nested resources compiled"
        );
        for route in table.routes() {
            tracing::debug!(
                name = %route.name,
                list = %route.pattern(ViewKind::List),
                detail = %route.pattern(ViewKind::Detail),
                "route"
            );
        }
        Ok(NestedApi {
            state: ApiState {
                routes: Arc::new(table),
                index: Arc::new(index),
                store,
                settings: Arc::new(settings),
            },
        })
    }

    pub fn state(&self) -> &ApiState {
        &self.state
    }

    pub fn routes(&self) -> &RouteTable {
        &self.state.routes
    }

    pub fn index(&self) -> &RelationshipIndex {
        &self.state.index
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(self.state.clone())
    }

    /// Router serving every route plus the API root, nested under the mount path when one is set.
    pub fn router(&self) -> Router {
        let dispatcher = self.dispatcher();
        let mut api = Router::new()
            .route("/", get(handlers::api_root))
            .with_state(dispatcher.clone());
        for route in self.routes().routes() {
            let state = RouteState {
                dispatcher: dispatcher.clone(),
                resource: Arc::from(route.name.as_str()),
            };
            let resource_router = Router::new()
                .route(
                    &route.router_path(ViewKind::List),
                    get(handlers::list).post(handlers::create),
                )
                .route(
                    &route.router_path(ViewKind::Detail),
                    get(handlers::retrieve)
                        .head(handlers::head)
                        .put(handlers::update)
                        .patch(handlers::partial_update)
                        .delete(handlers::destroy),
                )
                .with_state(state);
            api = api.merge(resource_router);
        }
        let api = api.layer(RequestBodyLimitLayer::new(self.state.settings.body_limit));
        let mount = &self.state.settings.mount_path;
        if mount.is_empty() {
            api
        } else {
            Router::new().nest(mount, api)
        }
    }
}

fn check_route(schema: &ModelSchema, route: &FlattenedRoute) -> Result<(), ConfigError> {
    let model = route.model();
    let def = schema.require_model(model)?;
    let known = |field: &str| {
        field == URL_FIELD || field == def.primary_key || def.field_def(field).is_some() || schema.relation(model, field).is_some()
    };
    if let Some(fields) = &route.view.fields {
        if let Some(unknown) = fields.iter().find(|f| !known(f.as_str())) {
            return Err(ConfigError::UnknownField {
                model: model.to_string(),
                field: unknown.clone(),
            });
        }
    }
    if let Some(field) = &route.view.forced_ancestor_field {
        if schema.relation(model, field).is_none() {
            return Err(ConfigError::UnknownField {
                model: model.to_string(),
                field: field.clone(),
            });
        }
    }
    for term in &route.view.base_filter.terms {
        let first = split_lookup(&term.path).first().copied().unwrap_or_default();
        if !known(first) {
            return Err(ConfigError::UnresolvableRelationship {
                model: model.to_string(),
                path: term.path.clone(),
            });
        }
    }
    if let Some(parent) = route.parent() {
        match &parent.lookup {
            ParentLookup::Path(path) => {
                let hops = schema.resolve_path(model, path)?;
                if hops.last().map(|h| h.target.as_str()) != Some(parent.model.as_str()) {
                    return Err(ConfigError::UnresolvableRelationship {
                        model: model.to_string(),
                        path: path.clone(),
                    });
                }
            }
            ParentLookup::Resolver(resolver) => resolver.check(schema, model)?,
        }
    }
    Ok(())
}
