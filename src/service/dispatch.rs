//! The generic resource pipeline and the ancestor permission cascade.
//!
//! Every route runs the same steps: operation gate, permission checks (parent check first,
//! then the resource's own policies), query scoping, then the action. The check of the parent
//! is an in-process HEAD dispatch to the parent's detail view, which runs the same pipeline and
//! therefore checks its own parent in turn.

use crate::error::{AppError, ConfigError};
use crate::extractors::AuthContext;
use crate::resource::{Action, ParentLookup};
use crate::routing::{FlattenedRoute, PathVars, ViewKind};
use crate::schema::{Direction, RelationKind};
use crate::service::permission::Decision;
use crate::service::scope::scope;
use crate::service::serializer::Serializer;
use crate::service::urls::UrlGenerator;
use crate::service::validation::{validate_fields, WriteMode};
use crate::service::RequestContext;
use crate::state::ApiState;
use crate::store::{Fields, Filter, Page, Record};
use axum::http::StatusCode;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Clone, Debug)]
pub struct DispatchRequest {
    pub resource: String,
    pub action: Action,
    pub ctx: RequestContext,
    pub body: Option<Value>,
    pub page: Page,
}

impl DispatchRequest {
    pub fn new(action: Action, ctx: RequestContext) -> Self {
        DispatchRequest {
            resource: ctx.route.clone(),
            action,
            ctx,
            body: None,
            page: Page::default(),
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    Many { data: Vec<Value>, page: Page },
    One(Value),
    Created(Value),
    NoContent,
    /// HEAD check succeeded.
    Empty,
}

#[derive(Clone, Debug)]
pub struct Dispatcher {
    state: ApiState,
}

impl Dispatcher {
    pub fn new(state: ApiState) -> Self {
        Dispatcher { state }
    }

    pub fn state(&self) -> &ApiState {
        &self.state
    }

    pub fn dispatch(&self, req: DispatchRequest) -> BoxFuture<'_, Result<Outcome, AppError>> {
        Box::pin(async move { self.run(req).await })
    }

    fn serializer<'a>(&'a self, route: &'a FlattenedRoute) -> Serializer<'a> {
        let s = &self.state;
        Serializer::new(
            route,
            &s.index,
            &s.routes,
            s.store.as_ref(),
            UrlGenerator::new(&s.routes, s.store.as_ref(), &s.settings),
            &s.settings.mount_path,
        )
    }

    async fn run(&self, req: DispatchRequest) -> Result<Outcome, AppError> {
        let route = self.state.routes.require(&req.resource)?;
        let operation = req.action.operation();
        if !route.view.allows(operation) {
            return Err(AppError::MethodNotAllowed(format!("{:?} on {}", operation, route.name)));
        }
        if let Some(format) = req.ctx.format.as_deref().filter(|f| *f != "json") {
            return Err(AppError::NotFound(format!("format '{}'", format)));
        }

        self.check_permissions(route, &req.ctx, req.action).await?;

        let schema = self.state.store.schema();
        let mut filter = scope(schema, route, &req.ctx.path_vars)?;
        filter.extend(&route.view.base_filter);

        match req.action {
            Action::List => self.list(route, &filter, &req).await,
            Action::Create => self.create(route, &req).await,
            _ => self.detail(route, filter, &req).await,
        }
    }

    async fn list(&self, route: &FlattenedRoute, filter: &Filter, req: &DispatchRequest) -> Result<Outcome, AppError> {
        let rows = self.state.store.filter(route.model(), filter, req.page).await?;
        let serializer = self.serializer(route);
        let mut data = Vec::with_capacity(rows.len());
        for row in &rows {
            data.push(serializer.to_json(row, &req.ctx).await?);
        }
        Ok(Outcome::Many { data, page: req.page })
    }

    async fn create(&self, route: &FlattenedRoute, req: &DispatchRequest) -> Result<Outcome, AppError> {
        let body = req
            .body
            .as_ref()
            .ok_or_else(|| AppError::BadRequest("request body required".into()))?;
        let serializer = self.serializer(route);
        let mut fields = serializer.from_json(body).await?;
        self.force_ancestor_field(route, &req.ctx, &mut fields).await?;
        self.fill_parent_key(route, &req.ctx, &mut fields)?;
        validate_fields(&fields, &route.view.validation, WriteMode::Full)?;

        let record = self.state.store.insert(route.model(), fields).await?;
        if let Err(e) = self.link_to_parent(route, &req.ctx, &record).await {
            if let Some(id) = &record.id {
                if let Err(cleanup) = self.state.store.delete(route.model(), id).await {
                    tracing::warn!(route = %route.name, ?id, error = %cleanup, "could not remove unlinked row");
                }
            }
            return Err(e);
        }
        tracing::debug!(route = %route.name, id = ?record.id, "created");
        Ok(Outcome::Created(serializer.to_json(&record, &req.ctx).await?))
    }

    async fn detail(&self, route: &FlattenedRoute, mut filter: Filter, req: &DispatchRequest) -> Result<Outcome, AppError> {
        let store = self.state.store.as_ref();
        let def = store.schema().require_model(route.model())?;
        let raw = req
            .ctx
            .path_vars
            .get(&route.name)
            .ok_or_else(|| ConfigError::MissingPathVariable {
                route: route.view_name(ViewKind::Detail),
                variable: route.name.clone(),
            })?;
        let id = store.schema().parse_id(route.model(), raw)?;
        filter.push(def.primary_key.clone(), id.clone());
        let record = store
            .filter(route.model(), &filter, Page::first())
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::NotFound(format!("{} {}", route.name, raw)))?;

        self.check_object_permissions(route, &req.ctx, req.action, &record).await?;

        match req.action {
            Action::Head => Ok(Outcome::Empty),
            Action::Retrieve => Ok(Outcome::One(self.serializer(route).to_json(&record, &req.ctx).await?)),
            Action::Update | Action::PartialUpdate => {
                let body = req
                    .body
                    .as_ref()
                    .ok_or_else(|| AppError::BadRequest("request body required".into()))?;
                let serializer = self.serializer(route);
                let mut fields = serializer.from_json(body).await?;
                self.force_ancestor_field(route, &req.ctx, &mut fields).await?;
                let mode = if req.action == Action::Update {
                    WriteMode::Full
                } else {
                    WriteMode::Partial
                };
                validate_fields(&fields, &route.view.validation, mode)?;
                let updated = store
                    .update(route.model(), &id, fields)
                    .await?
                    .ok_or_else(|| AppError::NotFound(format!("{} {}", route.name, raw)))?;
                Ok(Outcome::One(serializer.to_json(&updated, &req.ctx).await?))
            }
            Action::Destroy => {
                if !store.delete(route.model(), &id).await? {
                    return Err(AppError::NotFound(format!("{} {}", route.name, raw)));
                }
                Ok(Outcome::NoContent)
            }
            Action::List | Action::Create => Err(AppError::Internal(format!("{:?} is not a detail action", req.action))),
        }
    }

    async fn check_permissions(&self, route: &FlattenedRoute, ctx: &RequestContext, action: Action) -> Result<(), AppError> {
        self.cascade(route, ctx).await?;
        for policy in &route.view.permissions {
            policy.has_permission(ctx, action).into_result()?;
        }
        Ok(())
    }

    async fn check_object_permissions(
        &self,
        route: &FlattenedRoute,
        ctx: &RequestContext,
        action: Action,
        record: &Record,
    ) -> Result<(), AppError> {
        for policy in &route.view.permissions {
            policy.has_object_permission(ctx, action, record).into_result()?;
        }
        self.cascade(route, ctx).await
    }

    async fn cascade(&self, route: &FlattenedRoute, ctx: &RequestContext) -> Result<(), AppError> {
        let decision = self.evaluate_permissions_for(route, &ctx.path_vars, &ctx.auth).await?;
        let parent = route.parent().map(|p| p.name.as_str()).unwrap_or_default();
        decision.into_result(parent)
    }

    /// Check the parent's detail view with a HEAD dispatch carrying the caller's identity.
    pub async fn evaluate_permissions_for(
        &self,
        route: &FlattenedRoute,
        vars: &PathVars,
        auth: &AuthContext,
    ) -> Result<Decision, AppError> {
        let Some(parent) = route.parent() else {
            return Ok(Decision::from_status(None)?);
        };
        let parent_route = self.state.routes.require(&parent.name)?;
        let parent_vars = vars.restrict(&parent_route.required_vars(ViewKind::Detail));
        let ctx = RequestContext::new(parent.name.clone(), parent_vars, auth.clone());
        let check = DispatchRequest::new(Action::Head, ctx).with_page(Page::first());

        let status = match self.dispatch(check).await {
            Ok(_) => StatusCode::OK,
            Err(e @ (AppError::Config(_) | AppError::Db(_) | AppError::Internal(_))) => return Err(e),
            Err(e) => e.status(),
        };
        tracing::debug!(route = %route.name, parent = %parent.name, status = status.as_u16(), "ancestor check");
        Ok(Decision::from_status(Some(status))?)
    }

    /// Set the declared field to the ancestor bound in the URL.
    async fn force_ancestor_field(&self, route: &FlattenedRoute, ctx: &RequestContext, fields: &mut Fields) -> Result<(), AppError> {
        let Some(field) = &route.view.forced_ancestor_field else { return Ok(()) };
        let ancestor = self
            .state
            .index
            .target(&route.name, field)
            .ok_or_else(|| ConfigError::UnresolvableRelationship {
                model: route.model().to_string(),
                path: field.clone(),
            })?;
        let ancestor_route = self.state.routes.require(ancestor)?;
        let raw = ctx.path_vars.get(ancestor).ok_or_else(|| ConfigError::MissingPathVariable {
            route: route.name.clone(),
            variable: ancestor.to_string(),
        })?;
        let store = self.state.store.as_ref();
        let id = store.schema().parse_id(ancestor_route.model(), raw)?;
        if store.get(ancestor_route.model(), &id).await?.is_none() {
            return Err(AppError::NotFound(format!("{} {}", ancestor, raw)));
        }
        fields.insert(field.clone(), id);
        Ok(())
    }

    /// Single-hop foreign keys to the parent are filled from the URL.
    fn fill_parent_key(&self, route: &FlattenedRoute, ctx: &RequestContext, fields: &mut Fields) -> Result<(), AppError> {
        let Some(parent) = route.parent() else { return Ok(()) };
        let ParentLookup::Path(path) = &parent.lookup else { return Ok(()) };
        let schema = self.state.store.schema();
        let Some(relation) = schema.relation(route.model(), path) else { return Ok(()) };
        if relation.direction != Direction::Forward || relation.to_many {
            return Ok(());
        }
        if let Some(raw) = ctx.path_vars.get(&parent.name) {
            fields.insert(path.clone(), schema.parse_id(&parent.model, raw)?);
        }
        Ok(())
    }

    /// Children reached through a many-to-many resolver are linked to the parent in the URL.
    async fn link_to_parent(&self, route: &FlattenedRoute, ctx: &RequestContext, record: &Record) -> Result<(), AppError> {
        let Some(parent) = route.parent() else { return Ok(()) };
        let ParentLookup::Resolver(resolver) = &parent.lookup else { return Ok(()) };
        let store = self.state.store.as_ref();
        let field = resolver.field();
        let is_many_to_many = store
            .schema()
            .relation(route.model(), field)
            .map_or(false, |r| r.kind == RelationKind::ManyToMany);
        let (Some(id), Some(raw), true) = (&record.id, ctx.path_vars.get(&parent.name), is_many_to_many) else {
            return Ok(());
        };
        let parent_id = store.schema().parse_id(&parent.model, raw)?;
        store.link(route.model(), field, id, &parent_id).await
    }
}
