//! One set of handlers shared by every route. Per-route state says which resource is served.

use crate::error::AppError;
use crate::extractors::AuthContext;
use crate::resource::Action;
use crate::response::{success_created, success_many, success_one};
use crate::routing::{PathVars, ViewKind};
use crate::service::{DispatchRequest, Dispatcher, Outcome, RequestContext, UrlGenerator};
use crate::store::Page;
use axum::{
    extract::{rejection::PathRejection, Path, Query, State},
    http::{header::HOST, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct RouteState {
    pub dispatcher: Dispatcher,
    pub resource: Arc<str>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub format: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FormatQuery {
    pub format: Option<String>,
}

/// URL variables as extracted by axum. Rejections are kept so they can be reported as 404.
pub type RawPathVars = Result<Path<HashMap<String, String>>, PathRejection>;

/// A segment that cannot be decoded addresses nothing.
fn path_vars(params: RawPathVars) -> Result<PathVars, AppError> {
    match params {
        Ok(Path(p)) => Ok(p.into_iter().collect()),
        Err(PathRejection::MissingPathParams(_)) => Ok(PathVars::new()),
        Err(rejection) => Err(AppError::NotFound(rejection.body_text())),
    }
}

fn context(
    state: &RouteState,
    params: RawPathVars,
    headers: &HeaderMap,
    format: Option<String>,
    auth: AuthContext,
) -> Result<RequestContext, AppError> {
    let mut ctx = RequestContext::new(state.resource.as_ref(), path_vars(params)?, auth);
    ctx.host = host(headers);
    ctx.format = format;
    Ok(ctx)
}

fn host(headers: &HeaderMap) -> Option<String> {
    headers.get(HOST).and_then(|h| h.to_str().ok()).map(str::to_string)
}

fn respond(outcome: Outcome) -> Response {
    match outcome {
        Outcome::Many { data, page } => success_many(data, page).into_response(),
        Outcome::One(data) => success_one(data).into_response(),
        Outcome::Created(data) => success_created(data).into_response(),
        Outcome::NoContent => StatusCode::NO_CONTENT.into_response(),
        Outcome::Empty => StatusCode::OK.into_response(),
    }
}

async fn run(state: &RouteState, action: Action, ctx: RequestContext, body: Option<Value>) -> Result<Response, AppError> {
    let req = match body {
        Some(body) => DispatchRequest::new(action, ctx).with_body(body),
        None => DispatchRequest::new(action, ctx),
    };
    state.dispatcher.dispatch(req).await.map(respond)
}

pub async fn list(
    State(state): State<RouteState>,
    params: RawPathVars,
    Query(q): Query<ListQuery>,
    headers: HeaderMap,
    auth: AuthContext,
) -> Result<Response, AppError> {
    let default_limit = state.dispatcher.state().settings.page_limit;
    let ctx = context(&state, params, &headers, q.format, auth)?;
    let req = DispatchRequest::new(Action::List, ctx).with_page(Page::new(q.limit, q.offset, default_limit));
    state.dispatcher.dispatch(req).await.map(respond)
}

pub async fn create(
    State(state): State<RouteState>,
    params: RawPathVars,
    Query(q): Query<FormatQuery>,
    headers: HeaderMap,
    auth: AuthContext,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let ctx = context(&state, params, &headers, q.format, auth)?;
    run(&state, Action::Create, ctx, Some(body)).await
}

pub async fn retrieve(
    State(state): State<RouteState>,
    params: RawPathVars,
    Query(q): Query<FormatQuery>,
    headers: HeaderMap,
    auth: AuthContext,
) -> Result<Response, AppError> {
    let ctx = context(&state, params, &headers, q.format, auth)?;
    run(&state, Action::Retrieve, ctx, None).await
}

pub async fn head(
    State(state): State<RouteState>,
    params: RawPathVars,
    Query(q): Query<FormatQuery>,
    headers: HeaderMap,
    auth: AuthContext,
) -> Result<Response, AppError> {
    let ctx = context(&state, params, &headers, q.format, auth)?;
    run(&state, Action::Head, ctx, None).await
}

pub async fn update(
    State(state): State<RouteState>,
    params: RawPathVars,
    Query(q): Query<FormatQuery>,
    headers: HeaderMap,
    auth: AuthContext,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let ctx = context(&state, params, &headers, q.format, auth)?;
    run(&state, Action::Update, ctx, Some(body)).await
}

pub async fn partial_update(
    State(state): State<RouteState>,
    params: RawPathVars,
    Query(q): Query<FormatQuery>,
    headers: HeaderMap,
    auth: AuthContext,
    Json(body): Json<Value>,
) -> Result<Response, AppError> {
    let ctx = context(&state, params, &headers, q.format, auth)?;
    run(&state, Action::PartialUpdate, ctx, Some(body)).await
}

pub async fn destroy(
    State(state): State<RouteState>,
    params: RawPathVars,
    Query(q): Query<FormatQuery>,
    headers: HeaderMap,
    auth: AuthContext,
) -> Result<Response, AppError> {
    let ctx = context(&state, params, &headers, q.format, auth)?;
    run(&state, Action::Destroy, ctx, None).await
}

/// `GET /`: list URL of every top-level resource.
pub async fn api_root(
    State(dispatcher): State<Dispatcher>,
    Query(q): Query<FormatQuery>,
    headers: HeaderMap,
    auth: AuthContext,
) -> Result<Response, AppError> {
    let state = dispatcher.state();
    let mut ctx = RequestContext::new("", PathVars::new(), auth);
    ctx.host = host(&headers);
    ctx.format = q.format;
    let urls = UrlGenerator::new(&state.routes, state.store.as_ref(), &state.settings);
    let mut data = serde_json::Map::new();
    for route in state.routes.routes().iter().filter(|r| r.segments.len() == 1) {
        let view = route.view_name(ViewKind::List);
        let path = state.routes.reverse(&view, &PathVars::new())?;
        data.insert(route.name.clone(), Value::String(urls.absolute(&path, &ctx)));
    }
    Ok(success_one(Value::Object(data)).into_response())
}
