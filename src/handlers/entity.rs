//! Entity CRUD handlers: list, read, create, update, delete. Handlers
//! resolve the entity from the path segment and attach request context to
//! anything that fails.

use crate::config::EntityDescriptor;
use crate::error::ApiError;
use crate::extractors::RequestMeta;
use crate::params;
use crate::response;
use crate::service::CrudService;
use crate::state::AppState;
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde_json::Value;

/// Body decode failures stay inside the envelope contract.
fn decode_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(ApiError::params(rejection.body_text())),
    }
}

fn resolve_entity<'a>(
    state: &'a AppState,
    path_segment: &str,
) -> Result<&'a EntityDescriptor, ApiError> {
    state
        .model
        .entity_by_path(path_segment)
        .ok_or_else(ApiError::table_missing)
}

pub async fn list(
    State(state): State<AppState>,
    meta: RequestMeta,
    Path(path_segment): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = meta.context(None);
    let entity = resolve_entity(&state, &path_segment).map_err(|e| e.with_request(ctx.clone()))?;
    let tree = params::parse(pairs);
    let result = CrudService::list(&state.pool, entity, tree)
        .await
        .map_err(|e| e.with_request(ctx))?;
    Ok(response::list_body(result.total, result.items))
}

pub async fn read(
    State(state): State<AppState>,
    meta: RequestMeta,
    Path((path_segment, key)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = meta.context(None);
    let entity = resolve_entity(&state, &path_segment).map_err(|e| e.with_request(ctx.clone()))?;
    let record = CrudService::get_one(&state.pool, entity, &key)
        .await
        .map_err(|e| e.with_request(ctx))?;
    Ok(Json(record))
}

pub async fn create(
    State(state): State<AppState>,
    meta: RequestMeta,
    Path(path_segment): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = decode_body(body).map_err(|e| e.with_request(meta.context(None)))?;
    let ctx = meta.context(Some(body.to_string()));
    let entity = resolve_entity(&state, &path_segment).map_err(|e| e.with_request(ctx.clone()))?;
    let inserted = CrudService::insert(&state.pool, entity, body)
        .await
        .map_err(|e| e.with_request(ctx))?;
    Ok(response::inserted_body(inserted))
}

pub async fn update(
    State(state): State<AppState>,
    meta: RequestMeta,
    Path((path_segment, key)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let body = decode_body(body).map_err(|e| e.with_request(meta.context(None)))?;
    let ctx = meta.context(Some(body.to_string()));
    let entity = resolve_entity(&state, &path_segment).map_err(|e| e.with_request(ctx.clone()))?;
    let record = CrudService::update_one(&state.pool, entity, &key, body)
        .await
        .map_err(|e| e.with_request(ctx))?;
    Ok(Json(record))
}

pub async fn delete(
    State(state): State<AppState>,
    meta: RequestMeta,
    Path((path_segment, key)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let ctx = meta.context(None);
    let entity = resolve_entity(&state, &path_segment).map_err(|e| e.with_request(ctx.clone()))?;
    let record = CrudService::delete_one(&state.pool, entity, &key)
        .await
        .map_err(|e| e.with_request(ctx))?;
    Ok(Json(record))
}
