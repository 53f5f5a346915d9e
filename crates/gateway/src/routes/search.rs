//! Search API routes.
//!
//! Read-only surface over the curated Search schema: datasets, documents
//! and instruments, each with `/{pid}` and `/count` siblings, plus the
//! files of a dataset. All queries run on pooled sessions.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

use super::{filter_from_params, where_from_params};
use crate::error::GatewayResult;
use crate::state::AppState;

/// Create the Search API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/datasets", get(list_datasets))
        .route("/datasets/count", get(count_datasets))
        .route("/datasets/{pid}", get(get_dataset))
        .route("/datasets/{pid}/files", get(dataset_files))
        .route("/datasets/{pid}/files/count", get(dataset_files_count))
        .route("/documents", get(list_documents))
        .route("/documents/count", get(count_documents))
        .route("/documents/{pid}", get(get_document))
        .route("/instruments", get(list_instruments))
        .route("/instruments/count", get(count_instruments))
        .route("/instruments/{pid}", get(get_instrument))
}

async fn list_entity(
    state: &AppState,
    entity: &str,
    params: &[(String, String)],
) -> GatewayResult<Json<Value>> {
    let filter = filter_from_params(params)?;
    let records = state.catalogue().search_list(entity, &filter).await?;
    Ok(Json(Value::Array(records)))
}

async fn count_entity(
    state: &AppState,
    entity: &str,
    params: &[(String, String)],
) -> GatewayResult<Json<u64>> {
    let filter = where_from_params(params)?;
    let total = state.catalogue().search_count(entity, &filter).await?;
    Ok(Json(total))
}

async fn get_entity(
    state: &AppState,
    entity: &str,
    pid: &str,
    params: &[(String, String)],
) -> GatewayResult<Json<Value>> {
    let filter = filter_from_params(params)?;
    let record = state.catalogue().search_one(entity, pid, &filter).await?;
    Ok(Json(record))
}

async fn list_datasets(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> GatewayResult<Json<Value>> {
    list_entity(&state, "Dataset", &params).await
}

async fn count_datasets(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> GatewayResult<Json<u64>> {
    count_entity(&state, "Dataset", &params).await
}

async fn get_dataset(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> GatewayResult<Json<Value>> {
    get_entity(&state, "Dataset", &pid, &params).await
}

async fn dataset_files(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> GatewayResult<Json<Value>> {
    let filter = filter_from_params(&params)?;
    let records = state.catalogue().dataset_files(&pid, &filter).await?;
    Ok(Json(Value::Array(records)))
}

async fn dataset_files_count(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> GatewayResult<Json<u64>> {
    let filter = where_from_params(&params)?;
    let total = state.catalogue().dataset_files_count(&pid, &filter).await?;
    Ok(Json(total))
}

async fn list_documents(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> GatewayResult<Json<Value>> {
    list_entity(&state, "Document", &params).await
}

async fn count_documents(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> GatewayResult<Json<u64>> {
    count_entity(&state, "Document", &params).await
}

async fn get_document(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> GatewayResult<Json<Value>> {
    get_entity(&state, "Document", &pid, &params).await
}

async fn list_instruments(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> GatewayResult<Json<Value>> {
    list_entity(&state, "Instrument", &params).await
}

async fn count_instruments(
    State(state): State<AppState>,
    Query(params): Query<Vec<(String, String)>>,
) -> GatewayResult<Json<u64>> {
    count_entity(&state, "Instrument", &params).await
}

async fn get_instrument(
    State(state): State<AppState>,
    Path(pid): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> GatewayResult<Json<Value>> {
    get_entity(&state, "Instrument", &pid, &params).await
}
