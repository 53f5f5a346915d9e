//! DataGateway entity routes.
//!
//! One CRUD surface per catalogue entity, driven by the entity descriptors:
//! `GET/POST/PATCH /{entity}`, `GET/DELETE /{entity}/{id}`,
//! `GET /{entity}/count` and `GET /{entity}/findone`. All accept the filter
//! query grammar; requests without an `Authorization` bearer run on a pooled
//! session.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::Value;

use super::{bearer_token, filter_from_params, where_from_params};
use crate::error::{GatewayError, GatewayResult};
use crate::state::AppState;

/// Create the DataGateway entity router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{entity}", get(list).post(create).patch(update))
        .route("/{entity}/count", get(count))
        .route("/{entity}/findone", get(find_one))
        .route("/{entity}/{id}", get(get_by_id).delete(delete_by_id))
}

async fn list(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> GatewayResult<Json<Value>> {
    let session = bearer_token(&headers);
    let filter = filter_from_params(&params)?;

    let rows = state
        .catalogue()
        .list(session.as_deref(), &entity, &filter)
        .await?;
    Ok(Json(Value::Array(rows)))
}

async fn get_by_id(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, i64)>,
    headers: HeaderMap,
) -> GatewayResult<Json<Value>> {
    let session = bearer_token(&headers);
    let record = state
        .catalogue()
        .get_by_id(session.as_deref(), &entity, id)
        .await?;
    Ok(Json(record))
}

async fn find_one(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> GatewayResult<Json<Value>> {
    let session = bearer_token(&headers);
    let filter = filter_from_params(&params)?;

    let record = state
        .catalogue()
        .find_one(session.as_deref(), &entity, &filter)
        .await?;
    Ok(Json(record))
}

async fn count(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
) -> GatewayResult<Json<u64>> {
    let session = bearer_token(&headers);
    let filter = where_from_params(&params)?;

    let total = state
        .catalogue()
        .count(session.as_deref(), &entity, &filter)
        .await?;
    Ok(Json(total))
}

async fn create(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> GatewayResult<Json<Value>> {
    let session = bearer_token(&headers);
    let (records, single) = records_from_body(body)?;

    let created = state
        .catalogue()
        .create(session.as_deref(), &entity, records)
        .await?;
    Ok(Json(mirror_shape(created, single)))
}

async fn update(
    State(state): State<AppState>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> GatewayResult<Json<Value>> {
    let session = bearer_token(&headers);
    let (records, single) = records_from_body(body)?;

    let updated = state
        .catalogue()
        .update(session.as_deref(), &entity, records)
        .await?;
    Ok(Json(mirror_shape(updated, single)))
}

async fn delete_by_id(
    State(state): State<AppState>,
    Path((entity, id)): Path<(String, i64)>,
    headers: HeaderMap,
) -> GatewayResult<StatusCode> {
    let session = bearer_token(&headers);
    state
        .catalogue()
        .delete(session.as_deref(), &entity, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST/PATCH bodies are one record or a list of records.
fn records_from_body(body: Value) -> GatewayResult<(Vec<Value>, bool)> {
    match body {
        Value::Object(_) => Ok((vec![body], true)),
        Value::Array(items) if items.iter().all(Value::is_object) && !items.is_empty() => {
            Ok((items, false))
        }
        _ => Err(GatewayError::BadRequest(
            "request body must be a record or a non-empty list of records".to_string(),
        )),
    }
}

/// Responses mirror the request shape: object in, object out.
fn mirror_shape(mut records: Vec<Value>, single: bool) -> Value {
    if single {
        records.pop().unwrap_or(Value::Null)
    } else {
        Value::Array(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_shapes() {
        let (records, single) = records_from_body(json!({"name": "a"})).unwrap();
        assert!(single);
        assert_eq!(records.len(), 1);

        let (records, single) =
            records_from_body(json!([{"name": "a"}, {"name": "b"}])).unwrap();
        assert!(!single);
        assert_eq!(records.len(), 2);

        assert!(records_from_body(json!([])).is_err());
        assert!(records_from_body(json!("nope")).is_err());
        assert!(records_from_body(json!([1, 2])).is_err());
    }

    #[test]
    fn mirror_shape_round_trips() {
        let single = mirror_shape(vec![json!({"id": 1})], true);
        assert_eq!(single, json!({"id": 1}));

        let list = mirror_shape(vec![json!({"id": 1})], false);
        assert_eq!(list, json!([{"id": 1}]));
    }
}
