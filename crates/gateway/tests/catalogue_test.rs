#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Catalogue service integration tests.
//!
//! Orchestration behaviour over the in-memory transport: session retry,
//! error surfacing, write round-trips, and the login cache.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::{service, MockTransport};
use datagateway::client::CatalogueError;
use datagateway::error::GatewayError;
use datagateway::filter::{parse_filter, Filter};
use serde_json::json;

// -------------------------------------------------------------------------
// Reads
// -------------------------------------------------------------------------

#[tokio::test]
async fn list_returns_rows() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_rows(vec![json!({"id": 1, "title": "A"})]);
    let svc = service(transport.clone()).await;

    let rows = svc
        .list(None, "investigations", &Filter::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["title"], json!("A"));
}

#[tokio::test]
async fn get_by_id_maps_empty_to_not_found() {
    let transport = Arc::new(MockTransport::new());
    let svc = service(transport).await;

    let err = svc.get_by_id(None, "datasets", 42).await.unwrap_err();
    assert!(matches!(err, GatewayError::NotFound));
}

#[tokio::test]
async fn find_one_limits_to_a_single_record() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_rows(vec![json!({"id": 3})]);
    let svc = service(transport).await;

    let filter = parse_filter(&json!({"order": ["id desc"]})).unwrap();
    let record = svc.find_one(None, "datasets", &filter).await.unwrap();
    assert_eq!(record["id"], json!(3));
}

#[tokio::test]
async fn count_unwraps_the_aggregate_row() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_rows(vec![json!(17)]);
    let svc = service(transport).await;

    let total = svc
        .count(None, "investigations", &Filter::default())
        .await
        .unwrap();
    assert_eq!(total, 17);
}

#[tokio::test]
async fn bad_filter_surfaces_before_any_catalogue_call() {
    let transport = Arc::new(MockTransport::new());
    let svc = service(transport.clone()).await;

    let filter = parse_filter(&json!({"where": {"nosuch": 1}})).unwrap();
    let err = svc.list(None, "datasets", &filter).await.unwrap_err();

    assert!(matches!(err, GatewayError::BadFilter { .. }));
    assert_eq!(transport.search_count.load(Ordering::SeqCst), 0);
}

// -------------------------------------------------------------------------
// Session retry
// -------------------------------------------------------------------------

#[tokio::test]
async fn expired_pooled_session_is_retried_once() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_error(CatalogueError::SessionExpired);
    transport.queue_rows(vec![json!({"id": 1})]);
    let svc = service(transport.clone()).await;

    let rows = svc
        .list(None, "investigations", &Filter::default())
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);

    // The expired session was invalidated and replaced by a fresh login.
    assert_eq!(transport.login_count.load(Ordering::SeqCst), 2);
    assert_eq!(transport.search_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn second_expiry_surfaces_the_error() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_error(CatalogueError::SessionExpired);
    transport.queue_error(CatalogueError::SessionExpired);
    let svc = service(transport.clone()).await;

    let err = svc
        .list(None, "investigations", &Filter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::SessionExpired));
    assert_eq!(transport.search_count.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn explicit_session_is_not_retried() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_error(CatalogueError::SessionExpired);
    let svc = service(transport.clone()).await;

    let err = svc
        .list(Some("client-session"), "investigations", &Filter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::SessionExpired));
    assert_eq!(transport.search_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn forbidden_surfaces_catalogue_message() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_error(CatalogueError::Denied("read denied on Dataset".to_string()));
    let svc = service(transport).await;

    let err = svc
        .list(None, "datasets", &Filter::default())
        .await
        .unwrap_err();
    let GatewayError::Forbidden(message) = err else {
        panic!("expected forbidden");
    };
    assert!(message.contains("read denied"));
}

// -------------------------------------------------------------------------
// Writes
// -------------------------------------------------------------------------

#[tokio::test]
async fn create_reads_back_created_records() {
    let transport = Arc::new(MockTransport::new());
    // Read-back of ids 1 and 2.
    transport.queue_rows(vec![json!({"id": 1, "name": "a"})]);
    transport.queue_rows(vec![json!({"id": 2, "name": "b"})]);
    let svc = service(transport).await;

    let created = svc
        .create(
            None,
            "datasets",
            vec![json!({"name": "a"}), json!({"name": "b"})],
        )
        .await
        .unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(created[1]["id"], json!(2));
}

#[tokio::test]
async fn update_requires_an_id() {
    let transport = Arc::new(MockTransport::new());
    let svc = service(transport).await;

    let err = svc
        .update(None, "datasets", vec![json!({"name": "a"})])
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::BadRequest(_)));
}

#[tokio::test]
async fn unknown_entity_rejected_for_writes() {
    let transport = Arc::new(MockTransport::new());
    let svc = service(transport).await;

    let err = svc
        .create(None, "widgets", vec![json!({"name": "a"})])
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::BadRequest(_)));
}

// -------------------------------------------------------------------------
// Login cache
// -------------------------------------------------------------------------

#[tokio::test]
async fn login_is_served_from_cache_for_repeated_identities() {
    let transport = Arc::new(MockTransport::new());
    let svc = service(transport.clone()).await;
    let pool_logins = transport.login_count.load(Ordering::SeqCst);

    let first = svc.login("simple", "root", "pw").await.unwrap();
    let second = svc.login("simple", "root", "pw").await.unwrap();
    assert_eq!(first, second);
    assert_eq!(
        transport.login_count.load(Ordering::SeqCst),
        pool_logins + 1
    );

    // A different identity pays its own handshake.
    svc.login("ldap", "someone", "pw").await.unwrap();
    assert_eq!(
        transport.login_count.load(Ordering::SeqCst),
        pool_logins + 2
    );
}
