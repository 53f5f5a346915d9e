#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Search API integration tests.
//!
//! Full pipeline over the shipped mapping file: Search filter in, catalogue
//! rows from the in-memory transport, Search JSON out.

mod common;

use std::sync::Arc;

use common::{service, MockTransport, MAPPING_JSON};
use datagateway::error::GatewayError;
use datagateway::filter::{parse_filter, Filter};
use datagateway::query::{IcatQueryBuilder, QueryBuilder};
use datagateway::search::{rewrite_filter, SearchMapping};
use serde_json::json;

// -------------------------------------------------------------------------
// Query shapes (mapping file end to end)
// -------------------------------------------------------------------------

#[test]
fn dataset_count_rewrites_title_onto_name() {
    let mapping = SearchMapping::from_str(MAPPING_JSON).unwrap();
    let filter = parse_filter(&json!({"where": {"title": {"eq": "A"}}})).unwrap();

    let (root, rewritten) = rewrite_filter(&mapping, "Dataset", &filter).unwrap();
    let built = IcatQueryBuilder.build_count(&root, &rewritten).unwrap();

    assert_eq!(
        built.query,
        "SELECT COUNT(o) FROM Dataset o WHERE o.name = 'A'"
    );
}

#[test]
fn dataset_files_roots_at_datafile_with_pid_conjunct() {
    let mapping = SearchMapping::from_str(MAPPING_JSON).unwrap();
    let mut filter = parse_filter(&json!({"limit": 5})).unwrap();
    filter.and_where(datagateway::filter::WhereExpr::eq(
        "dataset.pid",
        datagateway::filter::FilterValue::String("abc-123".to_string()),
    ));

    let (root, rewritten) = rewrite_filter(&mapping, "File", &filter).unwrap();
    let built = IcatQueryBuilder.build(&root, &rewritten).unwrap();

    assert_eq!(
        built.query,
        "SELECT o FROM Datafile o JOIN o.dataset o1 WHERE o1.doi = 'abc-123' LIMIT 0, 5"
    );
}

#[test]
fn document_include_with_scope_restricts_joined_rows() {
    let mapping = SearchMapping::from_str(MAPPING_JSON).unwrap();
    let filter = parse_filter(&json!({
        "include": [{"relation": "datasets", "scope": {"where": {"isPublic": true}}}]
    }))
    .unwrap();

    let (root, rewritten) = rewrite_filter(&mapping, "Document", &filter).unwrap();
    assert_eq!(root, "Investigation");

    let built = IcatQueryBuilder.build(&root, &rewritten).unwrap();
    assert!(built.query.contains("JOIN o.datasets o1"));
    assert!(built.query.contains("o1.complete = True"));
    assert!(built.includes.contains(&"datasets".to_string()));
    // Document.keywords maps across the keywords relation, included
    // implicitly for reshape.
    assert!(built.includes.contains(&"keywords".to_string()));
}

// -------------------------------------------------------------------------
// Service round trips
// -------------------------------------------------------------------------

#[tokio::test]
async fn search_list_projects_rows_into_the_search_schema() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_rows(vec![json!({
        "id": 9,
        "doi": "10.1/ds",
        "name": "raw-scan",
        "complete": true,
        "createTime": "2020-01-01 00:00:00",
        "datafiles": [{"name": "a.nxs", "fileSize": 100, "location": "/a"}]
    })]);
    let svc = service(transport).await;

    let filter = Filter::default();
    let records = svc.search_list("Dataset", &filter).await.unwrap();

    assert_eq!(
        records,
        vec![json!({
            "creationDate": "2020-01-01 00:00:00",
            "isPublic": true,
            "pid": "10.1/ds",
            "title": "raw-scan"
        })]
    );
}

#[tokio::test]
async fn requested_files_appear_unrequested_dataset_absent() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_rows(vec![json!({
        "doi": "10.1/ds",
        "name": "raw-scan",
        "complete": false,
        "createTime": "2020-01-01 00:00:00",
        "datafiles": [
            {"name": "a.nxs", "fileSize": 100, "location": "/a"},
            {"name": "b.nxs", "fileSize": 200, "location": "/b"}
        ]
    })]);
    let svc = service(transport).await;

    let filter = parse_filter(&json!({"include": [{"relation": "files"}]})).unwrap();
    let records = svc.search_list("Dataset", &filter).await.unwrap();

    let files = records[0]["files"].as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert_eq!(files[0], json!({"name": "a.nxs", "size": 100, "path": "/a"}));
    assert!(records[0].get("dataset").is_none());
}

#[tokio::test]
async fn documents_without_matching_datasets_get_empty_arrays() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_rows(vec![json!({
        "doi": "10.1/doc",
        "title": "Parent without children",
        "keywords": [],
        "datasets": []
    })]);
    let svc = service(transport).await;

    let filter = parse_filter(&json!({
        "include": [{"relation": "datasets", "scope": {"where": {"isPublic": true}}}]
    }))
    .unwrap();
    let records = svc.search_list("Document", &filter).await.unwrap();

    assert_eq!(records[0]["datasets"], json!([]));
    assert_eq!(records[0]["type"], json!("proposal"));
}

#[tokio::test]
async fn search_count_returns_the_integer() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_rows(vec![json!(12)]);
    let svc = service(transport).await;

    let filter = parse_filter(&json!({"where": {"title": {"eq": "A"}}})).unwrap();
    let total = svc.search_count("Dataset", &filter).await.unwrap();
    assert_eq!(total, 12);
}

#[tokio::test]
async fn search_one_not_found_when_no_rows() {
    let transport = Arc::new(MockTransport::new());
    let svc = service(transport).await;

    let err = svc
        .search_one("Dataset", "missing-pid", &Filter::default())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotFound));
}

#[tokio::test]
async fn records_missing_required_fields_are_dropped() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_rows(vec![
        json!({"doi": "10.1/ok", "name": "good", "complete": true}),
        json!({"name": "no-doi", "complete": true}),
    ]);
    let svc = service(transport).await;

    let records = svc.search_list("Dataset", &Filter::default()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["pid"], json!("10.1/ok"));
}

#[tokio::test]
async fn dataset_files_applies_callers_filter_too() {
    let transport = Arc::new(MockTransport::new());
    transport.queue_rows(vec![json!({
        "name": "a.nxs", "fileSize": 100, "location": "/a"
    })]);
    let svc = service(transport).await;

    let filter = parse_filter(&json!({"where": {"name": {"like": "a%"}}})).unwrap();
    let records = svc.dataset_files("abc-123", &filter).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["name"], json!("a.nxs"));
}

#[tokio::test]
async fn unknown_search_field_is_a_bad_filter() {
    let transport = Arc::new(MockTransport::new());
    let svc = service(transport).await;

    let filter = parse_filter(&json!({"where": {"wavelength": {"gt": 1}}})).unwrap();
    let err = svc.search_list("Dataset", &filter).await.unwrap_err();

    let GatewayError::BadFilter { path, .. } = err else {
        panic!("expected bad filter");
    };
    assert_eq!(path, "where.wavelength");
}
