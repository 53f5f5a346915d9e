#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Filter grammar integration tests.
//!
//! Round-trips, parameter merging, and the documented request scenarios
//! from parser through query builder.

use datagateway::error::GatewayError;
use datagateway::filter::{merge_individual_params, parse_filter, parse_filter_str, Filter};
use datagateway::query::{IcatQueryBuilder, QueryBuilder};
use serde_json::json;

// -------------------------------------------------------------------------
// Round trips
// -------------------------------------------------------------------------

#[test]
fn parse_serialize_parse_is_identity() {
    let fixtures = [
        json!({}),
        json!({"limit": 10}),
        json!({"where": {"title": {"like": "dog%"}}}),
        json!({"where": {"and": [{"id": {"gt": 1}}, {"id": {"lte": 100}}]}}),
        json!({"where": {"or": [
            {"name": {"in": ["a", "b"]}},
            {"fileSize": {"between": [10, 20]}}
        ]}}),
        json!({"include": ["type", {"relation": "datasets",
                "scope": {"where": {"complete": true}, "include": ["datafiles"]}}]}),
        json!({"order": ["name desc", "id"], "skip": 5, "limit": 2}),
        json!({"distinct": ["title", "doi"]}),
    ];

    for fixture in fixtures {
        let first = parse_filter(&fixture).unwrap();
        let serialized = serde_json::to_value(&first).unwrap();
        let second = parse_filter(&serialized).unwrap();
        assert_eq!(first, second, "round-trip changed {fixture}");
    }
}

#[test]
fn deserialize_uses_the_parser() {
    let filter: Filter =
        serde_json::from_str(r#"{"where": {"title": "A"}, "limit": 3}"#).unwrap();
    assert_eq!(filter.limit, Some(3));
    assert!(filter.where_clause.is_some());

    let err = serde_json::from_str::<Filter>(r#"{"bogus": 1}"#).unwrap_err();
    assert!(err.to_string().contains("bogus"));
}

// -------------------------------------------------------------------------
// Query parameter merging
// -------------------------------------------------------------------------

#[test]
fn individual_parameters_override_filter_json() {
    let params = vec![
        (
            "filter".to_string(),
            r#"{"where": {"title": "A"}, "limit": 100, "skip": 50}"#.to_string(),
        ),
        ("limit".to_string(), "2".to_string()),
        ("skip".to_string(), "0".to_string()),
    ];

    let merged = merge_individual_params(&params).unwrap();
    let filter = parse_filter(&merged).unwrap();

    assert_eq!(filter.limit, Some(2));
    assert_eq!(filter.skip, Some(0));
    assert!(filter.where_clause.is_some());
}

#[test]
fn repeated_order_parameters_accumulate() {
    let params = vec![
        ("order".to_string(), "name desc".to_string()),
        ("order".to_string(), "id".to_string()),
    ];

    let merged = merge_individual_params(&params).unwrap();
    let filter = parse_filter(&merged).unwrap();
    assert_eq!(filter.order.len(), 2);
    assert_eq!(filter.order[0].field, "name");
    assert_eq!(filter.order[1].field, "id");
}

// -------------------------------------------------------------------------
// Documented scenarios
// -------------------------------------------------------------------------

#[test]
fn investigations_like_with_limit_builds_the_documented_query() {
    // GET /datagateway-api/Investigations?where={"title":{"like":"dog%"}}&limit=2
    let params = vec![
        ("where".to_string(), r#"{"title":{"like":"dog%"}}"#.to_string()),
        ("limit".to_string(), "2".to_string()),
    ];
    let merged = merge_individual_params(&params).unwrap();
    let filter = parse_filter(&merged).unwrap();

    let built = IcatQueryBuilder.build("Investigations", &filter).unwrap();
    assert_eq!(
        built.query,
        "SELECT o FROM Investigation o WHERE o.title LIKE 'dog%' LIMIT 0, 2"
    );
}

#[test]
fn malformed_between_is_a_400_naming_the_node() {
    let err = parse_filter_str(r#"{"where":{"size":{"between":[5]}}}"#).unwrap_err();

    let gateway_err: GatewayError = err.into();
    assert_eq!(gateway_err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    assert!(gateway_err.to_string().contains("where.size.between"));
}
