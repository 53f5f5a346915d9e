//! HTTP route handlers.

pub mod entities;
pub mod health;
pub mod search;
pub mod session;

use axum::http::HeaderMap;

use crate::error::GatewayResult;
use crate::filter::{merge_individual_params, parse_filter, Filter};

/// Build the request filter from query parameters: the JSON `filter`
/// parameter merged with any individual `where`/`limit`/`skip`/`order`/
/// `include`/`distinct` parameters, individual ones winning.
pub(crate) fn filter_from_params(params: &[(String, String)]) -> GatewayResult<Filter> {
    let merged = merge_individual_params(params)?;
    Ok(parse_filter(&merged)?)
}

/// Count endpoints accept `where` (or a `filter` carrying only `where`);
/// everything else in the query string is ignored.
pub(crate) fn where_from_params(params: &[(String, String)]) -> GatewayResult<Filter> {
    let filter = filter_from_params(params)?;
    Ok(Filter {
        where_clause: filter.where_clause,
        ..Filter::default()
    })
}

/// Session token from the `Authorization: Bearer <id>` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert!(bearer_token(&headers).is_none());

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc-123"),
        );
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc-123"));

        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcg=="),
        );
        assert!(bearer_token(&headers).is_none());
    }

    #[test]
    fn where_params_drop_everything_else() {
        let params = vec![
            ("where".to_string(), r#"{"title": "A"}"#.to_string()),
            ("limit".to_string(), "5".to_string()),
        ];
        let filter = where_from_params(&params).unwrap();
        assert!(filter.where_clause.is_some());
        assert!(filter.limit.is_none());
    }
}
