//! DataGateway library.
//!
//! This library exposes the gateway internals for integration testing.
//! The entry point for running the server is the `datagateway` binary.

pub mod catalogue;
pub mod client;
pub mod config;
pub mod error;
pub mod filter;
pub mod query;
pub mod routes;
pub mod schema;
pub mod search;
pub mod state;

use axum::Router;

use crate::state::AppState;

/// Assemble the full application router: the DataGateway surface under
/// `/datagateway-api`, the Search surface under `/search-api`, sessions and
/// health at the root, all optionally nested under the configured URL
/// extension.
pub fn app_router(extension: &str) -> Router<AppState> {
    let api = Router::new()
        .nest("/datagateway-api", routes::entities::router())
        .nest("/search-api", routes::search::router())
        .merge(routes::session::router())
        .merge(routes::health::router());

    if extension.is_empty() {
        api
    } else {
        Router::new().nest(extension, api)
    }
}
