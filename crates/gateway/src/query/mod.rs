//! Query building.
//!
//! Renders the typed filter model into a backend query. The catalogue
//! builder lives in [`icat`]; the trait keeps the filter contract shared
//! with any alternative backend.

pub mod icat;

pub use icat::IcatQueryBuilder;

use crate::filter::{Filter, FilterError};

/// A rendered query plus the relation paths it eagerly expands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltQuery {
    /// The backend query string.
    pub query: String,

    /// Dotted relation paths covered by INCLUDE, in alias order.
    pub includes: Vec<String>,
}

/// Renders filters for one backend.
pub trait QueryBuilder: Send + Sync {
    /// Build the data query for `root` restricted by `filter`.
    fn build(&self, root: &str, filter: &Filter) -> Result<BuiltQuery, FilterError>;

    /// Build the matching aggregate count query.
    fn build_count(&self, root: &str, filter: &Filter) -> Result<BuiltQuery, FilterError>;
}
