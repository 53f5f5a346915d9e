//! Search API projection engine.
//!
//! The Search surface exposes a curated, denormalised schema (Dataset,
//! Document, Instrument, File, ...) whose fields are projected from
//! catalogue entities via a declarative mapping file. [`rewrite`] turns
//! Search-schema filters into catalogue-schema filters; [`reshape`] turns
//! catalogue rows back into Search-schema JSON.

pub mod mapping;
pub mod reshape;
pub mod rewrite;

pub use mapping::{EntityMapping, FieldMapping, RelationMapping, SearchMapping};
pub use reshape::reshape_record;
pub use rewrite::rewrite_filter;
