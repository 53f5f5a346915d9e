//! Search filter rewrite.
//!
//! Translates a filter phrased in the Search schema into one phrased in the
//! catalogue schema: field paths are replaced segment-by-segment via the
//! mapping (one Search segment may expand to several catalogue segments),
//! includes become the catalogue chain reaching the mapped entity with
//! intermediate relations added transparently, and date literals are
//! normalised to the catalogue's accepted form. Catalogue relations backing
//! non-related Search fields are included implicitly so reshape always finds
//! its inputs.

use std::collections::BTreeSet;

use chrono::DateTime;

use super::mapping::{EntityMapping, FieldMapping, SearchMapping};
use crate::filter::{Filter, FilterError, FilterValue, IncludeSpec, OrderSpec, ScopedFilter, WhereExpr};

/// Rewrite `filter` from Search entity `entity` onto the catalogue schema.
///
/// Returns the catalogue root entity and the rewritten filter.
pub fn rewrite_filter(
    mapping: &SearchMapping,
    entity: &str,
    filter: &Filter,
) -> Result<(String, Filter), FilterError> {
    let em = lookup(mapping, entity, "entity")?;

    let mut rewritten = Filter {
        limit: filter.limit,
        skip: filter.skip,
        ..Filter::default()
    };

    if let Some(expr) = &filter.where_clause {
        rewritten.where_clause = Some(rewrite_where(mapping, entity, em, expr, "where")?);
    }

    rewritten.include = rewrite_includes(mapping, entity, em, &filter.include, "include")?;
    rewritten.include.extend(implicit_includes(em));

    for spec in &filter.order {
        let err_path = format!("order.{}", spec.field);
        let segs = rewrite_field_path(mapping, entity, em, &spec.field, &err_path, false)?;
        rewritten.order.push(OrderSpec {
            field: segs.join("."),
            direction: spec.direction,
        });
    }

    for field in &filter.distinct {
        let err_path = format!("distinct.{field}");
        let segs = rewrite_field_path(mapping, entity, em, field, &err_path, false)?;
        rewritten.distinct.push(segs.join("."));
    }

    Ok((em.base_icat_entity.clone(), rewritten))
}

fn lookup<'a>(
    mapping: &'a SearchMapping,
    entity: &str,
    err_path: &str,
) -> Result<&'a EntityMapping, FilterError> {
    mapping.entity(entity).ok_or_else(|| FilterError {
        path: err_path.to_string(),
        message: format!("unknown Search entity '{entity}'"),
    })
}

fn rewrite_where(
    mapping: &SearchMapping,
    entity: &str,
    em: &EntityMapping,
    expr: &WhereExpr,
    err_prefix: &str,
) -> Result<WhereExpr, FilterError> {
    match expr {
        WhereExpr::And(children) => Ok(WhereExpr::And(
            children
                .iter()
                .map(|c| rewrite_where(mapping, entity, em, c, err_prefix))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        WhereExpr::Or(children) => Ok(WhereExpr::Or(
            children
                .iter()
                .map(|c| rewrite_where(mapping, entity, em, c, err_prefix))
                .collect::<Result<Vec<_>, _>>()?,
        )),
        WhereExpr::Cmp { field, op, value } => {
            let err_path = format!("{err_prefix}.{field}");
            // `text` may stop at a relation: the query builder then expands
            // it over the mapped entity's text-searchable attributes.
            let allow_relation = *op == crate::filter::Comparator::Text;
            let segs = rewrite_field_path(mapping, entity, em, field, &err_path, allow_relation)?;
            Ok(WhereExpr::Cmp {
                field: segs.join("."),
                op: *op,
                value: normalise_value(value.clone()),
            })
        }
    }
}

/// Replace each Search path segment with its catalogue counterpart.
fn rewrite_field_path(
    mapping: &SearchMapping,
    entity: &str,
    em: &EntityMapping,
    field: &str,
    err_path: &str,
    allow_relation_terminal: bool,
) -> Result<Vec<String>, FilterError> {
    let mut current_name = entity.to_string();
    let mut current = em;
    let mut out = Vec::new();

    let segments: Vec<&str> = field.split('.').collect();
    for (idx, segment) in segments.iter().enumerate() {
        let last = idx + 1 == segments.len();

        if let Some(rm) = current.relations.get(*segment) {
            out.extend(rm.path.iter().cloned());
            current_name = rm.entity.clone();
            current = lookup(mapping, &rm.entity, err_path)?;
            if last {
                if allow_relation_terminal {
                    return Ok(out);
                }
                return Err(FilterError {
                    path: err_path.to_string(),
                    message: format!("path must end at a field, not relation '{segment}'"),
                });
            }
        } else if let Some(fm) = current.fields.get(*segment) {
            if !last {
                return Err(FilterError {
                    path: err_path.to_string(),
                    message: format!("cannot traverse field '{segment}'"),
                });
            }
            match fm {
                FieldMapping::Path(path) => {
                    out.extend(path.iter().cloned());
                    return Ok(out);
                }
                FieldMapping::All => {
                    return Err(FilterError {
                        path: err_path.to_string(),
                        message: format!("field '{segment}' is not filterable"),
                    });
                }
                FieldMapping::Const(_) => {
                    return Err(FilterError {
                        path: err_path.to_string(),
                        message: format!("field '{segment}' is constant and cannot be filtered"),
                    });
                }
            }
        } else {
            return Err(FilterError {
                path: err_path.to_string(),
                message: format!("unknown field '{segment}' on Search entity {current_name}"),
            });
        }
    }

    unreachable!("split always yields at least one segment")
}

/// Translate Search includes into catalogue include chains; the scoped
/// filter (rewritten in the target entity's terms) attaches at the chain's
/// innermost relation.
fn rewrite_includes(
    mapping: &SearchMapping,
    entity: &str,
    em: &EntityMapping,
    specs: &[IncludeSpec],
    err_prefix: &str,
) -> Result<Vec<IncludeSpec>, FilterError> {
    let mut out = Vec::with_capacity(specs.len());
    for spec in specs {
        let err_path = format!("{err_prefix}.{}", spec.relation);
        let Some(rm) = em.relations.get(&spec.relation) else {
            return Err(FilterError {
                path: err_path,
                message: format!(
                    "unknown relation '{}' on Search entity {entity}",
                    spec.relation
                ),
            });
        };
        let target = lookup(mapping, &rm.entity, &err_path)?;

        let mut innermost = ScopedFilter::default();
        if let Some(scope) = &spec.scope {
            if let Some(expr) = &scope.where_clause {
                let scope_err = format!("{err_path}.scope.where");
                innermost.where_clause =
                    Some(rewrite_where(mapping, &rm.entity, target, expr, &scope_err)?);
            }
            let nested_err = format!("{err_path}.scope.include");
            innermost.include =
                rewrite_includes(mapping, &rm.entity, target, &scope.include, &nested_err)?;
        }
        // The target's non-related fields may live across further catalogue
        // relations; include those transparently.
        innermost.include.extend(implicit_includes(target));

        out.push(build_chain(&rm.path, innermost));
    }
    Ok(out)
}

/// Nest a catalogue relation chain into include specs, innermost last.
fn build_chain(path: &[String], innermost: ScopedFilter) -> IncludeSpec {
    let scope = if innermost.where_clause.is_none() && innermost.include.is_empty() {
        None
    } else {
        Some(innermost)
    };

    let mut iter = path.iter().rev();
    let mut spec = IncludeSpec {
        relation: iter.next().cloned().unwrap_or_default(),
        scope,
    };
    for segment in iter {
        spec = IncludeSpec {
            relation: segment.clone(),
            scope: Some(ScopedFilter {
                where_clause: None,
                include: vec![spec],
            }),
        };
    }
    spec
}

/// Catalogue relations backing this entity's own (non-related) fields, as
/// include chains. `Document.keywords -> keywords.name` needs the
/// `keywords` relation expanded before reshape can project it.
fn implicit_includes(em: &EntityMapping) -> Vec<IncludeSpec> {
    let mut prefixes = BTreeSet::new();
    for fm in em.fields.values() {
        if let FieldMapping::Path(path) = fm {
            if path.len() > 1 {
                prefixes.insert(path[..path.len() - 1].to_vec());
            }
        }
    }
    prefixes
        .into_iter()
        .map(|prefix| build_chain(&prefix, ScopedFilter::default()))
        .collect()
}

/// Date strings are normalised to the catalogue's accepted ISO-8601 form;
/// everything else passes through unchanged.
fn normalise_value(value: FilterValue) -> FilterValue {
    match value {
        FilterValue::String(s) => match DateTime::parse_from_rfc3339(&s) {
            Ok(dt) => FilterValue::String(
                dt.naive_utc().format("%Y-%m-%d %H:%M:%S").to_string(),
            ),
            Err(_) => FilterValue::String(s),
        },
        FilterValue::List(items) => {
            FilterValue::List(items.into_iter().map(normalise_value).collect())
        }
        other => other,
    }
}
