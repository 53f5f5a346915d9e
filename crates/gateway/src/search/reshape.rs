//! Search result reshape.
//!
//! Walks a catalogue row along the mapped paths to build the Search-schema
//! JSON object. Paths crossing a to-many relation produce arrays; a null
//! intermediate omits the field, unless it is declared required, in which
//! case the whole record is dropped. Requested relation expansions are
//! projected recursively; the walk refuses to re-enter an entity already on
//! the current projection path, so circular mappings terminate.

use serde_json::{Map, Value};

use super::mapping::{FieldMapping, SearchMapping};
use crate::filter::IncludeSpec;

/// Project one catalogue row into the Search schema for `entity`.
///
/// `includes` is the *Search-level* include list from the request; only
/// requested relations appear in the output. Returns `None` when a required
/// field is missing and the record must be dropped.
pub fn reshape_record(
    mapping: &SearchMapping,
    entity: &str,
    row: &Value,
    includes: &[IncludeSpec],
) -> Option<Value> {
    let mut visited = Vec::new();
    project(mapping, entity, row, includes, &mut visited)
}

fn project(
    mapping: &SearchMapping,
    entity: &str,
    row: &Value,
    includes: &[IncludeSpec],
    visited: &mut Vec<String>,
) -> Option<Value> {
    let em = mapping.entity(entity)?;
    let mut obj = Map::new();

    for (field, fm) in &em.fields {
        match fm {
            FieldMapping::Path(segments) => {
                if let Some(value) = walk_value(row, segments) {
                    obj.insert(field.clone(), value);
                }
            }
            FieldMapping::All => {
                obj.insert(field.clone(), row.clone());
            }
            FieldMapping::Const(constant) => {
                obj.insert(field.clone(), constant.clone());
            }
        }
    }

    for required in &em.required {
        if !obj.contains_key(required) {
            return None;
        }
    }

    visited.push(entity.to_string());
    for spec in includes {
        let Some(rm) = em.relations.get(&spec.relation) else {
            continue;
        };
        if visited.contains(&rm.entity) {
            continue;
        }

        let (values, many) = walk_relation(row, &rm.path);
        let nested = spec
            .scope
            .as_ref()
            .map(|s| s.include.as_slice())
            .unwrap_or(&[]);

        let projected: Vec<Value> = values
            .iter()
            .filter_map(|value| project(mapping, &rm.entity, value, nested, visited))
            .collect();

        if many {
            obj.insert(spec.relation.clone(), Value::Array(projected));
        } else if let Some(first) = projected.into_iter().next() {
            obj.insert(spec.relation.clone(), first);
        }
    }
    visited.pop();

    Some(Value::Object(obj))
}

/// Follow a mapped path through the row. Crossing an array maps the
/// remainder over its elements; a missing or null step yields `None`.
fn walk_value(value: &Value, segments: &[String]) -> Option<Value> {
    if segments.is_empty() {
        return match value {
            Value::Null => None,
            other => Some(other.clone()),
        };
    }

    match value {
        Value::Array(items) => {
            let collected: Vec<Value> = items
                .iter()
                .filter_map(|item| walk_value(item, segments))
                .collect();
            Some(Value::Array(collected))
        }
        Value::Object(map) => walk_value(map.get(&segments[0])?, &segments[1..]),
        _ => None,
    }
}

/// Follow a relation chain, collecting the reached objects and whether a
/// to-many hop was crossed (an empty included list still counts).
fn walk_relation(value: &Value, segments: &[String]) -> (Vec<Value>, bool) {
    if segments.is_empty() {
        return match value {
            Value::Null => (Vec::new(), false),
            other => (vec![other.clone()], false),
        };
    }

    match value {
        Value::Array(items) => {
            let mut collected = Vec::new();
            for item in items {
                let (values, _) = walk_relation(item, segments);
                collected.extend(values);
            }
            (collected, true)
        }
        Value::Object(map) => match map.get(&segments[0]) {
            Some(next) => walk_relation(next, &segments[1..]),
            None => (Vec::new(), false),
        },
        _ => (Vec::new(), false),
    }
}
