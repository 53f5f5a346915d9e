//! Filter parser.
//!
//! Decodes the stringified-JSON filter grammar into the typed [`Filter`]
//! model. Errors carry a dotted path to the offending node (`where.size.
//! between`) so clients can locate the problem. Field paths are *not*
//! validated against the entity schema here; the query builder resolves
//! them in a single pass over the descriptor.

use serde_json::Value;

use super::{
    Comparator, Direction, Filter, FilterValue, IncludeSpec, OrderSpec, ScopedFilter, WhereExpr,
};
use crate::error::GatewayError;

/// A rejected filter, with the dotted path of the node that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterError {
    pub path: String,
    pub message: String,
}

impl FilterError {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        FilterError {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FilterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

impl std::error::Error for FilterError {}

impl From<FilterError> for GatewayError {
    fn from(err: FilterError) -> Self {
        GatewayError::BadFilter {
            path: err.path,
            message: err.message,
        }
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{path}.{segment}")
    }
}

/// Parse a filter from its JSON text form.
pub fn parse_filter_str(input: &str) -> Result<Filter, FilterError> {
    let value: Value = serde_json::from_str(input)
        .map_err(|e| FilterError::new("filter", format!("invalid JSON: {e}")))?;
    parse_filter(&value)
}

/// Parse a filter from a decoded JSON value.
pub fn parse_filter(value: &Value) -> Result<Filter, FilterError> {
    let Value::Object(map) = value else {
        return Err(FilterError::new("filter", "expected a JSON object"));
    };

    let mut filter = Filter::default();
    for (key, v) in map {
        match key.as_str() {
            "where" => filter.where_clause = Some(parse_where(v, "where")?),
            "include" => filter.include = parse_include(v, "include")?,
            "limit" => filter.limit = Some(parse_non_negative(v, "limit")?),
            "skip" => filter.skip = Some(parse_non_negative(v, "skip")?),
            "order" => filter.order = parse_order(v, "order")?,
            "distinct" => filter.distinct = parse_distinct(v, "distinct")?,
            other => {
                return Err(FilterError::new(other, "unrecognised filter key"));
            }
        }
    }
    Ok(filter)
}

/// Merge the `filter` query parameter with any individual
/// `where`/`include`/`limit`/`skip`/`order`/`distinct` parameters into a
/// single JSON object ready for [`parse_filter`].
///
/// Individual parameters override the like-named key of the JSON `filter`
/// object; a repeated `order` parameter accumulates into a list. Parameter
/// values that are not valid JSON are treated as plain strings, so
/// `order=name desc` works without quoting.
pub fn merge_individual_params(pairs: &[(String, String)]) -> Result<Value, FilterError> {
    let mut merged = serde_json::Map::new();

    for (_, raw) in pairs.iter().filter(|(k, _)| k == "filter") {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| FilterError::new("filter", format!("invalid JSON: {e}")))?;
        let Value::Object(map) = value else {
            return Err(FilterError::new("filter", "expected a JSON object"));
        };
        merged.extend(map);
    }

    let mut order_values = Vec::new();
    for (key, raw) in pairs {
        let key = key.as_str();
        if !matches!(
            key,
            "where" | "include" | "limit" | "skip" | "order" | "distinct"
        ) {
            continue;
        }
        let value =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        if key == "order" {
            order_values.push(value);
        } else {
            merged.insert(key.to_string(), value);
        }
    }

    match order_values.len() {
        0 => {}
        1 => {
            merged.insert("order".to_string(), order_values.remove(0));
        }
        _ => {
            merged.insert("order".to_string(), Value::Array(order_values));
        }
    }

    Ok(Value::Object(merged))
}

// ---------------------------------------------------------------------------
// where
// ---------------------------------------------------------------------------

fn parse_where(value: &Value, path: &str) -> Result<WhereExpr, FilterError> {
    match value {
        // Legacy shape: a list of {field: value} objects is an implicit AND.
        Value::Array(items) => {
            if items.is_empty() {
                return Err(FilterError::new(path, "expected at least one condition"));
            }
            let mut children = Vec::with_capacity(items.len());
            for item in items {
                children.push(parse_where(item, path)?);
            }
            Ok(flatten_and(children))
        }
        Value::Object(map) => parse_where_object(map, path),
        _ => Err(FilterError::new(path, "expected an object or array")),
    }
}

fn parse_where_object(
    map: &serde_json::Map<String, Value>,
    path: &str,
) -> Result<WhereExpr, FilterError> {
    if map.is_empty() {
        return Err(FilterError::new(path, "expected at least one condition"));
    }

    // A lone "and"/"or" key is a compound node.
    if map.len() == 1 {
        let (key, v) = map.iter().next().ok_or_else(|| {
            FilterError::new(path, "expected at least one condition")
        })?;
        if key == "and" || key == "or" {
            let node_path = join(path, key);
            let Value::Array(items) = v else {
                return Err(FilterError::new(node_path, "requires an array of conditions"));
            };
            if items.is_empty() {
                return Err(FilterError::new(node_path, "requires a non-empty array"));
            }
            let mut children = Vec::with_capacity(items.len());
            for item in items {
                children.push(parse_where(item, &node_path)?);
            }
            return Ok(if key == "and" {
                WhereExpr::And(children)
            } else {
                WhereExpr::Or(children)
            });
        }
    }

    // Otherwise every key is a field path; the object is a conjunction of
    // per-field clauses.
    let mut clauses = Vec::new();
    for (field, v) in map {
        if field == "and" || field == "or" {
            return Err(FilterError::new(
                join(path, field),
                "boolean operators must be the only key of their node",
            ));
        }
        let field_path = join(path, field);
        match v {
            Value::Object(ops) => {
                if ops.is_empty() {
                    return Err(FilterError::new(field_path, "expected an operator"));
                }
                for (op_name, op_value) in ops {
                    let op_path = join(&field_path, op_name);
                    let Some(op) = Comparator::from_name(op_name) else {
                        return Err(FilterError::new(op_path, "unrecognised operator"));
                    };
                    let value = parse_operand(op, op_value, &op_path)?;
                    clauses.push(WhereExpr::Cmp {
                        field: field.clone(),
                        op,
                        value,
                    });
                }
            }
            Value::Array(_) => {
                return Err(FilterError::new(
                    field_path,
                    "arrays require an explicit operator such as in or between",
                ));
            }
            Value::Null => {
                return Err(FilterError::new(field_path, "null is not a valid literal"));
            }
            scalar => {
                // Implicit equality.
                clauses.push(WhereExpr::Cmp {
                    field: field.clone(),
                    op: Comparator::Eq,
                    value: scalar_value(scalar, &field_path)?,
                });
            }
        }
    }

    Ok(flatten_and(clauses))
}

fn flatten_and(mut clauses: Vec<WhereExpr>) -> WhereExpr {
    if clauses.len() == 1 {
        clauses.remove(0)
    } else {
        WhereExpr::And(clauses)
    }
}

/// Validate the operand shape against the operator and convert it.
fn parse_operand(op: Comparator, value: &Value, path: &str) -> Result<FilterValue, FilterError> {
    match op {
        Comparator::Between => {
            let Value::Array(items) = value else {
                return Err(FilterError::new(path, "requires an array of exactly two elements"));
            };
            if items.len() != 2 {
                return Err(FilterError::new(path, "requires an array of exactly two elements"));
            }
            let list = items
                .iter()
                .map(|v| scalar_value(v, path))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(FilterValue::List(list))
        }
        Comparator::In | Comparator::Nin => {
            let Value::Array(items) = value else {
                return Err(FilterError::new(path, "requires an array of values"));
            };
            if items.is_empty() {
                return Err(FilterError::new(path, "requires a non-empty array"));
            }
            let list = items
                .iter()
                .map(|v| scalar_value(v, path))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(FilterValue::List(list))
        }
        Comparator::Like
        | Comparator::Nlike
        | Comparator::Ilike
        | Comparator::Nilike
        | Comparator::Regexp
        | Comparator::Text => match value {
            Value::String(s) => Ok(FilterValue::String(s.clone())),
            _ => Err(FilterError::new(path, "accepts only a string")),
        },
        _ => scalar_value(value, path),
    }
}

fn scalar_value(value: &Value, path: &str) -> Result<FilterValue, FilterError> {
    match value {
        Value::String(s) => Ok(FilterValue::String(s.clone())),
        Value::Bool(b) => Ok(FilterValue::Boolean(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(FilterValue::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(FilterValue::Float(f))
            } else {
                Err(FilterError::new(path, "number out of range"))
            }
        }
        Value::Null => Err(FilterError::new(path, "null is not a valid literal")),
        _ => Err(FilterError::new(path, "expected a scalar literal")),
    }
}

// ---------------------------------------------------------------------------
// include
// ---------------------------------------------------------------------------

fn parse_include(value: &Value, path: &str) -> Result<Vec<IncludeSpec>, FilterError> {
    match value {
        Value::String(relation) => Ok(vec![IncludeSpec::bare(relation.clone())]),
        Value::Object(_) => Ok(vec![parse_include_spec(value, path)?]),
        Value::Array(items) => {
            let mut specs = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                let item_path = join(path, &idx.to_string());
                match item {
                    Value::String(relation) => specs.push(IncludeSpec::bare(relation.clone())),
                    Value::Object(_) => specs.push(parse_include_spec(item, &item_path)?),
                    _ => {
                        return Err(FilterError::new(
                            item_path,
                            "expected a relation name or expansion object",
                        ))
                    }
                }
            }
            Ok(specs)
        }
        _ => Err(FilterError::new(
            path,
            "expected a relation name, expansion object, or array",
        )),
    }
}

fn parse_include_spec(value: &Value, path: &str) -> Result<IncludeSpec, FilterError> {
    let Value::Object(map) = value else {
        return Err(FilterError::new(path, "expected an expansion object"));
    };

    let mut relation = None;
    let mut scope = None;
    for (key, v) in map {
        match key.as_str() {
            "relation" => match v {
                Value::String(name) => relation = Some(name.clone()),
                _ => {
                    return Err(FilterError::new(
                        join(path, "relation"),
                        "expected a relation name",
                    ))
                }
            },
            "scope" => scope = Some(parse_scope(v, &join(path, "scope"))?),
            other => {
                return Err(FilterError::new(join(path, other), "unrecognised include key"));
            }
        }
    }

    let Some(relation) = relation else {
        return Err(FilterError::new(path, "expansion object requires a relation"));
    };
    Ok(IncludeSpec { relation, scope })
}

fn parse_scope(value: &Value, path: &str) -> Result<ScopedFilter, FilterError> {
    let Value::Object(map) = value else {
        return Err(FilterError::new(path, "expected a scope object"));
    };

    let mut scope = ScopedFilter::default();
    for (key, v) in map {
        match key.as_str() {
            "where" => scope.where_clause = Some(parse_where(v, &join(path, "where"))?),
            "include" => scope.include = parse_include(v, &join(path, "include"))?,
            other => {
                return Err(FilterError::new(join(path, other), "unrecognised scope key"));
            }
        }
    }
    Ok(scope)
}

// ---------------------------------------------------------------------------
// limit / skip / order / distinct
// ---------------------------------------------------------------------------

fn parse_non_negative(value: &Value, path: &str) -> Result<u64, FilterError> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .ok_or_else(|| FilterError::new(path, "must be a non-negative integer")),
        _ => Err(FilterError::new(path, "must be a non-negative integer")),
    }
}

fn parse_order(value: &Value, path: &str) -> Result<Vec<OrderSpec>, FilterError> {
    match value {
        Value::String(s) => Ok(vec![parse_order_str(s, path)?]),
        Value::Array(items) => {
            let mut specs = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                let item_path = join(path, &idx.to_string());
                match item {
                    Value::String(s) => specs.push(parse_order_str(s, &item_path)?),
                    Value::Array(pair) => specs.push(parse_order_pair(pair, &item_path)?),
                    _ => {
                        return Err(FilterError::new(
                            item_path,
                            "expected \"field direction\" or [field, direction]",
                        ))
                    }
                }
            }
            Ok(specs)
        }
        _ => Err(FilterError::new(path, "expected a string or array")),
    }
}

fn parse_order_str(input: &str, path: &str) -> Result<OrderSpec, FilterError> {
    let mut parts = input.split_whitespace();
    let Some(field) = parts.next() else {
        return Err(FilterError::new(path, "expected a field name"));
    };
    let direction = match parts.next() {
        None => Direction::Asc,
        Some(dir) => parse_direction(dir, path)?,
    };
    if parts.next().is_some() {
        return Err(FilterError::new(path, "expected \"field direction\""));
    }
    Ok(OrderSpec {
        field: field.to_string(),
        direction,
    })
}

fn parse_order_pair(pair: &[Value], path: &str) -> Result<OrderSpec, FilterError> {
    let [Value::String(field), Value::String(dir)] = pair else {
        return Err(FilterError::new(path, "expected [field, direction]"));
    };
    Ok(OrderSpec {
        field: field.clone(),
        direction: parse_direction(dir, path)?,
    })
}

fn parse_direction(input: &str, path: &str) -> Result<Direction, FilterError> {
    match input.to_ascii_lowercase().as_str() {
        "asc" => Ok(Direction::Asc),
        "desc" => Ok(Direction::Desc),
        _ => Err(FilterError::new(path, "direction must be asc or desc")),
    }
}

fn parse_distinct(value: &Value, path: &str) -> Result<Vec<String>, FilterError> {
    match value {
        Value::String(field) => Ok(vec![field.clone()]),
        Value::Array(items) => {
            let mut fields = Vec::with_capacity(items.len());
            for (idx, item) in items.iter().enumerate() {
                match item {
                    Value::String(field) => fields.push(field.clone()),
                    _ => {
                        return Err(FilterError::new(
                            join(path, &idx.to_string()),
                            "expected a field name",
                        ))
                    }
                }
            }
            Ok(fields)
        }
        _ => Err(FilterError::new(path, "expected a field name or array")),
    }
}
