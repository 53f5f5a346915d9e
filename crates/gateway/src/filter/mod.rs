//! Filter model.
//!
//! Typed representation of the LoopBack-style filter grammar carried by the
//! `filter` query parameter: a where-expression tree, relation expansions
//! with scoped filters, paging, ordering and distinct projection.

mod parser;

pub use parser::{merge_individual_params, parse_filter, parse_filter_str, FilterError};

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

/// A complete filter: every part is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    /// Boolean expression restricting the result set.
    pub where_clause: Option<WhereExpr>,

    /// Relations to eagerly expand, in request order.
    pub include: Vec<IncludeSpec>,

    /// Maximum number of records to return.
    pub limit: Option<u64>,

    /// Records to skip before the first returned one.
    pub skip: Option<u64>,

    /// Sort specification, in request order.
    pub order: Vec<OrderSpec>,

    /// When non-empty, project the result to exactly these fields.
    pub distinct: Vec<String>,
}

impl Filter {
    /// True when no part of the filter is set.
    pub fn is_empty(&self) -> bool {
        self.where_clause.is_none()
            && self.include.is_empty()
            && self.limit.is_none()
            && self.skip.is_none()
            && self.order.is_empty()
            && self.distinct.is_empty()
    }

    /// Conjoin an extra condition onto the existing where clause.
    pub fn and_where(&mut self, expr: WhereExpr) {
        self.where_clause = Some(match self.where_clause.take() {
            None => expr,
            Some(WhereExpr::And(mut children)) => {
                children.push(expr);
                WhereExpr::And(children)
            }
            Some(existing) => WhereExpr::And(vec![existing, expr]),
        });
    }
}

/// Boolean expression tree for `where`.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereExpr {
    And(Vec<WhereExpr>),
    Or(Vec<WhereExpr>),
    Cmp {
        /// Dotted field path, possibly crossing relations.
        field: String,
        op: Comparator,
        value: FilterValue,
    },
}

impl WhereExpr {
    /// Convenience constructor for an equality leaf.
    pub fn eq(field: impl Into<String>, value: FilterValue) -> Self {
        WhereExpr::Cmp {
            field: field.into(),
            op: Comparator::Eq,
            value,
        }
    }
}

/// Comparison operators accepted in `where` leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    Nlike,
    Ilike,
    Nilike,
    In,
    Nin,
    Between,
    Regexp,
    Text,
}

impl Comparator {
    /// Parse the lowercase wire name of an operator.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "eq" => Comparator::Eq,
            "neq" => Comparator::Neq,
            "gt" => Comparator::Gt,
            "gte" => Comparator::Gte,
            "lt" => Comparator::Lt,
            "lte" => Comparator::Lte,
            "like" => Comparator::Like,
            "nlike" => Comparator::Nlike,
            "ilike" => Comparator::Ilike,
            "nilike" => Comparator::Nilike,
            "in" => Comparator::In,
            "nin" => Comparator::Nin,
            "between" => Comparator::Between,
            "regexp" => Comparator::Regexp,
            "text" => Comparator::Text,
            _ => return None,
        })
    }

    /// Lowercase wire name of the operator.
    pub fn name(&self) -> &'static str {
        match self {
            Comparator::Eq => "eq",
            Comparator::Neq => "neq",
            Comparator::Gt => "gt",
            Comparator::Gte => "gte",
            Comparator::Lt => "lt",
            Comparator::Lte => "lte",
            Comparator::Like => "like",
            Comparator::Nlike => "nlike",
            Comparator::Ilike => "ilike",
            Comparator::Nilike => "nilike",
            Comparator::In => "in",
            Comparator::Nin => "nin",
            Comparator::Between => "between",
            Comparator::Regexp => "regexp",
            Comparator::Text => "text",
        }
    }
}

/// Literal values in `where` leaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    List(Vec<FilterValue>),
}

impl FilterValue {
    /// String content, if this is a string literal.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FilterValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// List content, if this is an array literal.
    pub fn as_list(&self) -> Option<&[FilterValue]> {
        match self {
            FilterValue::List(items) => Some(items),
            _ => None,
        }
    }
}

/// A relation expansion, optionally narrowed by a scoped filter.
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeSpec {
    /// Relation name on the parent entity.
    pub relation: String,

    /// Filter applied to the expanded rows only.
    pub scope: Option<ScopedFilter>,
}

impl IncludeSpec {
    /// An expansion without a scope.
    pub fn bare(relation: impl Into<String>) -> Self {
        IncludeSpec {
            relation: relation.into(),
            scope: None,
        }
    }
}

/// The filter allowed inside an include scope: `where` and nested `include`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScopedFilter {
    pub where_clause: Option<WhereExpr>,
    pub include: Vec<IncludeSpec>,
}

/// One `(field, direction)` element of `order`.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSpec {
    pub field: String,
    pub direction: Direction,
}

/// Sort direction; ascending when unspecified.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

// ---------------------------------------------------------------------------
// Serialization
//
// The canonical wire form: `where` leaves always carry an explicit operator
// object, `order` elements render as "field direction" strings, includes as
// `{relation, scope?}` objects. The parser accepts exactly this form (plus
// the shorthands), so serialize/parse round-trips.
// ---------------------------------------------------------------------------

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(w) = &self.where_clause {
            map.serialize_entry("where", w)?;
        }
        if !self.include.is_empty() {
            map.serialize_entry("include", &self.include)?;
        }
        if let Some(limit) = self.limit {
            map.serialize_entry("limit", &limit)?;
        }
        if let Some(skip) = self.skip {
            map.serialize_entry("skip", &skip)?;
        }
        if !self.order.is_empty() {
            map.serialize_entry("order", &self.order)?;
        }
        if !self.distinct.is_empty() {
            map.serialize_entry("distinct", &self.distinct)?;
        }
        map.end()
    }
}

impl Serialize for WhereExpr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            WhereExpr::And(children) => map.serialize_entry("and", children)?,
            WhereExpr::Or(children) => map.serialize_entry("or", children)?,
            WhereExpr::Cmp { field, op, value } => {
                let mut inner = serde_json::Map::new();
                inner.insert(
                    op.name().to_string(),
                    serde_json::to_value(value).map_err(serde::ser::Error::custom)?,
                );
                map.serialize_entry(field, &serde_json::Value::Object(inner))?;
            }
        }
        map.end()
    }
}

impl Serialize for IncludeSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("relation", &self.relation)?;
        if let Some(scope) = &self.scope {
            map.serialize_entry("scope", scope)?;
        }
        map.end()
    }
}

impl Serialize for ScopedFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(w) = &self.where_clause {
            map.serialize_entry("where", w)?;
        }
        if !self.include.is_empty() {
            map.serialize_entry("include", &self.include)?;
        }
        map.end()
    }
}

impl Serialize for OrderSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{} {}", self.field, self.direction.as_str()))
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        parse_filter(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_defaults_are_empty() {
        let filter = Filter::default();
        assert!(filter.is_empty());
        assert!(filter.where_clause.is_none());
        assert!(filter.order.is_empty());
    }

    #[test]
    fn and_where_builds_conjunction() {
        let mut filter = Filter::default();
        filter.and_where(WhereExpr::eq("name", FilterValue::String("a".into())));
        assert!(matches!(filter.where_clause, Some(WhereExpr::Cmp { .. })));

        filter.and_where(WhereExpr::eq("doi", FilterValue::String("b".into())));
        let Some(WhereExpr::And(children)) = &filter.where_clause else {
            panic!("expected conjunction");
        };
        assert_eq!(children.len(), 2);

        filter.and_where(WhereExpr::eq("id", FilterValue::Integer(1)));
        let Some(WhereExpr::And(children)) = &filter.where_clause else {
            panic!("expected conjunction");
        };
        assert_eq!(children.len(), 3);
    }

    #[test]
    fn comparator_names_round_trip() {
        for name in [
            "eq", "neq", "gt", "gte", "lt", "lte", "like", "nlike", "ilike", "nilike", "in", "nin",
            "between", "regexp", "text",
        ] {
            let op = Comparator::from_name(name).unwrap();
            assert_eq!(op.name(), name);
        }
        assert!(Comparator::from_name("matches").is_none());
    }

    #[test]
    fn where_serializes_with_explicit_operator() {
        let expr = WhereExpr::Cmp {
            field: "title".to_string(),
            op: Comparator::Like,
            value: FilterValue::String("dog%".to_string()),
        };
        let json = serde_json::to_value(&expr).unwrap();
        assert_eq!(json, serde_json::json!({"title": {"like": "dog%"}}));
    }

    #[test]
    fn order_serializes_as_string() {
        let spec = OrderSpec {
            field: "name".to_string(),
            direction: Direction::Desc,
        };
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json, serde_json::json!("name desc"));
    }
}
