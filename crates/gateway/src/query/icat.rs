//! Catalogue query builder.
//!
//! Renders a [`Filter`] into the catalogue's JPQL-like query language:
//! `SELECT <projection> FROM <Entity> o <joins> <where> <order> <limit>
//! INCLUDE <aliases>`. The root entity is aliased `o`; joined relations get
//! stable aliases (`o1`, `o2`, ...) assigned by a depth-first walk of the
//! include tree, with implicit joins from `where`/`order` paths continuing
//! the numbering. Field paths are validated against the entity descriptors
//! here, in one pass.

use std::collections::HashMap;

use chrono::NaiveDateTime;

use super::{BuiltQuery, QueryBuilder};
use crate::filter::{Comparator, Filter, FilterError, FilterValue, IncludeSpec, WhereExpr};
use crate::schema::{descriptor, resolve_entity, EntityDescriptor};

/// Java int max: the catalogue's positional LIMIT needs an explicit count
/// even when the request only skips.
const MAX_RESULTS: u64 = 2_147_483_647;

/// Builder for the catalogue's query dialect.
#[derive(Debug, Default, Clone, Copy)]
pub struct IcatQueryBuilder;

impl QueryBuilder for IcatQueryBuilder {
    fn build(&self, root: &str, filter: &Filter) -> Result<BuiltQuery, FilterError> {
        let entity = resolve_root(root)?;
        let mut ctx = Context::new();

        // Include aliases first so where/order paths reuse them.
        ctx.walk_includes(entity, "o", "", &filter.include, "include")?;

        let mut conditions = Vec::new();
        if let Some(expr) = &filter.where_clause {
            ctx.push_conditions(entity, "o", "", expr, "where", &mut conditions)?;
        }
        conditions.extend(ctx.scope_conditions.drain(..));

        let mut order_terms = Vec::with_capacity(filter.order.len());
        for spec in &filter.order {
            let err_path = format!("order.{}", spec.field);
            let (alias, attr) = ctx.resolve_attribute(entity, "o", "", &spec.field, &err_path)?;
            order_terms.push(format!(
                "{alias}.{attr} {}",
                spec.direction.as_str().to_ascii_uppercase()
            ));
        }

        let projection = if filter.distinct.is_empty() {
            "o".to_string()
        } else {
            let mut fields = Vec::with_capacity(filter.distinct.len());
            for field in &filter.distinct {
                let err_path = format!("distinct.{field}");
                let (alias, attr) = ctx.resolve_attribute(entity, "o", "", field, &err_path)?;
                fields.push(format!("{alias}.{attr}"));
            }
            format!("DISTINCT {}", fields.join(", "))
        };

        let mut query = format!("SELECT {projection} FROM {} o", entity.name);
        for join in &ctx.joins {
            query.push(' ');
            query.push_str(join);
        }
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }
        if !order_terms.is_empty() {
            query.push_str(" ORDER BY ");
            query.push_str(&order_terms.join(", "));
        }
        match (filter.skip, filter.limit) {
            (skip, Some(limit)) => {
                query.push_str(&format!(" LIMIT {}, {limit}", skip.unwrap_or(0)));
            }
            (Some(skip), None) => {
                query.push_str(&format!(" LIMIT {skip}, {MAX_RESULTS}"));
            }
            (None, None) => {}
        }
        if !ctx.include_aliases.is_empty() {
            query.push_str(" INCLUDE ");
            query.push_str(&ctx.include_aliases.join(", "));
        }

        Ok(BuiltQuery {
            query,
            includes: ctx.include_paths,
        })
    }

    fn build_count(&self, root: &str, filter: &Filter) -> Result<BuiltQuery, FilterError> {
        let entity = resolve_root(root)?;
        let mut ctx = Context::new();

        let mut conditions = Vec::new();
        if let Some(expr) = &filter.where_clause {
            ctx.push_conditions(entity, "o", "", expr, "where", &mut conditions)?;
        }

        let projection = match filter.distinct.first() {
            None => "COUNT(o)".to_string(),
            Some(field) => {
                let err_path = format!("distinct.{field}");
                let (alias, attr) = ctx.resolve_attribute(entity, "o", "", field, &err_path)?;
                format!("COUNT(DISTINCT {alias}.{attr})")
            }
        };

        let mut query = format!("SELECT {projection} FROM {} o", entity.name);
        for join in &ctx.joins {
            query.push(' ');
            query.push_str(join);
        }
        if !conditions.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&conditions.join(" AND "));
        }

        Ok(BuiltQuery {
            query,
            includes: Vec::new(),
        })
    }
}

fn resolve_root(root: &str) -> Result<&'static EntityDescriptor, FilterError> {
    resolve_entity(root).ok_or_else(|| FilterError {
        path: "entity".to_string(),
        message: format!("unknown entity '{root}'"),
    })
}

/// Per-query rendering state: join aliases, INCLUDE bookkeeping, and the
/// conditions contributed by include scopes.
struct Context {
    aliases: HashMap<String, AliasInfo>,
    next_alias: usize,
    joins: Vec<String>,
    include_aliases: Vec<String>,
    include_paths: Vec<String>,
    scope_conditions: Vec<String>,
}

struct AliasInfo {
    alias: String,
    included: bool,
}

impl Context {
    fn new() -> Self {
        Context {
            aliases: HashMap::new(),
            next_alias: 1,
            joins: Vec::new(),
            include_aliases: Vec::new(),
            include_paths: Vec::new(),
            scope_conditions: Vec::new(),
        }
    }

    /// Alias for a dotted relation path, joining it on first use.
    fn ensure_alias(&mut self, path: &str, parent_alias: &str, relation: &str) -> String {
        if let Some(info) = self.aliases.get(path) {
            return info.alias.clone();
        }
        let alias = format!("o{}", self.next_alias);
        self.next_alias += 1;
        self.joins
            .push(format!("JOIN {parent_alias}.{relation} {alias}"));
        self.aliases.insert(
            path.to_string(),
            AliasInfo {
                alias: alias.clone(),
                included: false,
            },
        );
        alias
    }

    fn mark_included(&mut self, path: &str) {
        if let Some(info) = self.aliases.get_mut(path) {
            if !info.included {
                info.included = true;
                self.include_aliases.push(info.alias.clone());
                self.include_paths.push(path.to_string());
            }
        }
    }

    /// Depth-first include walk: assign aliases, record INCLUDE entries, and
    /// collect scoped-where conditions anchored on the relation's alias.
    fn walk_includes(
        &mut self,
        parent: &'static EntityDescriptor,
        parent_alias: &str,
        parent_path: &str,
        specs: &[IncludeSpec],
        err_prefix: &str,
    ) -> Result<(), FilterError> {
        for spec in specs {
            let err_path = format!("{err_prefix}.{}", spec.relation);
            let Some(relation) = parent.relation(&spec.relation) else {
                return Err(FilterError {
                    path: err_path,
                    message: format!(
                        "unknown relation '{}' on entity {}",
                        spec.relation, parent.name
                    ),
                });
            };
            let target = descriptor(relation.target).ok_or_else(|| FilterError {
                path: err_path.clone(),
                message: format!("relation target {} has no descriptor", relation.target),
            })?;

            let path = join_path(parent_path, relation.name);
            let alias = self.ensure_alias(&path, parent_alias, relation.name);
            self.mark_included(&path);

            if let Some(scope) = &spec.scope {
                if let Some(expr) = &scope.where_clause {
                    let scope_err = format!("{err_path}.scope.where");
                    let mut conditions = Vec::new();
                    self.push_conditions(target, &alias, &path, expr, &scope_err, &mut conditions)?;
                    self.scope_conditions.extend(conditions);
                }
                let nested_prefix = format!("{err_path}.scope.include");
                self.walk_includes(target, &alias, &path, &scope.include, &nested_prefix)?;
            }
        }
        Ok(())
    }

    /// Render a where tree into conditions. A top-level conjunction spreads
    /// into separate conditions so the final WHERE reads without redundant
    /// parentheses.
    fn push_conditions(
        &mut self,
        entity: &'static EntityDescriptor,
        alias: &str,
        prefix: &str,
        expr: &WhereExpr,
        err_prefix: &str,
        out: &mut Vec<String>,
    ) -> Result<(), FilterError> {
        match expr {
            WhereExpr::And(children) => {
                for child in children {
                    out.push(self.render_expr(entity, alias, prefix, child, err_prefix)?);
                }
            }
            other => out.push(self.render_expr(entity, alias, prefix, other, err_prefix)?),
        }
        Ok(())
    }

    fn render_expr(
        &mut self,
        entity: &'static EntityDescriptor,
        alias: &str,
        prefix: &str,
        expr: &WhereExpr,
        err_prefix: &str,
    ) -> Result<String, FilterError> {
        match expr {
            WhereExpr::And(children) => {
                let parts = children
                    .iter()
                    .map(|c| self.render_expr(entity, alias, prefix, c, err_prefix))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", parts.join(" AND ")))
            }
            WhereExpr::Or(children) => {
                let parts = children
                    .iter()
                    .map(|c| self.render_expr(entity, alias, prefix, c, err_prefix))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(format!("({})", parts.join(" OR ")))
            }
            WhereExpr::Cmp { field, op, value } => {
                self.render_cmp(entity, alias, prefix, field, *op, value, err_prefix)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn render_cmp(
        &mut self,
        entity: &'static EntityDescriptor,
        alias: &str,
        prefix: &str,
        field: &str,
        op: Comparator,
        value: &FilterValue,
        err_prefix: &str,
    ) -> Result<String, FilterError> {
        let err_path = format!("{err_prefix}.{field}");

        if op == Comparator::Text {
            return self.render_text(entity, alias, prefix, field, value, &err_path);
        }

        let (lhs_alias, attr) = self.resolve_attribute(entity, alias, prefix, field, &err_path)?;
        let lhs = format!("{lhs_alias}.{attr}");

        let rendered = match op {
            Comparator::Eq => format!("{lhs} = {}", literal(value)),
            Comparator::Neq => format!("{lhs} != {}", literal(value)),
            Comparator::Gt => format!("{lhs} > {}", literal(value)),
            Comparator::Gte => format!("{lhs} >= {}", literal(value)),
            Comparator::Lt => format!("{lhs} < {}", literal(value)),
            Comparator::Lte => format!("{lhs} <= {}", literal(value)),
            Comparator::Like => format!("{lhs} LIKE {}", literal(value)),
            Comparator::Nlike => format!("{lhs} NOT LIKE {}", literal(value)),
            Comparator::Ilike => format!("LOWER({lhs}) LIKE {}", lowered_literal(value)),
            Comparator::Nilike => format!("LOWER({lhs}) NOT LIKE {}", lowered_literal(value)),
            Comparator::Regexp => format!("{lhs} REGEXP {}", literal(value)),
            Comparator::In | Comparator::Nin => {
                let items = value.as_list().ok_or_else(|| FilterError {
                    path: err_path.clone(),
                    message: "requires an array of values".to_string(),
                })?;
                let rendered: Vec<String> = items.iter().map(literal).collect();
                let keyword = if op == Comparator::In { "IN" } else { "NOT IN" };
                format!("{lhs} {keyword} ({})", rendered.join(", "))
            }
            Comparator::Between => {
                let items = value.as_list().filter(|l| l.len() == 2).ok_or_else(|| {
                    FilterError {
                        path: err_path.clone(),
                        message: "requires an array of exactly two elements".to_string(),
                    }
                })?;
                format!("{lhs} BETWEEN {} AND {}", literal(&items[0]), literal(&items[1]))
            }
            Comparator::Text => unreachable!("handled above"),
        };

        Ok(rendered)
    }

    /// `text` searches the owning entity's declared text fields with a
    /// contains pattern, OR-joined.
    fn render_text(
        &mut self,
        entity: &'static EntityDescriptor,
        alias: &str,
        prefix: &str,
        field: &str,
        value: &FilterValue,
        err_path: &str,
    ) -> Result<String, FilterError> {
        let needle = value.as_str().ok_or_else(|| FilterError {
            path: err_path.to_string(),
            message: "accepts only a string".to_string(),
        })?;

        let (target_entity, target_alias) =
            match self.resolve_path(entity, alias, prefix, field, err_path)? {
                Resolved::Entity { alias, entity } => (entity, alias),
                Resolved::Attribute {
                    owner, owner_alias, ..
                } => (owner, owner_alias),
            };

        if target_entity.text_fields.is_empty() {
            return Err(FilterError {
                path: err_path.to_string(),
                message: format!(
                    "entity {} has no text-searchable fields",
                    target_entity.name
                ),
            });
        }

        let pattern = quoted(&format!("%{needle}%"));
        let parts: Vec<String> = target_entity
            .text_fields
            .iter()
            .map(|f| format!("{target_alias}.{f} LIKE {pattern}"))
            .collect();

        Ok(if parts.len() == 1 {
            parts.into_iter().next().unwrap_or_default()
        } else {
            format!("({})", parts.join(" OR "))
        })
    }

    /// Resolve a dotted field path to `(alias, attribute)`, failing when the
    /// path does not end at a scalar attribute.
    fn resolve_attribute(
        &mut self,
        entity: &'static EntityDescriptor,
        alias: &str,
        prefix: &str,
        field: &str,
        err_path: &str,
    ) -> Result<(String, String), FilterError> {
        match self.resolve_path(entity, alias, prefix, field, err_path)? {
            Resolved::Attribute { alias, attr, .. } => Ok((alias, attr)),
            Resolved::Entity { entity, .. } => Err(FilterError {
                path: err_path.to_string(),
                message: format!(
                    "path must end at a scalar attribute, not entity {}",
                    entity.name
                ),
            }),
        }
    }

    /// Walk a dotted path segment by segment, joining relations as needed.
    fn resolve_path(
        &mut self,
        entity: &'static EntityDescriptor,
        alias: &str,
        prefix: &str,
        field: &str,
        err_path: &str,
    ) -> Result<Resolved, FilterError> {
        if field.is_empty() {
            return Err(FilterError {
                path: err_path.to_string(),
                message: "empty field path".to_string(),
            });
        }

        let mut cur_entity = entity;
        let mut cur_alias = alias.to_string();
        let mut cur_path = prefix.to_string();

        let segments: Vec<&str> = field.split('.').collect();
        for (idx, segment) in segments.iter().enumerate() {
            let last = idx + 1 == segments.len();

            if let Some(relation) = cur_entity.relation(segment) {
                let target = descriptor(relation.target).ok_or_else(|| FilterError {
                    path: err_path.to_string(),
                    message: format!("relation target {} has no descriptor", relation.target),
                })?;
                let path = join_path(&cur_path, relation.name);
                let new_alias = self.ensure_alias(&path, &cur_alias, relation.name);
                cur_entity = target;
                cur_alias = new_alias;
                cur_path = path;
                if last {
                    return Ok(Resolved::Entity {
                        alias: cur_alias,
                        entity: cur_entity,
                    });
                }
            } else if cur_entity.has_attribute(segment) {
                if !last {
                    return Err(FilterError {
                        path: err_path.to_string(),
                        message: format!("cannot traverse attribute '{segment}'"),
                    });
                }
                return Ok(Resolved::Attribute {
                    owner: cur_entity,
                    owner_alias: cur_alias.clone(),
                    alias: cur_alias,
                    attr: segment.to_string(),
                });
            } else {
                return Err(FilterError {
                    path: err_path.to_string(),
                    message: format!(
                        "unknown segment '{segment}' on entity {}",
                        cur_entity.name
                    ),
                });
            }
        }
        unreachable!("split always yields at least one segment")
    }
}

enum Resolved {
    Attribute {
        alias: String,
        attr: String,
        owner: &'static EntityDescriptor,
        owner_alias: String,
    },
    Entity {
        alias: String,
        entity: &'static EntityDescriptor,
    },
}

fn join_path(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}

/// Render a literal in the catalogue dialect: strings single-quoted with
/// embedded quotes doubled, booleans in Java casing, ISO date strings as
/// timestamp literals.
fn literal(value: &FilterValue) -> String {
    match value {
        FilterValue::String(s) => match parse_timestamp(s) {
            Some(ts) => format!("{{ts '{}'}}", ts.format("%Y-%m-%d %H:%M:%S")),
            None => quoted(s),
        },
        FilterValue::Integer(i) => i.to_string(),
        FilterValue::Float(f) => f.to_string(),
        FilterValue::Boolean(true) => "True".to_string(),
        FilterValue::Boolean(false) => "False".to_string(),
        FilterValue::List(items) => items
            .iter()
            .map(literal)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn lowered_literal(value: &FilterValue) -> String {
    match value {
        FilterValue::String(s) => quoted(&s.to_lowercase()),
        other => literal(other),
    }
}

fn quoted(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Recognise the date-string forms accepted in filters.
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    None
}
