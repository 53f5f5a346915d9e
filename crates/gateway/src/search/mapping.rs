//! Search API field mapping.
//!
//! A JSON file pins each Search-schema entity to one catalogue entity and
//! maps every Search field to a catalogue path, the literal `"ALL"`, or a
//! constant. Relation entries carry the catalogue relation chain crossed
//! when a nested include or where-path traverses entities. The file is
//! loaded once at startup, validated against the entity descriptors, and
//! shared immutably.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::schema;

/// The whole mapping file: Search entity name to its mapping.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct SearchMapping {
    entities: BTreeMap<String, EntityMapping>,
}

/// Mapping of one Search-schema entity.
#[derive(Debug, Deserialize)]
pub struct EntityMapping {
    /// Catalogue entity the Search entity is rooted on.
    pub base_icat_entity: String,

    /// Search field name to catalogue mapping.
    #[serde(default)]
    pub fields: BTreeMap<String, FieldMapping>,

    /// Search relation name to the catalogue chain reaching it.
    #[serde(default)]
    pub relations: BTreeMap<String, RelationMapping>,

    /// Fields whose absence drops the whole record from the response.
    #[serde(default)]
    pub required: Vec<String>,
}

/// How one Search field projects from the catalogue object.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldMapping {
    /// Dotted catalogue path ending in a scalar attribute.
    Path(Vec<String>),

    /// Embed the raw catalogue subtree unprojected.
    All,

    /// A fixed value independent of the catalogue object.
    Const(Value),
}

impl<'de> Deserialize<'de> for FieldMapping {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        match value {
            Value::String(s) if s == "ALL" => Ok(FieldMapping::All),
            Value::String(s) => Ok(FieldMapping::Path(
                s.split('.').map(str::to_string).collect(),
            )),
            Value::Object(mut map) => match map.remove("const") {
                Some(constant) if map.is_empty() => Ok(FieldMapping::Const(constant)),
                _ => Err(serde::de::Error::custom(
                    "field mapping object must have a single 'const' key",
                )),
            },
            _ => Err(serde::de::Error::custom(
                "field mapping must be a path string, \"ALL\", or {\"const\": value}",
            )),
        }
    }
}

/// A Search relation: the target Search entity and the catalogue relation
/// chain that reaches it.
#[derive(Debug, Deserialize)]
pub struct RelationMapping {
    pub entity: String,
    pub path: Vec<String>,
}

impl SearchMapping {
    /// Load and validate the mapping file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read mapping file {}", path.display()))?;
        Self::from_str(&contents)
    }

    /// Parse and validate mapping JSON.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self> {
        let mapping: SearchMapping =
            serde_json::from_str(contents).context("mapping file is not valid JSON")?;
        mapping.validate()?;
        Ok(mapping)
    }

    /// Look up one Search entity's mapping.
    pub fn entity(&self, name: &str) -> Option<&EntityMapping> {
        self.entities.get(name)
    }

    /// Check every mapped path against the compiled-in entity descriptors so
    /// a broken mapping file fails at startup rather than per request.
    fn validate(&self) -> Result<()> {
        for (name, em) in &self.entities {
            let base = schema::descriptor(&em.base_icat_entity).with_context(|| {
                format!(
                    "{name}: base_icat_entity '{}' is not a catalogue entity",
                    em.base_icat_entity
                )
            })?;

            for (field, fm) in &em.fields {
                if let FieldMapping::Path(segs) = fm {
                    validate_attribute_path(base, segs)
                        .with_context(|| format!("{name}.{field}"))?;
                }
            }

            for (relation, rm) in &em.relations {
                let Some(target_mapping) = self.entities.get(&rm.entity) else {
                    bail!("{name}.{relation}: unknown Search entity '{}'", rm.entity);
                };
                if rm.path.is_empty() {
                    bail!("{name}.{relation}: empty catalogue relation chain");
                }
                let target = validate_relation_path(base, &rm.path)
                    .with_context(|| format!("{name}.{relation}"))?;

                // The chain end need not equal the target's base entity (one
                // Search entity may be reached through several catalogue
                // parameter tables), but every field the target projects
                // must resolve on whatever the chain reaches.
                for (field, fm) in &target_mapping.fields {
                    if let FieldMapping::Path(segs) = fm {
                        validate_attribute_path(target, segs).with_context(|| {
                            format!("{name}.{relation} -> {}.{field}", rm.entity)
                        })?;
                    }
                }
            }

            for field in &em.required {
                if !em.fields.contains_key(field) {
                    bail!("{name}: required field '{field}' has no mapping");
                }
            }
        }
        Ok(())
    }
}

fn validate_attribute_path(
    base: &'static schema::EntityDescriptor,
    segs: &[String],
) -> Result<()> {
    let mut current = base;
    for (idx, seg) in segs.iter().enumerate() {
        let last = idx + 1 == segs.len();
        if let Some(relation) = current.relation(seg) {
            if last {
                bail!("path ends at relation '{seg}', expected a scalar attribute");
            }
            current = schema::descriptor(relation.target)
                .with_context(|| format!("relation '{seg}' targets unknown entity"))?;
        } else if current.has_attribute(seg) {
            if !last {
                bail!("cannot traverse attribute '{seg}'");
            }
        } else {
            bail!("unknown segment '{seg}' on entity {}", current.name);
        }
    }
    Ok(())
}

fn validate_relation_path(
    base: &'static schema::EntityDescriptor,
    segs: &[String],
) -> Result<&'static schema::EntityDescriptor> {
    let mut current = base;
    for seg in segs {
        let relation = current
            .relation(seg)
            .with_context(|| format!("unknown relation '{seg}' on entity {}", current.name))?;
        current = schema::descriptor(relation.target)
            .with_context(|| format!("relation '{seg}' targets unknown entity"))?;
    }
    Ok(current)
}
