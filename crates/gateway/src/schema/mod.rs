//! Catalogue entity descriptors.
//!
//! Static metadata about the catalogue schema: scalar attributes, relations
//! with their cardinality and target entity, and the text-searchable fields
//! per entity. The query builder resolves every field path against these
//! tables; nothing here changes at runtime.

/// Metadata for one catalogue entity type.
#[derive(Debug)]
pub struct EntityDescriptor {
    /// Canonical (correctly cased) entity name.
    pub name: &'static str,

    /// Scalar attributes, including the id/audit fields every entity carries.
    pub attributes: &'static [&'static str],

    /// Relations to other entities.
    pub relations: &'static [Relation],

    /// Attributes searched by the `text` operator.
    pub text_fields: &'static [&'static str],
}

/// One relation of an entity.
#[derive(Debug)]
pub struct Relation {
    pub name: &'static str,

    /// Canonical name of the target entity.
    pub target: &'static str,

    /// True for to-many relations.
    pub many: bool,
}

impl EntityDescriptor {
    /// Whether `name` is a scalar attribute of this entity.
    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains(&name)
    }

    /// Look up a relation by name.
    pub fn relation(&self, name: &str) -> Option<&'static Relation> {
        self.relations.iter().find(|r| r.name == name)
    }
}

/// Look up a descriptor by its canonical name.
pub fn descriptor(name: &str) -> Option<&'static EntityDescriptor> {
    ENTITIES.iter().find(|e| e.name == name)
}

/// Resolve a URL path segment to a descriptor.
///
/// Case-insensitive, and tolerant of the plural forms used in endpoint paths
/// (`investigations`, `facilities`).
pub fn resolve_entity(path_name: &str) -> Option<&'static EntityDescriptor> {
    let lower = path_name.to_ascii_lowercase();

    let find = |candidate: &str| {
        ENTITIES
            .iter()
            .find(|e| e.name.to_ascii_lowercase() == candidate)
    };

    if let Some(found) = find(&lower) {
        return Some(found);
    }
    if let Some(stripped) = lower.strip_suffix("ies") {
        if let Some(found) = find(&format!("{stripped}y")) {
            return Some(found);
        }
    }
    if let Some(stripped) = lower.strip_suffix('s') {
        if let Some(found) = find(stripped) {
            return Some(found);
        }
    }
    None
}

// Every entity carries the id/audit attributes; attrs! prepends them.
macro_rules! attrs {
    ($($name:literal),* $(,)?) => {
        &["id", "createTime", "modTime" $(, $name)*]
    };
}

const fn one(name: &'static str, target: &'static str) -> Relation {
    Relation {
        name,
        target,
        many: false,
    }
}

const fn many(name: &'static str, target: &'static str) -> Relation {
    Relation {
        name,
        target,
        many: true,
    }
}

static ENTITIES: &[EntityDescriptor] = &[
    EntityDescriptor {
        name: "Investigation",
        attributes: attrs![
            "name",
            "visitId",
            "title",
            "summary",
            "doi",
            "startDate",
            "endDate",
            "releaseDate",
        ],
        relations: &[
            many("datasets", "Dataset"),
            many("samples", "Sample"),
            many("publications", "Publication"),
            many("keywords", "Keyword"),
            many("parameters", "InvestigationParameter"),
            many("investigationUsers", "InvestigationUser"),
            many("investigationInstruments", "InvestigationInstrument"),
            one("type", "InvestigationType"),
            one("facility", "Facility"),
        ],
        text_fields: &["title", "summary"],
    },
    EntityDescriptor {
        name: "Dataset",
        attributes: attrs![
            "name",
            "description",
            "doi",
            "location",
            "complete",
            "startDate",
            "endDate",
        ],
        relations: &[
            one("investigation", "Investigation"),
            many("datafiles", "Datafile"),
            many("parameters", "DatasetParameter"),
            many("datasetTechniques", "DatasetTechnique"),
            one("sample", "Sample"),
            one("type", "DatasetType"),
        ],
        text_fields: &["name", "description"],
    },
    EntityDescriptor {
        name: "Datafile",
        attributes: attrs![
            "name",
            "description",
            "location",
            "fileSize",
            "checksum",
            "doi",
            "datafileCreateTime",
            "datafileModTime",
        ],
        relations: &[
            one("dataset", "Dataset"),
            many("parameters", "DatafileParameter"),
            one("datafileFormat", "DatafileFormat"),
        ],
        text_fields: &["name", "description"],
    },
    EntityDescriptor {
        name: "Instrument",
        attributes: attrs!["name", "fullName", "description", "type", "url", "pid"],
        relations: &[
            one("facility", "Facility"),
            many("instrumentScientists", "InstrumentScientist"),
            many("investigationInstruments", "InvestigationInstrument"),
        ],
        text_fields: &["name", "fullName"],
    },
    EntityDescriptor {
        name: "Sample",
        attributes: attrs!["name", "pid"],
        relations: &[
            one("investigation", "Investigation"),
            many("datasets", "Dataset"),
            many("parameters", "SampleParameter"),
            one("type", "SampleType"),
        ],
        text_fields: &["name"],
    },
    EntityDescriptor {
        name: "SampleType",
        attributes: attrs!["name", "molecularFormula", "safetyInformation"],
        relations: &[many("samples", "Sample"), one("facility", "Facility")],
        text_fields: &["name"],
    },
    EntityDescriptor {
        name: "ParameterType",
        attributes: attrs!["name", "units", "description", "valueType"],
        relations: &[one("facility", "Facility")],
        text_fields: &["name", "description"],
    },
    EntityDescriptor {
        name: "InvestigationParameter",
        attributes: attrs![
            "stringValue",
            "numericValue",
            "dateTimeValue",
            "rangeBottom",
            "rangeTop",
            "error",
        ],
        relations: &[
            one("investigation", "Investigation"),
            one("type", "ParameterType"),
        ],
        text_fields: &[],
    },
    EntityDescriptor {
        name: "DatasetParameter",
        attributes: attrs![
            "stringValue",
            "numericValue",
            "dateTimeValue",
            "rangeBottom",
            "rangeTop",
            "error",
        ],
        relations: &[one("dataset", "Dataset"), one("type", "ParameterType")],
        text_fields: &[],
    },
    EntityDescriptor {
        name: "DatafileParameter",
        attributes: attrs![
            "stringValue",
            "numericValue",
            "dateTimeValue",
            "rangeBottom",
            "rangeTop",
            "error",
        ],
        relations: &[one("datafile", "Datafile"), one("type", "ParameterType")],
        text_fields: &[],
    },
    EntityDescriptor {
        name: "SampleParameter",
        attributes: attrs![
            "stringValue",
            "numericValue",
            "dateTimeValue",
            "rangeBottom",
            "rangeTop",
            "error",
        ],
        relations: &[one("sample", "Sample"), one("type", "ParameterType")],
        text_fields: &[],
    },
    EntityDescriptor {
        name: "InvestigationType",
        attributes: attrs!["name", "description"],
        relations: &[one("facility", "Facility")],
        text_fields: &["name"],
    },
    EntityDescriptor {
        name: "DatasetType",
        attributes: attrs!["name", "description"],
        relations: &[one("facility", "Facility")],
        text_fields: &["name"],
    },
    EntityDescriptor {
        name: "DatafileFormat",
        attributes: attrs!["name", "version", "description", "type"],
        relations: &[one("facility", "Facility")],
        text_fields: &["name"],
    },
    EntityDescriptor {
        name: "InvestigationUser",
        attributes: attrs!["role"],
        relations: &[one("investigation", "Investigation"), one("user", "User")],
        text_fields: &[],
    },
    EntityDescriptor {
        name: "User",
        attributes: attrs![
            "name",
            "fullName",
            "givenName",
            "familyName",
            "email",
            "orcidId",
        ],
        relations: &[
            many("investigationUsers", "InvestigationUser"),
            many("instrumentScientists", "InstrumentScientist"),
            many("affiliations", "Affiliation"),
        ],
        text_fields: &["fullName"],
    },
    EntityDescriptor {
        name: "Affiliation",
        attributes: attrs!["name", "address", "city", "country"],
        relations: &[one("user", "User")],
        text_fields: &["name"],
    },
    EntityDescriptor {
        name: "InstrumentScientist",
        attributes: attrs![],
        relations: &[one("instrument", "Instrument"), one("user", "User")],
        text_fields: &[],
    },
    EntityDescriptor {
        name: "InvestigationInstrument",
        attributes: attrs![],
        relations: &[
            one("investigation", "Investigation"),
            one("instrument", "Instrument"),
        ],
        text_fields: &[],
    },
    EntityDescriptor {
        name: "Keyword",
        attributes: attrs!["name"],
        relations: &[one("investigation", "Investigation")],
        text_fields: &["name"],
    },
    EntityDescriptor {
        name: "Publication",
        attributes: attrs!["fullReference", "doi", "repository", "repositoryId", "url"],
        relations: &[one("investigation", "Investigation")],
        text_fields: &["fullReference"],
    },
    EntityDescriptor {
        name: "Facility",
        attributes: attrs!["name", "fullName", "description", "url", "daysUntilRelease"],
        relations: &[],
        text_fields: &["name", "fullName"],
    },
    EntityDescriptor {
        name: "Technique",
        attributes: attrs!["name", "description", "pid"],
        relations: &[many("datasetTechniques", "DatasetTechnique")],
        text_fields: &["name", "description"],
    },
    EntityDescriptor {
        name: "DatasetTechnique",
        attributes: attrs![],
        relations: &[one("dataset", "Dataset"), one("technique", "Technique")],
        text_fields: &[],
    },
    EntityDescriptor {
        name: "FacilityCycle",
        attributes: attrs!["name", "description", "startDate", "endDate"],
        relations: &[one("facility", "Facility")],
        text_fields: &["name"],
    },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_lookup_is_exact() {
        assert!(descriptor("Investigation").is_some());
        assert!(descriptor("investigation").is_none());
    }

    #[test]
    fn resolve_entity_handles_case_and_plurals() {
        assert_eq!(resolve_entity("Investigations").unwrap().name, "Investigation");
        assert_eq!(resolve_entity("investigations").unwrap().name, "Investigation");
        assert_eq!(resolve_entity("FACILITIES").unwrap().name, "Facility");
        assert_eq!(resolve_entity("facilitycycles").unwrap().name, "FacilityCycle");
        assert_eq!(resolve_entity("Datafile").unwrap().name, "Datafile");
        assert!(resolve_entity("widgets").is_none());
    }

    #[test]
    fn every_relation_target_exists() {
        for entity in ENTITIES {
            for relation in entity.relations {
                assert!(
                    descriptor(relation.target).is_some(),
                    "{}.{} targets unknown entity {}",
                    entity.name,
                    relation.name,
                    relation.target
                );
            }
        }
    }

    #[test]
    fn text_fields_are_attributes() {
        for entity in ENTITIES {
            for field in entity.text_fields {
                assert!(
                    entity.has_attribute(field),
                    "{}.{} is not a scalar attribute",
                    entity.name,
                    field
                );
            }
        }
    }

    #[test]
    fn meta_attributes_present_everywhere() {
        for entity in ENTITIES {
            for meta in ["id", "createTime", "modTime"] {
                assert!(entity.has_attribute(meta), "{} lacks {}", entity.name, meta);
            }
        }
    }

    #[test]
    fn relation_cardinality() {
        let dataset = descriptor("Dataset").unwrap();
        assert!(dataset.relation("datafiles").unwrap().many);
        assert!(!dataset.relation("investigation").unwrap().many);
        assert!(dataset.relation("missing").is_none());
    }
}
