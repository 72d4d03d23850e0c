//! Schema-tagged entity records.
//!
//! Entities carry id-keyed properties where every value is a list of
//! strings. Relationships (Ownership, Directorship, ...) are entities too:
//! they name their endpoints by id in their properties, so traversal is
//! always an id lookup — no back-pointers are ever stored.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Schemas that denote a relationship between two other entities.
pub const RELATIONSHIP_SCHEMAS: &[&str] = &[
    "Ownership",
    "Directorship",
    "Membership",
    "Employment",
    "Family",
    "Associate",
    "Payment",
    "Debt",
    "Representation",
    "Succession",
    "UnknownLink",
];

/// A typed record with id-keyed multi-valued properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    pub schema: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Vec<String>>,
    /// Opaque source attribution bag, carried verbatim from the tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<serde_json::Value>,
}

impl Entity {
    pub fn new(id: impl Into<String>, schema: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            schema: schema.into(),
            properties: BTreeMap::new(),
            provenance: None,
        }
    }

    /// Builder-style property setter used by fixtures and tests.
    pub fn with_property(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.properties.insert(key.into(), values);
        self
    }

    /// First value of a property, if any.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key)?.first().map(String::as_str)
    }

    /// Display name: the first `name` property, falling back to a
    /// truncated id.
    pub fn name(&self) -> &str {
        self.property("name").unwrap_or_else(|| {
            let end = self
                .id
                .char_indices()
                .nth(12)
                .map(|(i, _)| i)
                .unwrap_or(self.id.len());
            &self.id[..end]
        })
    }

    pub fn is_relationship(&self) -> bool {
        RELATIONSHIP_SCHEMAS.contains(&self.schema.as_str())
    }

    /// Merge another record's properties into this one.
    ///
    /// For each incoming key, values missing from the existing per-key
    /// list are appended in their incoming order; existing values and
    /// their order are untouched. Merging the same record twice is a
    /// no-op.
    pub fn merge_from(&mut self, other: &Entity) {
        for (key, values) in &other.properties {
            let existing = self.properties.entry(key.clone()).or_default();
            for value in values {
                if !existing.contains(value) {
                    existing.push(value.clone());
                }
            }
        }
        if self.provenance.is_none() {
            self.provenance = other.provenance.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(name: &str) -> Entity {
        Entity::new("p1", "Person").with_property("name", vec![name.into()])
    }

    #[test]
    fn property_and_name_accessors() {
        let e = person("Viktor Renko");
        assert_eq!(e.property("name"), Some("Viktor Renko"));
        assert_eq!(e.name(), "Viktor Renko");

        let anon = Entity::new("company:aaaabbbbccccdddd", "Company");
        assert_eq!(anon.name(), "company:aaaa");
    }

    #[test]
    fn merge_appends_missing_values_in_order() {
        let mut a = person("Viktor Renko");
        let b = Entity::new("p1", "Person")
            .with_property("name", vec!["Viktor Renko".into(), "V. Renko".into()])
            .with_property("country", vec!["CY".into()]);

        a.merge_from(&b);
        assert_eq!(
            a.properties["name"],
            vec!["Viktor Renko".to_string(), "V. Renko".to_string()]
        );
        assert_eq!(a.properties["country"], vec!["CY".to_string()]);
    }

    #[test]
    fn merge_is_idempotent() {
        let mut a = person("Viktor Renko");
        let b = person("Viktor Renko");
        a.merge_from(&b);
        let once = a.clone();
        a.merge_from(&b);
        assert_eq!(a, once);
    }

    #[test]
    fn relationship_schemas_detected() {
        assert!(Entity::new("o1", "Ownership").is_relationship());
        assert!(!Entity::new("c1", "Company").is_relationship());
    }
}
