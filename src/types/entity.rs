//! Entity resolution types: EntityType, ResolvedEntity, MatchCandidate

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Entity classes the resolver clusters within. Cross-type pairs never match.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    #[default]
    Person,
    Vehicle,
    Incident,
    Address,
    Generic,
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityType::Person => write!(f, "person"),
            EntityType::Vehicle => write!(f, "vehicle"),
            EntityType::Incident => write!(f, "incident"),
            EntityType::Address => write!(f, "address"),
            EntityType::Generic => write!(f, "generic"),
        }
    }
}

/// Confidence band derived from a pairwise similarity score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MatchConfidence {
    Low,
    Medium,
    High,
}

/// An unresolved input record: canonical id, type, and flat attributes.
///
/// `entity_id` is canonical; upstream systems that still send `id` are
/// normalized at ingest. Attribute keys follow the upstream schema
/// (`name`, `dob`, `ssn`, `plate_number`, `vin`, ...).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EntityRecord {
    pub entity_id: String,
    pub entity_type: EntityType,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl EntityRecord {
    pub fn new(entity_id: impl Into<String>, entity_type: EntityType) -> Self {
        Self {
            entity_id: entity_id.into(),
            entity_type,
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute insertion for tests and adapters.
    #[must_use]
    pub fn with_attr(mut self, key: &str, value: &str) -> Self {
        self.attributes.insert(key.to_string(), value.to_string());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// A scored potential match between two records of the same type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchCandidate {
    pub entity_id: String,
    pub other_id: String,
    pub similarity: f64,
    pub confidence: MatchConfidence,
}

/// Output of one resolution pass: a cluster seed with its absorbed records.
///
/// `entity_id` stays stable across merges; absorbed records become aliases.
/// `confidence` is 1.0 for a solo entity, otherwise the maximum pairwise
/// similarity inside the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedEntity {
    pub entity_id: String,
    pub entity_type: EntityType,
    pub canonical_attributes: BTreeMap<String, String>,
    pub alias_set: Vec<String>,
    pub merge_candidates: Vec<MatchCandidate>,
    pub confidence: f64,
    pub source_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_builder_sets_attributes() {
        let rec = EntityRecord::new("p-1", EntityType::Person)
            .with_attr("name", "John Smith")
            .with_attr("dob", "1990-01-01");
        assert_eq!(rec.attr("name"), Some("John Smith"));
        assert_eq!(rec.attr("missing"), None);
    }
}
