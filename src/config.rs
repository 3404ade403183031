//! Engine-wide configuration.
//!
//! Everything here has a default, so `EngineConfig::default()` is a working
//! setup; `EngineConfig::from_json` accepts a partial document.

use serde::{Deserialize, Serialize};

use crate::rdf::vocab;
use crate::{Error, Result};

pub const DEFAULT_URI_PROPERTY: &str = "uri";
pub const DEFAULT_SCHEMA_NAMESPACE: &str = "neo4j://graph.schema#";
pub const DEFAULT_INDIVIDUALS_NAMESPACE: &str = "neo4j://graph.individuals#";
pub const DEFAULT_COMMIT_BATCH_SIZE: usize = 10_000;

/// Global settings shared by every ingest and export call of one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Reserved node property holding the original IRI.
    pub uri_property: String,
    /// Base used to mint IRIs for graph names that no mapping covers.
    pub default_namespace: String,
    /// Base used to mint IRIs for nodes that carry no uri property.
    pub individuals_namespace: String,
    pub default_commit_batch_size: usize,
    pub hierarchy: HierarchyPredicates,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            uri_property: DEFAULT_URI_PROPERTY.into(),
            default_namespace: DEFAULT_SCHEMA_NAMESPACE.into(),
            individuals_namespace: DEFAULT_INDIVIDUALS_NAMESPACE.into(),
            default_commit_batch_size: DEFAULT_COMMIT_BATCH_SIZE,
            hierarchy: HierarchyPredicates::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.uri_property.is_empty() {
            return Err(Error::InvalidConfig("uri_property must not be empty".into()));
        }
        if self.default_commit_batch_size == 0 {
            return Err(Error::InvalidConfig("default_commit_batch_size must be positive".into()));
        }
        for base in [&self.default_namespace, &self.individuals_namespace] {
            if !vocab::is_absolute_iri(base) {
                return Err(Error::InvalidConfig(format!("namespace {base:?} is not an absolute IRI")));
            }
        }
        Ok(())
    }
}

/// Which predicates define the class and property hierarchies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyPredicates {
    pub class: Vec<String>,
    pub property: Vec<String>,
}

impl Default for HierarchyPredicates {
    fn default() -> Self {
        Self {
            class: vec![vocab::RDFS_SUBCLASS_OF.into()],
            property: vec![vocab::RDFS_SUBPROPERTY_OF.into()],
        }
    }
}

impl HierarchyPredicates {
    /// The hierarchy a predicate contributes to, if any.
    pub fn kind_of(&self, predicate: &str) -> Option<HierarchyKind> {
        if self.class.iter().any(|p| p == predicate) {
            Some(HierarchyKind::Class)
        } else if self.property.iter().any(|p| p == predicate) {
            Some(HierarchyKind::Property)
        } else {
            None
        }
    }

    pub fn all(&self) -> impl Iterator<Item = (&str, HierarchyKind)> {
        self.class
            .iter()
            .map(|p| (p.as_str(), HierarchyKind::Class))
            .chain(self.property.iter().map(|p| (p.as_str(), HierarchyKind::Property)))
    }
}

/// The two subsumption hierarchies the inference index tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HierarchyKind {
    Class,
    Property,
}
