//! Mutation batches: what one window flush asks of the graph store.

use serde::{Deserialize, Serialize};

use crate::config::HierarchyKind;
use crate::mapping::ElementKind;
use crate::model::PropertyMap;
use crate::resolve::{PropertyCell, TermResolver};

/// Create-or-update of one node keyed by its IRI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeMerge {
    pub uri: String,
    pub labels: Vec<String>,
    pub properties: Vec<PropertyUpdate>,
    /// Object of a relationship whose subject statements are not in this batch.
    /// Stubs are only created when absent, never updated.
    pub stub: bool,
}

impl NodeMerge {
    pub fn subject(uri: impl Into<String>) -> Self {
        Self { uri: uri.into(), labels: Vec::new(), properties: Vec::new(), stub: false }
    }

    pub fn stub(uri: impl Into<String>) -> Self {
        Self { stub: true, ..Self::subject(uri) }
    }

    pub fn add_label(&mut self, label: &str) {
        if !self.labels.iter().any(|l| l == label) {
            self.labels.push(label.to_string());
        }
    }

    pub fn property(&self, key: &str) -> Option<&PropertyUpdate> {
        self.properties.iter().find(|p| p.key == key)
    }
}

/// New cells for one property key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyUpdate {
    pub key: String,
    pub cells: Vec<PropertyCell>,
    /// Union with the stored cells instead of replacing them.
    pub append: bool,
}

/// Create-if-absent of `(src)-[rel_type]->(dst)`, both ends by IRI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipMerge {
    pub src: String,
    pub dst: String,
    pub rel_type: String,
    pub properties: PropertyMap,
}

/// A subsumption statement, fed to the inference index once its batch commits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HierarchyEdge {
    pub kind: HierarchyKind,
    pub child: String,
    pub parent: String,
    /// Graph names of both ends: labels for classes, relationship types for properties.
    pub child_name: Option<String>,
    pub parent_name: Option<String>,
}

impl HierarchyEdge {
    /// Edge between two IRIs, with graph names resolved under `resolver`.
    pub fn resolved(resolver: &TermResolver, kind: HierarchyKind, child: &str, parent: &str) -> Self {
        let element = match kind {
            HierarchyKind::Class => ElementKind::Label,
            HierarchyKind::Property => ElementKind::RelationshipType,
        };
        Self {
            kind,
            child: child.to_string(),
            parent: parent.to_string(),
            child_name: resolver.resolve_inbound(child, element).ok(),
            parent_name: resolver.resolve_inbound(parent, element).ok(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationBatch {
    /// 1-based flush number within the call.
    pub sequence: u64,
    /// Statements this batch accounts for.
    pub statements: u64,
    /// Subject merges first, in window order, then stubs.
    pub nodes: Vec<NodeMerge>,
    pub relationships: Vec<RelationshipMerge>,
    pub hierarchy: Vec<HierarchyEdge>,
}

impl MutationBatch {
    pub fn node(&self, uri: &str) -> Option<&NodeMerge> {
        self.nodes.iter().find(|n| n.uri == uri)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.relationships.is_empty()
    }
}
