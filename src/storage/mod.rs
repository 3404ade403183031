//! # Storage Backend Trait
//!
//! This is THE contract between the mapping engine and the graph store.
//! The engine never issues query-language text for mutation; it only calls
//! the create/merge/lookup operations defined here.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryBackend` | `memory` | In-memory reference store for testing/embedding |
//!
//! Registry persistence goes through the separate, synchronous [`ConfigStore`]
//! trait so that a schema mutation and its persistence happen under one writer lock.

pub mod memory;

use async_trait::async_trait;
use crate::model::*;
use crate::tx::{Transaction, TxMode};
use crate::{Error, Result};

pub use memory::{MemoryBackend, TxStats};

// ============================================================================
// Merge outcomes
// ============================================================================

/// Result of a create-or-update on a node keyed by its IRI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedNode {
    pub id: NodeId,
    pub created: bool,
}

/// Result of a create-or-update on a `(src, type, dst)` relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergedRelationship {
    pub id: RelId,
    pub created: bool,
}

// ============================================================================
// StorageBackend Trait
// ============================================================================

/// The universal storage contract.
///
/// Required methods are plain CRUD and scans; the merge operations the ingest
/// pipeline relies on have default implementations on top of them, which
/// backends with native upserts should override.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// The transaction type for this backend.
    type Tx: Transaction;

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a new transaction.
    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;

    /// Commit a transaction.
    async fn commit_tx(&self, tx: Self::Tx) -> Result<()>;

    /// Roll back a transaction.
    async fn rollback_tx(&self, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Node CRUD
    // ========================================================================

    /// Create a node with the given labels and properties.
    async fn create_node(
        &self,
        tx: &mut Self::Tx,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId>;

    /// Get a node by ID. Returns None if not found.
    async fn get_node(&self, tx: &Self::Tx, id: NodeId) -> Result<Option<Node>>;

    /// Set a property on a node (upsert).
    async fn set_node_property(
        &self,
        tx: &mut Self::Tx,
        id: NodeId,
        key: &str,
        val: Value,
    ) -> Result<()>;

    /// Remove a property from a node.
    async fn remove_node_property(
        &self,
        tx: &mut Self::Tx,
        id: NodeId,
        key: &str,
    ) -> Result<()>;

    /// Add a label to a node. Adding a label twice is a no-op.
    async fn add_label(&self, tx: &mut Self::Tx, id: NodeId, label: &str) -> Result<()>;

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    /// Create a relationship between two nodes.
    async fn create_relationship(
        &self,
        tx: &mut Self::Tx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId>;

    /// Set a property on a relationship (upsert).
    ///
    /// Default returns error; override for backends with relationship property CRUD.
    async fn set_relationship_property(
        &self,
        _tx: &mut Self::Tx,
        _id: RelId,
        _key: &str,
        _val: Value,
    ) -> Result<()> {
        Err(Error::StorageError("relationship property set not supported".into()))
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    /// Get all relationships of a node, optionally filtered by direction and type.
    async fn get_relationships(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>>;

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Total number of nodes.
    async fn node_count(&self, tx: &Self::Tx) -> Result<u64>;

    /// Total number of relationships.
    async fn relationship_count(&self, tx: &Self::Tx) -> Result<u64>;

    // ========================================================================
    // Scan
    // ========================================================================

    /// Return all nodes (no label filter).
    async fn all_nodes(&self, tx: &Self::Tx) -> Result<Vec<Node>>;

    /// Find all nodes with a given label.
    async fn nodes_by_label(&self, tx: &Self::Tx, label: &str) -> Result<Vec<Node>>;

    /// Find all relationships of a given type.
    ///
    /// Default: scans all nodes and collects outgoing relationships of that type.
    async fn relationships_by_type(
        &self,
        tx: &Self::Tx,
        rel_type: &str,
    ) -> Result<Vec<Relationship>> {
        let mut result = Vec::new();
        let nodes = self.all_nodes(tx).await?;
        for node in &nodes {
            let rels = self.get_relationships(
                tx, node.id, Direction::Outgoing, Some(rel_type),
            ).await?;
            result.extend(rels);
        }
        Ok(result)
    }

    // ========================================================================
    // Merge (create-or-update): what the ingest pipeline calls
    // ========================================================================

    /// Look up the node whose `uri_key` property equals `uri`.
    ///
    /// Default: full scan. Backends should override with an index.
    async fn node_by_uri(
        &self,
        tx: &Self::Tx,
        uri_key: &str,
        uri: &str,
    ) -> Result<Option<Node>> {
        let nodes = self.all_nodes(tx).await?;
        Ok(nodes.into_iter().find(|n| n.uri(uri_key) == Some(uri)))
    }

    /// Create the node keyed by `uri` or update it in place.
    ///
    /// Labels are added (never removed). Properties are upserted; a
    /// `Value::Null` removes the key.
    async fn merge_node(
        &self,
        tx: &mut Self::Tx,
        uri_key: &str,
        uri: &str,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<MergedNode> {
        match self.node_by_uri(tx, uri_key, uri).await? {
            Some(node) => {
                for label in labels {
                    if !node.has_label(label) {
                        self.add_label(tx, node.id, label).await?;
                    }
                }
                for (key, val) in props {
                    if val.is_null() {
                        if node.properties.contains_key(&key) {
                            self.remove_node_property(tx, node.id, &key).await?;
                        }
                    } else {
                        self.set_node_property(tx, node.id, &key, val).await?;
                    }
                }
                Ok(MergedNode { id: node.id, created: false })
            }
            None => {
                let mut props: PropertyMap =
                    props.into_iter().filter(|(_, v)| !v.is_null()).collect();
                props.insert(uri_key.to_string(), Value::from(uri));
                let id = self.create_node(tx, labels, props).await?;
                Ok(MergedNode { id, created: true })
            }
        }
    }

    /// Create the `(src)-[rel_type]->(dst)` relationship unless it already exists.
    ///
    /// Properties of an existing relationship are upserted.
    async fn merge_relationship(
        &self,
        tx: &mut Self::Tx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<MergedRelationship> {
        let existing = self
            .get_relationships(tx, src, Direction::Outgoing, Some(rel_type))
            .await?
            .into_iter()
            .find(|r| r.dst == dst);
        match existing {
            Some(rel) => {
                for (key, val) in props {
                    if rel.properties.get(&key) != Some(&val) {
                        self.set_relationship_property(tx, rel.id, &key, val).await?;
                    }
                }
                Ok(MergedRelationship { id: rel.id, created: false })
            }
            None => {
                let id = self.create_relationship(tx, src, dst, rel_type, props).await?;
                Ok(MergedRelationship { id, created: true })
            }
        }
    }
}

// ============================================================================
// Configuration entities
// ============================================================================

/// Store-native persistence for engine configuration (schema mappings).
///
/// Entities are opaque JSON payloads grouped by namespace and keyed by name.
/// Calls are synchronous: they run while the registry's writer lock is held.
pub trait ConfigStore: Send + Sync {
    /// All `(key, payload)` pairs stored under `namespace`.
    fn load_config(&self, namespace: &str) -> Result<Vec<(String, String)>>;

    /// Insert or replace one entity.
    fn save_config(&self, namespace: &str, key: &str, payload: &str) -> Result<()>;

    /// Delete one entity. Returns true if it existed.
    fn delete_config(&self, namespace: &str, key: &str) -> Result<bool>;
}
