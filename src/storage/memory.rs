//! In-memory storage backend.
//!
//! This is the reference implementation of `StorageBackend` and `ConfigStore`.
//! It uses simple HashMaps protected by RwLock.
//!
//! ## Limitations
//!
//! - **No real transactions**: `commit_tx()` and `rollback_tx()` are no-ops.
//!   Writes are applied immediately. Rollback does NOT undo mutations.
//! - **Read-only is enforced**: any mutation through a `ReadOnly` transaction
//!   fails with `Error::TxError`, which is how preview isolation is checked.
//! - **One uri index per key**: keys passed to `merge_node`/`node_by_uri` are
//!   indexed from their first use on; nodes written earlier under that key are
//!   back-filled at registration.
//!
//! Clones share the same graph, so a "restarted" engine can be opened on a
//! clone of the backend an earlier engine wrote to.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use async_trait::async_trait;

use crate::model::*;
use crate::tx::{Transaction, TxMode, TxId};
use crate::{Error, Result};
use super::{ConfigStore, MergedNode, MergedRelationship, StorageBackend};

// ============================================================================
// MemoryBackend
// ============================================================================

/// In-memory property graph storage.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    nodes: RwLock<HashMap<NodeId, Node>>,
    relationships: RwLock<HashMap<RelId, Relationship>>,
    /// node_id → list of relationship IDs
    adjacency: RwLock<HashMap<NodeId, Vec<RelId>>>,
    /// label → node IDs (poor man's label index)
    label_index: RwLock<HashMap<String, Vec<NodeId>>>,
    /// uri key → (uri → node id)
    uri_index: RwLock<HashMap<String, HashMap<String, NodeId>>>,
    /// (namespace, key) → JSON payload
    config: RwLock<BTreeMap<(String, String), String>>,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
    next_tx_id: AtomicU64,
    stats: TxCounters,
}

#[derive(Default)]
struct TxCounters {
    read_only: AtomicU64,
    read_write: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

/// Transaction counters, for asserting how often the store was touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TxStats {
    pub read_only_begun: u64,
    pub read_write_begun: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tx_stats(&self) -> TxStats {
        let s = &self.inner.stats;
        TxStats {
            read_only_begun: s.read_only.load(Ordering::Relaxed),
            read_write_begun: s.read_write.load(Ordering::Relaxed),
            commits: s.commits.load(Ordering::Relaxed),
            rollbacks: s.rollbacks.load(Ordering::Relaxed),
        }
    }

    /// Make sure `key` is indexed, back-filling nodes that already carry it.
    fn ensure_uri_index(&self, key: &str) {
        if self.inner.uri_index.read().contains_key(key) {
            return;
        }
        let nodes = self.inner.nodes.read();
        let mut idx = self.inner.uri_index.write();
        idx.entry(key.to_string()).or_insert_with(|| {
            nodes
                .values()
                .filter_map(|n| n.uri(key).map(|u| (u.to_string(), n.id)))
                .collect()
        });
    }

    fn index_property(&self, id: NodeId, key: &str, old: Option<&Value>, new: Option<&Value>) {
        let mut idx = self.inner.uri_index.write();
        if let Some(by_uri) = idx.get_mut(key) {
            if let Some(Value::String(old)) = old {
                by_uri.remove(old);
            }
            if let Some(Value::String(new)) = new {
                by_uri.insert(new.clone(), id);
            }
        }
    }
}

fn ensure_writable(tx: &MemoryTx) -> Result<()> {
    if tx.mode.is_write() {
        Ok(())
    } else {
        Err(Error::TxError(format!("write attempted in read-only transaction {}", tx.id.0)))
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

/// In-memory transaction (currently just a marker, no real MVCC).
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode { self.mode }
    fn id(&self) -> TxId { self.id }
}

// ============================================================================
// StorageBackend impl
// ============================================================================

#[async_trait]
impl StorageBackend for MemoryBackend {
    type Tx = MemoryTx;

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed) + 1);
        let counter = match mode {
            TxMode::ReadOnly => &self.inner.stats.read_only,
            TxMode::ReadWrite => &self.inner.stats.read_write,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(MemoryTx { id, mode })
    }

    /// No-op: memory backend applies writes immediately, not on commit.
    async fn commit_tx(&self, _tx: MemoryTx) -> Result<()> {
        self.inner.stats.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// WARNING: No-op. Memory backend has no write-ahead log.
    /// Mutations applied during this transaction are NOT reverted.
    async fn rollback_tx(&self, _tx: MemoryTx) -> Result<()> {
        self.inner.stats.rollbacks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    // ========================================================================
    // Node CRUD
    // ========================================================================

    async fn create_node(
        &self,
        tx: &mut MemoryTx,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId> {
        ensure_writable(tx)?;
        let id = NodeId(self.inner.next_node_id.fetch_add(1, Ordering::Relaxed) + 1);
        let mut distinct: Vec<String> = Vec::with_capacity(labels.len());
        for label in labels {
            if !distinct.iter().any(|l| l == label) {
                distinct.push(label.to_string());
            }
        }
        let node = Node { id, labels: distinct, properties: props };

        // Update label index
        {
            let mut idx = self.inner.label_index.write();
            for label in &node.labels {
                idx.entry(label.clone()).or_default().push(id);
            }
        }
        {
            let mut idx = self.inner.uri_index.write();
            for (key, by_uri) in idx.iter_mut() {
                if let Some(uri) = node.uri(key) {
                    by_uri.insert(uri.to_string(), id);
                }
            }
        }

        self.inner.nodes.write().insert(id, node);
        self.inner.adjacency.write().insert(id, Vec::new());

        Ok(id)
    }

    async fn get_node(&self, _tx: &MemoryTx, id: NodeId) -> Result<Option<Node>> {
        Ok(self.inner.nodes.read().get(&id).cloned())
    }

    async fn set_node_property(
        &self,
        tx: &mut MemoryTx,
        id: NodeId,
        key: &str,
        val: Value,
    ) -> Result<()> {
        ensure_writable(tx)?;
        let mut nodes = self.inner.nodes.write();
        let node = nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))?;
        let old = node.properties.insert(key.to_string(), val.clone());
        drop(nodes);
        self.index_property(id, key, old.as_ref(), Some(&val));
        Ok(())
    }

    async fn remove_node_property(
        &self,
        tx: &mut MemoryTx,
        id: NodeId,
        key: &str,
    ) -> Result<()> {
        ensure_writable(tx)?;
        let mut nodes = self.inner.nodes.write();
        let node = nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))?;
        let old = node.properties.remove(key);
        drop(nodes);
        self.index_property(id, key, old.as_ref(), None);
        Ok(())
    }

    async fn add_label(&self, tx: &mut MemoryTx, id: NodeId, label: &str) -> Result<()> {
        ensure_writable(tx)?;
        let mut nodes = self.inner.nodes.write();
        let node = nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))?;
        if !node.has_label(label) {
            node.labels.push(label.to_string());
            drop(nodes);
            self.inner.label_index.write().entry(label.to_string()).or_default().push(id);
        }
        Ok(())
    }

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    async fn create_relationship(
        &self,
        tx: &mut MemoryTx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId> {
        ensure_writable(tx)?;
        // Verify both nodes exist
        {
            let nodes = self.inner.nodes.read();
            if !nodes.contains_key(&src) {
                return Err(Error::NotFound(format!("Source node {src}")));
            }
            if !nodes.contains_key(&dst) {
                return Err(Error::NotFound(format!("Target node {dst}")));
            }
        }

        let id = RelId(self.inner.next_rel_id.fetch_add(1, Ordering::Relaxed) + 1);
        let rel = Relationship {
            id,
            src,
            dst,
            rel_type: rel_type.to_string(),
            properties: props,
        };

        self.inner.relationships.write().insert(id, rel);

        // Update adjacency for both endpoints
        let mut adj = self.inner.adjacency.write();
        adj.entry(src).or_default().push(id);
        if src != dst {
            adj.entry(dst).or_default().push(id);
        }

        Ok(id)
    }

    async fn set_relationship_property(
        &self,
        tx: &mut MemoryTx,
        id: RelId,
        key: &str,
        val: Value,
    ) -> Result<()> {
        ensure_writable(tx)?;
        let mut rels = self.inner.relationships.write();
        let rel = rels.get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Relationship {id}")))?;
        rel.properties.insert(key.to_string(), val);
        Ok(())
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    async fn get_relationships(
        &self,
        _tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        let adj = self.inner.adjacency.read();
        let rels = self.inner.relationships.read();

        let Some(rel_ids) = adj.get(&node) else { return Ok(Vec::new()) };
        Ok(rel_ids
            .iter()
            .filter_map(|rid| rels.get(rid))
            .filter(|rel| rel.matches_direction(node, dir))
            .filter(|rel| rel_type.is_none_or(|t| rel.rel_type == t))
            .cloned()
            .collect())
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    async fn node_count(&self, _tx: &MemoryTx) -> Result<u64> {
        Ok(self.inner.nodes.read().len() as u64)
    }

    async fn relationship_count(&self, _tx: &MemoryTx) -> Result<u64> {
        Ok(self.inner.relationships.read().len() as u64)
    }

    // ========================================================================
    // Scan
    // ========================================================================

    async fn all_nodes(&self, _tx: &MemoryTx) -> Result<Vec<Node>> {
        let mut nodes: Vec<Node> = self.inner.nodes.read().values().cloned().collect();
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    async fn nodes_by_label(&self, _tx: &MemoryTx, label: &str) -> Result<Vec<Node>> {
        let idx = self.inner.label_index.read();
        let nodes = self.inner.nodes.read();

        let Some(ids) = idx.get(label) else { return Ok(Vec::new()) };
        Ok(ids.iter().filter_map(|id| nodes.get(id).cloned()).collect())
    }

    async fn relationships_by_type(
        &self,
        _tx: &MemoryTx,
        rel_type: &str,
    ) -> Result<Vec<Relationship>> {
        let mut rels: Vec<Relationship> = self.inner.relationships.read()
            .values()
            .filter(|r| r.rel_type == rel_type)
            .cloned()
            .collect();
        rels.sort_by_key(|r| r.id.0);
        Ok(rels)
    }

    // ========================================================================
    // Merge
    // ========================================================================

    async fn node_by_uri(
        &self,
        _tx: &MemoryTx,
        uri_key: &str,
        uri: &str,
    ) -> Result<Option<Node>> {
        self.ensure_uri_index(uri_key);
        let id = self.inner.uri_index.read()
            .get(uri_key)
            .and_then(|by_uri| by_uri.get(uri).copied());
        Ok(id.and_then(|id| self.inner.nodes.read().get(&id).cloned()))
    }

    async fn merge_node(
        &self,
        tx: &mut MemoryTx,
        uri_key: &str,
        uri: &str,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<MergedNode> {
        ensure_writable(tx)?;
        self.ensure_uri_index(uri_key);
        let existing = self.inner.uri_index.read()
            .get(uri_key)
            .and_then(|by_uri| by_uri.get(uri).copied());

        let Some(id) = existing else {
            let mut props: PropertyMap =
                props.into_iter().filter(|(_, v)| !v.is_null()).collect();
            props.insert(uri_key.to_string(), Value::from(uri));
            let id = self.create_node(tx, labels, props).await?;
            return Ok(MergedNode { id, created: true });
        };

        for label in labels {
            self.add_label(tx, id, label).await?;
        }
        for (key, val) in props {
            if val.is_null() {
                self.remove_node_property(tx, id, &key).await?;
            } else {
                self.set_node_property(tx, id, &key, val).await?;
            }
        }
        Ok(MergedNode { id, created: false })
    }

    async fn merge_relationship(
        &self,
        tx: &mut MemoryTx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<MergedRelationship> {
        ensure_writable(tx)?;
        let existing = {
            let adj = self.inner.adjacency.read();
            let rels = self.inner.relationships.read();
            adj.get(&src).and_then(|ids| {
                ids.iter()
                    .filter_map(|rid| rels.get(rid))
                    .find(|r| r.src == src && r.dst == dst && r.rel_type == rel_type)
                    .map(|r| r.id)
            })
        };
        match existing {
            Some(id) => {
                for (key, val) in props {
                    self.set_relationship_property(tx, id, &key, val).await?;
                }
                Ok(MergedRelationship { id, created: false })
            }
            None => {
                let id = self.create_relationship(tx, src, dst, rel_type, props).await?;
                Ok(MergedRelationship { id, created: true })
            }
        }
    }
}

// ============================================================================
// ConfigStore impl
// ============================================================================

impl ConfigStore for MemoryBackend {
    fn load_config(&self, namespace: &str) -> Result<Vec<(String, String)>> {
        Ok(self.inner.config.read()
            .iter()
            .filter(|((ns, _), _)| ns == namespace)
            .map(|((_, key), payload)| (key.clone(), payload.clone()))
            .collect())
    }

    fn save_config(&self, namespace: &str, key: &str, payload: &str) -> Result<()> {
        self.inner.config.write()
            .insert((namespace.to_string(), key.to_string()), payload.to_string());
        Ok(())
    }

    fn delete_config(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self.inner.config.write()
            .remove(&(namespace.to_string(), key.to_string()))
            .is_some())
    }
}

// ============================================================================
// Tests
// ============================================================================
