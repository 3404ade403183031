//! Committing batches to the graph store.

use std::collections::HashMap;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::batch::{MutationBatch, NodeMerge};
use super::{BatchOutcome, BatchSink};
use crate::inference::InferenceIndex;
use crate::model::{NodeId, PropertyMap};
use crate::resolve::cell::{decode_cells, encode_cells};
use crate::storage::StorageBackend;
use crate::tx::TxMode;
use crate::{Error, Result};

/// Writes each batch in its own `ReadWrite` transaction, then feeds the
/// batch's hierarchy edges to the inference index.
pub struct CommitSink<'a, B: StorageBackend> {
    backend: &'a B,
    uri_key: &'a str,
    inference: &'a InferenceIndex,
}

impl<'a, B: StorageBackend> CommitSink<'a, B> {
    pub fn new(backend: &'a B, uri_key: &'a str, inference: &'a InferenceIndex) -> Self {
        Self { backend, uri_key, inference }
    }
}

#[async_trait]
impl<'a, B: StorageBackend> BatchSink for CommitSink<'a, B> {
    async fn apply(&mut self, batch: &MutationBatch) -> Result<BatchOutcome> {
        let mut tx = self.backend.begin_tx(TxMode::ReadWrite).await.map_err(unavailable)?;
        match write_batch(self.backend, &mut tx, self.uri_key, batch).await {
            Ok(mut outcome) => {
                self.backend.commit_tx(tx).await.map_err(unavailable)?;
                outcome.warnings = self.inference.add_edges(&batch.hierarchy);
                debug!(
                    sequence = batch.sequence,
                    nodes_created = outcome.nodes_created,
                    relationships_created = outcome.relationships_created,
                    "batch committed"
                );
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback) = self.backend.rollback_tx(tx).await {
                    warn!(%rollback, sequence = batch.sequence, "rollback failed");
                }
                Err(unavailable(e))
            }
        }
    }
}

async fn write_batch<B: StorageBackend>(
    backend: &B,
    tx: &mut B::Tx,
    uri_key: &str,
    batch: &MutationBatch,
) -> Result<BatchOutcome> {
    let mut outcome = BatchOutcome::default();
    let mut ids: HashMap<&str, NodeId> = HashMap::new();

    for node in &batch.nodes {
        let labels: Vec<&str> = node.labels.iter().map(String::as_str).collect();
        if node.stub {
            if let Some(existing) = backend.node_by_uri(tx, uri_key, &node.uri).await? {
                ids.insert(&node.uri, existing.id);
                continue;
            }
            let merged = backend.merge_node(tx, uri_key, &node.uri, &labels, PropertyMap::new()).await?;
            outcome.nodes_created += 1;
            ids.insert(&node.uri, merged.id);
            continue;
        }

        let stored = if node.properties.iter().any(|p| p.append) {
            backend.node_by_uri(tx, uri_key, &node.uri).await?.map(|n| n.properties)
        } else {
            None
        };
        let props = node_properties(node, stored.as_ref());
        let merged = backend.merge_node(tx, uri_key, &node.uri, &labels, props).await?;
        if merged.created {
            outcome.nodes_created += 1;
        } else {
            outcome.nodes_updated += 1;
        }
        ids.insert(&node.uri, merged.id);
    }

    for rel in &batch.relationships {
        let (Some(&src), Some(&dst)) = (ids.get(rel.src.as_str()), ids.get(rel.dst.as_str())) else {
            return Err(Error::StorageError(format!(
                "relationship {} from {} to {} has an unmerged endpoint",
                rel.rel_type, rel.src, rel.dst
            )));
        };
        let merged = backend
            .merge_relationship(tx, src, dst, &rel.rel_type, rel.properties.clone())
            .await?;
        if merged.created {
            outcome.relationships_created += 1;
        }
    }
    Ok(outcome)
}

/// Encoded properties for one subject merge, unioned with `stored` where the
/// update appends.
pub fn node_properties(node: &NodeMerge, stored: Option<&PropertyMap>) -> PropertyMap {
    let mut props = PropertyMap::new();
    for update in &node.properties {
        let cells = match (update.append, stored) {
            (true, Some(stored)) => {
                let mut cells = decode_cells(stored, &update.key);
                for cell in &update.cells {
                    if !cells.contains(cell) {
                        cells.push(cell.clone());
                    }
                }
                cells
            }
            _ => update.cells.clone(),
        };
        encode_cells(&update.key, &cells, &mut props);
    }
    props
}

pub(crate) fn unavailable(e: Error) -> Error {
    match e {
        Error::StoreUnavailable(_) => e,
        other => Error::StoreUnavailable(other.to_string()),
    }
}
