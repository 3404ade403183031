//! Preview / dry-run: the ingest pipeline against read-only lookups.
//!
//! A preview runs the same planner and windowing as a real ingest. Only the
//! sink differs: [`SimulatedSink`] answers "would this node or relationship
//! be created?" from `ReadOnly` lookups plus the set of things earlier
//! simulated batches would already have created. The store, the registry
//! and the inference index are never written, and the report counts match
//! what an ingest of the same input would report.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, warn};

use crate::ingest::apply::unavailable;
use crate::ingest::{drive, BatchOutcome, BatchPlanner, BatchSink, IngestReport, MutationBatch, MutationStream};
use crate::model::{Direction, NodeId};
use crate::rdf::{ParsedStatement, RdfStatement};
use crate::storage::StorageBackend;
use crate::tx::TxMode;
use crate::{IngestError, Result};

/// What a dry run would do, with the input sample and the planned batches.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewReport {
    pub report: IngestReport,
    /// The parsed statements the preview consumed.
    pub statements: Vec<RdfStatement>,
    pub batches: Vec<MutationBatch>,
}

type RelKey = (String, String, String);

/// A [`BatchSink`] that never writes.
pub struct SimulatedSink<'a, B: StorageBackend> {
    backend: &'a B,
    uri_key: &'a str,
    created_nodes: HashSet<String>,
    created_rels: HashSet<RelKey>,
    keep_batches: bool,
    batches: Vec<MutationBatch>,
}

impl<'a, B: StorageBackend> SimulatedSink<'a, B> {
    pub fn new(backend: &'a B, uri_key: &'a str) -> Self {
        Self {
            backend,
            uri_key,
            created_nodes: HashSet::new(),
            created_rels: HashSet::new(),
            keep_batches: false,
            batches: Vec::new(),
        }
    }

    /// Keep a copy of every simulated batch.
    pub fn keep_batches(mut self) -> Self {
        self.keep_batches = true;
        self
    }

    pub fn into_batches(self) -> Vec<MutationBatch> {
        self.batches
    }

    async fn simulate(&mut self, tx: &B::Tx, batch: &MutationBatch) -> Result<BatchOutcome> {
        let mut outcome = BatchOutcome::default();
        // None: created by this or an earlier simulated batch
        let mut stored: HashMap<&str, Option<NodeId>> = HashMap::new();

        for node in &batch.nodes {
            let existing = if self.created_nodes.contains(&node.uri) {
                None
            } else {
                self.backend.node_by_uri(tx, self.uri_key, &node.uri).await?.map(|n| n.id)
            };
            let exists = existing.is_some() || self.created_nodes.contains(&node.uri);
            stored.insert(&node.uri, existing);
            match (exists, node.stub) {
                (true, true) => {}
                (true, false) => outcome.nodes_updated += 1,
                (false, _) => {
                    outcome.nodes_created += 1;
                    self.created_nodes.insert(node.uri.clone());
                }
            }
        }

        for rel in &batch.relationships {
            let key = (rel.src.clone(), rel.dst.clone(), rel.rel_type.clone());
            if self.created_rels.contains(&key) {
                continue;
            }
            let src = stored.get(rel.src.as_str()).copied().flatten();
            let dst = stored.get(rel.dst.as_str()).copied().flatten();
            let exists = match (src, dst) {
                (Some(src), Some(dst)) => self
                    .backend
                    .get_relationships(tx, src, Direction::Outgoing, Some(&rel.rel_type))
                    .await?
                    .iter()
                    .any(|r| r.dst == dst),
                _ => false,
            };
            if !exists {
                outcome.relationships_created += 1;
                self.created_rels.insert(key);
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl<'a, B: StorageBackend> BatchSink for SimulatedSink<'a, B> {
    async fn apply(&mut self, batch: &MutationBatch) -> Result<BatchOutcome> {
        let tx = self.backend.begin_tx(TxMode::ReadOnly).await.map_err(unavailable)?;
        let simulated = self.simulate(&tx, batch).await;
        match simulated {
            Ok(outcome) => {
                self.backend.commit_tx(tx).await.map_err(unavailable)?;
                debug!(sequence = batch.sequence, nodes_created = outcome.nodes_created, "batch simulated");
                if self.keep_batches {
                    self.batches.push(batch.clone());
                }
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

/// Dry-run the first `sample_limit` statements of `source`.
pub async fn run_preview<B, I>(
    backend: &B,
    uri_key: &str,
    planner: BatchPlanner,
    source: I,
    sample_limit: usize,
) -> std::result::Result<PreviewReport, IngestError>
where
    B: StorageBackend,
    I: IntoIterator<Item = ParsedStatement>,
{
    let sample: Vec<ParsedStatement> = source.into_iter().take(sample_limit).collect();
    let statements = sample.iter().filter_map(|s| s.as_ref().ok().cloned()).collect();

    let mut sink = SimulatedSink::new(backend, uri_key).keep_batches();
    let report = drive(MutationStream::new(sample.into_iter(), planner), &mut sink).await?;
    Ok(PreviewReport { report, statements, batches: sink.into_batches() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HierarchyPredicates;
    use crate::ingest::IngestOptions;
    use crate::resolve::TermResolver;
    use crate::storage::MemoryBackend;

    fn planner() -> BatchPlanner {
        BatchPlanner::new(
            TermResolver::new(None, "neo4j://graph.schema#"),
            IngestOptions::default().preview(),
            HierarchyPredicates::default(),
            100,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_preview_counts_without_writing() {
        let db = MemoryBackend::new();
        let input = vec![
            Ok(RdfStatement::literal("http://ex.org/a", "http://ex.org/name", "A")),
            Ok(RdfStatement::iri("http://ex.org/a", "http://ex.org/knows", "http://ex.org/b")),
            Ok(RdfStatement::iri("http://ex.org/b", "http://ex.org/knows", "http://ex.org/a")),
        ];

        let preview = run_preview(&db, "uri", planner(), input, 10).await.unwrap();
        assert_eq!(preview.statements.len(), 3);
        assert_eq!(preview.report.nodes_created, 2);
        assert_eq!(preview.report.relationships_created, 2);
        assert_eq!(preview.batches.len(), 1);

        let stats = db.tx_stats();
        assert_eq!(stats.read_write_begun, 0);
    }

    #[tokio::test]
    async fn test_sample_limit() {
        let db = MemoryBackend::new();
        let input = (0..50).map(|i| Ok(RdfStatement::literal(&format!("http://ex.org/s{i}"), "http://ex.org/p", "x")));
        let preview = run_preview(&db, "uri", planner(), input, 5).await.unwrap();
        assert_eq!(preview.statements.len(), 5);
        assert_eq!(preview.report.statements_read, 5);
        assert_eq!(preview.report.nodes_created, 5);
    }
}
