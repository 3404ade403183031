//! # Statement Ingest Pipeline
//!
//! Parsed statements → subject window → mutation batches → graph store.
//!
//! ```text
//!  ParsedStatement ──► BatchPlanner::push ──► SubjectWindow (≤ k statements)
//!                            │ full / end of input
//!                            ▼
//!                      MutationBatch ──► BatchSink::apply
//!                                          ├─ CommitSink     (one ReadWrite tx per batch)
//!                                          └─ SimulatedSink  (ReadOnly lookups only)
//! ```
//!
//! Batches commit independently. A failure aborts the call but leaves every
//! earlier batch committed; the returned [`IngestError`] carries the report
//! up to that point.

pub mod apply;
pub mod batch;
pub mod ontology;
pub mod plan;
pub mod stream;
pub mod window;

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::inference::CycleDetectedWarning;
use crate::rdf::{ParsedStatement, RdfStatement};
use crate::resolve::LiteralPolicy;
use crate::{IngestError, Result};

pub use apply::CommitSink;
pub use batch::{HierarchyEdge, MutationBatch, NodeMerge, PropertyUpdate, RelationshipMerge};
pub use plan::BatchPlanner;
pub use stream::MutationStream;
pub use window::SubjectWindow;

/// Upper bound on skipped statements kept verbatim in a report.
pub const MAX_SKIPPED_SAMPLE: usize = 1_000;

/// Relationship property recording the named graph a statement came from.
pub const GRAPH_CONTEXT_PROPERTY: &str = "graphUri";

/// Prefix that turns a blank node id into a node key.
pub const BLANK_NODE_SCHEME: &str = "bnode://";

// ============================================================================
// Options
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnresolvedTermPolicy {
    /// Record the statement in the report and carry on.
    #[default]
    Skip,
    /// Abort the call on the first unresolved term.
    FailFast,
    /// Store the object's text under the predicate's full IRI.
    CoerceToLiteral,
}

/// What a repeated literal predicate on one subject does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MultivalPolicy {
    /// Last value wins, also against the stored value.
    #[default]
    Overwrite,
    /// Accumulate distinct values into a list.
    Append,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IngestMode {
    #[default]
    Ingest,
    Preview,
}

/// How `rdf:type` statements land in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TypeHandling {
    /// One label per type.
    #[default]
    Labels,
    /// A relationship to a node for the class.
    Nodes,
    LabelsAndNodes,
}

impl TypeHandling {
    pub fn labels(self) -> bool {
        matches!(self, TypeHandling::Labels | TypeHandling::LabelsAndNodes)
    }

    pub fn nodes(self) -> bool {
        matches!(self, TypeHandling::Nodes | TypeHandling::LabelsAndNodes)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Statements per flushed batch. `None` takes the engine default.
    pub commit_batch_size: Option<usize>,
    pub on_unresolved_term: UnresolvedTermPolicy,
    pub multival: MultivalPolicy,
    /// Restrict `MultivalPolicy::Append` to these predicates.
    pub multival_predicates: Option<Vec<String>>,
    pub mode: IngestMode,
    pub type_handling: TypeHandling,
    pub keep_lang_tag: bool,
    /// Only keep tagged literals in this language (`en` also admits `en-GB`).
    pub language_filter: Option<String>,
    pub excluded_predicates: Vec<String>,
    /// Extra label put on every node the call merges.
    pub resource_label: Option<String>,
    /// Record the statement's named graph on relationships.
    pub keep_graph_context: bool,
    pub literals: LiteralPolicy,
    /// Keep only class and property declarations and their structure.
    pub schema_only: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            commit_batch_size: None,
            on_unresolved_term: UnresolvedTermPolicy::default(),
            multival: MultivalPolicy::default(),
            multival_predicates: None,
            mode: IngestMode::default(),
            type_handling: TypeHandling::default(),
            keep_lang_tag: true,
            language_filter: None,
            excluded_predicates: Vec::new(),
            resource_label: None,
            keep_graph_context: false,
            literals: LiteralPolicy::default(),
            schema_only: false,
        }
    }
}

impl IngestOptions {
    pub fn with_batch_size(mut self, k: usize) -> Self {
        self.commit_batch_size = Some(k);
        self
    }

    pub fn with_policy(mut self, policy: UnresolvedTermPolicy) -> Self {
        self.on_unresolved_term = policy;
        self
    }

    pub fn with_multival(mut self, policy: MultivalPolicy) -> Self {
        self.multival = policy;
        self
    }

    pub fn preview(mut self) -> Self {
        self.mode = IngestMode::Preview;
        self
    }

    pub fn schema_only(mut self) -> Self {
        self.schema_only = true;
        self
    }
}

// ============================================================================
// Report
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedStatement {
    /// 0-based position in the input.
    pub index: u64,
    pub statement: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    pub mode: IngestMode,
    pub statements_read: u64,
    pub statements_committed: u64,
    pub statements_skipped: u64,
    /// First [`MAX_SKIPPED_SAMPLE`] skipped statements.
    pub skipped: Vec<SkippedStatement>,
    pub nodes_created: u64,
    pub nodes_updated: u64,
    pub relationships_created: u64,
    pub batches: u64,
    pub hierarchy_edges: u64,
    pub warnings: Vec<CycleDetectedWarning>,
    pub elapsed_ms: u64,
}

/// The countable part of a report, for comparing runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestCounts {
    pub statements_read: u64,
    pub statements_committed: u64,
    pub statements_skipped: u64,
    pub nodes_created: u64,
    pub nodes_updated: u64,
    pub relationships_created: u64,
    pub batches: u64,
    pub hierarchy_edges: u64,
}

impl IngestReport {
    pub fn new(mode: IngestMode) -> Self {
        Self { mode, ..Self::default() }
    }

    pub fn counts(&self) -> IngestCounts {
        IngestCounts {
            statements_read: self.statements_read,
            statements_committed: self.statements_committed,
            statements_skipped: self.statements_skipped,
            nodes_created: self.nodes_created,
            nodes_updated: self.nodes_updated,
            relationships_created: self.relationships_created,
            batches: self.batches,
            hierarchy_edges: self.hierarchy_edges,
        }
    }

    pub fn record_skip(&mut self, index: u64, statement: &RdfStatement, reason: String) {
        self.statements_skipped += 1;
        if self.skipped.len() < MAX_SKIPPED_SAMPLE {
            self.skipped.push(SkippedStatement { index, statement: statement.to_string(), reason });
        }
    }

    fn absorb(&mut self, batch: &MutationBatch, outcome: BatchOutcome) {
        self.statements_committed += batch.statements;
        self.hierarchy_edges += batch.hierarchy.len() as u64;
        self.nodes_created += outcome.nodes_created;
        self.nodes_updated += outcome.nodes_updated;
        self.relationships_created += outcome.relationships_created;
        self.warnings.extend(outcome.warnings);
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// What applying one batch did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub nodes_created: u64,
    pub nodes_updated: u64,
    pub relationships_created: u64,
    pub warnings: Vec<CycleDetectedWarning>,
}

/// Where planned batches go.
#[async_trait]
pub trait BatchSink: Send {
    async fn apply(&mut self, batch: &MutationBatch) -> Result<BatchOutcome>;
}

/// Pull batches from `stream` into `sink` until the input ends or a batch fails.
pub(crate) async fn drive<I, S>(mut stream: MutationStream<I>, sink: &mut S) -> std::result::Result<IngestReport, IngestError>
where
    I: Iterator<Item = ParsedStatement>,
    S: BatchSink,
{
    let started = Instant::now();
    while let Some(next) = stream.next() {
        let applied = match next {
            Ok(batch) => sink.apply(&batch).await.map(|outcome| (batch, outcome)),
            Err(e) => Err(e),
        };
        match applied {
            Ok((batch, outcome)) => stream.report_mut().absorb(&batch, outcome),
            Err(error) => {
                let mut report = stream.into_report();
                report.elapsed_ms = started.elapsed().as_millis() as u64;
                warn!(
                    %error,
                    read = report.statements_read,
                    committed = report.statements_committed,
                    "ingest aborted"
                );
                return Err(IngestError { error, report });
            }
        }
    }
    let mut report = stream.into_report();
    report.elapsed_ms = started.elapsed().as_millis() as u64;
    info!(
        mode = ?report.mode,
        read = report.statements_read,
        skipped = report.statements_skipped,
        nodes_created = report.nodes_created,
        relationships_created = report.relationships_created,
        batches = report.batches,
        "ingest finished"
    );
    Ok(report)
}
