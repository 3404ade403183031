//! # graph-semantics: RDF ↔ Property Graph Mapping
//!
//! Loads RDF statements into a labeled property graph, exports graph content
//! back as RDF, and answers subclass / subproperty questions over what was
//! loaded.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `StorageBackend` is the contract between the engine and the graph store
//! 2. **Clean DTOs**: `Node`, `Relationship`, `Value`, `RdfStatement` cross all boundaries
//! 3. **Parser owns nothing**: statements arrive already parsed; serialization is the caller's
//! 4. **One resolver per call**: a call captures a schema mapping once and uses it throughout
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use graph_semantics::{Engine, IngestOptions, RdfStatement};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::open_memory()?;
//!
//! let input = vec![
//!     Ok(RdfStatement::iri("http://ex.org/alice", graph_semantics::rdf::vocab::RDF_TYPE, "http://ex.org/Person")),
//!     Ok(RdfStatement::literal("http://ex.org/alice", "http://ex.org/name", "Alice")),
//! ];
//! let report = engine.ingest(input, None, IngestOptions::default()).await?;
//! assert_eq!(report.nodes_created, 1);
//!
//! let statements = engine.export_all(None).await?.collect_all().await?;
//! assert_eq!(statements.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Components
//!
//! | Component | Module | Description |
//! |-----------|--------|-------------|
//! | Term Resolver | `resolve` | IRI ↔ graph name under a schema mapping |
//! | Schema Mapping Registry | `mapping` | Named, persisted translation tables |
//! | Statement Ingest Pipeline | `ingest` | Windowed batches, one transaction each |
//! | Inference Index | `inference` | Memoized subclass / subproperty closure |
//! | Export Mapper | `export` | Nodes back to statements |
//! | Preview | `preview` | Ingest against read-only lookups |

// ============================================================================
// Modules
// ============================================================================

pub mod config;
pub mod export;
pub mod inference;
pub mod ingest;
pub mod mapping;
pub mod model;
pub mod preview;
pub mod rdf;
pub mod resolve;
pub mod storage;
pub mod tx;

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, info, Instrument};

// ============================================================================
// Re-exports
// ============================================================================

pub use model::{Direction, Node, NodeId, PropertyMap, RelId, Relationship, Value};

pub use rdf::{BlankNode, Literal, Object, ParseError, ParsedStatement, RdfStatement, Subject};

pub use storage::{ConfigStore, MemoryBackend, StorageBackend};

pub use tx::{Transaction, TxId, TxMode};

pub use config::{EngineConfig, HierarchyKind, HierarchyPredicates};

pub use mapping::{ElementKind, MappingEntry, NamingPolicy, SchemaMapping, SchemaOptions, SchemaRegistry};

pub use resolve::TermResolver;

pub use ingest::{
    IngestMode, IngestOptions, IngestReport, MultivalPolicy, MutationBatch, MutationStream,
    TypeHandling, UnresolvedTermPolicy,
};

pub use inference::{BuildReport, CycleDetectedWarning, InferenceIndex};

pub use export::{ExportOptions, ExportSelection, RdfExport};

pub use preview::PreviewReport;

use ingest::{BatchPlanner, CommitSink, HierarchyEdge};
use preview::SimulatedSink;

// ============================================================================
// Engine handle
// ============================================================================

/// The primary entry point. An `Engine` wraps a storage backend together
/// with the schema registry and the inference index built over its content.
pub struct Engine<B: StorageBackend> {
    backend: B,
    config: EngineConfig,
    registry: SchemaRegistry,
    inference: InferenceIndex,
    /// Remembers which mappings wrote hierarchy relationships, across restarts.
    store: Option<Arc<dyn ConfigStore>>,
    /// Set once the index reflects every hierarchy edge in the store.
    hydrated: AtomicBool,
}

/// Configuration namespace listing the mappings hierarchy edges were ingested under.
pub const INFERENCE_SOURCE_NAMESPACE: &str = "inference_source";

/// How [`Engine::nodes_linked_to`] picks neighbours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkFilter {
    /// Through relationships of this type (and its subtypes).
    RelationshipType { name: String, include_subtypes: bool },
    /// Neighbours carrying this label (or a subclass label).
    Label { name: String, include_subclasses: bool },
}

impl<B: StorageBackend> Engine<B> {
    /// Engine with default settings and an unpersisted registry.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: EngineConfig::default(),
            registry: SchemaRegistry::new(),
            inference: InferenceIndex::new(),
            store: None,
            hydrated: AtomicBool::new(false),
        }
    }

    pub fn with_config(backend: B, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, ..Self::new(backend) })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn inference(&self) -> &InferenceIndex {
        &self.inference
    }

    /// Resolver bound to the current version of `mapping`, or the identity
    /// resolver when no mapping is named.
    pub fn resolver(&self, mapping: Option<&str>) -> Result<TermResolver> {
        let schema = mapping.map(|name| self.registry.get(name)).transpose()?;
        Ok(TermResolver::new(schema, self.config.default_namespace.as_str()))
    }

    fn planner(&self, mapping: Option<&str>, options: IngestOptions) -> Result<BatchPlanner> {
        let planner = BatchPlanner::new(
            self.resolver(mapping)?,
            options,
            self.config.hierarchy.clone(),
            self.config.default_commit_batch_size,
        )?;
        Ok(planner.with_uri_key(self.config.uri_property.as_str()))
    }

    // ========================================================================
    // Ingest
    // ========================================================================

    /// The would-be mutation batches for `source`, without touching the store.
    pub fn stream_rdf<I>(
        &self,
        source: I,
        mapping: Option<&str>,
        options: IngestOptions,
    ) -> Result<MutationStream<I::IntoIter>>
    where
        I: IntoIterator<Item = ParsedStatement>,
    {
        let planner = self.planner(mapping, options)?;
        Ok(MutationStream::new(source.into_iter(), planner))
    }

    /// Load `source` into the store, one transaction per batch.
    ///
    /// In `IngestMode::Preview` nothing is written and the report holds what
    /// an ingest would have done.
    pub async fn ingest<I>(
        &self,
        source: I,
        mapping: Option<&str>,
        options: IngestOptions,
    ) -> std::result::Result<IngestReport, IngestError>
    where
        I: IntoIterator<Item = ParsedStatement>,
    {
        let span = tracing::info_span!("ingest", mapping = mapping.unwrap_or(""), mode = ?options.mode);
        self.run_ingest(source, mapping, options).instrument(span).await
    }

    async fn run_ingest<I>(
        &self,
        source: I,
        mapping: Option<&str>,
        options: IngestOptions,
    ) -> std::result::Result<IngestReport, IngestError>
    where
        I: IntoIterator<Item = ParsedStatement>,
    {
        let mode = options.mode;
        let stream = self.stream_rdf(source, mapping, options)?;
        let uri_key = self.config.uri_property.as_str();
        match mode {
            IngestMode::Ingest => {
                // cycle checks need the edges of earlier runs
                self.hydrate_inference().await?;
                let mut sink = CommitSink::new(&self.backend, uri_key, &self.inference);
                let result = ingest::drive(stream, &mut sink).await;
                let report = match &result {
                    Ok(report) => report,
                    Err(e) => &e.report,
                };
                if report.hierarchy_edges > 0 {
                    if let Err(error) = self.record_inference_source(mapping) {
                        return Err(IngestError { error, report: report.clone() });
                    }
                }
                result
            }
            IngestMode::Preview => {
                let mut sink = SimulatedSink::new(&self.backend, uri_key);
                ingest::drive(stream, &mut sink).await
            }
        }
    }

    /// Load only the ontology in `source`: class and property declarations
    /// with their subclass, subproperty, domain and range statements.
    /// Hierarchy edges feed the inference index as in any ingest.
    pub async fn import_ontology<I>(
        &self,
        source: I,
        mapping: Option<&str>,
        options: IngestOptions,
    ) -> std::result::Result<IngestReport, IngestError>
    where
        I: IntoIterator<Item = ParsedStatement>,
    {
        self.ingest(source, mapping, options.schema_only()).await
    }

    /// Dry-run the first `sample_limit` statements of `source`.
    pub async fn preview<I>(
        &self,
        source: I,
        mapping: Option<&str>,
        options: IngestOptions,
        sample_limit: usize,
    ) -> std::result::Result<PreviewReport, IngestError>
    where
        I: IntoIterator<Item = ParsedStatement>,
    {
        let planner = self.planner(mapping, options.preview())?;
        preview::run_preview(&self.backend, &self.config.uri_property, planner, source, sample_limit).await
    }

    // ========================================================================
    // Export
    // ========================================================================

    pub async fn export(
        &self,
        selection: ExportSelection,
        mapping: Option<&str>,
        options: ExportOptions,
    ) -> Result<RdfExport<'_, B>> {
        let span = tracing::debug_span!("export_open", mapping = mapping.unwrap_or(""));
        RdfExport::open(
            &self.backend,
            selection,
            self.resolver(mapping)?,
            &self.config.uri_property,
            &self.config.individuals_namespace,
            options,
        )
        .instrument(span)
        .await
    }

    pub async fn export_by_id(
        &self,
        ids: impl IntoIterator<Item = NodeId>,
        mapping: Option<&str>,
    ) -> Result<RdfExport<'_, B>> {
        let selection = ExportSelection::Ids(ids.into_iter().collect());
        self.export(selection, mapping, ExportOptions::default()).await
    }

    pub async fn export_by_uri<S: Into<String>>(
        &self,
        uris: impl IntoIterator<Item = S>,
        mapping: Option<&str>,
    ) -> Result<RdfExport<'_, B>> {
        let selection = ExportSelection::Uris(uris.into_iter().map(Into::into).collect());
        self.export(selection, mapping, ExportOptions::default()).await
    }

    /// Export the nodes of an already-executed query, pulled lazily.
    pub async fn export_by_query<Q>(&self, handle: Q, mapping: Option<&str>) -> Result<RdfExport<'_, B>>
    where
        Q: IntoIterator<Item = NodeId>,
        Q::IntoIter: Send + 'static,
    {
        let selection = ExportSelection::Query(Box::new(handle.into_iter()));
        self.export(selection, mapping, ExportOptions::default()).await
    }

    pub async fn export_all(&self, mapping: Option<&str>) -> Result<RdfExport<'_, B>> {
        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let ids: Vec<NodeId> = self.backend.all_nodes(&tx).await?.into_iter().map(|n| n.id).collect();
        self.backend.commit_tx(tx).await?;
        self.export_by_id(ids, mapping).await
    }

    // ========================================================================
    // Inference
    // ========================================================================

    pub async fn ancestors(&self, kind: HierarchyKind, iri: &str) -> Result<BTreeSet<String>> {
        self.hydrate_inference().await?;
        Ok(self.inference.ancestors(kind, iri))
    }

    pub async fn descendants_including_self(&self, kind: HierarchyKind, iri: &str) -> Result<BTreeSet<String>> {
        self.hydrate_inference().await?;
        Ok(self.inference.descendants_including_self(kind, iri))
    }

    /// Nodes labeled `label`, or with any label below it when `include_subclasses`.
    pub async fn nodes_with_label(&self, label: &str, include_subclasses: bool) -> Result<Vec<Node>> {
        self.hydrate_inference().await?;
        let labels = self.expand(HierarchyKind::Class, label, include_subclasses);
        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let mut found = Vec::new();
        let mut seen = BTreeSet::new();
        for label in &labels {
            for node in self.backend.nodes_by_label(&tx, label).await? {
                if seen.insert(node.id) {
                    found.push(node);
                }
            }
        }
        self.backend.commit_tx(tx).await?;
        found.sort_by_key(|n| n.id);
        Ok(found)
    }

    /// Relationships of `rel_type`, or of any type below it when `include_subtypes`.
    pub async fn relationships_of_type(&self, rel_type: &str, include_subtypes: bool) -> Result<Vec<Relationship>> {
        self.hydrate_inference().await?;
        let types = self.expand(HierarchyKind::Property, rel_type, include_subtypes);
        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let mut found = Vec::new();
        for rel_type in &types {
            found.extend(self.backend.relationships_by_type(&tx, rel_type).await?);
        }
        self.backend.commit_tx(tx).await?;
        found.sort_by_key(|r| r.id.0);
        Ok(found)
    }

    /// Neighbours of `node` in `direction` that pass `filter`.
    pub async fn nodes_linked_to(&self, node: NodeId, filter: &LinkFilter, direction: Direction) -> Result<Vec<Node>> {
        self.hydrate_inference().await?;
        let (types, labels) = match filter {
            LinkFilter::RelationshipType { name, include_subtypes } => {
                (Some(self.expand(HierarchyKind::Property, name, *include_subtypes)), None)
            }
            LinkFilter::Label { name, include_subclasses } => {
                (None, Some(self.expand(HierarchyKind::Class, name, *include_subclasses)))
            }
        };

        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let mut found = Vec::new();
        let mut seen = BTreeSet::new();
        for rel in self.backend.get_relationships(&tx, node, direction, None).await? {
            if types.as_ref().is_some_and(|t| !t.contains(&rel.rel_type)) {
                continue;
            }
            let Some(other) = rel.other_node(node) else { continue };
            if !seen.insert(other) {
                continue;
            }
            let Some(neighbour) = self.backend.get_node(&tx, other).await? else { continue };
            if labels.as_ref().is_some_and(|l| !neighbour.labels.iter().any(|x| l.contains(x))) {
                continue;
            }
            found.push(neighbour);
        }
        self.backend.commit_tx(tx).await?;
        found.sort_by_key(|n| n.id);
        Ok(found)
    }

    /// Rebuild the inference index from the hierarchy relationships that
    /// `mapping` names in the store.
    pub async fn rebuild_inference(&self, mapping: Option<&str>) -> Result<BuildReport> {
        let edges = self.stored_hierarchy(mapping).await?;
        let report = self.inference.rebuild(&edges);
        self.hydrated.store(true, Ordering::Release);
        info!(
            classes = report.classes,
            properties = report.properties,
            edges = report.edges,
            cycles = report.cycles.len(),
            "inference index rebuilt"
        );
        Ok(report)
    }

    /// Load the hierarchy edges of every recorded ingest mapping, once per engine.
    async fn hydrate_inference(&self) -> Result<()> {
        if self.hydrated.load(Ordering::Acquire) {
            return Ok(());
        }
        let Some(store) = &self.store else {
            self.hydrated.store(true, Ordering::Release);
            return Ok(());
        };
        let mut edges = Vec::new();
        for (key, payload) in store.load_config(INFERENCE_SOURCE_NAMESPACE)? {
            let mapping: Option<String> = serde_json::from_str(&payload)?;
            match self.stored_hierarchy(mapping.as_deref()).await {
                Ok(found) => edges.extend(found),
                // the mapping was dropped since; its edges cannot be named
                Err(Error::NotFound(_)) => debug!(source = key.as_str(), "inference source gone"),
                Err(e) => return Err(e),
            }
        }
        if !edges.is_empty() {
            let report = self.inference.rebuild(&edges);
            info!(edges = report.edges, cycles = report.cycles.len(), "inference index loaded from store");
        }
        self.hydrated.store(true, Ordering::Release);
        Ok(())
    }

    fn record_inference_source(&self, mapping: Option<&str>) -> Result<()> {
        if let Some(store) = &self.store {
            let payload = serde_json::to_string(&mapping)?;
            store.save_config(INFERENCE_SOURCE_NAMESPACE, mapping.unwrap_or(""), &payload)?;
        }
        Ok(())
    }

    async fn stored_hierarchy(&self, mapping: Option<&str>) -> Result<Vec<HierarchyEdge>> {
        let resolver = self.resolver(mapping)?;
        let uri_key = self.config.uri_property.as_str();
        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let mut edges = Vec::new();
        for (predicate, kind) in self.config.hierarchy.all() {
            let Ok(rel_type) = resolver.resolve_inbound(predicate, ElementKind::RelationshipType) else {
                debug!(predicate, "hierarchy predicate has no relationship type");
                continue;
            };
            for rel in self.backend.relationships_by_type(&tx, &rel_type).await? {
                let child = self.backend.get_node(&tx, rel.src).await?;
                let parent = self.backend.get_node(&tx, rel.dst).await?;
                let (Some(child), Some(parent)) = (
                    child.as_ref().and_then(|n| n.uri(uri_key)),
                    parent.as_ref().and_then(|n| n.uri(uri_key)),
                ) else {
                    continue;
                };
                edges.push(HierarchyEdge::resolved(&resolver, kind, child, parent));
            }
        }
        self.backend.commit_tx(tx).await?;
        Ok(edges)
    }

    fn expand(&self, kind: HierarchyKind, name: &str, include_below: bool) -> BTreeSet<String> {
        if include_below {
            self.inference.expand_name(kind, name)
        } else {
            BTreeSet::from([name.to_string()])
        }
    }
}

/// Engines whose backend also persists registry state.
impl<B: StorageBackend + ConfigStore + Clone> Engine<B> {
    /// Open over `backend`, loading every persisted schema mapping.
    pub fn open(backend: B, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let store: Arc<dyn ConfigStore> = Arc::new(backend.clone());
        let registry = SchemaRegistry::load(store.clone())?;
        info!(schemas = registry.list_schemas().len(), "engine opened");
        Ok(Self {
            backend,
            config,
            registry,
            inference: InferenceIndex::new(),
            store: Some(store),
            hydrated: AtomicBool::new(false),
        })
    }
}

/// In-memory graph for testing and embedding.
impl Engine<MemoryBackend> {
    pub fn open_memory() -> Result<Self> {
        Self::open(MemoryBackend::new(), EngineConfig::default())
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Unresolved term {term}: {reason}")]
    UnresolvedTerm { term: String, reason: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Transaction error: {0}")]
    TxError(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// An ingest that stopped early. Batches before the failure stay committed;
/// `report` counts them.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct IngestError {
    #[source]
    pub error: Error,
    pub report: IngestReport,
}

impl From<Error> for IngestError {
    fn from(error: Error) -> Self {
        Self { error, report: IngestReport::default() }
    }
}
