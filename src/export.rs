//! RDF export: reconstruct statements from stored nodes.
//!
//! The reverse of ingest: a node selection is walked lazily, one node at a
//! time, and each node becomes its `rdf:type` statements, one statement per
//! literal value, and one per outgoing relationship.
//!
//! ```text
//! ExportSelection ──► RdfExport::next_node() ──► Vec<RdfStatement>
//!                         │ ReadOnly tx held until exhausted
//!                         ▼
//!                  TermResolver::resolve_outbound (labels, keys, types)
//! ```
//!
//! Property encoding follows [`crate::resolve::cell`]: `key^^` and `key@`
//! siblings are folded back into literals and the uri property becomes the
//! subject. Every other key is exported.

use std::collections::{HashSet, VecDeque};

use tracing::{debug, debug_span, Instrument};

use crate::ingest::{BLANK_NODE_SCHEME, GRAPH_CONTEXT_PROPERTY};
use crate::mapping::ElementKind;
use crate::model::*;
use crate::rdf::{vocab, BlankNode, Object, RdfStatement, Subject};
use crate::resolve::cell::{decode_cells, is_sibling_key};
use crate::resolve::TermResolver;
use crate::storage::StorageBackend;
use crate::tx::TxMode;
use crate::Result;

// ============================================================================
// Selection and options
// ============================================================================

/// Which nodes to export, in the order they are yielded.
pub enum ExportSelection {
    Ids(Vec<NodeId>),
    Uris(Vec<String>),
    /// An already-executed query result: node handles pulled lazily.
    Query(Box<dyn Iterator<Item = NodeId> + Send>),
}

impl std::fmt::Debug for ExportSelection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportSelection::Ids(ids) => f.debug_tuple("Ids").field(&ids.len()).finish(),
            ExportSelection::Uris(uris) => f.debug_tuple("Uris").field(&uris.len()).finish(),
            ExportSelection::Query(_) => f.write_str("Query(..)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Label added at ingest time to every node; not exported as a type.
    pub resource_label: Option<String>,
    pub include_relationships: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self { resource_label: None, include_relationships: true }
    }
}

enum Source {
    Ids(std::vec::IntoIter<NodeId>),
    Uris(std::vec::IntoIter<String>),
    Query(Box<dyn Iterator<Item = NodeId> + Send>),
}

enum Handle {
    Id(NodeId),
    Uri(String),
}

impl Source {
    fn next(&mut self) -> Option<Handle> {
        match self {
            Source::Ids(it) => it.next().map(Handle::Id),
            Source::Uris(it) => it.next().map(Handle::Uri),
            Source::Query(it) => it.next().map(Handle::Id),
        }
    }
}

// ============================================================================
// RdfExport cursor
// ============================================================================

/// Lazy statement cursor over a node selection.
///
/// Holds one read-only transaction from the first pull until the selection
/// is exhausted.
pub struct RdfExport<'a, B: StorageBackend> {
    backend: &'a B,
    tx: Option<B::Tx>,
    resolver: TermResolver,
    uri_key: &'a str,
    individuals_namespace: &'a str,
    options: ExportOptions,
    source: Source,
    /// Id selections: relationships to these nodes are exported even when
    /// the target has no uri.
    members: HashSet<NodeId>,
    pending: VecDeque<RdfStatement>,
    nodes_exported: u64,
    unresolved: Vec<String>,
}

impl<'a, B: StorageBackend> RdfExport<'a, B> {
    pub async fn open(
        backend: &'a B,
        selection: ExportSelection,
        resolver: TermResolver,
        uri_key: &'a str,
        individuals_namespace: &'a str,
        options: ExportOptions,
    ) -> Result<Self> {
        let tx = backend.begin_tx(TxMode::ReadOnly).await?;
        let (source, members) = match selection {
            ExportSelection::Ids(ids) => {
                let members = ids.iter().copied().collect();
                (Source::Ids(ids.into_iter()), members)
            }
            ExportSelection::Uris(uris) => (Source::Uris(uris.into_iter()), HashSet::new()),
            ExportSelection::Query(handle) => (Source::Query(handle), HashSet::new()),
        };
        Ok(Self {
            backend,
            tx: Some(tx),
            resolver,
            uri_key,
            individuals_namespace,
            options,
            source,
            members,
            pending: VecDeque::new(),
            nodes_exported: 0,
            unresolved: Vec::new(),
        })
    }

    /// Statements of the next selected node, or `None` once exhausted.
    /// Selected ids or uris with no stored node are passed over.
    pub async fn next_node(&mut self) -> Result<Option<Vec<RdfStatement>>> {
        loop {
            let Some(tx) = self.tx.as_ref() else { return Ok(None) };
            let node = match self.source.next() {
                Some(Handle::Id(id)) => self.backend.get_node(tx, id).await?,
                Some(Handle::Uri(uri)) => self.backend.node_by_uri(tx, self.uri_key, &uri).await?,
                None => {
                    self.close().await?;
                    return Ok(None);
                }
            };
            let Some(node) = node else {
                debug!("selected node not found");
                continue;
            };
            let span = debug_span!("export_node", node = %node.id);
            let (statements, unresolved) = self.node_statements(tx, &node).instrument(span).await?;
            self.unresolved.extend(unresolved);
            self.nodes_exported += 1;
            return Ok(Some(statements));
        }
    }

    pub async fn next_statement(&mut self) -> Result<Option<RdfStatement>> {
        loop {
            if let Some(statement) = self.pending.pop_front() {
                return Ok(Some(statement));
            }
            match self.next_node().await? {
                Some(statements) => self.pending.extend(statements),
                None => return Ok(None),
            }
        }
    }

    /// Drain the whole selection. Loads every statement into memory.
    pub async fn collect_all(mut self) -> Result<Vec<RdfStatement>> {
        let mut out: Vec<RdfStatement> = self.pending.drain(..).collect();
        while let Some(statements) = self.next_node().await? {
            out.extend(statements);
        }
        Ok(out)
    }

    pub fn nodes_exported(&self) -> u64 {
        self.nodes_exported
    }

    /// Graph names that had no IRI under the mapping; their statements were left out.
    pub fn unresolved_terms(&self) -> &[String] {
        &self.unresolved
    }

    /// End the read transaction early.
    pub async fn close(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            self.backend.commit_tx(tx).await?;
            debug!(nodes = self.nodes_exported, "export finished");
        }
        Ok(())
    }

    // ========================================================================
    // Per-node reconstruction
    // ========================================================================

    async fn node_statements(&self, tx: &B::Tx, node: &Node) -> Result<(Vec<RdfStatement>, Vec<String>)> {
        let subject = self.subject_of(node);
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut unresolved = Vec::new();
        let mut emit = |statement: RdfStatement| {
            if seen.insert(statement.clone()) {
                out.push(statement);
            }
        };

        for label in &node.labels {
            if self.options.resource_label.as_ref() == Some(label) {
                continue;
            }
            match self.resolver.resolve_outbound(label, ElementKind::Label) {
                Ok(class) => emit(RdfStatement::new(subject.clone(), vocab::RDF_TYPE, Object::Iri(class))),
                Err(_) => unresolved.push(label.clone()),
            }
        }

        let mut keys: Vec<&String> = node
            .properties
            .keys()
            .filter(|k| k.as_str() != self.uri_key && !is_sibling_key(k))
            .collect();
        keys.sort();
        for key in keys {
            let predicate = match self.resolver.resolve_outbound(key, ElementKind::PropertyKey) {
                Ok(predicate) => predicate,
                Err(_) => {
                    unresolved.push(key.clone());
                    continue;
                }
            };
            for cell in decode_cells(&node.properties, key) {
                if cell.value.is_null() {
                    continue;
                }
                emit(RdfStatement::new(subject.clone(), predicate.as_str(), cell.to_literal()));
            }
        }

        if self.options.include_relationships {
            let mut rels = self.backend.get_relationships(tx, node.id, Direction::Outgoing, None).await?;
            rels.sort_by_key(|r| r.id.0);
            for rel in rels {
                let Some(target) = self.backend.get_node(tx, rel.dst).await? else { continue };
                if target.uri(self.uri_key).is_none() && !self.members.contains(&rel.dst) {
                    continue;
                }
                let predicate = match self.resolver.resolve_outbound(&rel.rel_type, ElementKind::RelationshipType) {
                    Ok(predicate) => predicate,
                    Err(_) => {
                        unresolved.push(rel.rel_type.clone());
                        continue;
                    }
                };
                let mut statement = RdfStatement::new(subject.clone(), predicate, Object::from(self.subject_of(&target)));
                statement.graph = rel
                    .properties
                    .get(GRAPH_CONTEXT_PROPERTY)
                    .and_then(Value::as_str)
                    .map(str::to_string);
                emit(statement);
            }
        }
        Ok((out, unresolved))
    }

    fn subject_of(&self, node: &Node) -> Subject {
        match node.uri(self.uri_key) {
            Some(uri) => match uri.strip_prefix(BLANK_NODE_SCHEME) {
                Some(id) => Subject::Blank(BlankNode::new(id)),
                None => Subject::Iri(uri.to_string()),
            },
            None => Subject::Iri(format!("{}{}", self.individuals_namespace, node.id)),
        }
    }
}
