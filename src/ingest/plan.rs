//! Statement → mutation planning. Synchronous; never touches the store.

use std::collections::{HashMap, HashSet};

use smallvec::{smallvec, SmallVec};
use tracing::{debug, debug_span};

use super::batch::{HierarchyEdge, MutationBatch, NodeMerge, PropertyUpdate, RelationshipMerge};
use super::ontology;
use super::window::SubjectWindow;
use super::{
    IngestMode, IngestOptions, IngestReport, UnresolvedTermPolicy, BLANK_NODE_SCHEME,
    GRAPH_CONTEXT_PROPERTY,
};
use crate::config::{HierarchyPredicates, DEFAULT_URI_PROPERTY};
use crate::mapping::ElementKind;
use crate::model::{PropertyMap, Value};
use crate::rdf::{vocab, BlankNode, Literal, Object, RdfStatement, Subject};
use crate::resolve::cell::is_sibling_key;
use crate::resolve::{PropertyCell, TermResolver};
use crate::{Error, Result};

/// What one statement contributes to its subject's node.
#[derive(Debug, Clone)]
enum Op {
    Label(String),
    Property { key: String, cell: PropertyCell, append: bool },
    Link {
        rel_type: String,
        target: String,
        properties: PropertyMap,
        hierarchy: Option<HierarchyEdge>,
    },
}

type Staged = SmallVec<[Op; 2]>;

/// Resolves statements as they arrive and turns each full window into a batch.
pub struct BatchPlanner {
    resolver: TermResolver,
    options: IngestOptions,
    hierarchy: HierarchyPredicates,
    uri_key: String,
    window: SubjectWindow<Staged>,
    report: IngestReport,
    next_index: u64,
}

impl BatchPlanner {
    pub fn new(
        resolver: TermResolver,
        options: IngestOptions,
        hierarchy: HierarchyPredicates,
        default_batch_size: usize,
    ) -> Result<Self> {
        let capacity = options.commit_batch_size.unwrap_or(default_batch_size);
        if capacity == 0 {
            return Err(Error::InvalidConfig("commit_batch_size must be positive".into()));
        }
        Ok(Self {
            resolver,
            report: IngestReport::new(options.mode),
            options,
            hierarchy,
            uri_key: DEFAULT_URI_PROPERTY.into(),
            window: SubjectWindow::new(capacity),
            next_index: 0,
        })
    }

    /// Node property the store merges on. No predicate may land on it.
    pub fn with_uri_key(mut self, uri_key: impl Into<String>) -> Self {
        self.uri_key = uri_key.into();
        self
    }

    pub fn mode(&self) -> IngestMode {
        self.options.mode
    }

    pub fn report(&self) -> &IngestReport {
        &self.report
    }

    pub fn report_mut(&mut self) -> &mut IngestReport {
        &mut self.report
    }

    pub fn into_report(self) -> IngestReport {
        self.report
    }

    /// Statements currently held in the window.
    pub fn buffered(&self) -> usize {
        self.window.buffered()
    }

    /// Stage one statement. Returns a batch when this statement filled the window.
    pub fn push(&mut self, statement: RdfStatement) -> Result<Option<MutationBatch>> {
        let index = self.next_index;
        self.next_index += 1;
        self.report.statements_read += 1;

        let Some(ops) = self.stage(index, &statement)? else {
            return Ok(None);
        };
        let subject = subject_uri(&statement.subject);
        if self.window.push(&subject, ops) {
            Ok(Some(self.flush()))
        } else {
            Ok(None)
        }
    }

    /// Flush whatever is left once the input ends.
    pub fn finish(&mut self) -> Option<MutationBatch> {
        (!self.window.is_empty()).then(|| self.flush())
    }

    // ========================================================================
    // Staging
    // ========================================================================

    fn stage(&mut self, index: u64, st: &RdfStatement) -> Result<Option<Staged>> {
        if self.options.excluded_predicates.iter().any(|p| *p == st.predicate) {
            self.report.record_skip(index, st, "excluded predicate".into());
            return Ok(None);
        }
        if self.options.schema_only {
            if let Some(reason) = ontology::exclusion_reason(st, &self.hierarchy) {
                self.report.record_skip(index, st, reason.into());
                return Ok(None);
            }
        }
        if st.predicate == vocab::RDF_TYPE {
            return self.stage_type(index, st);
        }
        match &st.object {
            Object::Literal(lit) => self.stage_literal(index, st, lit),
            Object::Iri(_) | Object::Blank(_) => self.stage_link(index, st),
        }
    }

    fn stage_type(&mut self, index: u64, st: &RdfStatement) -> Result<Option<Staged>> {
        let handling = self.options.type_handling;
        let class = match &st.object {
            Object::Iri(iri) => iri.clone(),
            Object::Blank(b) if !handling.labels() => blank_uri(b),
            other => {
                let err = Error::UnresolvedTerm {
                    term: other.to_string(),
                    reason: "rdf:type object is not a class IRI".into(),
                };
                return self.unresolved(index, st, err);
            }
        };

        let mut ops = Staged::new();
        if handling.labels() {
            match self.resolver.resolve_inbound(&class, ElementKind::Label) {
                Ok(label) => ops.push(Op::Label(label)),
                Err(e) => return self.unresolved(index, st, e),
            }
        }
        if handling.nodes() {
            match self.resolver.resolve_inbound(vocab::RDF_TYPE, ElementKind::RelationshipType) {
                Ok(rel_type) => ops.push(Op::Link {
                    rel_type,
                    target: class,
                    properties: self.link_properties(st),
                    hierarchy: None,
                }),
                Err(e) => return self.unresolved(index, st, e),
            }
        }
        Ok(Some(ops))
    }

    fn stage_literal(&mut self, index: u64, st: &RdfStatement, lit: &Literal) -> Result<Option<Staged>> {
        let filtered = match (&lit.language, &self.options.language_filter) {
            (Some(tag), Some(wanted)) => !language_matches(tag, wanted),
            _ => false,
        };
        if filtered {
            self.report.record_skip(index, st, "language filtered out".into());
            return Ok(None);
        }

        let key = match self.resolver.resolve_inbound(&st.predicate, ElementKind::PropertyKey) {
            Ok(key) => key,
            Err(e) => return self.unresolved(index, st, e),
        };
        if key == self.uri_key || is_sibling_key(&key) {
            let err = Error::UnresolvedTerm {
                term: st.predicate.clone(),
                reason: format!("property key {key:?} is reserved"),
            };
            return self.unresolved(index, st, err);
        }
        let mut cell = PropertyCell::from(self.options.literals.resolve(lit));
        if !self.options.keep_lang_tag {
            cell.language = None;
        }
        let append = self.appends(&st.predicate);
        Ok(Some(smallvec![Op::Property { key, cell, append }]))
    }

    fn stage_link(&mut self, index: u64, st: &RdfStatement) -> Result<Option<Staged>> {
        let rel_type = match self.resolver.resolve_inbound(&st.predicate, ElementKind::RelationshipType) {
            Ok(rel_type) => rel_type,
            Err(e) => return self.unresolved(index, st, e),
        };
        let hierarchy = match (self.hierarchy.kind_of(&st.predicate), &st.subject, &st.object) {
            (Some(kind), Subject::Iri(child), Object::Iri(parent)) => {
                Some(HierarchyEdge::resolved(&self.resolver, kind, child, parent))
            }
            _ => None,
        };
        Ok(Some(smallvec![Op::Link {
            rel_type,
            target: object_uri(&st.object),
            properties: self.link_properties(st),
            hierarchy,
        }]))
    }

    fn unresolved(&mut self, index: u64, st: &RdfStatement, err: Error) -> Result<Option<Staged>> {
        if !matches!(err, Error::UnresolvedTerm { .. }) {
            return Err(err);
        }
        match self.options.on_unresolved_term {
            UnresolvedTermPolicy::Skip => {
                debug!(index, %err, "statement skipped");
                self.report.record_skip(index, st, err.to_string());
                Ok(None)
            }
            UnresolvedTermPolicy::FailFast => Err(err),
            UnresolvedTermPolicy::CoerceToLiteral => {
                let text = match &st.object {
                    Object::Literal(lit) => lit.lexical.clone(),
                    other => object_uri(other),
                };
                Ok(Some(smallvec![Op::Property {
                    key: st.predicate.clone(),
                    cell: PropertyCell::text(text),
                    append: self.appends(&st.predicate),
                }]))
            }
        }
    }

    fn appends(&self, predicate: &str) -> bool {
        self.options.multival == super::MultivalPolicy::Append
            && self
                .options
                .multival_predicates
                .as_ref()
                .is_none_or(|preds| preds.iter().any(|p| p == predicate))
    }

    fn link_properties(&self, st: &RdfStatement) -> PropertyMap {
        let mut props = PropertyMap::new();
        if let (true, Some(graph)) = (self.options.keep_graph_context, &st.graph) {
            props.insert(GRAPH_CONTEXT_PROPERTY.into(), Value::from(graph.as_str()));
        }
        props
    }

    // ========================================================================
    // Flush
    // ========================================================================

    fn flush(&mut self) -> MutationBatch {
        self.report.batches += 1;
        let _span = debug_span!("window_flush", sequence = self.report.batches).entered();
        let mut batch = MutationBatch {
            sequence: self.report.batches,
            statements: 0,
            nodes: Vec::new(),
            relationships: Vec::new(),
            hierarchy: Vec::new(),
        };
        let mut rel_slots: HashMap<(String, String, String), usize> = HashMap::new();

        for (subject, staged) in self.window.drain() {
            let mut node = NodeMerge::subject(subject.as_str());
            if let Some(label) = &self.options.resource_label {
                node.add_label(label);
            }
            for ops in staged {
                batch.statements += 1;
                for op in ops {
                    match op {
                        Op::Label(label) => node.add_label(&label),
                        Op::Property { key, cell, append } => set_property(&mut node, key, cell, append),
                        Op::Link { rel_type, target, properties, hierarchy } => {
                            let slot = (subject.clone(), target.clone(), rel_type.clone());
                            match rel_slots.get(&slot) {
                                Some(&i) => batch.relationships[i].properties.extend(properties),
                                None => {
                                    rel_slots.insert(slot, batch.relationships.len());
                                    batch.relationships.push(RelationshipMerge {
                                        src: subject.clone(),
                                        dst: target,
                                        rel_type,
                                        properties,
                                    });
                                }
                            }
                            if let Some(edge) = hierarchy {
                                if !batch.hierarchy.contains(&edge) {
                                    batch.hierarchy.push(edge);
                                }
                            }
                        }
                    }
                }
            }
            batch.nodes.push(node);
        }

        let subjects: HashSet<&str> = batch.nodes.iter().map(|n| n.uri.as_str()).collect();
        let mut stubbed: HashSet<&str> = HashSet::new();
        let mut stubs = Vec::new();
        for rel in &batch.relationships {
            if !subjects.contains(rel.dst.as_str()) && stubbed.insert(rel.dst.as_str()) {
                let mut stub = NodeMerge::stub(rel.dst.as_str());
                if let Some(label) = &self.options.resource_label {
                    stub.add_label(label);
                }
                stubs.push(stub);
            }
        }
        batch.nodes.extend(stubs);

        debug!(
            sequence = batch.sequence,
            statements = batch.statements,
            nodes = batch.nodes.len(),
            relationships = batch.relationships.len(),
            "window flushed"
        );
        batch
    }
}

fn set_property(node: &mut NodeMerge, key: String, cell: PropertyCell, append: bool) {
    match node.properties.iter().position(|p| p.key == key) {
        Some(i) => {
            let update = &mut node.properties[i];
            if append {
                if !update.cells.contains(&cell) {
                    update.cells.push(cell);
                }
            } else {
                update.cells = vec![cell];
            }
            update.append = append;
        }
        None => node.properties.push(PropertyUpdate { key, cells: vec![cell], append }),
    }
}

fn blank_uri(b: &BlankNode) -> String {
    format!("{BLANK_NODE_SCHEME}{}", b.id())
}

/// Node key of a subject: its IRI, or `bnode://<id>`.
pub fn subject_uri(subject: &Subject) -> String {
    match subject {
        Subject::Iri(iri) => iri.clone(),
        Subject::Blank(b) => blank_uri(b),
    }
}

fn object_uri(object: &Object) -> String {
    match object {
        Object::Iri(iri) => iri.clone(),
        Object::Blank(b) => blank_uri(b),
        Object::Literal(lit) => lit.lexical.clone(),
    }
}

fn language_matches(tag: &str, wanted: &str) -> bool {
    tag.eq_ignore_ascii_case(wanted)
        || tag
            .get(..wanted.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(wanted) && tag[wanted.len()..].starts_with('-'))
}
