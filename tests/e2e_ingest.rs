//! End-to-end ingest: parsed statements in, merged nodes and relationships out.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use graph_semantics::rdf::vocab::{RDF_TYPE, XSD_INTEGER};
use graph_semantics::storage::memory::MemoryTx;
use graph_semantics::{
    BlankNode, Direction, ElementKind, Engine, Error, IngestOptions, Literal, MemoryBackend, MultivalPolicy, Node,
    NodeId, Object, ParseError, ParsedStatement, PropertyMap, RdfStatement, RelId, Relationship, SchemaOptions,
    StorageBackend, Subject, TxMode, UnresolvedTermPolicy, Value,
};
use pretty_assertions::assert_eq;

const EX: &str = "http://ex.org/";

fn ex(local: &str) -> String {
    format!("{EX}{local}")
}

fn alice() -> Vec<ParsedStatement> {
    vec![
        Ok(RdfStatement::iri(&ex("Alice"), RDF_TYPE, &ex("Person"))),
        Ok(RdfStatement::literal(&ex("Alice"), &ex("name"), "Alice")),
    ]
}

/// Engine whose `ex` schema maps the `ex` namespace to labels only.
fn engine_with_labels(options: SchemaOptions) -> Engine<MemoryBackend> {
    let engine = Engine::open_memory().unwrap();
    engine.registry().add_schema("ex", options.with_namespace("ex", EX)).unwrap();
    engine.registry().add_mapping("ex", "ex", ElementKind::Label, "").unwrap();
    engine
}

async fn graph_size<B: StorageBackend>(db: &B) -> (u64, u64) {
    let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
    let counts = (db.node_count(&tx).await.unwrap(), db.relationship_count(&tx).await.unwrap());
    db.commit_tx(tx).await.unwrap();
    counts
}

async fn node_by_uri(engine: &Engine<MemoryBackend>, uri: &str) -> Node {
    let db = engine.backend();
    let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
    let node = db.node_by_uri(&tx, "uri", uri).await.unwrap().unwrap();
    db.commit_tx(tx).await.unwrap();
    node
}

// ============================================================================
// Mapping scenarios
// ============================================================================

#[tokio::test]
async fn test_alice_person_scenario() {
    let engine = engine_with_labels(SchemaOptions::default());
    let report = engine.ingest(alice(), Some("ex"), IngestOptions::default()).await.unwrap();

    assert_eq!(report.statements_read, 2);
    assert_eq!(report.statements_committed, 2);
    assert_eq!(report.statements_skipped, 0);
    assert_eq!(report.nodes_created, 1);
    assert_eq!(report.relationships_created, 0);

    let people = engine.nodes_with_label("Person", false).await.unwrap();
    assert_eq!(people.len(), 1);
    let node = &people[0];
    assert_eq!(node.labels, vec!["Person".to_string()]);
    assert_eq!(node.get("name"), Some(&Value::from("Alice")));
    assert_eq!(node.get("uri"), Some(&Value::from("http://ex.org/Alice")));
    assert_eq!(node.properties.len(), 2);
}

#[tokio::test]
async fn test_no_mapping_keeps_full_iris() {
    let engine = Engine::open_memory().unwrap();
    engine.ingest(alice(), None, IngestOptions::default()).await.unwrap();

    let node = node_by_uri(&engine, &ex("Alice")).await;
    assert_eq!(node.labels, vec![ex("Person")]);
    assert_eq!(node.get(&ex("name")), Some(&Value::from("Alice")));
}

#[tokio::test]
async fn test_typed_literal_becomes_native() {
    let engine = Engine::open_memory().unwrap();
    let input = vec![Ok(RdfStatement::new(
        Subject::Iri(ex("Alice")),
        ex("age"),
        Literal::typed("42", XSD_INTEGER),
    ))];
    engine.ingest(input, None, IngestOptions::default()).await.unwrap();

    let node = node_by_uri(&engine, &ex("Alice")).await;
    assert_eq!(node.get(&ex("age")), Some(&Value::Int(42)));
}

// ============================================================================
// Merge semantics
// ============================================================================

fn friends() -> Vec<ParsedStatement> {
    vec![
        Ok(RdfStatement::literal(&ex("alice"), &ex("name"), "Alice")),
        Ok(RdfStatement::iri(&ex("alice"), &ex("knows"), &ex("bob"))),
        Ok(RdfStatement::literal(&ex("bob"), &ex("name"), "Bob")),
    ]
}

#[tokio::test]
async fn test_ingest_twice_is_idempotent() {
    let engine = Engine::open_memory().unwrap();

    let first = engine.ingest(friends(), None, IngestOptions::default()).await.unwrap();
    assert_eq!(first.nodes_created, 2);
    assert_eq!(first.relationships_created, 1);
    let once = graph_size(engine.backend()).await;

    let second = engine.ingest(friends(), None, IngestOptions::default()).await.unwrap();
    assert_eq!(second.nodes_created, 0);
    assert_eq!(second.nodes_updated, 2);
    assert_eq!(second.relationships_created, 0);
    assert_eq!(graph_size(engine.backend()).await, once);
    assert_eq!(once, (2, 1));
}

fn alice_with_isbn() -> Vec<ParsedStatement> {
    vec![
        Ok(RdfStatement::iri(&ex("Alice"), RDF_TYPE, &ex("Person"))),
        Ok(RdfStatement::literal(&ex("Alice"), &ex("uri"), "urn:isbn:123")),
    ]
}

#[tokio::test]
async fn test_predicate_named_like_uri_key_keeps_join_key() {
    let engine = engine_with_labels(SchemaOptions::default());
    for round in 0..3 {
        let report = engine.ingest(alice_with_isbn(), Some("ex"), IngestOptions::default()).await.unwrap();
        assert_eq!(report.statements_skipped, 1);
        assert_eq!(report.skipped[0].index, 1);
        assert!(report.skipped[0].reason.contains("reserved"));
        assert_eq!(report.nodes_created, u64::from(round == 0));
        assert_eq!(graph_size(engine.backend()).await, (1, 0));
    }
    let node = node_by_uri(&engine, &ex("Alice")).await;
    assert_eq!(node.get("uri"), Some(&Value::from("http://ex.org/Alice")));
}

#[tokio::test]
async fn test_predicate_named_like_uri_key_coerced_round_trips() {
    let engine = engine_with_labels(SchemaOptions::default());
    let options = IngestOptions::default().with_policy(UnresolvedTermPolicy::CoerceToLiteral);
    for _ in 0..3 {
        engine.ingest(alice_with_isbn(), Some("ex"), options.clone()).await.unwrap();
    }
    assert_eq!(graph_size(engine.backend()).await, (1, 0));

    let exported = engine.export_all(Some("ex")).await.unwrap().collect_all().await.unwrap();
    assert!(exported.iter().all(|s| s.subject == Subject::Iri(ex("Alice"))));
    assert!(exported.contains(&RdfStatement::literal(&ex("Alice"), &ex("uri"), "urn:isbn:123")));
    assert_eq!(exported.len(), 2);
}

#[tokio::test]
async fn test_forward_reference_resolved_in_later_batch() {
    let engine = Engine::open_memory().unwrap();
    // bob is only a relationship target in the first batch
    let options = IngestOptions::default().with_batch_size(2);
    let report = engine.ingest(friends(), None, options).await.unwrap();

    assert_eq!(report.batches, 2);
    // bob: stub in the first batch, subject in the second
    assert_eq!(report.nodes_created, 2);
    assert_eq!(report.nodes_updated, 1);
    assert_eq!(graph_size(engine.backend()).await, (2, 1));

    let bob = node_by_uri(&engine, &ex("bob")).await;
    assert_eq!(bob.get(&ex("name")), Some(&Value::from("Bob")));
}

#[tokio::test]
async fn test_multival_overwrite_and_append() {
    let input = || {
        vec![
            Ok(RdfStatement::literal(&ex("alice"), &ex("tag"), "a")),
            Ok(RdfStatement::literal(&ex("alice"), &ex("tag"), "b")),
        ]
    };

    let engine = Engine::open_memory().unwrap();
    engine.ingest(input(), None, IngestOptions::default()).await.unwrap();
    assert_eq!(node_by_uri(&engine, &ex("alice")).await.get(&ex("tag")), Some(&Value::from("b")));

    let engine = Engine::open_memory().unwrap();
    let options = IngestOptions::default().with_multival(MultivalPolicy::Append);
    engine.ingest(input(), None, options).await.unwrap();
    assert_eq!(
        node_by_uri(&engine, &ex("alice")).await.get(&ex("tag")),
        Some(&Value::List(vec![Value::from("a"), Value::from("b")]))
    );
}

#[tokio::test]
async fn test_blank_nodes_keyed_by_scheme() {
    let engine = Engine::open_memory().unwrap();
    let input = vec![
        Ok(RdfStatement::new(Subject::Iri(ex("alice")), ex("address"), Object::Blank(BlankNode::new("a1")))),
        Ok(RdfStatement::new(Subject::Blank(BlankNode::new("a1")), ex("city"), Literal::simple("Paris"))),
    ];
    engine.ingest(input, None, IngestOptions::default()).await.unwrap();

    let address = node_by_uri(&engine, "bnode://a1").await;
    assert_eq!(address.get(&ex("city")), Some(&Value::from("Paris")));
    assert_eq!(graph_size(engine.backend()).await, (2, 1));
}

// ============================================================================
// Streaming bound
// ============================================================================

#[tokio::test]
async fn test_batches_bounded_by_window_size() {
    let engine = Engine::open_memory().unwrap();
    let (n, k) = (100usize, 7usize);
    // ten subjects, interleaved, ten predicates each
    let input: Vec<ParsedStatement> = (0..n)
        .map(|i| Ok(RdfStatement::literal(&ex(&format!("s{}", i % 10)), &ex(&format!("p{}", i / 10)), "v")))
        .collect();

    let report = engine.ingest(input, None, IngestOptions::default().with_batch_size(k)).await.unwrap();
    assert!(report.batches as usize <= n.div_ceil(k) + 1, "batches = {}", report.batches);
    assert_eq!(report.statements_committed, n as u64);
    assert_eq!(report.nodes_created, 10);

    for s in 0..10 {
        let node = node_by_uri(&engine, &ex(&format!("s{s}"))).await;
        for p in 0..10 {
            assert_eq!(node.get(&ex(&format!("p{p}"))), Some(&Value::from("v")));
        }
    }
}

#[tokio::test]
async fn test_stream_never_writes() {
    let engine = Engine::open_memory().unwrap();
    let stream = engine.stream_rdf(friends(), None, IngestOptions::default().with_batch_size(1)).unwrap();
    let batches: Vec<_> = stream.collect::<Result<_, _>>().unwrap();

    assert_eq!(batches.len(), 3);
    assert_eq!(graph_size(engine.backend()).await, (0, 0));
    assert_eq!(engine.backend().tx_stats().read_write_begun, 0);
}

// ============================================================================
// Failure policy
// ============================================================================

#[tokio::test]
async fn test_unresolved_term_skipped() {
    let engine = engine_with_labels(SchemaOptions { mapped_only: true, ..SchemaOptions::default() });
    let report = engine.ingest(alice(), Some("ex"), IngestOptions::default()).await.unwrap();

    assert_eq!(report.statements_skipped, 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].index, 1);
    assert_eq!(report.nodes_created, 1);
}

#[tokio::test]
async fn test_unresolved_term_fail_fast() {
    let engine = engine_with_labels(SchemaOptions { mapped_only: true, ..SchemaOptions::default() });
    let options = IngestOptions::default().with_policy(UnresolvedTermPolicy::FailFast);
    let err = engine.ingest(alice(), Some("ex"), options).await.unwrap_err();

    assert!(matches!(err.error, Error::UnresolvedTerm { .. }));
    assert_eq!(err.report.statements_read, 2);
    assert_eq!(err.report.statements_committed, 0);
    assert_eq!(graph_size(engine.backend()).await, (0, 0));
}

#[tokio::test]
async fn test_unresolved_term_coerced_to_literal() {
    let engine = engine_with_labels(SchemaOptions { mapped_only: true, ..SchemaOptions::default() });
    let options = IngestOptions::default().with_policy(UnresolvedTermPolicy::CoerceToLiteral);
    engine.ingest(alice(), Some("ex"), options).await.unwrap();

    let node = node_by_uri(&engine, &ex("Alice")).await;
    assert_eq!(node.get(&ex("name")), Some(&Value::from("Alice")));
}

#[tokio::test]
async fn test_parse_error_aborts_after_committed_batches() {
    let engine = Engine::open_memory().unwrap();
    let mut input = alice();
    input.push(Err(ParseError::at(3, "unexpected end of statement")));
    input.push(Ok(RdfStatement::literal(&ex("Bob"), &ex("name"), "Bob")));

    let err = engine
        .ingest(input, None, IngestOptions::default().with_batch_size(1))
        .await
        .unwrap_err();
    assert!(matches!(err.error, Error::Parse(_)));
    assert_eq!(err.report.statements_committed, 2);
    assert_eq!(err.report.batches, 2);
    assert_eq!(graph_size(engine.backend()).await, (1, 0));
}

// ============================================================================
// Store failure
// ============================================================================

/// Memory store whose write transactions start failing after `budget` begins.
#[derive(Clone)]
struct FlakyBackend {
    inner: MemoryBackend,
    budget: std::sync::Arc<AtomicUsize>,
}

impl FlakyBackend {
    fn new(budget: usize) -> Self {
        Self { inner: MemoryBackend::new(), budget: std::sync::Arc::new(AtomicUsize::new(budget)) }
    }
}

#[async_trait]
impl StorageBackend for FlakyBackend {
    type Tx = MemoryTx;

    async fn begin_tx(&self, mode: TxMode) -> graph_semantics::Result<MemoryTx> {
        if mode.is_write() && self.budget.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |b| b.checked_sub(1)).is_err() {
            return Err(Error::StorageError("connection reset".into()));
        }
        self.inner.begin_tx(mode).await
    }

    async fn commit_tx(&self, tx: MemoryTx) -> graph_semantics::Result<()> {
        self.inner.commit_tx(tx).await
    }

    async fn rollback_tx(&self, tx: MemoryTx) -> graph_semantics::Result<()> {
        self.inner.rollback_tx(tx).await
    }

    async fn create_node(&self, tx: &mut MemoryTx, labels: &[&str], props: PropertyMap) -> graph_semantics::Result<NodeId> {
        self.inner.create_node(tx, labels, props).await
    }

    async fn get_node(&self, tx: &MemoryTx, id: NodeId) -> graph_semantics::Result<Option<Node>> {
        self.inner.get_node(tx, id).await
    }

    async fn set_node_property(&self, tx: &mut MemoryTx, id: NodeId, key: &str, val: Value) -> graph_semantics::Result<()> {
        self.inner.set_node_property(tx, id, key, val).await
    }

    async fn remove_node_property(&self, tx: &mut MemoryTx, id: NodeId, key: &str) -> graph_semantics::Result<()> {
        self.inner.remove_node_property(tx, id, key).await
    }

    async fn add_label(&self, tx: &mut MemoryTx, id: NodeId, label: &str) -> graph_semantics::Result<()> {
        self.inner.add_label(tx, id, label).await
    }

    async fn create_relationship(
        &self,
        tx: &mut MemoryTx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> graph_semantics::Result<RelId> {
        self.inner.create_relationship(tx, src, dst, rel_type, props).await
    }

    async fn get_relationships(
        &self,
        tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> graph_semantics::Result<Vec<Relationship>> {
        self.inner.get_relationships(tx, node, dir, rel_type).await
    }

    async fn node_count(&self, tx: &MemoryTx) -> graph_semantics::Result<u64> {
        self.inner.node_count(tx).await
    }

    async fn relationship_count(&self, tx: &MemoryTx) -> graph_semantics::Result<u64> {
        self.inner.relationship_count(tx).await
    }

    async fn all_nodes(&self, tx: &MemoryTx) -> graph_semantics::Result<Vec<Node>> {
        self.inner.all_nodes(tx).await
    }

    async fn nodes_by_label(&self, tx: &MemoryTx, label: &str) -> graph_semantics::Result<Vec<Node>> {
        self.inner.nodes_by_label(tx, label).await
    }
}

#[tokio::test]
async fn test_store_failure_keeps_committed_batches() {
    let backend = FlakyBackend::new(1);
    let engine = Engine::new(backend.clone());
    let input = vec![
        Ok(RdfStatement::literal(&ex("a"), &ex("name"), "A")),
        Ok(RdfStatement::literal(&ex("b"), &ex("name"), "B")),
        Ok(RdfStatement::literal(&ex("c"), &ex("name"), "C")),
    ];

    let err = engine
        .ingest(input, None, IngestOptions::default().with_batch_size(1))
        .await
        .unwrap_err();
    assert!(matches!(err.error, Error::StoreUnavailable(_)));
    assert_eq!(err.report.statements_committed, 1);
    assert_eq!(err.report.nodes_created, 1);
    assert_eq!(graph_size(&backend.inner).await, (1, 0));
}
