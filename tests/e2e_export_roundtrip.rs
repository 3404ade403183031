//! Export round-trip: statements → ingest → export → the same statements.
//!
//! Blank nodes keep their ids through the `bnode://` uri, so the sets are
//! compared directly.

use std::collections::HashSet;

use graph_semantics::rdf::vocab::{RDF_TYPE, XSD_INT, XSD_INTEGER};
use graph_semantics::{
    BlankNode, ElementKind, Engine, ExportOptions, ExportSelection, IngestOptions, Literal, MemoryBackend,
    NodeId, Object, ParsedStatement, RdfStatement, SchemaOptions, StorageBackend, Subject, TxMode,
};
use pretty_assertions::assert_eq;

const EX: &str = "http://ex.org/";

fn ex(local: &str) -> String {
    format!("{EX}{local}")
}

fn dataset() -> Vec<RdfStatement> {
    let alice = Subject::Iri(ex("alice"));
    vec![
        RdfStatement::iri(&ex("alice"), RDF_TYPE, &ex("Person")),
        RdfStatement::literal(&ex("alice"), &ex("name"), "Alice"),
        RdfStatement::new(alice.clone(), ex("age"), Literal::typed("42", XSD_INTEGER)),
        RdfStatement::new(alice.clone(), ex("shoeSize"), Literal::typed("38", XSD_INT)),
        RdfStatement::new(alice.clone(), ex("nickname"), Literal::lang("Alicia", "es")),
        RdfStatement::new(alice.clone(), ex("born"), Literal::typed("circa 1990", "http://ex.org/fuzzyDate")),
        RdfStatement::iri(&ex("alice"), &ex("knows"), &ex("bob")).in_graph(ex("g1")),
        RdfStatement::new(alice, ex("address"), Object::Blank(BlankNode::new("addr"))),
        RdfStatement::iri(&ex("bob"), RDF_TYPE, &ex("Person")),
        RdfStatement::literal(&ex("bob"), &ex("name"), "Bob"),
        RdfStatement::new(Subject::Blank(BlankNode::new("addr")), ex("city"), Literal::simple("Paris")),
    ]
}

fn parsed(statements: &[RdfStatement]) -> Vec<ParsedStatement> {
    statements.iter().cloned().map(Ok).collect()
}

/// `ex` namespace mapped for every element kind, names are local names.
fn engine_with_full_mapping() -> Engine<MemoryBackend> {
    let engine = Engine::open_memory().unwrap();
    let registry = engine.registry();
    registry.add_schema("ex", SchemaOptions::default().with_namespace("ex", EX)).unwrap();
    for kind in [ElementKind::Label, ElementKind::RelationshipType, ElementKind::PropertyKey] {
        registry.add_mapping("ex", "ex", kind, "").unwrap();
    }
    engine
}

fn keep_graphs() -> IngestOptions {
    IngestOptions { keep_graph_context: true, ..IngestOptions::default() }
}

#[tokio::test]
async fn test_roundtrip_with_mapping() {
    let engine = engine_with_full_mapping();
    engine.ingest(parsed(&dataset()), Some("ex"), keep_graphs()).await.unwrap();

    // names in the graph are local names
    let people = engine.nodes_with_label("Person", false).await.unwrap();
    assert_eq!(people.len(), 2);

    let exported = engine.export_all(Some("ex")).await.unwrap().collect_all().await.unwrap();
    let exported: HashSet<RdfStatement> = exported.into_iter().collect();
    let expected: HashSet<RdfStatement> = dataset().into_iter().collect();
    assert_eq!(exported, expected);
}

#[tokio::test]
async fn test_roundtrip_without_mapping() {
    let engine = Engine::open_memory().unwrap();
    engine.ingest(parsed(&dataset()), None, keep_graphs()).await.unwrap();

    let exported = engine.export_all(None).await.unwrap().collect_all().await.unwrap();
    let exported: HashSet<RdfStatement> = exported.into_iter().collect();
    assert_eq!(exported, dataset().into_iter().collect::<HashSet<_>>());
}

#[tokio::test]
async fn test_underscore_local_names_round_trip() {
    let engine = engine_with_full_mapping();
    let input = vec![RdfStatement::literal(&ex("alice"), &ex("_code"), "x")];
    engine.ingest(parsed(&input), Some("ex"), IngestOptions::default()).await.unwrap();

    let exported = engine.export_all(Some("ex")).await.unwrap().collect_all().await.unwrap();
    assert_eq!(exported, input);
}

#[tokio::test]
async fn test_export_by_uri_in_selection_order() {
    let engine = engine_with_full_mapping();
    engine.ingest(parsed(&dataset()), Some("ex"), keep_graphs()).await.unwrap();

    let mut export = engine
        .export_by_uri([ex("bob"), ex("nobody"), ex("alice")], Some("ex"))
        .await
        .unwrap();

    let bob = export.next_node().await.unwrap().unwrap();
    assert!(bob.iter().all(|s| s.subject == Subject::Iri(ex("bob"))));
    assert_eq!(bob.len(), 2);

    let alice = export.next_node().await.unwrap().unwrap();
    assert!(alice.iter().all(|s| s.subject == Subject::Iri(ex("alice"))));
    assert_eq!(alice.len(), 8);

    assert!(export.next_node().await.unwrap().is_none());
    assert_eq!(export.nodes_exported(), 2);
}

#[tokio::test]
async fn test_export_by_query_is_lazy() {
    let engine = Engine::open_memory().unwrap();
    engine.ingest(parsed(&dataset()), None, IngestOptions::default()).await.unwrap();

    let db = engine.backend();
    let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
    let ids: Vec<NodeId> = db.nodes_by_label(&tx, &ex("Person")).await.unwrap().into_iter().map(|n| n.id).collect();
    db.commit_tx(tx).await.unwrap();

    let mut export = engine.export_by_query(ids, None).await.unwrap();
    let mut count = 0;
    while let Some(statement) = export.next_statement().await.unwrap() {
        assert!(matches!(statement.subject, Subject::Iri(_)));
        count += 1;
    }
    // alice: 8 statements, bob: 2
    assert_eq!(count, 10);
}

#[tokio::test]
async fn test_resource_label_not_exported() {
    let engine = Engine::open_memory().unwrap();
    let options = IngestOptions { resource_label: Some("Resource".into()), ..IngestOptions::default() };
    let input = vec![Ok(RdfStatement::iri(&ex("alice"), RDF_TYPE, &ex("Person")))];
    engine.ingest(input, None, options).await.unwrap();

    let export = engine
        .export(
            ExportSelection::Uris(vec![ex("alice")]),
            None,
            ExportOptions { resource_label: Some("Resource".into()), ..ExportOptions::default() },
        )
        .await
        .unwrap();
    assert_eq!(export.collect_all().await.unwrap(), vec![RdfStatement::iri(&ex("alice"), RDF_TYPE, &ex("Person"))]);
}

#[tokio::test]
async fn test_export_never_writes() {
    let engine = Engine::open_memory().unwrap();
    engine.ingest(parsed(&dataset()), None, IngestOptions::default()).await.unwrap();
    let before = engine.backend().tx_stats();

    engine.export_all(None).await.unwrap().collect_all().await.unwrap();
    let after = engine.backend().tx_stats();
    assert_eq!(after.read_write_begun, before.read_write_begun);
}
