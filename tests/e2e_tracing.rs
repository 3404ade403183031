//! Span tree emitted by ingest, registry writes and export.

use std::sync::{Arc, Mutex};

use graph_semantics::rdf::vocab::RDF_TYPE;
use graph_semantics::{ElementKind, Engine, IngestOptions, RdfStatement, SchemaOptions};
use tracing::span::{Attributes, Id};
use tracing::Subscriber;
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

/// `(span name, parent span name)` in creation order.
#[derive(Clone, Default)]
struct SpanStore(Arc<Mutex<Vec<(&'static str, Option<String>)>>>);

impl SpanStore {
    fn names(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().iter().map(|(name, _)| *name).collect()
    }

    fn parent_of(&self, name: &str) -> Option<String> {
        self.0.lock().unwrap().iter().find(|(n, _)| *n == name).and_then(|(_, parent)| parent.clone())
    }
}

struct SpanCapture(SpanStore);

impl<S> Layer<S> for SpanCapture
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, _id: &Id, ctx: Context<'_, S>) {
        let parent = attrs
            .parent()
            .and_then(|id| ctx.span(id))
            .map(|span| span.name().to_string())
            .or_else(|| ctx.lookup_current().map(|span| span.name().to_string()));
        self.0 .0.lock().unwrap().push((attrs.metadata().name(), parent));
    }
}

fn capture() -> (SpanStore, tracing::subscriber::DefaultGuard) {
    let store = SpanStore::default();
    let subscriber = tracing_subscriber::registry().with(SpanCapture(store.clone()));
    (store, tracing::subscriber::set_default(subscriber))
}

#[tokio::test]
async fn test_spans_cover_registry_ingest_and_export() {
    let (spans, _guard) = capture();
    let engine = Engine::open_memory().unwrap();
    engine.registry().add_schema("ex", SchemaOptions::default().with_namespace("ex", "http://ex.org/")).unwrap();
    engine.registry().add_mapping("ex", "ex", ElementKind::Label, "").unwrap();

    let input = vec![Ok(RdfStatement::iri("http://ex.org/alice", RDF_TYPE, "http://ex.org/Person"))];
    engine.ingest(input, Some("ex"), IngestOptions::default()).await.unwrap();
    engine.export_all(Some("ex")).await.unwrap().collect_all().await.unwrap();

    let names = spans.names();
    for expected in ["registry_write", "ingest", "window_flush", "export_open", "export_node"] {
        assert!(names.contains(&expected), "missing span {expected}: {names:?}");
    }
    assert_eq!(spans.parent_of("window_flush").as_deref(), Some("ingest"));
}
