//! Integration tests for the read/dispatch/commit pipeline.
//!
//! A scripted message source and an in-memory index stand in for Kafka and
//! OpenSearch, so the tests exercise the reader, dispatcher, translators and
//! gateway together without network access.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use cdc_indexer::consumer::{MessageSource, SourceMessage};
use cdc_indexer::dispatcher::EventDispatcher;
use cdc_indexer::reader::{BrokerReader, PoisonHandler, PoisonSink, ReaderConfig};
use cdc_indexer::supervisor::{Supervisor, SupervisorConfig};
use cdc_indexer::translator::TranslatorRegistry;
use cdc_indexer::IngestError;
use cdc_indexer_repository::{
    DeleteDocumentRequest, SearchIndexError, SearchIndexProvider, SyncGateway,
};
use cdc_indexer_shared::IndexDocument;
use serde_json::{json, Value};
use tokio::sync::broadcast;

// =============================================================================
// Fakes
// =============================================================================

/// Scripted message source.
struct MockSource {
    script: VecDeque<Result<SourceMessage, IngestError>>,
    committed: Arc<Mutex<Vec<i64>>>,
    reconnects: Arc<AtomicUsize>,
    reconnect_succeeds: bool,
    /// Block forever once the script runs out, like an idle topic.
    pend_when_empty: bool,
}

impl MockSource {
    fn new(messages: Vec<SourceMessage>) -> Self {
        Self {
            script: messages.into_iter().map(Ok).collect(),
            committed: Arc::new(Mutex::new(Vec::new())),
            reconnects: Arc::new(AtomicUsize::new(0)),
            reconnect_succeeds: true,
            pend_when_empty: false,
        }
    }

    fn push_error(&mut self, err: IngestError) {
        self.script.push_front(Err(err));
    }
}

#[async_trait]
impl MessageSource for MockSource {
    async fn next_message(&mut self) -> Result<Option<SourceMessage>, IngestError> {
        match self.script.pop_front() {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(e)) => Err(e),
            None if self.pend_when_empty => std::future::pending().await,
            None => Ok(None),
        }
    }

    async fn commit(&mut self, message: &SourceMessage) -> Result<(), IngestError> {
        self.committed.lock().unwrap().push(message.offset);
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), IngestError> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        if self.reconnect_succeeds {
            Ok(())
        } else {
            Err(IngestError::connection_lost("broker still down"))
        }
    }
}

/// In-memory search index with scripted failures.
#[derive(Default)]
struct MemoryIndex {
    documents: Mutex<HashMap<String, IndexDocument>>,
    calls: AtomicUsize,
    failures: Mutex<VecDeque<SearchIndexError>>,
    /// Sent on the first call, to trigger shutdown mid-message.
    shutdown_on_call: Mutex<Option<broadcast::Sender<()>>>,
}

impl MemoryIndex {
    fn fail_with(&self, errors: Vec<SearchIndexError>) {
        self.failures.lock().unwrap().extend(errors);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn document(&self, id: &str) -> Option<IndexDocument> {
        self.documents.lock().unwrap().get(id).cloned()
    }

    fn record_call(&self) -> Result<(), SearchIndexError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(tx) = self.shutdown_on_call.lock().unwrap().take() {
            let _ = tx.send(());
        }
        match self.failures.lock().unwrap().pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl SearchIndexProvider for MemoryIndex {
    async fn ensure_index_exists(&self) -> Result<(), SearchIndexError> {
        Ok(())
    }

    async fn upsert_document(&self, document: &IndexDocument) -> Result<(), SearchIndexError> {
        self.record_call()?;
        self.documents
            .lock()
            .unwrap()
            .insert(document.document_id.clone(), document.clone());
        Ok(())
    }

    async fn delete_document(&self, request: &DeleteDocumentRequest) -> Result<(), SearchIndexError> {
        self.record_call()?;
        self.documents.lock().unwrap().remove(&request.document_id);
        Ok(())
    }
}

#[derive(Default)]
struct MemorySink {
    parked: Mutex<Vec<(i64, String)>>,
}

#[async_trait]
impl PoisonSink for MemorySink {
    async fn park(&self, message: &SourceMessage, error: &IngestError) -> Result<(), IngestError> {
        self.parked
            .lock()
            .unwrap()
            .push((message.offset, error.to_string()));
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn envelope(offset: i64, op: &str, table: &str, before: Value, after: Value) -> SourceMessage {
    let body = json!({
        "schema": { "type": "struct" },
        "payload": {
            "op": op,
            "before": before,
            "after": after,
            "source": { "connector": "postgresql", "table": table, "ts_ms": 1_000 + offset },
            "ts_ms": 2_000 + offset
        }
    });
    SourceMessage::new(format!("cdc.public.{}", table), 0, offset)
        .with_payload(serde_json::to_vec(&body).unwrap())
}

fn fast_config() -> ReaderConfig {
    ReaderConfig {
        max_retries: 2,
        retry_base: Duration::from_millis(10),
        retry_max: Duration::from_millis(40),
        reconnect_attempts: 2,
        reconnect_base: Duration::from_millis(10),
        reconnect_max: Duration::from_millis(40),
    }
}

fn dispatcher(index: &Arc<MemoryIndex>) -> EventDispatcher {
    EventDispatcher::new(
        Arc::new(TranslatorRegistry::with_default_translators()),
        SyncGateway::new(index.clone()),
    )
}

fn reader(
    source: MockSource,
    index: &Arc<MemoryIndex>,
    shutdown: &broadcast::Sender<()>,
) -> BrokerReader {
    BrokerReader::new(Box::new(source), dispatcher(index), shutdown.subscribe())
        .with_config(fast_config())
}

// =============================================================================
// Scenarios
// =============================================================================

#[tokio::test]
async fn test_create_then_delete_removes_document() {
    let index = Arc::new(MemoryIndex::default());
    let (shutdown, _) = broadcast::channel(1);
    let source = MockSource::new(vec![
        envelope(0, "c", "organizations", Value::Null, json!({"id": 1, "name": "Acme"})),
        envelope(1, "d", "organizations", json!({"id": 1, "name": "Acme"}), Value::Null),
    ]);
    let committed = source.committed.clone();

    reader(source, &index, &shutdown).run().await.unwrap();

    assert!(index.document("organizations:1").is_none());
    assert_eq!(index.calls(), 2);
    assert_eq!(*committed.lock().unwrap(), vec![0, 1]);
}

#[tokio::test]
async fn test_update_overwrites_document() {
    let index = Arc::new(MemoryIndex::default());
    let (shutdown, _) = broadcast::channel(1);
    let source = MockSource::new(vec![
        envelope(0, "c", "jobs", Value::Null, json!({"id": 5, "title": "Engineer"})),
        envelope(
            1,
            "u",
            "jobs",
            json!({"id": 5, "title": "Engineer"}),
            json!({"id": 5, "title": "Senior Engineer"}),
        ),
    ]);

    reader(source, &index, &shutdown).run().await.unwrap();

    let doc = index.document("jobs:5").expect("jobs:5 indexed");
    assert_eq!(doc.field("title"), Some(&json!("Senior Engineer")));
    assert_eq!(doc.source_timestamp, Some(1_001));
}

#[tokio::test]
async fn test_unknown_table_is_skipped_and_next_message_proceeds() {
    let index = Arc::new(MemoryIndex::default());
    let (shutdown, _) = broadcast::channel(1);
    let source = MockSource::new(vec![
        envelope(0, "c", "audit_log", Value::Null, json!({"id": 1, "action": "login"})),
        envelope(1, "c", "organizations", Value::Null, json!({"id": 2, "name": "Globex"})),
    ]);
    let committed = source.committed.clone();

    let reader = reader(source, &index, &shutdown);
    let stats = reader.stats();
    reader.run().await.unwrap();

    assert_eq!(index.calls(), 1);
    assert!(index.document("organizations:2").is_some());
    assert_eq!(*committed.lock().unwrap(), vec![0, 1]);
    assert_eq!(stats.snapshot().skipped, 1);
}

#[tokio::test]
async fn test_bad_messages_never_reach_the_index() {
    let index = Arc::new(MemoryIndex::default());
    let (shutdown, _) = broadcast::channel(1);

    let no_op = json!({"payload": {"before": null, "after": {"id": 1}, "source": {"table": "jobs"}}});
    let truncate = json!({"payload": {"op": "t", "source": {"table": "jobs"}}});

    let source = MockSource::new(vec![
        SourceMessage::new("cdc.public.jobs", 0, 0).with_payload(b"not json".to_vec()),
        SourceMessage::new("cdc.public.jobs", 0, 1).with_payload(serde_json::to_vec(&no_op).unwrap()),
        SourceMessage::new("cdc.public.jobs", 0, 2).with_key(b"{\"id\":1}".to_vec()),
        SourceMessage::new("cdc.public.jobs", 0, 3).with_payload(serde_json::to_vec(&truncate).unwrap()),
        envelope(4, "d", "jobs", Value::Null, Value::Null),
        envelope(5, "r", "jobs", Value::Null, json!({"id": 9, "title": "Snapshot"})),
        envelope(6, "c", "jobs", Value::Null, json!({"id": 10, "title": "Valid"})),
    ]);
    let committed = source.committed.clone();

    reader(source, &index, &shutdown).run().await.unwrap();

    assert_eq!(index.calls(), 1);
    assert!(index.document("jobs:9").is_none());
    assert!(index.document("jobs:10").is_some());
    assert_eq!(*committed.lock().unwrap(), vec![0, 1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_replaying_a_message_is_idempotent() {
    let index = Arc::new(MemoryIndex::default());
    let (shutdown, _) = broadcast::channel(1);
    let create = envelope(0, "c", "events", Value::Null, json!({"id": 3, "title": "Meetup"}));
    let mut replay = create.clone();
    replay.offset = 1;

    reader(MockSource::new(vec![create]), &index, &shutdown)
        .run()
        .await
        .unwrap();
    let once = index.document("events:3").unwrap();

    reader(MockSource::new(vec![replay]), &index, &shutdown)
        .run()
        .await
        .unwrap();
    let twice = index.document("events:3").unwrap();

    assert_eq!(once, twice);
    assert_eq!(index.documents.lock().unwrap().len(), 1);
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_transient_failure_recovers_after_retry() {
    let index = Arc::new(MemoryIndex::default());
    index.fail_with(vec![SearchIndexError::timeout("slow")]);
    let (shutdown, _) = broadcast::channel(1);
    let source = MockSource::new(vec![envelope(
        0,
        "c",
        "jobs",
        Value::Null,
        json!({"id": 5, "title": "Engineer"}),
    )]);
    let committed = source.committed.clone();

    let reader = reader(source, &index, &shutdown);
    let stats = reader.stats();
    reader.run().await.unwrap();

    assert_eq!(index.calls(), 2);
    assert!(index.document("jobs:5").is_some());
    assert_eq!(*committed.lock().unwrap(), vec![0]);
    assert_eq!(stats.snapshot().retries, 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_skip_poison_message() {
    let index = Arc::new(MemoryIndex::default());
    index.fail_with(vec![
        SearchIndexError::upsert(503, "unavailable"),
        SearchIndexError::upsert(503, "unavailable"),
        SearchIndexError::upsert(503, "unavailable"),
    ]);
    let (shutdown, _) = broadcast::channel(1);
    let source = MockSource::new(vec![
        envelope(0, "c", "jobs", Value::Null, json!({"id": 5, "title": "Engineer"})),
        envelope(1, "c", "jobs", Value::Null, json!({"id": 6, "title": "Designer"})),
    ]);
    let committed = source.committed.clone();

    let reader = reader(source, &index, &shutdown);
    let stats = reader.stats();
    reader.run().await.unwrap();

    // One attempt plus two retries, then the next message.
    assert_eq!(index.calls(), 4);
    assert!(index.document("jobs:5").is_none());
    assert!(index.document("jobs:6").is_some());
    assert_eq!(*committed.lock().unwrap(), vec![0, 1]);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.retries, 2);
    assert_eq!(snapshot.poisoned, 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_park_poison_message() {
    let index = Arc::new(MemoryIndex::default());
    index.fail_with(vec![
        SearchIndexError::connection("refused"),
        SearchIndexError::connection("refused"),
        SearchIndexError::connection("refused"),
    ]);
    let sink = Arc::new(MemorySink::default());
    let (shutdown, _) = broadcast::channel(1);
    let source = MockSource::new(vec![envelope(
        7,
        "d",
        "events",
        json!({"id": 12}),
        Value::Null,
    )]);
    let committed = source.committed.clone();

    reader(source, &index, &shutdown)
        .with_poison_handler(PoisonHandler::Park(sink.clone()))
        .run()
        .await
        .unwrap();

    let parked = sink.parked.lock().unwrap();
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].0, 7);
    assert!(parked[0].1.contains("events:12"));
    assert_eq!(*committed.lock().unwrap(), vec![7]);
}

#[tokio::test(start_paused = true)]
async fn test_permanent_failure_is_not_retried() {
    let index = Arc::new(MemoryIndex::default());
    index.fail_with(vec![SearchIndexError::upsert(400, "mapper_parsing_exception")]);
    let (shutdown, _) = broadcast::channel(1);
    let source = MockSource::new(vec![envelope(
        0,
        "c",
        "organizations",
        Value::Null,
        json!({"id": 1, "name": "Acme"}),
    )]);
    let committed = source.committed.clone();

    let reader = reader(source, &index, &shutdown);
    let stats = reader.stats();
    reader.run().await.unwrap();

    assert_eq!(index.calls(), 1);
    assert_eq!(*committed.lock().unwrap(), vec![0]);

    let snapshot = stats.snapshot();
    assert_eq!(snapshot.retries, 0);
    assert_eq!(snapshot.permanent_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_backoff_leaves_message_uncommitted() {
    let index = Arc::new(MemoryIndex::default());
    index.fail_with(vec![SearchIndexError::timeout("slow")]);
    let (shutdown, _) = broadcast::channel(1);
    *index.shutdown_on_call.lock().unwrap() = Some(shutdown.clone());

    let source = MockSource::new(vec![
        envelope(0, "c", "jobs", Value::Null, json!({"id": 5, "title": "Engineer"})),
        envelope(1, "c", "jobs", Value::Null, json!({"id": 6, "title": "Designer"})),
    ]);
    let committed = source.committed.clone();

    reader(source, &index, &shutdown).run().await.unwrap();

    assert_eq!(index.calls(), 1);
    assert!(committed.lock().unwrap().is_empty());
    assert!(index.document("jobs:6").is_none());
}

// =============================================================================
// Broker connection
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_connection_loss_reconnects_and_continues() {
    let index = Arc::new(MemoryIndex::default());
    let (shutdown, _) = broadcast::channel(1);
    let mut source = MockSource::new(vec![envelope(
        0,
        "c",
        "jobs",
        Value::Null,
        json!({"id": 5, "title": "Engineer"}),
    )]);
    source.push_error(IngestError::connection_lost("all brokers down"));
    let reconnects = source.reconnects.clone();

    let reader = reader(source, &index, &shutdown);
    let stats = reader.stats();
    reader.run().await.unwrap();

    assert_eq!(reconnects.load(Ordering::SeqCst), 1);
    assert!(index.document("jobs:5").is_some());
    assert_eq!(stats.snapshot().reconnects, 1);
}

#[tokio::test(start_paused = true)]
async fn test_receive_errors_pause_before_next_read() {
    let index = Arc::new(MemoryIndex::default());
    let (shutdown, _) = broadcast::channel(1);
    let mut source = MockSource::new(vec![envelope(
        0,
        "c",
        "jobs",
        Value::Null,
        json!({"id": 5, "title": "Engineer"}),
    )]);
    for _ in 0..3 {
        source.push_error(IngestError::kafka("broker transport failure"));
    }
    let committed = source.committed.clone();

    let started = tokio::time::Instant::now();
    reader(source, &index, &shutdown).run().await.unwrap();

    assert!(started.elapsed() >= fast_config().retry_base * 3);
    assert!(index.document("jobs:5").is_some());
    assert_eq!(*committed.lock().unwrap(), vec![0]);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_receive_error_pause() {
    let index = Arc::new(MemoryIndex::default());
    let (shutdown, _) = broadcast::channel(1);
    let mut source = MockSource::new(vec![envelope(
        0,
        "c",
        "jobs",
        Value::Null,
        json!({"id": 5, "title": "Engineer"}),
    )]);
    source.push_error(IngestError::kafka("broker transport failure"));
    let committed = source.committed.clone();

    let reader = BrokerReader::new(Box::new(source), dispatcher(&index), shutdown.subscribe())
        .with_config(ReaderConfig {
            retry_base: Duration::from_secs(60),
            ..fast_config()
        });
    let run = tokio::spawn(reader.run());
    tokio::time::sleep(Duration::from_millis(10)).await;
    shutdown.send(()).unwrap();

    run.await.unwrap().unwrap();
    assert!(committed.lock().unwrap().is_empty());
    assert_eq!(index.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_reconnects_surface_connection_lost() {
    let index = Arc::new(MemoryIndex::default());
    let (shutdown, _) = broadcast::channel(1);
    let mut source = MockSource::new(Vec::new());
    source.reconnect_succeeds = false;
    source.push_error(IngestError::connection_lost("all brokers down"));
    let reconnects = source.reconnects.clone();

    let result = reader(source, &index, &shutdown).run().await;

    assert!(matches!(result, Err(IngestError::BrokerConnectionLost(_))));
    assert_eq!(reconnects.load(Ordering::SeqCst), 2);
}

// =============================================================================
// Supervisor
// =============================================================================

fn supervisor_config() -> SupervisorConfig {
    SupervisorConfig {
        shutdown_grace: Duration::from_secs(1),
        progress_interval: Duration::from_secs(60),
    }
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_runs_all_readers_to_completion() {
    let index = Arc::new(MemoryIndex::default());
    let mut supervisor = Supervisor::new(supervisor_config());

    for worker_id in 0..2 {
        let source = MockSource::new(vec![envelope(
            worker_id,
            "c",
            "organizations",
            Value::Null,
            json!({"id": worker_id, "name": "Org"}),
        )]);
        let reader = BrokerReader::new(Box::new(source), dispatcher(&index), supervisor.subscribe())
            .with_worker_id(worker_id as usize)
            .with_config(fast_config());
        supervisor.add_reader(reader);
    }

    supervisor.run().await.unwrap();

    assert!(index.document("organizations:0").is_some());
    assert!(index.document("organizations:1").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_stops_all_readers_when_one_fails() {
    let index = Arc::new(MemoryIndex::default());
    let mut supervisor = Supervisor::new(supervisor_config());

    let mut failing = MockSource::new(Vec::new());
    failing.reconnect_succeeds = false;
    failing.push_error(IngestError::connection_lost("all brokers down"));
    supervisor.add_reader(
        BrokerReader::new(Box::new(failing), dispatcher(&index), supervisor.subscribe())
            .with_worker_id(0)
            .with_config(fast_config()),
    );

    let mut idle = MockSource::new(Vec::new());
    idle.pend_when_empty = true;
    supervisor.add_reader(
        BrokerReader::new(Box::new(idle), dispatcher(&index), supervisor.subscribe())
            .with_worker_id(1)
            .with_config(fast_config()),
    );

    let result = supervisor.run().await;
    assert!(matches!(result, Err(IngestError::BrokerConnectionLost(_))));
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_tolerates_zero_progress_interval() {
    let index = Arc::new(MemoryIndex::default());
    let mut supervisor = Supervisor::new(SupervisorConfig {
        progress_interval: Duration::ZERO,
        ..supervisor_config()
    });
    supervisor.add_reader(BrokerReader::new(
        Box::new(MockSource::new(vec![envelope(
            0,
            "c",
            "jobs",
            Value::Null,
            json!({"id": 5, "title": "Engineer"}),
        )])),
        dispatcher(&index),
        supervisor.subscribe(),
    ));

    supervisor.run().await.unwrap();
    assert!(index.document("jobs:5").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_supervisor_shutdown_handle_stops_idle_readers() {
    let index = Arc::new(MemoryIndex::default());
    let mut supervisor = Supervisor::new(supervisor_config());

    let mut idle = MockSource::new(Vec::new());
    idle.pend_when_empty = true;
    supervisor.add_reader(BrokerReader::new(
        Box::new(idle),
        dispatcher(&index),
        supervisor.subscribe(),
    ));

    let handle = supervisor.shutdown_handle();
    let run = tokio::spawn(supervisor.run());
    tokio::time::sleep(Duration::from_millis(10)).await;
    handle.send(()).unwrap();

    run.await.unwrap().unwrap();
}
