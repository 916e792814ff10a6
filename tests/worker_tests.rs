//! Worker pipeline tests with stubbed collaborators
//!
//! Every stage behind a trait seam is replaced with a recording stub, so
//! these tests pin the per-task control flow: stage ordering, hard vs soft
//! failure handling, persistence writes, completion events, and temp-file
//! cleanup.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use vibe_analysis::analysis::AudioAnalyzer;
use vibe_analysis::db::AssetStore;
use vibe_analysis::embedding::EmbeddingBackend;
use vibe_analysis::error::{AnalysisError, EmbeddingError, StorageError};
use vibe_analysis::models::{AnalysisResult, EMBEDDING_DIM};
use vibe_analysis::storage::BlobStore;
use vibe_analysis::tagger::{TagVocabulary, ZeroShotTagger};
use vibe_analysis::worker::{
    process_task, BusSession, CompletionPublisher, EventBus, InboundTask, PipelineContext,
    TaskDisposition, TaskStream, Worker, WorkerState,
};

fn basis(index: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[index] = 1.0;
    v
}

/// Two-tag vocabulary: "ambient" on axis 0, "calm and relaxing" halfway
/// between axes 0 and 1 (cosine ~0.707 against axis 0)
fn test_tagger() -> ZeroShotTagger {
    let mut blended = basis(0);
    blended[1] = 1.0;
    ZeroShotTagger::new(Some(TagVocabulary::from_parts(
        vec!["ambient".to_string(), "calm and relaxing".to_string()],
        vec![basis(0), blended],
    )))
}

struct StubBlobStore {
    fail: bool,
    downloaded: Mutex<Option<PathBuf>>,
}

impl StubBlobStore {
    fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            fail,
            downloaded: Mutex::new(None),
        })
    }

    fn downloaded_path(&self) -> Option<PathBuf> {
        self.downloaded.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for StubBlobStore {
    async fn download_to_temp(&self, storage_name: &str) -> Result<PathBuf, StorageError> {
        if self.fail {
            return Err(StorageError::Download(format!("no such object: {}", storage_name)));
        }
        let file = tempfile::Builder::new()
            .prefix("worker_test_")
            .suffix(".wav")
            .tempfile()?;
        let path = file.into_temp_path().keep().map_err(|e| e.error)?;
        *self.downloaded.lock().unwrap() = Some(path.clone());
        Ok(path)
    }

    async fn upload_sample(&self, _path: &Path) -> Result<String, StorageError> {
        Ok("http://blob.invalid/sample.wav".to_string())
    }
}

struct StubAnalyzer {
    fail: bool,
}

#[async_trait]
impl AudioAnalyzer for StubAnalyzer {
    async fn analyze(&self, _path: &Path) -> Result<AnalysisResult, AnalysisError> {
        if self.fail {
            return Err(AnalysisError::Decode("corrupt stream".to_string()));
        }
        Ok(AnalysisResult {
            bpm: 120,
            key: "A Minor".to_string(),
            duration: 180,
        })
    }
}

struct StubEmbedder {
    fail: bool,
}

#[async_trait]
impl EmbeddingBackend for StubEmbedder {
    async fn audio_embedding(&self, _path: &Path) -> Result<Vec<f32>, EmbeddingError> {
        if self.fail {
            return Err(EmbeddingError::BadDimension {
                expected: EMBEDDING_DIM,
                got: 0,
            });
        }
        Ok(basis(0))
    }

    async fn text_embedding(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(basis(0))
    }
}

#[derive(Default)]
struct RecordingStore {
    fail_success: bool,
    fail_failure: bool,
    successes: Mutex<Vec<(i64, AnalysisResult, Option<Vec<f32>>, Option<String>)>>,
    failures: Mutex<Vec<i64>>,
}

#[async_trait]
impl AssetStore for RecordingStore {
    async fn record_success(
        &self,
        asset_id: i64,
        result: &AnalysisResult,
        embedding: Option<&[f32]>,
        tags: Option<&str>,
    ) -> anyhow::Result<()> {
        if self.fail_success {
            anyhow::bail!("database unavailable");
        }
        self.successes.lock().unwrap().push((
            asset_id,
            result.clone(),
            embedding.map(|v| v.to_vec()),
            tags.map(|t| t.to_string()),
        ));
        Ok(())
    }

    async fn record_failure(&self, asset_id: i64) -> anyhow::Result<()> {
        if self.fail_failure {
            anyhow::bail!("database unavailable");
        }
        self.failures.lock().unwrap().push(asset_id);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingPublisher {
    fail: bool,
    published: Mutex<Vec<i64>>,
}

#[async_trait]
impl CompletionPublisher for RecordingPublisher {
    async fn publish_completed(&self, asset_id: i64) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("channel closed");
        }
        self.published.lock().unwrap().push(asset_id);
        Ok(())
    }
}

struct Harness {
    blob: Arc<StubBlobStore>,
    store: Arc<RecordingStore>,
    publisher: RecordingPublisher,
    ctx: PipelineContext,
}

fn harness(
    blob: Arc<StubBlobStore>,
    store: Arc<RecordingStore>,
    analyzer_fail: bool,
    embedder_fail: bool,
) -> Harness {
    let ctx = PipelineContext {
        blob_store: blob.clone(),
        asset_store: store.clone(),
        analyzer: Arc::new(StubAnalyzer { fail: analyzer_fail }),
        embedder: Arc::new(StubEmbedder { fail: embedder_fail }),
        tagger: test_tagger(),
    };
    Harness {
        blob,
        store,
        publisher: RecordingPublisher::default(),
        ctx,
    }
}

const TASK: &[u8] = br#"{"assetId": 42, "storageName": "audio/2026/02/track.mp3"}"#;

#[tokio::test]
async fn successful_task_persists_everything_and_publishes() {
    let h = harness(StubBlobStore::new(false), Arc::default(), false, false);

    let disposition = process_task(&h.ctx, &h.publisher, TASK).await;
    assert_eq!(disposition, TaskDisposition::Completed { asset_id: 42 });

    let successes = h.store.successes.lock().unwrap();
    assert_eq!(successes.len(), 1);
    let (asset_id, result, embedding, tags) = &successes[0];
    assert_eq!(*asset_id, 42);
    assert_eq!(result.bpm, 120);
    assert_eq!(result.key, "A Minor");
    assert_eq!(result.duration, 180);
    assert_eq!(embedding.as_deref(), Some(basis(0).as_slice()));
    assert_eq!(tags.as_deref(), Some("ambient,calm and relaxing"));

    assert!(h.store.failures.lock().unwrap().is_empty());
    assert_eq!(*h.publisher.published.lock().unwrap(), vec![42]);
}

#[tokio::test]
async fn temp_file_is_removed_after_success() {
    let h = harness(StubBlobStore::new(false), Arc::default(), false, false);

    process_task(&h.ctx, &h.publisher, TASK).await;

    let path = h.blob.downloaded_path().expect("download happened");
    assert!(!path.exists(), "temp file should be cleaned up");
}

#[tokio::test]
async fn embedding_failure_is_soft() {
    let h = harness(StubBlobStore::new(false), Arc::default(), false, true);

    let disposition = process_task(&h.ctx, &h.publisher, TASK).await;
    assert_eq!(disposition, TaskDisposition::Completed { asset_id: 42 });

    // Analysis fields persisted, vector and tags absent
    let successes = h.store.successes.lock().unwrap();
    assert_eq!(successes.len(), 1);
    let (_, result, embedding, tags) = &successes[0];
    assert_eq!(result.bpm, 120);
    assert!(embedding.is_none());
    assert!(tags.is_none());

    assert!(h.store.failures.lock().unwrap().is_empty());
    assert_eq!(*h.publisher.published.lock().unwrap(), vec![42]);
}

#[tokio::test]
async fn download_failure_marks_the_asset_failed() {
    let h = harness(StubBlobStore::new(true), Arc::default(), false, false);

    let disposition = process_task(&h.ctx, &h.publisher, TASK).await;
    assert_eq!(disposition, TaskDisposition::Failed { asset_id: 42 });

    assert!(h.store.successes.lock().unwrap().is_empty());
    assert_eq!(*h.store.failures.lock().unwrap(), vec![42]);
    assert!(h.publisher.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn analysis_failure_marks_the_asset_failed_and_cleans_up() {
    let h = harness(StubBlobStore::new(false), Arc::default(), true, false);

    let disposition = process_task(&h.ctx, &h.publisher, TASK).await;
    assert_eq!(disposition, TaskDisposition::Failed { asset_id: 42 });

    assert!(h.store.successes.lock().unwrap().is_empty());
    assert_eq!(*h.store.failures.lock().unwrap(), vec![42]);

    let path = h.blob.downloaded_path().expect("download happened");
    assert!(!path.exists(), "temp file should be cleaned up on failure too");
}

#[tokio::test]
async fn persistence_failure_marks_the_asset_failed() {
    let store = Arc::new(RecordingStore {
        fail_success: true,
        ..Default::default()
    });
    let h = harness(StubBlobStore::new(false), store, false, false);

    let disposition = process_task(&h.ctx, &h.publisher, TASK).await;
    assert_eq!(disposition, TaskDisposition::Failed { asset_id: 42 });

    assert_eq!(*h.store.failures.lock().unwrap(), vec![42]);
    assert!(h.publisher.published.lock().unwrap().is_empty());
}

#[tokio::test]
async fn failure_status_write_fault_is_swallowed() {
    let store = Arc::new(RecordingStore {
        fail_success: true,
        fail_failure: true,
        ..Default::default()
    });
    let h = harness(StubBlobStore::new(false), store, false, false);

    // Both writes fail; the task still resolves without panicking
    let disposition = process_task(&h.ctx, &h.publisher, TASK).await;
    assert_eq!(disposition, TaskDisposition::Failed { asset_id: 42 });
}

#[tokio::test]
async fn publish_failure_does_not_fail_the_task() {
    let h = harness(StubBlobStore::new(false), Arc::default(), false, false);
    let publisher = RecordingPublisher {
        fail: true,
        ..Default::default()
    };

    let disposition = process_task(&h.ctx, &publisher, TASK).await;
    assert_eq!(disposition, TaskDisposition::Completed { asset_id: 42 });

    // The durable write happened even though the event was lost
    assert_eq!(h.store.successes.lock().unwrap().len(), 1);
    assert!(h.store.failures.lock().unwrap().is_empty());
}

/// Scripted bus: fails the first `connect_failures` connects, then hands out
/// the queued payloads one at a time; `drained` fires when the stream is
/// polled past its last payload, after which it stays pending like a quiet
/// broker would.
struct ScriptedBus {
    payloads: Mutex<VecDeque<Vec<u8>>>,
    connect_failures: Mutex<usize>,
    connects: Mutex<usize>,
    acks: Arc<Mutex<usize>>,
    drained: CancellationToken,
    publisher: Arc<RecordingPublisher>,
}

impl ScriptedBus {
    fn new(payloads: Vec<Vec<u8>>, connect_failures: usize) -> Arc<Self> {
        Arc::new(Self {
            payloads: Mutex::new(payloads.into()),
            connect_failures: Mutex::new(connect_failures),
            connects: Mutex::new(0),
            acks: Arc::new(Mutex::new(0)),
            drained: CancellationToken::new(),
            publisher: Arc::new(RecordingPublisher::default()),
        })
    }
}

#[async_trait]
impl EventBus for ScriptedBus {
    async fn connect(&self) -> anyhow::Result<BusSession> {
        *self.connects.lock().unwrap() += 1;
        {
            let mut failures = self.connect_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                anyhow::bail!("broker unreachable");
            }
        }
        let payloads = std::mem::take(&mut *self.payloads.lock().unwrap());
        Ok(BusSession {
            tasks: Box::new(ScriptedStream {
                payloads,
                acks: self.acks.clone(),
                drained: self.drained.clone(),
            }),
            publisher: self.publisher.clone(),
        })
    }
}

struct ScriptedStream {
    payloads: VecDeque<Vec<u8>>,
    acks: Arc<Mutex<usize>>,
    drained: CancellationToken,
}

#[async_trait]
impl TaskStream for ScriptedStream {
    async fn next_task(&mut self) -> anyhow::Result<Option<Box<dyn InboundTask>>> {
        match self.payloads.pop_front() {
            Some(payload) => Ok(Some(Box::new(ScriptedTask {
                payload,
                acks: self.acks.clone(),
            }))),
            None => {
                self.drained.cancel();
                futures::future::pending().await
            }
        }
    }
}

struct ScriptedTask {
    payload: Vec<u8>,
    acks: Arc<Mutex<usize>>,
}

#[async_trait]
impl InboundTask for ScriptedTask {
    fn payload(&self) -> &[u8] {
        &self.payload
    }

    async fn ack(self: Box<Self>) -> anyhow::Result<()> {
        *self.acks.lock().unwrap() += 1;
        Ok(())
    }
}

/// Analyzer that records its busy interval and holds the stage long enough
/// for overlap to be measurable
struct TimingAnalyzer {
    intervals: Arc<Mutex<Vec<(Instant, Instant)>>>,
}

#[async_trait]
impl AudioAnalyzer for TimingAnalyzer {
    async fn analyze(&self, _path: &Path) -> Result<AnalysisResult, AnalysisError> {
        let entered = Instant::now();
        tokio::time::sleep(Duration::from_millis(25)).await;
        self.intervals.lock().unwrap().push((entered, Instant::now()));
        Ok(AnalysisResult {
            bpm: 120,
            key: "A Minor".to_string(),
            duration: 180,
        })
    }
}

#[tokio::test]
async fn back_to_back_tasks_never_process_concurrently() {
    let intervals = Arc::new(Mutex::new(Vec::new()));
    let ctx = Arc::new(PipelineContext {
        blob_store: StubBlobStore::new(false),
        asset_store: Arc::new(RecordingStore::default()),
        analyzer: Arc::new(TimingAnalyzer {
            intervals: intervals.clone(),
        }),
        embedder: Arc::new(StubEmbedder { fail: false }),
        tagger: test_tagger(),
    });

    let bus = ScriptedBus::new(vec![TASK.to_vec(), TASK.to_vec()], 0);
    let shutdown = CancellationToken::new();
    let worker = Arc::new(Worker::new(
        bus.clone(),
        ctx,
        Duration::from_millis(1),
        shutdown.clone(),
    ));

    let handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    // The stream signals once both tasks are handed out and processed
    bus.drained.cancelled().await;
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(*bus.acks.lock().unwrap(), 2);
    assert_eq!(worker.state(), WorkerState::ShutDown);

    let intervals = intervals.lock().unwrap();
    assert_eq!(intervals.len(), 2);
    let (first, second) = (intervals[0], intervals[1]);
    assert!(
        first.1 <= second.0,
        "processing intervals overlap: first ended {:?} after second began",
        second.0.duration_since(first.1)
    );
}

#[tokio::test]
async fn connection_faults_retry_until_the_broker_returns() {
    let ctx = Arc::new(PipelineContext {
        blob_store: StubBlobStore::new(false),
        asset_store: Arc::new(RecordingStore::default()),
        analyzer: Arc::new(StubAnalyzer { fail: false }),
        embedder: Arc::new(StubEmbedder { fail: false }),
        tagger: test_tagger(),
    });

    // Two failed connects, then an empty session the worker idles on
    let bus = ScriptedBus::new(Vec::new(), 2);
    let shutdown = CancellationToken::new();
    let worker = Arc::new(Worker::new(
        bus.clone(),
        ctx,
        Duration::from_millis(1),
        shutdown.clone(),
    ));

    let handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run().await })
    };

    bus.drained.cancelled().await;
    assert_eq!(worker.state(), WorkerState::Consuming);
    shutdown.cancel();
    handle.await.unwrap();

    assert_eq!(*bus.connects.lock().unwrap(), 3);
    assert_eq!(worker.state(), WorkerState::ShutDown);
}

#[tokio::test]
async fn unparseable_payload_is_dropped_without_writes() {
    let h = harness(StubBlobStore::new(false), Arc::default(), false, false);

    let disposition = process_task(&h.ctx, &h.publisher, b"not json at all").await;
    assert_eq!(disposition, TaskDisposition::Invalid);

    assert!(h.store.successes.lock().unwrap().is_empty());
    assert!(h.store.failures.lock().unwrap().is_empty());
    assert!(h.blob.downloaded_path().is_none());
}

#[tokio::test]
async fn task_with_unusable_fields_is_dropped_without_writes() {
    let h = harness(StubBlobStore::new(false), Arc::default(), false, false);

    let payload = br#"{"assetId": 0, "storageName": "audio/x.mp3"}"#;
    let disposition = process_task(&h.ctx, &h.publisher, payload).await;
    assert_eq!(disposition, TaskDisposition::Invalid);

    assert!(h.store.successes.lock().unwrap().is_empty());
    assert!(h.store.failures.lock().unwrap().is_empty());
}
