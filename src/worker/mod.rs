//! Pipeline Worker: event-bus consumption state machine
//!
//! Lifecycle: DISCONNECTED → CONNECTING → CONSUMING → (per task)
//! PROCESSING → CONSUMING, with SHUT DOWN reached only through operator
//! cancellation. Connection faults drop back to DISCONNECTED and retry
//! after a fixed delay, unboundedly.
//!
//! Backpressure is the prefetch bound: the worker asks the bus for at most
//! one unacknowledged delivery at a time, so feature extraction and
//! inference never run for two tasks concurrently.
//!
//! Failure policy per task:
//! - malformed payload: ack and drop, no persistence write
//! - embedding/tagging fault: logged, outputs treated as absent
//! - download/analysis/persistence fault: best-effort failure-status
//!   write, remaining stages skipped
//! - the task is acknowledged exactly once in every case, so one poisoned
//!   message can never block the queue

use crate::analysis::AudioAnalyzer;
use crate::config::RabbitMqConfig;
use crate::db::AssetStore;
use crate::embedding::EmbeddingBackend;
use crate::error::TaskError;
use crate::models::{AnalysisTask, CompletionEvent};
use crate::storage::BlobStore;
use crate::tagger::ZeroShotTagger;
use async_trait::async_trait;
use futures::StreamExt;
use lapin::{
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Disconnected,
    Connecting,
    Consuming,
    Processing,
    ShutDown,
}

/// How a task left the worker; the delivery is acknowledged regardless
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskDisposition {
    /// Payload unusable: dropped without touching the store
    Invalid,
    /// Success outcome persisted
    Completed { asset_id: i64 },
    /// Fatal fault: failure outcome written best-effort
    Failed { asset_id: i64 },
}

/// Collaborators the per-task pipeline runs against
pub struct PipelineContext {
    pub blob_store: Arc<dyn BlobStore>,
    pub asset_store: Arc<dyn AssetStore>,
    pub analyzer: Arc<dyn AudioAnalyzer>,
    pub embedder: Arc<dyn EmbeddingBackend>,
    pub tagger: ZeroShotTagger,
}

/// Completion-event sink (the AMQP channel in production)
#[async_trait]
pub trait CompletionPublisher: Send + Sync {
    async fn publish_completed(&self, asset_id: i64) -> anyhow::Result<()>;
}

/// One inbound delivery; the worker acknowledges it exactly once
#[async_trait]
pub trait InboundTask: Send {
    fn payload(&self) -> &[u8];
    async fn ack(self: Box<Self>) -> anyhow::Result<()>;
}

/// Open delivery stream for one bus session
#[async_trait]
pub trait TaskStream: Send {
    /// Next delivery; `Ok(None)` when the stream closes
    async fn next_task(&mut self) -> anyhow::Result<Option<Box<dyn InboundTask>>>;
}

/// One established bus session: a consuming stream plus the publisher that
/// shares its channel
pub struct BusSession {
    pub tasks: Box<dyn TaskStream>,
    pub publisher: Arc<dyn CompletionPublisher>,
}

/// Connection seam for the worker; the AMQP broker in production
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn connect(&self) -> anyhow::Result<BusSession>;
}

/// The worker itself: drives the session lifecycle over an `EventBus`
pub struct Worker {
    bus: Arc<dyn EventBus>,
    ctx: Arc<PipelineContext>,
    reconnect_delay: Duration,
    shutdown: CancellationToken,
    state: Mutex<WorkerState>,
}

impl Worker {
    pub fn new(
        bus: Arc<dyn EventBus>,
        ctx: Arc<PipelineContext>,
        reconnect_delay: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            bus,
            ctx,
            reconnect_delay,
            shutdown,
            state: Mutex::new(WorkerState::Disconnected),
        }
    }

    /// Current lifecycle state (observability and tests)
    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap()
    }

    fn transition(&self, to: WorkerState) {
        let mut state = self.state.lock().unwrap();
        if *state != to {
            debug!(from = ?*state, to = ?to, "worker state transition");
            *state = to;
        }
    }

    /// Run until the shutdown token fires
    ///
    /// Reconnects forever on connection faults with the fixed delay;
    /// unacknowledged tasks are redelivered by the bus after reconnection,
    /// so no task is lost across faults.
    pub async fn run(&self) {
        info!("analysis worker starting");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            self.transition(WorkerState::Connecting);
            match self.consume().await {
                Ok(()) => break, // cancelled while consuming
                Err(e) => {
                    self.transition(WorkerState::Disconnected);
                    warn!(
                        error = %e,
                        retry_in = ?self.reconnect_delay,
                        "event bus connection lost, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                        _ = self.shutdown.cancelled() => break,
                    }
                }
            }
        }

        self.transition(WorkerState::ShutDown);
        info!("analysis worker shut down");
    }

    /// Consume one session until a fault or cancellation
    async fn consume(&self) -> anyhow::Result<()> {
        let mut session = self.bus.connect().await?;

        self.transition(WorkerState::Consuming);
        info!("worker connected, consuming analysis tasks");

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("shutdown requested, stopping consumer");
                    return Ok(());
                }
                next = session.tasks.next_task() => {
                    let task = match next? {
                        Some(task) => task,
                        None => anyhow::bail!("task stream closed"),
                    };

                    self.transition(WorkerState::Processing);
                    let disposition =
                        process_task(&self.ctx, session.publisher.as_ref(), task.payload()).await;
                    debug!(disposition = ?disposition, "task processed");
                    self.transition(WorkerState::Consuming);

                    // Always ack, exactly once, whatever the outcome
                    task.ack().await?;
                }
            }
        }
    }
}

/// Production event bus: lapin against the shared topic exchange
pub struct AmqpBus {
    config: RabbitMqConfig,
}

impl AmqpBus {
    pub fn new(config: RabbitMqConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl EventBus for AmqpBus {
    async fn connect(&self) -> anyhow::Result<BusSession> {
        let connection =
            Connection::connect(&self.config.amqp_uri(), ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        // Idempotent declarations, shared with the producing asset service
        channel
            .exchange_declare(
                RabbitMqConfig::EXCHANGE,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_declare(
                RabbitMqConfig::QUEUE,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                RabbitMqConfig::QUEUE,
                RabbitMqConfig::EXCHANGE,
                RabbitMqConfig::ROUTING_KEY_UPLOADED,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        // Prefetch bound of one: the backpressure policy for this worker
        channel.basic_qos(1, BasicQosOptions::default()).await?;

        let consumer = channel
            .basic_consume(
                RabbitMqConfig::QUEUE,
                "vibe-analysis",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(
            exchange = RabbitMqConfig::EXCHANGE,
            queue = RabbitMqConfig::QUEUE,
            "event bus connected"
        );

        Ok(BusSession {
            tasks: Box::new(AmqpTaskStream {
                _connection: connection,
                consumer,
            }),
            publisher: Arc::new(AmqpCompletionPublisher { channel }),
        })
    }
}

/// Delivery stream over a live lapin consumer; holds the connection so the
/// session stays open for the stream's lifetime
struct AmqpTaskStream {
    _connection: Connection,
    consumer: lapin::Consumer,
}

#[async_trait]
impl TaskStream for AmqpTaskStream {
    async fn next_task(&mut self) -> anyhow::Result<Option<Box<dyn InboundTask>>> {
        match self.consumer.next().await {
            Some(delivery) => Ok(Some(Box::new(AmqpInboundTask {
                delivery: delivery?,
            }))),
            None => Ok(None),
        }
    }
}

struct AmqpInboundTask {
    delivery: lapin::message::Delivery,
}

#[async_trait]
impl InboundTask for AmqpInboundTask {
    fn payload(&self) -> &[u8] {
        &self.delivery.data
    }

    async fn ack(self: Box<Self>) -> anyhow::Result<()> {
        self.delivery.ack(BasicAckOptions::default()).await?;
        Ok(())
    }
}

/// Production completion publisher over the consuming channel
struct AmqpCompletionPublisher {
    channel: Channel,
}

#[async_trait]
impl CompletionPublisher for AmqpCompletionPublisher {
    async fn publish_completed(&self, asset_id: i64) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(&CompletionEvent { asset_id })?;
        self.channel
            .basic_publish(
                RabbitMqConfig::EXCHANGE,
                RabbitMqConfig::ROUTING_KEY_COMPLETED,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2), // persisted delivery
            )
            .await?
            .await?;
        Ok(())
    }
}

/// Run one task through the pipeline
///
/// Sequential stages: download → analysis (hard) → embedding (soft) →
/// tag matching (soft) → persistence → completion event (best-effort).
/// The temp file is removed in every path; acknowledgment is the caller's
/// job so it happens exactly once.
pub async fn process_task(
    ctx: &PipelineContext,
    publisher: &dyn CompletionPublisher,
    payload: &[u8],
) -> TaskDisposition {
    let task = match serde_json::from_slice::<AnalysisTask>(payload) {
        Ok(task) if task.is_valid() => task,
        Ok(task) => {
            error!(asset_id = task.asset_id, "task missing required fields, dropping");
            return TaskDisposition::Invalid;
        }
        Err(e) => {
            error!(error = %e, "unparseable task payload, dropping");
            return TaskDisposition::Invalid;
        }
    };

    info!(
        asset_id = task.asset_id,
        storage_name = %task.storage_name,
        "analysis task received"
    );

    let mut temp_path: Option<PathBuf> = None;
    let disposition = match run_stages(ctx, publisher, &task, &mut temp_path).await {
        Ok(()) => TaskDisposition::Completed {
            asset_id: task.asset_id,
        },
        Err(e) => {
            error!(asset_id = task.asset_id, error = %e, "analysis task failed");
            // Best-effort failure-status write; its own failure is only logged
            if let Err(mark) = ctx.asset_store.record_failure(task.asset_id).await {
                error!(asset_id = task.asset_id, error = %mark, "failure-status write failed");
            }
            TaskDisposition::Failed {
                asset_id: task.asset_id,
            }
        }
    };

    if let Some(path) = temp_path {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => debug!(path = %path.display(), "temp file removed"),
            Err(e) => warn!(path = %path.display(), error = %e, "temp file cleanup failed"),
        }
    }

    disposition
}

/// Stages 2-7 of task processing; any error here is a fatal task fault
async fn run_stages(
    ctx: &PipelineContext,
    publisher: &dyn CompletionPublisher,
    task: &AnalysisTask,
    temp_path: &mut Option<PathBuf>,
) -> Result<(), TaskError> {
    let started = Instant::now();
    let path = ctx.blob_store.download_to_temp(&task.storage_name).await?;
    *temp_path = Some(path.clone());
    debug!(elapsed = ?started.elapsed(), "download finished");

    let analysis = ctx.analyzer.analyze(&path).await?;

    // Soft dependency: an absent embedding only suppresses tag matching
    let embedding = match ctx.embedder.audio_embedding(&path).await {
        Ok(vector) => Some(vector),
        Err(e) => {
            warn!(
                asset_id = task.asset_id,
                error = %e,
                "embedding failed, continuing without vector"
            );
            None
        }
    };

    let tags = embedding
        .as_deref()
        .and_then(|vector| ctx.tagger.match_tags(vector));

    ctx.asset_store
        .record_success(
            task.asset_id,
            &analysis,
            embedding.as_deref(),
            tags.as_deref(),
        )
        .await
        .map_err(TaskError::Persist)?;

    info!(
        asset_id = task.asset_id,
        bpm = analysis.bpm,
        key = %analysis.key,
        duration_seconds = analysis.duration,
        vector_dim = embedding.as_ref().map(|v| v.len()).unwrap_or(0),
        tags = tags.as_deref().unwrap_or("none"),
        elapsed = ?started.elapsed(),
        "analysis task completed"
    );

    // Best-effort: the result is already durable, a lost event only delays
    // the downstream index refresh
    if let Err(e) = publisher.publish_completed(task.asset_id).await {
        warn!(asset_id = task.asset_id, error = %e, "completion event publish failed");
    }

    Ok(())
}
