//! Durable external log store.
//!
//! # Data Flow
//! ```text
//! tracing event (INFO and above)
//!     → StoreLayer (render to LogRecord, try_send; never blocks)
//!     → bounded mpsc queue
//!     → StoreShipper task (batch, LogStore::persist)
//!     → collector endpoint
//! ```
//!
//! # Design Decisions
//! - The request path never waits on the store; a full queue drops the
//!   record and bumps `log_store_dropped_total`
//! - Shipper diagnostics use [`STORE_TARGET`], which the store layer filters
//!   out to avoid feeding its own failures back into the queue

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;
use url::Url;

use crate::observability::metrics;

pub const STORE_TARGET: &str = "log_store";
pub const QUEUE_CAPACITY: usize = 4096;
const MAX_BATCH: usize = 256;

/// One structured log record as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("log store request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Destination that accepts batches of records.
#[async_trait]
pub trait LogStore: Send + Sync + 'static {
    async fn persist(&self, batch: &[LogRecord]) -> Result<(), StoreError>;
}

/// Ships batches as a JSON array to a collector endpoint.
pub struct HttpLogStore {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpLogStore {
    /// Store posting to `endpoint` with a 5 second timeout.
    pub fn new(endpoint: Url) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl LogStore for HttpLogStore {
    async fn persist(&self, batch: &[LogRecord]) -> Result<(), StoreError> {
        self.client
            .post(self.endpoint.clone())
            .json(batch)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: Option<String>,
    fields: Map<String, Value>,
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.insert(field.name().to_string(), Value::from(value));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.fields.insert(field.name().to_string(), Value::from(rendered));
        }
    }
}

/// Fields recorded on a span, kept so events inside it can carry them.
struct SpanFields(Map<String, Value>);

/// Layer that queues records for the external store.
///
/// Each record carries the fields of its enclosing spans (root first), so
/// `request_id`, `method` and `path` travel with every request-scoped record.
pub struct StoreLayer {
    tx: mpsc::Sender<LogRecord>,
}

impl StoreLayer {
    /// Layer feeding `tx`.
    pub fn new(tx: mpsc::Sender<LogRecord>) -> Self {
        Self { tx }
    }
}

impl<S> Layer<S> for StoreLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else { return };
        let mut visitor = RecordVisitor::default();
        attrs.record(&mut visitor);
        span.extensions_mut().insert(SpanFields(visitor.fields));
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let mut fields = Map::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(SpanFields(span_fields)) = span.extensions().get::<SpanFields>() {
                    fields.extend(span_fields.clone());
                }
            }
        }
        fields.extend(visitor.fields);

        let record = LogRecord {
            timestamp: Utc::now(),
            level: metadata.level().to_string(),
            target: metadata.target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields,
        };
        if self.tx.try_send(record).is_err() {
            metrics::record_log_dropped();
        }
    }
}

/// Background task draining the queue into a [`LogStore`].
pub struct StoreShipper {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl StoreShipper {
    /// Start draining `rx` into `store`.
    pub fn spawn<T: LogStore>(store: T, mut rx: mpsc::Receiver<LogRecord>) -> Self {
        let (stop, mut stopped) = oneshot::channel();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = rx.recv() => {
                        let Some(first) = received else { break };
                        let mut batch = vec![first];
                        fill_batch(&mut rx, &mut batch);
                        ship(&store, &batch).await;
                    }
                    _ = &mut stopped => {
                        let mut batch = Vec::new();
                        fill_batch(&mut rx, &mut batch);
                        while !batch.is_empty() {
                            ship(&store, &batch).await;
                            batch.clear();
                            fill_batch(&mut rx, &mut batch);
                        }
                        break;
                    }
                }
            }
        });
        Self { stop, task }
    }

    /// Flush what is queued and stop.
    pub async fn close(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            tracing::warn!(target: STORE_TARGET, error = %e, "Log shipper did not stop cleanly");
        }
    }
}

fn fill_batch(rx: &mut mpsc::Receiver<LogRecord>, batch: &mut Vec<LogRecord>) {
    while batch.len() < MAX_BATCH {
        match rx.try_recv() {
            Ok(record) => batch.push(record),
            Err(_) => break,
        }
    }
}

async fn ship<T: LogStore>(store: &T, batch: &[LogRecord]) {
    if let Err(e) = store.persist(batch).await {
        tracing::warn!(
            target: STORE_TARGET,
            error = %e,
            records = batch.len(),
            "Failed to persist log batch"
        );
    }
}
