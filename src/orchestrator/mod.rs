//! Batch Orchestrator: dispatches records across a bounded worker pool,
//! reorders out-of-order completions, flushes in index order, and
//! checkpoints progress (spec §4.5).
//!
//! No teacher analog — grounded in `sygra/processors/data_generator.py`'s
//! batch loop in the original Python source for the dispatch/checkpoint
//! shape, and in `elevatelaw-prompt-scaler`'s `queues::work` module for the
//! bounded-concurrency worker-pool pattern (a `Semaphore`-gated spawn loop
//! plus a single collector that owns ordering, rather than that module's
//! request/response channel abstraction, since here the "work" is a whole
//! graph run rather than one request).

pub mod checkpoint;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::error::{ErrorKind, PipelineError, Result};
use crate::events::{self, Event, EventHandler};
use crate::executor::RuntimeContext;
use crate::graph::runtime::{run_one, RunOutcome};
use crate::graph::Graph;
use checkpoint::{CheckpointData, FileCheckpoint};

/// A process-wide flag workers poll between steps so an orchestrator
/// shutdown can propagate to in-flight workers without them completing
/// their current HTTP request first (spec §5 "Cancellation").
#[derive(Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Destination for completed records, written in strict ascending index
/// order (spec §8 invariant 1).
pub trait OutputSink: Send {
    fn write_record(&mut self, record: &Value) -> Result<()>;
}

/// An `OutputSink` that appends one JSON value per line (JSONL).
pub struct JsonlSink<W: std::io::Write + Send> {
    writer: W,
}

impl<W: std::io::Write + Send> JsonlSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: std::io::Write + Send> OutputSink for JsonlSink<W> {
    fn write_record(&mut self, record: &Value) -> Result<()> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer
            .write_all(b"\n")
            .map_err(|e| PipelineError::Other(format!("failed to write output record: {e}")))?;
        Ok(())
    }
}

/// Summary of one batch run, logged at completion (spec §7 "at batch end, a
/// summary logs the count per error kind").
#[derive(Debug, Default)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub error_counts: HashMap<ErrorKind, usize>,
}

impl RunSummary {
    /// Fraction of dispatched records that failed, used by the CLI to
    /// decide between exit code 0 and 2 (spec §6 "partial failure exceeding
    /// a configured threshold").
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }
}

const DEFAULT_BATCH_SIZE: usize = 25;
const DEFAULT_CHECKPOINT_INTERVAL: usize = 100;

/// Drives one graph across a stream of input records.
pub struct BatchOrchestrator {
    graph: Arc<Graph>,
    ctx: Arc<RuntimeContext>,
    batch_size: usize,
    checkpoint_interval: usize,
}

impl BatchOrchestrator {
    pub fn new(graph: Arc<Graph>, ctx: Arc<RuntimeContext>) -> Self {
        Self {
            graph,
            ctx,
            batch_size: DEFAULT_BATCH_SIZE,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_checkpoint_interval(mut self, checkpoint_interval: usize) -> Self {
        self.checkpoint_interval = checkpoint_interval.max(1);
        self
    }

    /// Ping every model the graph references; abort (spec §4.5 "Startup")
    /// if any returns a non-2xx status.
    pub async fn ping_all_models(&self) -> Result<()> {
        for (name, client) in &self.ctx.models {
            let status = client.ping().await?;
            if !(200..300).contains(&status) {
                error!(model = %name, status, "model ping failed at startup");
                return Err(PipelineError::InvalidConfig(format!(
                    "model '{name}' ping returned status {status}"
                )));
            }
            debug!(model = %name, status, "model ping ok");
        }
        Ok(())
    }

    /// Run `records` (already skipped to `start_index`) through the graph.
    ///
    /// Dispatch is FIFO (the iteration order of `records`); completion is
    /// out-of-order across the `batch_size`-bounded worker pool; flush to
    /// `sink` and checkpoint writes happen only as indices become
    /// contiguous, preserving spec §8 invariant 1.
    pub async fn run(
        &self,
        records: impl IntoIterator<Item = HashMap<String, Value>>,
        start_index: usize,
        run_id: impl Into<String>,
        sink: &mut dyn OutputSink,
        checkpoint: &FileCheckpoint,
        cancel: CancellationFlag,
    ) -> Result<RunSummary> {
        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.batch_size));
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<(usize, Option<RunOutcome>)>();

        let mut total_dispatched = 0usize;
        for (offset, record) in records.into_iter().enumerate() {
            if cancel.is_cancelled() {
                break;
            }
            let index = start_index + offset;
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore is never closed while the orchestrator is running");
            let graph = self.graph.clone();
            let ctx = self.ctx.clone();
            let tx = tx.clone();
            let cancel = cancel.clone();
            total_dispatched += 1;

            tokio::spawn(async move {
                let _permit = permit;
                events::emit(&ctx.event_handler, Event::NodeStart { record_id: index.to_string(), node: "__graph__".to_string() });
                if cancel.is_cancelled() {
                    let _ = tx.send((index, None));
                    return;
                }
                let outcome = run_one(&graph, record, &ctx).await;
                let _ = tx.send((index, Some(outcome)));
            });
        }
        drop(tx);

        let run_id = run_id.into();
        let mut pending: HashMap<usize, Option<RunOutcome>> = HashMap::new();
        let mut next_to_flush = start_index;
        let mut completed_since_checkpoint = 0usize;
        let mut summary = RunSummary { total: total_dispatched, ..Default::default() };

        while let Some((index, outcome)) = rx.recv().await {
            pending.insert(index, outcome);

            while let Some(outcome) = pending.remove(&next_to_flush) {
                completed_since_checkpoint += 1;
                write_one(&mut summary, sink, next_to_flush, outcome)?;
                next_to_flush += 1;

                if completed_since_checkpoint >= self.checkpoint_interval {
                    flush_checkpoint(checkpoint, &run_id, next_to_flush, completed_since_checkpoint, &self.ctx.event_handler)?;
                    completed_since_checkpoint = 0;
                }
            }
        }

        if completed_since_checkpoint > 0 || next_to_flush > start_index {
            flush_checkpoint(checkpoint, &run_id, next_to_flush, completed_since_checkpoint, &self.ctx.event_handler)?;
        }

        info!(
            total = summary.total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            "batch run complete"
        );
        for (kind, count) in &summary.error_counts {
            warn!(?kind, count, "record error kind summary");
        }

        Ok(summary)
    }
}

fn flush_checkpoint(
    checkpoint: &FileCheckpoint,
    run_id: &str,
    next_to_flush: usize,
    flushed_count: usize,
    event_handler: &Option<Arc<dyn EventHandler>>,
) -> Result<()> {
    let mut data = CheckpointData::new(run_id.to_string());
    data.last_completed_index = next_to_flush as i64 - 1;
    checkpoint.write(&data)?;
    events::emit(
        event_handler,
        Event::CheckpointFlushed { last_completed_index: data.last_completed_index.max(0) as usize, flushed_count },
    );
    Ok(())
}

fn write_one(
    summary: &mut RunSummary,
    sink: &mut dyn OutputSink,
    index: usize,
    outcome: Option<RunOutcome>,
) -> Result<()> {
    match outcome {
        None => {
            summary.failed += 1;
            *summary.error_counts.entry(ErrorKind::Cancelled).or_insert(0) += 1;
            sink.write_record(&json!({"index": index, "error": {"kind": "cancelled", "message": "cancelled before completion"}}))?;
        }
        Some(RunOutcome { record, error: None }) => {
            summary.succeeded += 1;
            sink.write_record(&json!(record))?;
        }
        Some(RunOutcome { record, error: Some(err) }) => {
            summary.failed += 1;
            *summary.error_counts.entry(err.kind).or_insert(0) += 1;
            let id = record.get("id").cloned().unwrap_or(Value::Null);
            sink.write_record(&json!({
                "id": id,
                "error": {"kind": err.kind, "message": err.message},
                "partial_state": record,
            }))?;
        }
    }
    Ok(())
}
