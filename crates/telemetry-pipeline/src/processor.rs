// Copyright 2025-Present the telemetry-pipeline authors.
// SPDX-License-Identifier: Apache-2.0

//! The batch processor: the producer/consumer engine between application
//! code and an exporter.
//!
//! Producers call [`BatchProcessor::on_emit`], which appends to a bounded
//! buffer under a lock and returns; it never touches the network. One
//! background worker per processor drains the buffer in batches, woken by
//! whichever comes first: the schedule delay elapsing, the buffer reaching a
//! full batch, or shutdown. The dual wake condition bounds both staleness
//! and memory.
//!
//! # Lifecycle
//!
//! `created → running → shutting_down → stopped`. The transition is one-way
//! and idempotent: a second `shutdown` logs a warning and performs no
//! additional export attempts, and `on_emit` becomes a no-op once shutdown
//! begins.
//!
//! # Fork safety
//!
//! The buffer and the worker belong to one process image. The processor
//! records the PID that owns it; when an API call observes a different PID
//! (we are running in a forked child), the inherited buffer is cleared, the
//! dead worker handle is discarded, and a fresh worker is started under the
//! child's PID.
//!
//! # Error containment
//!
//! Nothing escapes the worker context: exporter panics are caught and
//! classified as failures, failed batches are dropped with a warning and an
//! error-hook invocation, and the loop continues.

use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::backoff::Deadline;
use crate::buffer::RecordBuffer;
use crate::config::{BatchConfig, ConfigError};
use crate::export::{ExportErrorHook, ExportResult, Exporter, LogHook};
use crate::pipeline::Processor;
use crate::record::Record;

const STATE_RUNNING: u8 = 0;
const STATE_SHUTTING_DOWN: u8 = 1;
const STATE_STOPPED: u8 = 2;

/// Counters exposed for observability and assertions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessorMetrics {
    /// Records accepted by `on_emit`.
    pub submitted: u64,
    /// Records lost to capacity eviction, failed batches, or termination.
    pub dropped: u64,
    /// Batches the exporter accepted.
    pub exported_batches: u64,
    /// Batches the exporter gave up on.
    pub failed_batches: u64,
}

#[derive(Debug, Default)]
struct Counters {
    submitted: AtomicU64,
    dropped: AtomicU64,
    exported_batches: AtomicU64,
    failed_batches: AtomicU64,
}

struct WorkerHandle {
    join: JoinHandle<()>,
    token: CancellationToken,
}

struct Inner<S> {
    signal: &'static str,
    config: BatchConfig,
    buffer: Mutex<RecordBuffer<S>>,
    exporter: Arc<dyn Exporter<S>>,
    /// Serializes the export path so outbound batches from this processor
    /// stay ordered and the exporter's connection is never reentered.
    export_gate: tokio::sync::Mutex<()>,
    batch_ready: tokio::sync::Notify,
    state: AtomicU8,
    owner_pid: AtomicU32,
    worker: Mutex<Option<WorkerHandle>>,
    hook: Arc<dyn ExportErrorHook>,
    counters: Counters,
}

/// Batches records and ships them through an exporter off the caller's
/// hot path. Cheap to clone; clones share the same buffer and worker.
pub struct BatchProcessor<R: Record> {
    inner: Arc<Inner<R::Snapshot>>,
    _record: PhantomData<fn(R)>,
}

impl<R: Record> Clone for BatchProcessor<R> {
    fn clone(&self) -> Self {
        BatchProcessor {
            inner: Arc::clone(&self.inner),
            _record: PhantomData,
        }
    }
}

impl<R: Record> BatchProcessor<R> {
    /// Creates a processor and, unless configured otherwise, starts its
    /// background worker. Must be called within a tokio runtime when
    /// `start_worker_on_boot` is set.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the configuration is invalid. This is a
    /// programming error and fails fast rather than surfacing at first use.
    pub fn new(
        signal: &'static str,
        exporter: Arc<dyn Exporter<R::Snapshot>>,
        config: BatchConfig,
    ) -> Result<Self, ConfigError> {
        Self::with_hook(signal, exporter, config, Arc::new(LogHook))
    }

    /// Same as [`BatchProcessor::new`] with a custom export error hook.
    pub fn with_hook(
        signal: &'static str,
        exporter: Arc<dyn Exporter<R::Snapshot>>,
        config: BatchConfig,
        hook: Arc<dyn ExportErrorHook>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let inner = Arc::new(Inner {
            signal,
            buffer: Mutex::new(RecordBuffer::new(config.max_queue_size)),
            exporter,
            export_gate: tokio::sync::Mutex::new(()),
            batch_ready: tokio::sync::Notify::new(),
            state: AtomicU8::new(STATE_RUNNING),
            owner_pid: AtomicU32::new(std::process::id()),
            worker: Mutex::new(None),
            hook,
            counters: Counters::default(),
            config,
        });
        if inner.config.start_worker_on_boot {
            ensure_worker(&inner);
        }
        Ok(BatchProcessor {
            inner,
            _record: PhantomData,
        })
    }

    /// Starts the background worker if it is not already running.
    ///
    /// Only needed when `start_worker_on_boot` is disabled: environments
    /// that fork before first use construct the processor early and call
    /// this from the process that will actually emit telemetry. Harmless to
    /// call more than once. Without a running worker, records still ship
    /// through `force_flush` and `shutdown`.
    pub fn start_worker(&self) {
        ensure_worker(&self.inner);
    }

    /// Hands a finished record to the processor. Never blocks on I/O; the
    /// only synchronization is a short buffer lock. No-op after shutdown.
    pub fn on_emit(&self, record: R) {
        let inner = &self.inner;
        handle_fork_if_needed(inner);
        if inner.state.load(Ordering::Acquire) != STATE_RUNNING {
            debug!("{} | record emitted after shutdown, ignoring", inner.signal);
            return;
        }

        let snapshot = record.into_snapshot();
        let (len, evicted) = {
            let mut buffer = inner.lock_buffer();
            let evicted = buffer.push(snapshot);
            (buffer.len(), evicted)
        };
        inner.counters.submitted.fetch_add(1, Ordering::Relaxed);
        if evicted > 0 {
            inner
                .counters
                .dropped
                .fetch_add(evicted as u64, Ordering::Relaxed);
            warn!(
                "{} | buffer full ({} records), dropping oldest record",
                inner.signal, inner.config.max_queue_size
            );
        }

        if inner.config.start_worker_on_boot {
            // Safety net for processors constructed off the runtime: the
            // first emission on a runtime thread starts the worker.
            ensure_worker(inner);
        }
        if len >= inner.config.max_export_batch_size {
            inner.batch_ready.notify_one();
        }
    }

    /// Synchronously drains the entire buffer, batch by batch, until it is
    /// empty or `timeout` elapses. `None` drains fully.
    ///
    /// On budget exhaustion, records already removed but not yet handed to
    /// the exporter are returned to the front of the buffer and
    /// [`ExportResult::Timeout`] is reported; otherwise the worst export
    /// result across the drained batches is returned.
    pub async fn force_flush(&self, timeout: Option<Duration>) -> ExportResult {
        let inner = &self.inner;
        handle_fork_if_needed(inner);
        if inner.state.load(Ordering::Acquire) == STATE_STOPPED {
            debug!("{} | flush requested after shutdown, ignoring", inner.signal);
            return ExportResult::Success;
        }
        inner.drain(timeout.map(Deadline::after)).await
    }

    /// Stops the worker, performs one final flush, and forwards shutdown to
    /// the exporter so it can release connections. Idempotent: a second
    /// call warns and returns without exporting anything.
    pub async fn shutdown(&self, timeout: Option<Duration>) -> ExportResult {
        let inner = &self.inner;
        if inner
            .state
            .compare_exchange(
                STATE_RUNNING,
                STATE_SHUTTING_DOWN,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            warn!("{} | shutdown called more than once, ignoring", inner.signal);
            return ExportResult::Success;
        }

        let deadline = timeout.map(Deadline::after);

        let worker = inner.lock_worker().take();
        if let Some(worker) = worker {
            worker.token.cancel();
            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout(deadline.remaining(), worker.join)
                        .await
                        .is_err()
                    {
                        warn!(
                            "{} | worker did not stop within the shutdown budget",
                            inner.signal
                        );
                    }
                }
                None => {
                    let _ = worker.join.await;
                }
            }
        }

        let flush_result = inner.drain(deadline).await;
        let exporter_timeout =
            deadline.map_or(inner.config.exporter_timeout, |d| {
                d.clamp(inner.config.exporter_timeout)
            });
        let exporter_result = inner.exporter.shutdown(exporter_timeout).await;
        inner.state.store(STATE_STOPPED, Ordering::Release);

        let unflushed = {
            let mut buffer = inner.lock_buffer();
            let n = buffer.len();
            buffer.clear();
            n
        };
        if unflushed > 0 {
            inner
                .counters
                .dropped
                .fetch_add(unflushed as u64, Ordering::Relaxed);
            warn!(
                "{} | dropped: terminating with {} records unflushed",
                inner.signal, unflushed
            );
        }

        let metrics = self.metrics();
        debug!(
            "{} | processor stopped ({} batches exported, {} records dropped)",
            inner.signal, metrics.exported_batches, metrics.dropped
        );
        flush_result.worst(exporter_result)
    }

    /// Number of records currently buffered.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.inner.buffered()
    }

    /// Snapshot of the processor's counters.
    #[must_use]
    pub fn metrics(&self) -> ProcessorMetrics {
        let c = &self.inner.counters;
        ProcessorMetrics {
            submitted: c.submitted.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            exported_batches: c.exported_batches.load(Ordering::Relaxed),
            failed_batches: c.failed_batches.load(Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    fn pretend_foreign_owner(&self) {
        let pid = self.inner.owner_pid.load(Ordering::Acquire);
        self.inner
            .owner_pid
            .store(pid.wrapping_add(1), Ordering::Release);
    }

    #[cfg(test)]
    fn worker_running(&self) -> bool {
        self.inner.lock_worker().is_some()
    }
}

#[async_trait]
impl<R: Record> Processor<R> for BatchProcessor<R> {
    fn on_emit(&self, record: R) {
        BatchProcessor::on_emit(self, record);
    }

    async fn force_flush(&self, timeout: Option<Duration>) -> ExportResult {
        BatchProcessor::force_flush(self, timeout).await
    }

    async fn shutdown(&self, timeout: Option<Duration>) -> ExportResult {
        BatchProcessor::shutdown(self, timeout).await
    }
}

impl<S: Send + Sync + 'static> Inner<S> {
    #[allow(clippy::expect_used)]
    fn lock_buffer(&self) -> MutexGuard<'_, RecordBuffer<S>> {
        self.buffer.lock().expect("lock poisoned")
    }

    #[allow(clippy::expect_used)]
    fn lock_worker(&self) -> MutexGuard<'_, Option<WorkerHandle>> {
        self.worker.lock().expect("lock poisoned")
    }

    fn buffered(&self) -> usize {
        self.lock_buffer().len()
    }

    /// Removes one batch from the buffer front and exports it with the
    /// configured per-export timeout. Called only from the worker.
    async fn export_one_batch(&self) {
        let batch = self
            .lock_buffer()
            .take_batch(self.config.max_export_batch_size);
        if batch.is_empty() {
            return;
        }
        let _ = self.export_batch(batch, self.config.exporter_timeout).await;
    }

    /// Ships one batch through the exporter under the export gate,
    /// containing panics and recording the outcome.
    async fn export_batch(&self, batch: Vec<S>, timeout: Duration) -> ExportResult {
        let count = batch.len();
        let _gate = self.export_gate.lock().await;
        let result = match AssertUnwindSafe(self.exporter.export(batch, timeout))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                error!("{} | exporter panicked, treating as failure", self.signal);
                ExportResult::Failure
            }
        };
        if result.is_success() {
            self.counters
                .exported_batches
                .fetch_add(1, Ordering::Relaxed);
            debug!("{} | exported batch of {} records", self.signal, count);
        } else {
            self.counters.failed_batches.fetch_add(1, Ordering::Relaxed);
            self.counters
                .dropped
                .fetch_add(count as u64, Ordering::Relaxed);
            self.hook.on_export_failure(self.signal, result, count);
        }
        result
    }

    /// Drains the buffer batch by batch within an optional deadline. The
    /// budget is checked after removing each batch; a batch caught by an
    /// expired budget goes back to the buffer front un-exported.
    async fn drain(&self, deadline: Option<Deadline>) -> ExportResult {
        let mut worst = ExportResult::Success;
        loop {
            let batch = self
                .lock_buffer()
                .take_batch(self.config.max_export_batch_size);
            if batch.is_empty() {
                return worst;
            }
            if let Some(deadline) = deadline {
                if deadline.expired() {
                    let count = batch.len();
                    let evicted = self.lock_buffer().requeue_front(batch);
                    if evicted > 0 {
                        self.counters
                            .dropped
                            .fetch_add(evicted as u64, Ordering::Relaxed);
                    }
                    warn!(
                        "{} | flush budget exhausted, re-queued {} records",
                        self.signal,
                        count - evicted
                    );
                    return ExportResult::Timeout;
                }
            }
            let timeout = deadline.map_or(self.config.exporter_timeout, |d| {
                d.clamp(self.config.exporter_timeout)
            });
            worst = worst.worst(self.export_batch(batch, timeout).await);
        }
    }
}

/// Starts the background worker if none is running. Harmless to call
/// repeatedly; used at construction, on the first emission when the
/// processor was built off the runtime, and after a fork.
fn ensure_worker<S: Send + Sync + 'static>(inner: &Arc<Inner<S>>) {
    if inner.state.load(Ordering::Acquire) != STATE_RUNNING {
        return;
    }
    let mut slot = inner.lock_worker();
    if slot.is_some() {
        return;
    }
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        // Not on a runtime thread; the worker will start from the next
        // emission that is.
        return;
    };
    let token = CancellationToken::new();
    let worker = Arc::clone(inner);
    let join = handle.spawn(run_worker(worker, token.clone()));
    *slot = Some(WorkerHandle { join, token });
}

/// Detects that we are running in a forked child (the observed PID no
/// longer matches the owner) and resets per-process state: the inherited
/// buffer is cleared and the parent's worker handle, whose task does not
/// exist in this process image, is discarded.
fn handle_fork_if_needed<S: Send + Sync + 'static>(inner: &Arc<Inner<S>>) {
    let pid = std::process::id();
    let owner = inner.owner_pid.load(Ordering::Acquire);
    if owner == pid {
        return;
    }
    if inner
        .owner_pid
        .compare_exchange(owner, pid, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        // Another thread observed the fork first.
        return;
    }
    warn!(
        "{} | fork detected (pid {} -> {}), clearing inherited buffer",
        inner.signal, owner, pid
    );
    inner.lock_buffer().clear();
    let stale = inner.lock_worker().take();
    if let Some(stale) = stale {
        stale.token.cancel();
        stale.join.abort();
    }
    if inner.config.start_worker_on_boot {
        ensure_worker(inner);
    }
}

/// Background worker loop: sleep until the schedule delay elapses, the
/// buffer reaches a full batch, or shutdown is signaled; then drain.
async fn run_worker<S: Send + Sync + 'static>(inner: Arc<Inner<S>>, token: CancellationToken) {
    debug!(
        "{} | batch worker started (pid {})",
        inner.signal,
        std::process::id()
    );
    loop {
        tokio::select! {
            () = tokio::time::sleep(inner.config.schedule_delay) => {}
            () = inner.batch_ready.notified() => {}
            () = token.cancelled() => break,
        }
        inner.export_one_batch().await;
        // A burst can queue more than one full batch between wakeups; keep
        // draining rather than waiting out the schedule delay.
        while !token.is_cancelled() && inner.buffered() >= inner.config.max_export_batch_size {
            inner.export_one_batch().await;
        }
    }
    debug!("{} | batch worker stopped", inner.signal);
}
