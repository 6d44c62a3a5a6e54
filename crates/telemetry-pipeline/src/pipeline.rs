// Copyright 2025-Present the telemetry-pipeline authors.
// SPDX-License-Identifier: Apache-2.0

//! Composition of multiple processors over a single record stream.
//!
//! A [`Pipeline`] fans every emitted record out to its processors so several
//! destinations can receive the same stream. Flush and shutdown walk the
//! chain sequentially under one shared deadline and fold the per-processor
//! results with [`ExportResult::worst`], so the caller sees the worst
//! outcome across destinations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::backoff::Deadline;
use crate::export::ExportResult;
use crate::record::Record;

/// The processor contract: non-blocking emission plus timeout-bounded flush
/// and shutdown. [`crate::BatchProcessor`] implements it; so does
/// [`Pipeline`], which lets pipelines nest.
#[async_trait]
pub trait Processor<R: Record>: Send + Sync {
    /// Hand over a finished record. Must not block on I/O.
    fn on_emit(&self, record: R);

    /// Drain buffered records. `None` means drain fully.
    async fn force_flush(&self, timeout: Option<Duration>) -> ExportResult;

    /// One-way, idempotent stop. `None` means drain fully before stopping.
    async fn shutdown(&self, timeout: Option<Duration>) -> ExportResult;
}

/// A chain of processors sharing one record stream.
pub struct Pipeline<R: Record> {
    processors: Vec<Arc<dyn Processor<R>>>,
}

impl<R: Record> Default for Pipeline<R> {
    fn default() -> Self {
        Pipeline {
            processors: Vec::new(),
        }
    }
}

impl<R: Record + Clone> Pipeline<R> {
    #[must_use]
    pub fn new() -> Self {
        Pipeline::default()
    }

    /// Appends a processor to the chain.
    pub fn push(&mut self, processor: Arc<dyn Processor<R>>) {
        self.processors.push(processor);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.processors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }

    /// Fans the record out to every processor. The final processor receives
    /// the original record; the rest receive clones.
    pub fn on_emit(&self, record: R) {
        let Some((last, rest)) = self.processors.split_last() else {
            return;
        };
        for processor in rest {
            processor.on_emit(record.clone());
        }
        last.on_emit(record);
    }

    /// Flushes every processor under one shared deadline, folding results
    /// with [`ExportResult::worst`].
    pub async fn force_flush(&self, timeout: Option<Duration>) -> ExportResult {
        let deadline = timeout.map(Deadline::after);
        let mut worst = ExportResult::Success;
        for processor in &self.processors {
            if let Some(deadline) = deadline {
                if deadline.expired() {
                    return worst.worst(ExportResult::Timeout);
                }
            }
            let remaining = deadline.map(|d| d.remaining());
            worst = worst.worst(processor.force_flush(remaining).await);
        }
        worst
    }

    /// Shuts every processor down under one shared deadline, folding results
    /// with [`ExportResult::worst`].
    pub async fn shutdown(&self, timeout: Option<Duration>) -> ExportResult {
        let deadline = timeout.map(Deadline::after);
        let mut worst = ExportResult::Success;
        for processor in &self.processors {
            if let Some(deadline) = deadline {
                if deadline.expired() {
                    return worst.worst(ExportResult::Timeout);
                }
            }
            let remaining = deadline.map(|d| d.remaining());
            worst = worst.worst(processor.shutdown(remaining).await);
        }
        worst
    }
}

#[async_trait]
impl<R: Record + Clone> Processor<R> for Pipeline<R> {
    fn on_emit(&self, record: R) {
        Pipeline::on_emit(self, record);
    }

    async fn force_flush(&self, timeout: Option<Duration>) -> ExportResult {
        Pipeline::force_flush(self, timeout).await
    }

    async fn shutdown(&self, timeout: Option<Duration>) -> ExportResult {
        Pipeline::shutdown(self, timeout).await
    }
}
