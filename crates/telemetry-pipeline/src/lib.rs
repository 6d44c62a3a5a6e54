// Copyright 2025-Present the telemetry-pipeline authors.
// SPDX-License-Identifier: Apache-2.0

//! # Telemetry Pipeline
//!
//! Batching and export pipeline for telemetry signals (spans, logs, metric
//! snapshots). Applications hand finished records to a [`BatchProcessor`];
//! a background worker batches them and ships them through an [`Exporter`]
//! without ever blocking the caller on network I/O.
//!
//! ## Overview
//!
//! The pipeline is built from a small set of pieces:
//! - [`record`]: immutable, exportable units of telemetry and the snapshot
//!   conversion seam between the application and the processor
//! - [`buffer`]: the bounded FIFO queue with drop-oldest overflow policy
//! - [`processor`]: the producer/consumer engine (non-blocking `on_emit`,
//!   scheduled or size-triggered background flushing, drain-on-shutdown)
//! - [`pipeline`]: composition of several processors over one record stream
//! - [`backoff`]: the retry budget and delay arithmetic shared by exporters
//! - [`export`]: the exporter contract and the result codes every layer
//!   reports
//!
//! Data flow:
//!
//! ```text
//!   application ──on_emit──> buffer ──worker──> Exporter::export(batch, timeout)
//!                  (lock,      (bounded,          (serialized per processor,
//!                   no I/O)     drop-oldest)       retry/backoff inside)
//! ```
//!
//! ## Failure semantics
//!
//! The worst failure mode is data loss with a logged warning: overload drops
//! the oldest buffered records, export failures drop the affected batch
//! after the exporter's retries are spent, and nothing here ever panics out
//! of the background worker or blocks the host application.

#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]

/// Retry budget and backoff delay computation shared by exporters
pub mod backoff;

/// Bounded FIFO record buffer with drop-oldest eviction
pub mod buffer;

/// Processor construction parameters, environment overrides, and validation
pub mod config;

/// Exporter contract, result codes, and the export error hook
pub mod export;

/// The batch processor: non-blocking emission, background flushing, shutdown
pub mod processor;

/// Composition of multiple processors over a single record stream
pub mod pipeline;

/// Record types and the snapshot conversion seam
pub mod record;

pub use backoff::{backoff_delay, Deadline, MAX_EXPORT_ATTEMPTS};
pub use config::{BatchConfig, ConfigError};
pub use export::{ExportErrorHook, ExportResult, Exporter, LogHook};
pub use pipeline::{Pipeline, Processor};
pub use processor::{BatchProcessor, ProcessorMetrics};
pub use record::{LogData, MetricData, Record, SpanData};
