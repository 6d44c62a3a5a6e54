// Copyright 2025-Present the telemetry-pipeline authors.
// SPDX-License-Identifier: Apache-2.0

//! # Telemetry HTTP Exporter
//!
//! Ships batches from the telemetry pipeline to a collector over HTTP POST,
//! implementing the retry/backoff wire protocol the processor relies on:
//!
//! - a timeout budget computed once per export call; every retry consults
//!   the remaining budget, never the original timeout
//! - response classification into accepted / retryable / redirect / terminal
//! - server-directed backoff via `Retry-After` (seconds or HTTP-date), with
//!   exponential jitter as the fallback
//! - a fixed retry ceiling; exceeding it converts the outcome to a failure
//! - one redirect re-resolution per call, never open-ended following
//! - zstd payload compression, applied before transmission and invisible to
//!   the retry logic
//!
//! The exporter is stateless between calls apart from its HTTP client and an
//! idempotent shutdown flag; serialization of concurrent exports is the
//! processor's job.

#![deny(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]

/// The HTTP exporter and its configuration
pub mod exporter;

/// Response classification and `Retry-After` parsing
mod response;

pub use exporter::{BuildError, HttpExporter, HttpExporterConfig};
