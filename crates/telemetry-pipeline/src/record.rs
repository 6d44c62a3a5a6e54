// Copyright 2025-Present the telemetry-pipeline authors.
// SPDX-License-Identifier: Apache-2.0

//! Record types and the snapshot conversion seam.
//!
//! A record is an immutable, finished unit of telemetry: a completed span,
//! an emitted log entry, or a metric measurement. The processor does not
//! inspect records; it only requires a cheap conversion into an exportable
//! snapshot, whose ownership transfers to the processor on `on_emit`.
//!
//! The three concrete signal types here carry just enough shape for the
//! pipeline to move them: identifiers, timestamps, a value or body, and an
//! attribute map. Wire encodings, context propagation, and aggregation math
//! all live outside this crate.

use serde::Serialize;
use serde_json::{Map, Value};

/// A finished unit of telemetry that can be handed to a processor.
///
/// `into_snapshot` must be cheap (a move or a trivial restructuring) because
/// it runs on the caller's hot path inside `on_emit`. The snapshot is what
/// the buffer holds and what exporters ultimately serialize.
pub trait Record: Send + 'static {
    /// The exportable form of this record.
    type Snapshot: Send + Sync + 'static;

    /// Convert into the exportable snapshot, transferring ownership.
    fn into_snapshot(self) -> Self::Snapshot;
}

/// A completed span.
#[derive(Clone, Debug, Serialize)]
pub struct SpanData {
    pub trace_id: u128,
    pub span_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_span_id: Option<u64>,
    pub name: String,
    pub start_unix_nanos: u64,
    pub end_unix_nanos: u64,
    /// False when the span finished in an error state.
    pub ok: bool,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl Record for SpanData {
    type Snapshot = SpanData;

    #[inline]
    fn into_snapshot(self) -> SpanData {
        self
    }
}

/// Severity of an emitted log entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// An emitted log entry.
#[derive(Clone, Debug, Serialize)]
pub struct LogData {
    pub timestamp_unix_nanos: u64,
    pub severity: Severity,
    pub body: String,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl Record for LogData {
    type Snapshot = LogData;

    #[inline]
    fn into_snapshot(self) -> LogData {
        self
    }
}

/// The kind of measurement a metric snapshot carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Counter,
    Gauge,
}

/// A point-in-time metric measurement.
#[derive(Clone, Debug, Serialize)]
pub struct MetricData {
    pub name: String,
    pub timestamp_unix_nanos: u64,
    pub kind: MetricKind,
    pub value: f64,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub attributes: Map<String, Value>,
}

impl Record for MetricData {
    type Snapshot = MetricData;

    #[inline]
    fn into_snapshot(self) -> MetricData {
        self
    }
}
