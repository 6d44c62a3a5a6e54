// Copyright 2025-Present the telemetry-pipeline authors.
// SPDX-License-Identifier: Apache-2.0

//! Exporter contract and result codes.
//!
//! An [`Exporter`] consumes batches of exportable snapshots and a timeout and
//! reports one of three result codes. The processor never learns anything
//! about the transport beyond the code; retry and backoff live inside the
//! exporter (see the `backoff` module and the HTTP exporter crate).
//!
//! Result codes are stable small integers so fan-out callers can fold the
//! worst outcome across destinations with [`ExportResult::worst`].

use std::time::Duration;

use async_trait::async_trait;
use tracing::error;

/// Outcome of an export, flush, or shutdown call.
///
/// The numeric codes are part of the contract: `SUCCESS = 0`, `FAILURE = 1`,
/// `TIMEOUT = 2`. A higher code is a worse outcome, which is what makes
/// [`ExportResult::worst`] a plain max.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum ExportResult {
    /// The batch was fully accepted by the destination.
    Success = 0,
    /// The batch was dropped: terminal rejection, retry ceiling spent, or an
    /// internal error.
    Failure = 1,
    /// The caller's timeout budget ran out before delivery completed.
    Timeout = 2,
}

impl ExportResult {
    /// Stable numeric code for this result.
    #[must_use]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns the worse of the two results (the numeric max).
    #[must_use]
    pub fn worst(self, other: ExportResult) -> ExportResult {
        self.max(other)
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == ExportResult::Success
    }
}

/// Destination for batches of exportable snapshots.
///
/// Contract (see the processor for the calling side):
/// - `export` must not panic; failures are reported through the result code
/// - `export` must respect `timeout` as a budget covering all internal
///   retries, not a per-attempt limit
/// - after `shutdown`, further `export` calls return [`ExportResult::Failure`]
///   immediately and `shutdown` itself is idempotent
#[async_trait]
pub trait Exporter<T: Send + 'static>: Send + Sync {
    /// Ship one batch, spending at most `timeout` across all attempts.
    async fn export(&self, batch: Vec<T>, timeout: Duration) -> ExportResult;

    /// Flush anything the exporter itself buffers. Exporters without
    /// internal buffering report success.
    async fn force_flush(&self, _timeout: Duration) -> ExportResult {
        ExportResult::Success
    }

    /// Release connections and refuse further exports.
    async fn shutdown(&self, timeout: Duration) -> ExportResult;
}

/// Hook invoked when a batch is dropped after the exporter gave up on it.
///
/// One method, one purpose: surfacing terminal export failures to the host
/// application (error reporters, counters) without coupling the processor to
/// any particular observability stack.
pub trait ExportErrorHook: Send + Sync {
    /// Called with the signal label, the final result code, and the number
    /// of records that were dropped with the batch.
    fn on_export_failure(&self, signal: &str, result: ExportResult, dropped_records: usize);
}

/// Default hook: logs the failure and moves on.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogHook;

impl ExportErrorHook for LogHook {
    fn on_export_failure(&self, signal: &str, result: ExportResult, dropped_records: usize) {
        error!(
            "{} | export failed ({:?}), dropping batch of {} records",
            signal, result, dropped_records
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ExportResult::Success.code(), 0);
        assert_eq!(ExportResult::Failure.code(), 1);
        assert_eq!(ExportResult::Timeout.code(), 2);
    }

    #[test]
    fn worst_is_numeric_max() {
        assert_eq!(
            ExportResult::Success.worst(ExportResult::Failure),
            ExportResult::Failure
        );
        assert_eq!(
            ExportResult::Timeout.worst(ExportResult::Failure),
            ExportResult::Timeout
        );
        assert_eq!(
            ExportResult::Success.worst(ExportResult::Success),
            ExportResult::Success
        );
    }

    #[test]
    fn worst_folds_across_fanout() {
        let results = [
            ExportResult::Success,
            ExportResult::Failure,
            ExportResult::Success,
        ];
        let folded = results
            .into_iter()
            .fold(ExportResult::Success, ExportResult::worst);
        assert_eq!(folded, ExportResult::Failure);
    }
}
