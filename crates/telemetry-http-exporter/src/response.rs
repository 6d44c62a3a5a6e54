// Copyright 2025-Present the telemetry-pipeline authors.
// SPDX-License-Identifier: Apache-2.0

//! Response classification and `Retry-After` parsing.
//!
//! Three buckets decide what happens next (plus redirects, which get one
//! re-resolution): 2xx is accepted, 408/429/502/503/504 are retryable, and
//! everything else is terminal: the payload is presumed bad and retrying
//! would not help. Failure bodies are parsed as a structured status payload
//! for diagnostic logging only; they never change the retry decision.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, LOCATION, RETRY_AFTER};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::debug;

/// What a response (or transport error) means for the export attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Disposition {
    /// 2xx: the batch was fully accepted.
    Accepted,
    /// Worth another attempt if budget and retry count allow.
    Retryable { retry_after: Option<Duration> },
    /// Destination moved; re-resolve and try once more.
    Redirect { location: Option<String> },
    /// Rejected for good; the batch is dropped.
    Terminal { status: u16 },
}

pub(crate) fn classify(status: StatusCode, headers: &HeaderMap) -> Disposition {
    if status.is_success() {
        return Disposition::Accepted;
    }
    if status.is_redirection() {
        let location = headers
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        return Disposition::Redirect { location };
    }
    match status.as_u16() {
        408 | 429 | 502 | 503 | 504 => Disposition::Retryable {
            retry_after: headers
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after),
        },
        other => Disposition::Terminal { status: other },
    }
}

/// Parses a `Retry-After` value: integer seconds or an HTTP-date. Returns
/// `None` unless the result is positive.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return (secs > 0).then(|| Duration::from_secs(secs));
    }
    let date = DateTime::parse_from_rfc2822(value).ok()?;
    date.signed_duration_since(Utc::now())
        .to_std()
        .ok()
        .filter(|d| !d.is_zero())
}

/// Structured status payload some collectors return on failure. Parsed for
/// log lines only.
#[derive(Debug, Deserialize)]
pub(crate) struct StatusPayload {
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

pub(crate) fn log_failure_body(status: u16, body: &str) {
    if body.is_empty() {
        return;
    }
    match serde_json::from_str::<StatusPayload>(body) {
        Ok(payload) => debug!(
            "collector status payload (http {}): code={:?} message={:?}",
            status, payload.code, payload.message
        ),
        Err(_) => debug!(
            "collector returned http {} with a non-structured body ({} bytes)",
            status,
            body.len()
        ),
    }
}
