// Copyright 2025-Present the telemetry-pipeline authors.
// SPDX-License-Identifier: Apache-2.0

//! The HTTP exporter and its configuration.
//!
//! One exporter instance targets one collector endpoint. The HTTP client is
//! built once at construction with the static configured timeouts; each
//! attempt applies its own per-request timeout clamped to the remaining
//! export budget, so a slow request can never shorten the defaults seen by
//! later, unrelated calls.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::Url;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error, warn};
use zstd::stream::write::Encoder;

use telemetry_pipeline::backoff::{backoff_delay, Deadline, MAX_EXPORT_ATTEMPTS};
use telemetry_pipeline::export::{ExportResult, Exporter};

use crate::response::{classify, log_failure_body, Disposition};

/// Configuration error raised when the exporter cannot be constructed.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid endpoint URL `{0}`")]
    InvalidEndpoint(String),

    #[error("invalid header `{name}`")]
    InvalidHeader { name: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Construction parameters for [`HttpExporter`].
#[derive(Clone, Debug)]
pub struct HttpExporterConfig {
    /// Collector endpoint receiving the POSTed batches.
    pub endpoint: String,
    /// Extra request headers (authentication, tenant routing).
    pub headers: Vec<(String, String)>,
    /// Compress payloads with zstd before transmission.
    pub compression: bool,
    /// zstd compression level.
    pub compression_level: i32,
    /// Static per-attempt request timeout; each attempt is additionally
    /// clamped to the remaining export budget.
    pub request_timeout: Duration,
    /// Static connection-establishment timeout.
    pub connect_timeout: Duration,
}

impl HttpExporterConfig {
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        HttpExporterConfig {
            endpoint: endpoint.into(),
            headers: Vec::new(),
            compression: true,
            compression_level: 3,
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }
}

/// What the retry loop should do after one attempt.
enum Step {
    Done(ExportResult),
    Redirect(Option<String>),
    Backoff(Option<Duration>),
}

/// Ships JSON-encoded, optionally zstd-compressed batches to one collector
/// endpoint with budgeted retries.
pub struct HttpExporter {
    client: reqwest::Client,
    endpoint: Url,
    headers: HeaderMap,
    compression: bool,
    compression_level: i32,
    request_timeout: Duration,
    is_shutdown: AtomicBool,
}

impl HttpExporter {
    /// Builds the exporter and its HTTP client.
    ///
    /// Redirect following is disabled on the client so the retry loop can
    /// observe 3xx responses and apply the single-re-resolution rule itself.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] for an unparsable endpoint, malformed headers,
    /// or a client construction failure.
    pub fn new(config: HttpExporterConfig) -> Result<Self, BuildError> {
        let endpoint = Url::parse(&config.endpoint)
            .map_err(|_| BuildError::InvalidEndpoint(config.endpoint.clone()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if config.compression {
            headers.insert(CONTENT_ENCODING, HeaderValue::from_static("zstd"));
        }
        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| BuildError::InvalidHeader { name: name.clone() })?;
            let header_value = HeaderValue::from_str(value)
                .map_err(|_| BuildError::InvalidHeader { name: name.clone() })?;
            headers.insert(header_name, header_value);
        }

        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(HttpExporter {
            client,
            endpoint,
            headers,
            compression: config.compression,
            compression_level: config.compression_level,
            request_timeout: config.request_timeout,
            is_shutdown: AtomicBool::new(false),
        })
    }

    fn encode(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut encoder = Encoder::new(Vec::new(), self.compression_level)?;
        encoder.write_all(data)?;
        encoder.finish()
    }

    /// One POST attempt, classified into the retry loop's next step.
    async fn attempt(&self, target: &Url, body: Vec<u8>, timeout: Duration) -> Step {
        let response = self
            .client
            .post(target.clone())
            .headers(self.headers.clone())
            .timeout(timeout)
            .body(body)
            .send()
            .await;

        match response {
            Ok(response) => {
                let status = response.status();
                match classify(status, response.headers()) {
                    Disposition::Accepted => Step::Done(ExportResult::Success),
                    Disposition::Terminal { status } => {
                        let body = response.text().await.unwrap_or_default();
                        log_failure_body(status, &body);
                        error!(
                            "terminal response {} from {}, dropping batch",
                            status, target
                        );
                        Step::Done(ExportResult::Failure)
                    }
                    Disposition::Redirect { location } => Step::Redirect(location),
                    Disposition::Retryable { retry_after } => {
                        let body = response.text().await.unwrap_or_default();
                        log_failure_body(status.as_u16(), &body);
                        Step::Backoff(retry_after)
                    }
                }
            }
            Err(e) if e.is_timeout() => {
                debug!("attempt against {} timed out: {}", target, e);
                Step::Backoff(None)
            }
            Err(e) if e.is_connect() => {
                debug!("connection to {} failed: {}", target, e);
                Step::Backoff(None)
            }
            Err(e) => {
                error!("request to {} failed: {}, dropping batch", target, e);
                Step::Done(ExportResult::Failure)
            }
        }
    }

    async fn send_with_retry(&self, body: Vec<u8>, deadline: Deadline) -> ExportResult {
        let mut target = self.endpoint.clone();
        let mut attempts: u32 = 0;
        let mut redirected = false;

        loop {
            if deadline.expired() {
                warn!("export budget exhausted before delivery to {}", target);
                return ExportResult::Timeout;
            }
            attempts += 1;
            let attempt_timeout = deadline.clamp(self.request_timeout);
            match self.attempt(&target, body.clone(), attempt_timeout).await {
                Step::Done(result) => return result,
                Step::Redirect(location) => {
                    if redirected {
                        error!("second redirect from {}, dropping batch", target);
                        return ExportResult::Failure;
                    }
                    if attempts >= MAX_EXPORT_ATTEMPTS {
                        error!(
                            "retry ceiling ({}) reached for {}, dropping batch",
                            MAX_EXPORT_ATTEMPTS, target
                        );
                        return ExportResult::Failure;
                    }
                    let Some(next) = location.and_then(|loc| target.join(&loc).ok()) else {
                        error!(
                            "redirect from {} without a usable Location, dropping batch",
                            target
                        );
                        return ExportResult::Failure;
                    };
                    debug!("collector moved, re-resolving to {}", next);
                    redirected = true;
                    target = next;
                }
                Step::Backoff(retry_after) => {
                    if attempts >= MAX_EXPORT_ATTEMPTS {
                        error!(
                            "retry ceiling ({}) reached for {}, dropping batch",
                            MAX_EXPORT_ATTEMPTS, target
                        );
                        return ExportResult::Failure;
                    }
                    let delay = backoff_delay(attempts, retry_after);
                    if !deadline.fits(delay) {
                        warn!(
                            "remaining budget cannot cover a {:?} backoff, giving up",
                            delay
                        );
                        return ExportResult::Timeout;
                    }
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[async_trait]
impl<T> Exporter<T> for HttpExporter
where
    T: Serialize + Send + Sync + 'static,
{
    async fn export(&self, batch: Vec<T>, timeout: Duration) -> ExportResult {
        if self.is_shutdown.load(Ordering::Acquire) {
            debug!("export after shutdown, refusing batch");
            return ExportResult::Failure;
        }
        if batch.is_empty() {
            return ExportResult::Success;
        }

        let payload = match serde_json::to_vec(&batch) {
            Ok(payload) => payload,
            Err(e) => {
                error!("failed to encode batch: {}, dropping it", e);
                return ExportResult::Failure;
            }
        };
        let body = if self.compression {
            match self.encode(&payload) {
                Ok(compressed) => compressed,
                Err(e) => {
                    // Terminal: the payload never left the process.
                    error!("payload compression failed: {}, dropping batch", e);
                    return ExportResult::Failure;
                }
            }
        } else {
            payload
        };

        let deadline = Deadline::after(timeout);
        self.send_with_retry(body, deadline).await
    }

    async fn shutdown(&self, _timeout: Duration) -> ExportResult {
        if self.is_shutdown.swap(true, Ordering::AcqRel) {
            warn!("exporter shutdown called more than once, ignoring");
        }
        ExportResult::Success
    }
}
