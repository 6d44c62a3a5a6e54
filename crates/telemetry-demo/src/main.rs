// Copyright 2025-Present the telemetry-pipeline authors.
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Wires a batch processor per signal type to HTTP exporters, emits sample
//! telemetry on an interval, and drains everything on Ctrl+C.
//!
//! Configuration comes from the environment:
//! - `TELEMETRY_LOG_LEVEL`: tracing filter (default `info`)
//! - `TELEMETRY_ENDPOINT`: collector base URL (default
//!   `http://127.0.0.1:4318`); signals POST to `/v1/traces`, `/v1/logs`,
//!   and `/v1/metrics` under it
//! - `TELEMETRY_SECONDARY_ENDPOINT`: optional second collector base URL;
//!   when set, traces fan out to both collectors through a pipeline
//! - the `TELEMETRY_*` batch parameters documented in `telemetry-pipeline`

use std::env;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Map;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use telemetry_http_exporter::{HttpExporter, HttpExporterConfig};
use telemetry_pipeline::record::{LogData, MetricData, MetricKind, Severity, SpanData};
use telemetry_pipeline::{BatchConfig, BatchProcessor, Pipeline};

const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:4318";
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn exporter_for(base: &str, signal_path: &str) -> Option<Arc<HttpExporter>> {
    let config = HttpExporterConfig::new(format!("{base}{signal_path}"));
    match HttpExporter::new(config) {
        Ok(exporter) => Some(Arc::new(exporter)),
        Err(e) => {
            error!("failed to build exporter for {}: {}", signal_path, e);
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let log_level = env::var("TELEMETRY_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let endpoint = env::var("TELEMETRY_ENDPOINT").unwrap_or_else(|_| DEFAULT_ENDPOINT.to_string());
    let endpoint = endpoint.trim_end_matches('/').to_string();
    info!("shipping telemetry to {}", endpoint);

    let Some(trace_exporter) = exporter_for(&endpoint, "/v1/traces") else {
        return;
    };
    let Some(log_exporter) = exporter_for(&endpoint, "/v1/logs") else {
        return;
    };
    let Some(metric_exporter) = exporter_for(&endpoint, "/v1/metrics") else {
        return;
    };

    let mut traces = Pipeline::new();
    match BatchProcessor::<SpanData>::new(
        "TRACES",
        trace_exporter,
        BatchConfig::default().from_env(),
    ) {
        Ok(processor) => traces.push(Arc::new(processor)),
        Err(e) => {
            error!("invalid trace processor configuration: {}", e);
            return;
        }
    }
    if let Ok(secondary) = env::var("TELEMETRY_SECONDARY_ENDPOINT") {
        let secondary = secondary.trim_end_matches('/').to_string();
        info!("fanning traces out to secondary collector {}", secondary);
        let Some(exporter) = exporter_for(&secondary, "/v1/traces") else {
            return;
        };
        match BatchProcessor::<SpanData>::new(
            "TRACES_SECONDARY",
            exporter,
            BatchConfig::default().from_env(),
        ) {
            Ok(processor) => traces.push(Arc::new(processor)),
            Err(e) => {
                error!("invalid secondary trace processor configuration: {}", e);
                return;
            }
        }
    }
    let logs = match BatchProcessor::<LogData>::new(
        "LOGS",
        log_exporter,
        BatchConfig::default().from_env(),
    ) {
        Ok(processor) => processor,
        Err(e) => {
            error!("invalid log processor configuration: {}", e);
            return;
        }
    };
    let metrics = match BatchProcessor::<MetricData>::new(
        "METRICS",
        metric_exporter,
        BatchConfig::metrics().from_env(),
    ) {
        Ok(processor) => processor,
        Err(e) => {
            error!("invalid metric processor configuration: {}", e);
            return;
        }
    };

    info!("processors running; emitting sample telemetry until Ctrl+C");

    let mut interval = tokio::time::interval(Duration::from_millis(500));
    let mut sequence: u64 = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                sequence += 1;
                let started = unix_nanos();

                traces.on_emit(SpanData {
                    trace_id: u128::from(sequence),
                    span_id: sequence,
                    parent_span_id: None,
                    name: "demo.request".to_string(),
                    start_unix_nanos: started,
                    end_unix_nanos: started + 1_000_000,
                    ok: sequence % 10 != 0,
                    attributes: Map::new(),
                });
                logs.on_emit(LogData {
                    timestamp_unix_nanos: started,
                    severity: Severity::Info,
                    body: format!("handled request {sequence}"),
                    attributes: Map::new(),
                });
                metrics.on_emit(MetricData {
                    name: "demo.requests".to_string(),
                    timestamp_unix_nanos: started,
                    kind: MetricKind::Counter,
                    value: 1.0,
                    attributes: Map::new(),
                });
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("failed to listen for Ctrl+C: {}", e);
                }
                break;
            }
        }
    }

    info!("shutting down, draining buffered telemetry");
    let worst = traces
        .shutdown(Some(SHUTDOWN_TIMEOUT))
        .await
        .worst(logs.shutdown(Some(SHUTDOWN_TIMEOUT)).await)
        .worst(metrics.shutdown(Some(SHUTDOWN_TIMEOUT)).await);
    info!("shutdown complete (worst result: {:?})", worst);
}
