// Copyright 2025-Present the telemetry-pipeline authors.
// SPDX-License-Identifier: Apache-2.0

use std::time::{Duration, Instant};

use serde::Serialize;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use telemetry_http_exporter::{HttpExporter, HttpExporterConfig};
use telemetry_pipeline::export::{ExportResult, Exporter};

#[derive(Clone, Debug, Serialize, PartialEq, Eq, serde::Deserialize)]
struct Row {
    id: u64,
    name: String,
}

fn rows(n: u64) -> Vec<Row> {
    (1..=n)
        .map(|id| Row {
            id,
            name: format!("row-{id}"),
        })
        .collect()
}

fn plain_exporter(server: &MockServer) -> HttpExporter {
    let mut config = HttpExporterConfig::new(format!("{}/v1/telemetry", server.uri()));
    config.compression = false;
    HttpExporter::new(config).expect("failed to build exporter")
}

#[tokio::test]
async fn accepted_batch_returns_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/telemetry"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let exporter = plain_exporter(&server);
    let result = exporter.export(rows(3), Duration::from_secs(5)).await;

    assert_eq!(result, ExportResult::Success);
}

#[tokio::test]
async fn retryable_503_then_200_succeeds_within_backoff_bound() {
    let server = MockServer::start().await;
    // First response is a retryable 503; the mock stops matching after one
    // hit and the 200 mock takes over.
    Mock::given(method("POST"))
        .and(path("/v1/telemetry"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/telemetry"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let exporter = plain_exporter(&server);
    let started = Instant::now();
    let result = exporter.export(rows(2), Duration::from_secs(10)).await;
    let elapsed = started.elapsed();

    assert_eq!(result, ExportResult::Success);
    // Absent a Retry-After header the sleep before attempt 2 is drawn from
    // [0, 2^1) seconds.
    assert!(elapsed < Duration::from_millis(2_500), "took {elapsed:?}");
    let requests = server.received_requests().await.expect("requests recorded");
    assert_eq!(requests.len(), 2);
}

#[tokio::test]
async fn terminal_400_fails_immediately_with_zero_retries() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/telemetry"))
        .respond_with(
            ResponseTemplate::new(400).set_body_string(r#"{"code":3,"message":"bad payload"}"#),
        )
        .expect(1)
        .mount(&server)
        .await;

    let exporter = plain_exporter(&server);
    let result = exporter.export(rows(1), Duration::from_secs(5)).await;

    assert_eq!(result, ExportResult::Failure);
    let requests = server.received_requests().await.expect("requests recorded");
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn retry_after_header_delays_the_second_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/telemetry"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/telemetry"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let exporter = plain_exporter(&server);
    let started = Instant::now();
    let result = exporter.export(rows(1), Duration::from_secs(10)).await;

    assert_eq!(result, ExportResult::Success);
    assert!(
        started.elapsed() >= Duration::from_secs(1),
        "server-directed delay was not honored"
    );
}

#[tokio::test]
async fn redirect_re_resolves_the_destination_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/telemetry"))
        .respond_with(
            ResponseTemplate::new(308)
                .insert_header("location", format!("{}/v1/moved", server.uri()).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/moved"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let exporter = plain_exporter(&server);
    let result = exporter.export(rows(2), Duration::from_secs(5)).await;

    assert_eq!(result, ExportResult::Success);
}

#[tokio::test]
async fn a_second_redirect_is_a_failure_not_a_loop() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/telemetry"))
        .respond_with(
            ResponseTemplate::new(308)
                .insert_header("location", format!("{}/v1/hop", server.uri()).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1/hop"))
        .respond_with(
            ResponseTemplate::new(308)
                .insert_header("location", format!("{}/v1/hop2", server.uri()).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let exporter = plain_exporter(&server);
    let result = exporter.export(rows(1), Duration::from_secs(5)).await;

    assert_eq!(result, ExportResult::Failure);
}

#[tokio::test]
async fn persistent_503_exhausts_the_budget_not_the_caller() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/telemetry"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let exporter = plain_exporter(&server);
    let budget = Duration::from_millis(300);
    let started = Instant::now();
    let result = exporter.export(rows(1), budget).await;
    let elapsed = started.elapsed();

    // Either the budget ran out (Timeout) or five cheap attempts spent the
    // retry ceiling first (Failure); success is impossible, and the elapsed
    // time stays in the order of the budget, never the retry ceiling's
    // worst-case sleep.
    assert_ne!(result, ExportResult::Success);
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");
    let requests = server.received_requests().await.expect("requests recorded");
    assert!(!requests.is_empty());
}

#[tokio::test]
async fn shutdown_is_idempotent_and_gates_exports() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&server)
        .await;

    let exporter = plain_exporter(&server);
    assert_eq!(
        Exporter::<Row>::shutdown(&exporter, Duration::from_secs(1)).await,
        ExportResult::Success
    );
    assert_eq!(
        Exporter::<Row>::shutdown(&exporter, Duration::from_secs(1)).await,
        ExportResult::Success
    );

    let result = exporter.export(rows(2), Duration::from_secs(5)).await;
    assert_eq!(result, ExportResult::Failure);
}

#[tokio::test]
async fn empty_batches_are_not_transmitted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(202))
        .expect(0)
        .mount(&server)
        .await;

    let exporter = plain_exporter(&server);
    let result = exporter
        .export(Vec::<Row>::new(), Duration::from_secs(5))
        .await;
    assert_eq!(result, ExportResult::Success);
}

#[tokio::test]
async fn compressed_payloads_decompress_to_the_original_batch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/telemetry"))
        .and(header("content-encoding", "zstd"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let config = HttpExporterConfig::new(format!("{}/v1/telemetry", server.uri()));
    let exporter = HttpExporter::new(config).expect("failed to build exporter");
    let batch = rows(4);
    let result = exporter.export(batch.clone(), Duration::from_secs(5)).await;
    assert_eq!(result, ExportResult::Success);

    let requests = server.received_requests().await.expect("requests recorded");
    assert_eq!(requests.len(), 1);
    let decompressed = zstd::stream::decode_all(&requests[0].body[..]).expect("valid zstd");
    let decoded: Vec<Row> = serde_json::from_slice(&decompressed).expect("valid JSON");
    assert_eq!(decoded, batch);
}
