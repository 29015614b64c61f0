use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use mockall::{mock, Sequence};
use serde_json::json;
use webhook_testkit::config::WebClientConfig;
use webhook_testkit::models::{DeliveryOutcome, DeliveryResult, Prospect, TestRecord};
use webhook_testkit::services::bulk_delivery::{percent, round_to};
use webhook_testkit::services::{BulkDelivery, DeliveryReport, DeliveryStats, WebhookDelivery};
use webhook_testkit::utils::error::{AppError, Result};

mock! {
    pub Transport {}

    #[async_trait]
    impl WebhookDelivery for Transport {
        async fn post_payload(&self, url: &str, body: &str) -> Result<DeliveryResult>;
    }
}

fn create_test_settings(max_retries: u32) -> WebClientConfig {
    WebClientConfig {
        timeout: 5,
        max_retries,
        retry_delay: 0,
        concurrent_requests: 3,
    }
}

fn response(status_code: u16, body: &str) -> DeliveryResult {
    DeliveryResult {
        status_code,
        body: body.to_string(),
        elapsed: Duration::from_millis(20),
    }
}

fn create_test_record(n: usize) -> TestRecord {
    TestRecord {
        record_id: format!("run_{:03}", n),
        user_email: "user1@example.com".to_string(),
        user_id: 1001,
        team_id: 501,
        sequence_number: n,
        contact: Prospect {
            first_name: format!("TestRecord_run_{:03}", n),
            last_name: format!("Test{:03}", n),
            email: format!("testrecord_run.{:03}@bonzobuddy.test", n),
            phone: format!("555-000-{:04}", n),
        },
        payload: json!({ "n": n }),
    }
}

fn outcome(record_id: &str, status_code: u16, response_time: f64) -> DeliveryOutcome {
    DeliveryOutcome {
        record_id: record_id.to_string(),
        status_code,
        response_text: String::new(),
        response_time,
        attempts: 1,
        error: None,
        timestamp: Utc::now(),
    }
}

#[tokio::test]
async fn test_retries_server_errors_until_success() {
    let mut transport = MockTransport::new();
    let mut seq = Sequence::new();
    transport
        .expect_post_payload()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(response(503, "busy")));
    transport
        .expect_post_payload()
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_, _| Ok(response(200, "ok")));

    let delivery = BulkDelivery::new(Arc::new(transport), create_test_settings(3));
    let outcome = delivery
        .deliver_with_retry("http://hook", "run_001", "{}")
        .await;

    assert_eq!(outcome.status_code, 200);
    assert_eq!(outcome.attempts, 2);
    assert!(outcome.is_success());
}

#[tokio::test]
async fn test_client_errors_are_not_retried() {
    let mut transport = MockTransport::new();
    transport
        .expect_post_payload()
        .times(1)
        .returning(|_, _| Ok(response(400, "bad payload")));

    let delivery = BulkDelivery::new(Arc::new(transport), create_test_settings(3));
    let outcome = delivery
        .deliver_with_retry("http://hook", "run_001", "{}")
        .await;

    assert_eq!(outcome.status_code, 400);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(outcome.response_text, "bad payload");
}

#[tokio::test]
async fn test_retries_stop_at_configured_attempts() {
    let mut transport = MockTransport::new();
    transport
        .expect_post_payload()
        .times(2)
        .returning(|_, _| Ok(response(502, "gateway")));

    let delivery = BulkDelivery::new(Arc::new(transport), create_test_settings(2));
    let outcome = delivery
        .deliver_with_retry("http://hook", "run_001", "{}")
        .await;

    assert_eq!(outcome.status_code, 502);
    assert_eq!(outcome.attempts, 2);
}

#[tokio::test]
async fn test_non_transient_errors_give_status_zero() {
    let mut transport = MockTransport::new();
    transport
        .expect_post_payload()
        .times(1)
        .returning(|_, _| Err(AppError::validation("refused")));

    let delivery = BulkDelivery::new(Arc::new(transport), create_test_settings(3));
    let outcome = delivery
        .deliver_with_retry("http://hook", "run_001", "{}")
        .await;

    assert_eq!(outcome.status_code, 0);
    assert!(outcome.error.unwrap().starts_with("Request failed:"));
}

#[tokio::test]
async fn test_deliver_all_keeps_input_order() {
    let mut transport = MockTransport::new();
    transport.expect_post_payload().times(9).returning(|_, body| {
        let payload: serde_json::Value = serde_json::from_str(body).unwrap();
        let n = payload["n"].as_u64().unwrap();
        Ok(response(if n % 3 == 0 { 422 } else { 200 }, "done"))
    });

    let records: Vec<TestRecord> = (1..=9).map(create_test_record).collect();
    let delivery = BulkDelivery::new(Arc::new(transport), create_test_settings(1));

    let outcomes = delivery
        .deliver_all("http://hook", &records, Some("run"))
        .await
        .unwrap();

    let ids: Vec<&str> = outcomes.iter().map(|o| o.record_id.as_str()).collect();
    let expected: Vec<String> = (1..=9).map(|n| format!("run_{:03}", n)).collect();
    assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(outcomes.iter().filter(|o| o.is_success()).count(), 6);
    assert_eq!(outcomes[2].status_code, 422);
}

/// Transport that holds each request briefly and records how many were
/// in flight at once.
#[derive(Default)]
struct CountingTransport {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

#[async_trait]
impl WebhookDelivery for CountingTransport {
    async fn post_payload(&self, _url: &str, _body: &str) -> Result<DeliveryResult> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(response(200, "ok"))
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_deliver_all_respects_concurrency_limit() {
    let transport = Arc::new(CountingTransport::default());
    let records: Vec<TestRecord> = (1..=12).map(create_test_record).collect();
    let delivery = BulkDelivery::new(transport.clone(), create_test_settings(1));

    let outcomes = delivery
        .deliver_all("http://hook", &records, None)
        .await
        .unwrap();

    assert_eq!(outcomes.len(), 12);
    assert!(outcomes.iter().all(|o| o.is_success()));
    assert_eq!(transport.calls.load(Ordering::SeqCst), 12);
    let peak = transport.peak.load(Ordering::SeqCst);
    assert!(peak >= 1 && peak <= 3, "peak in flight was {}", peak);
}

#[test]
fn test_stats_ignore_missing_response_times() {
    let outcomes = vec![
        outcome("a", 200, 0.2),
        outcome("b", 201, 0.4),
        outcome("c", 500, 0.6),
        outcome("d", 0, 0.0),
    ];

    let stats = DeliveryStats::from_outcomes(&outcomes);

    assert_eq!(stats.total_sent, 4);
    assert_eq!(stats.successful, 2);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.success_rate, 50.0);
    assert!((stats.avg_response_time - 0.4).abs() < 1e-9);
    assert_eq!(stats.max_response_time, 0.6);
    assert_eq!(stats.min_response_time, 0.2);
}

#[test]
fn test_stats_for_empty_batch() {
    let stats = DeliveryStats::from_outcomes(&[]);
    assert_eq!(stats.total_sent, 0);
    assert_eq!(stats.success_rate, 0.0);
    assert_eq!(stats.avg_response_time, 0.0);
}

#[test]
fn test_report_breaks_down_status_codes() {
    let mut failed = outcome("c", 0, 0.0);
    failed.error = Some("Request failed: timeout".to_string());
    let outcomes = vec![outcome("a", 200, 0.1234), outcome("b", 200, 0.2), failed];

    let report = DeliveryReport::from_outcomes(&outcomes);

    assert_eq!(report.summary.total_requests, 3);
    assert_eq!(report.summary.success_rate_percent, 66.67);
    assert_eq!(report.summary.min_response_time_seconds, 0.123);
    assert_eq!(report.status_code_breakdown["200"], 2);
    assert_eq!(report.status_code_breakdown["0"], 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].record_id, "c");
    assert_eq!(report.failures[0].response_text, None);
    assert_eq!(report.performance_metrics.requests_per_second, 3.0);
}

#[test]
fn test_report_is_written_as_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("delivery.json");

    DeliveryReport::from_outcomes(&[outcome("a", 200, 0.1)])
        .write_to(&path)
        .unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(written["summary"]["successful_requests"], 1);
}

#[test]
fn test_percent_and_rounding() {
    assert_eq!(percent(1, 4), 25.0);
    assert_eq!(percent(5, 0), 0.0);
    assert_eq!(round_to(66.666, 2), 66.67);
    assert_eq!(round_to(2.0, 3), 2.0);
}
