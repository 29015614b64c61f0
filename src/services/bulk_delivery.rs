use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::sleep;

use crate::config::WebClientConfig;
use crate::models::{DeliveryOutcome, TestRecord};
use crate::providers::StructuredLogger;
use crate::services::webhook_sender::{truncate_text, WebhookDelivery, MAX_RESPONSE_TEXT};
use crate::utils::error::Result;
use crate::utils::write_json_atomic;

/// Fans test records out to one webhook URL with a bounded number of
/// requests in flight and a fixed retry policy per record.
#[derive(Clone)]
pub struct BulkDelivery {
    transport: Arc<dyn WebhookDelivery>,
    settings: WebClientConfig,
}

impl BulkDelivery {
    pub fn new(transport: Arc<dyn WebhookDelivery>, settings: WebClientConfig) -> Self {
        Self { transport, settings }
    }

    pub fn settings(&self) -> &WebClientConfig {
        &self.settings
    }

    pub async fn deliver_with_retry(&self, url: &str, record_id: &str, body: &str) -> DeliveryOutcome {
        deliver_with_retry(self.transport.as_ref(), &self.settings, url, record_id, body, None).await
    }

    /// Sends every record and returns one outcome per record, in input
    /// order. A failed record never stops the others.
    pub async fn deliver_all(
        &self,
        url: &str,
        records: &[TestRecord],
        run_id: Option<&str>,
    ) -> Result<Vec<DeliveryOutcome>> {
        let limit = self.settings.concurrent_requests.max(1);
        StructuredLogger::log_info(
            &format!("Sending {} webhooks with {} concurrent requests", records.len(), limit),
            run_id,
            None,
            Some(serde_json::json!({ "url": url })),
        );

        let semaphore = Arc::new(Semaphore::new(limit));
        let mut tasks = JoinSet::new();

        for (index, record) in records.iter().enumerate() {
            let body = serde_json::to_string(&record.payload)?;
            let transport = Arc::clone(&self.transport);
            let semaphore = Arc::clone(&semaphore);
            let settings = self.settings.clone();
            let url = url.to_string();
            let record_id = record.record_id.clone();
            let run_id = run_id.map(str::to_string);

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = deliver_with_retry(
                    transport.as_ref(),
                    &settings,
                    &url,
                    &record_id,
                    &body,
                    run_id.as_deref(),
                )
                .await;
                (index, outcome)
            });
        }

        let mut slots: Vec<Option<DeliveryOutcome>> = vec![None; records.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome)) => slots[index] = Some(outcome),
                Err(e) => StructuredLogger::log_error(
                    &format!("Delivery task failed: {}", e),
                    run_id,
                    None,
                ),
            }
        }

        Ok(slots
            .into_iter()
            .zip(records)
            .map(|(slot, record)| {
                slot.unwrap_or_else(|| failed_outcome(&record.record_id, "delivery task failed", 0.0, 0))
            })
            .collect())
    }
}

async fn deliver_with_retry(
    transport: &dyn WebhookDelivery,
    settings: &WebClientConfig,
    url: &str,
    record_id: &str,
    body: &str,
    run_id: Option<&str>,
) -> DeliveryOutcome {
    let attempts = settings.max_retries.max(1);
    let mut last = failed_outcome(record_id, "no attempt made", 0.0, 0);

    for attempt in 1..=attempts {
        let started = Instant::now();
        let retry = match transport.post_payload(url, body).await {
            Ok(result) => {
                last = DeliveryOutcome {
                    record_id: record_id.to_string(),
                    status_code: result.status_code,
                    response_text: truncate_text(&result.body, MAX_RESPONSE_TEXT),
                    response_time: result.elapsed.as_secs_f64(),
                    attempts: attempt,
                    error: None,
                    timestamp: Utc::now(),
                };
                if result.is_success() {
                    StructuredLogger::log_info(
                        &format!(
                            "Webhook {}: {} in {:.2}s",
                            record_id, result.status_code, last.response_time
                        ),
                        run_id,
                        Some(record_id),
                        None,
                    );
                    return last;
                }
                result.status_code >= 500
            }
            Err(e) => {
                let retry = e.is_transient();
                last = failed_outcome(
                    record_id,
                    &format!("Request failed: {}", e),
                    started.elapsed().as_secs_f64(),
                    attempt,
                );
                retry
            }
        };

        if !retry {
            break;
        }
        if attempt < attempts {
            StructuredLogger::log_warning(
                &format!(
                    "Webhook {} attempt {} failed with status {}, retrying in {}s",
                    record_id, attempt, last.status_code, settings.retry_delay
                ),
                run_id,
                Some(record_id),
            );
            sleep(Duration::from_secs(settings.retry_delay)).await;
        }
    }

    StructuredLogger::log_error(
        &format!(
            "Webhook {} failed after {} attempt(s): status {}{}",
            record_id,
            last.attempts,
            last.status_code,
            last.error.as_deref().map(|e| format!(", {}", e)).unwrap_or_default()
        ),
        run_id,
        Some(record_id),
    );
    last
}

fn failed_outcome(record_id: &str, error: &str, response_time: f64, attempts: u32) -> DeliveryOutcome {
    DeliveryOutcome {
        record_id: record_id.to_string(),
        status_code: 0,
        response_text: String::new(),
        response_time,
        attempts,
        error: Some(error.to_string()),
        timestamp: Utc::now(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryStats {
    pub total_sent: usize,
    pub successful: usize,
    pub failed: usize,
    pub avg_response_time: f64,
    pub max_response_time: f64,
    pub min_response_time: f64,
    /// Percent, 0 when nothing was sent.
    pub success_rate: f64,
}

impl DeliveryStats {
    pub fn from_outcomes(outcomes: &[DeliveryOutcome]) -> Self {
        let total_sent = outcomes.len();
        let successful = outcomes.iter().filter(|o| o.is_success()).count();

        let times: Vec<f64> = outcomes
            .iter()
            .map(|o| o.response_time)
            .filter(|t| *t > 0.0)
            .collect();
        let (avg, max, min) = if times.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            (
                times.iter().sum::<f64>() / times.len() as f64,
                times.iter().copied().fold(f64::MIN, f64::max),
                times.iter().copied().fold(f64::MAX, f64::min),
            )
        };

        Self {
            total_sent,
            successful,
            failed: total_sent - successful,
            avg_response_time: avg,
            max_response_time: max,
            min_response_time: min,
            success_rate: percent(successful, total_sent),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliverySummary {
    pub total_requests: usize,
    pub successful_requests: usize,
    pub failed_requests: usize,
    pub success_rate_percent: f64,
    pub avg_response_time_seconds: f64,
    pub max_response_time_seconds: f64,
    pub min_response_time_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub record_id: String,
    pub status_code: u16,
    pub error: Option<String>,
    pub response_text: Option<String>,
    pub response_time: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub requests_per_second: f64,
    pub fastest_response: f64,
    pub slowest_response: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub summary: DeliverySummary,
    pub status_code_breakdown: BTreeMap<String, usize>,
    pub failures: Vec<DeliveryFailure>,
    pub performance_metrics: PerformanceMetrics,
    pub generated_at: DateTime<Utc>,
}

impl DeliveryReport {
    pub fn from_outcomes(outcomes: &[DeliveryOutcome]) -> Self {
        let stats = DeliveryStats::from_outcomes(outcomes);

        let mut status_code_breakdown = BTreeMap::new();
        for outcome in outcomes {
            *status_code_breakdown
                .entry(outcome.status_code.to_string())
                .or_insert(0) += 1;
        }

        let failures = outcomes
            .iter()
            .filter(|o| !o.is_success())
            .map(|o| DeliveryFailure {
                record_id: o.record_id.clone(),
                status_code: o.status_code,
                error: o.error.clone(),
                response_text: Some(truncate_text(&o.response_text, 200)).filter(|t| !t.is_empty()),
                response_time: round_to(o.response_time, 3),
            })
            .collect();

        Self {
            summary: DeliverySummary {
                total_requests: stats.total_sent,
                successful_requests: stats.successful,
                failed_requests: stats.failed,
                success_rate_percent: round_to(stats.success_rate, 2),
                avg_response_time_seconds: round_to(stats.avg_response_time, 3),
                max_response_time_seconds: round_to(stats.max_response_time, 3),
                min_response_time_seconds: round_to(stats.min_response_time, 3),
            },
            status_code_breakdown,
            failures,
            performance_metrics: PerformanceMetrics {
                requests_per_second: round_to(
                    stats.total_sent as f64 / stats.max_response_time.max(1.0),
                    2,
                ),
                fastest_response: round_to(stats.min_response_time, 3),
                slowest_response: round_to(stats.max_response_time, 3),
            },
            generated_at: Utc::now(),
        }
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        write_json_atomic(path, self)?;
        StructuredLogger::log_info(
            &format!("Delivery report saved to {}", path.display()),
            None,
            None,
            None,
        );
        Ok(())
    }
}

/// `part / whole` as a percentage; 0 for an empty whole.
pub fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
