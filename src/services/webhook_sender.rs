use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::WebClientConfig;
use crate::models::DeliveryResult;
use crate::providers::StructuredLogger;
use crate::utils::error::{AppError, Result};

pub const USER_AGENT: &str = "BonzoBuddy-IntegrationTest/1.0";
pub const MAX_RESPONSE_TEXT: usize = 1000;

/// One POST of a raw JSON body. Any HTTP answer is `Ok`, whatever its
/// status; only transport failures are errors.
#[async_trait]
pub trait WebhookDelivery: Send + Sync {
    async fn post_payload(&self, url: &str, body: &str) -> Result<DeliveryResult>;
}

/// Result of probing a webhook endpoint before a bulk run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointHealth {
    pub url: String,
    pub endpoint_reachable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Seconds.
    pub response_time: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EndpointHealth {
    fn failed(url: &str, error: String, response_time: f64) -> Self {
        Self {
            url: url.to_string(),
            endpoint_reachable: false,
            status_code: None,
            response_time,
            response_text: None,
            error: Some(error),
        }
    }
}

#[derive(Clone)]
pub struct WebhookSender {
    client: Client,
    timeout: Duration,
}

impl WebhookSender {
    pub fn new(config: &WebClientConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout);
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client, timeout })
    }

    /// Sends `body` exactly as given, so hand-edited or deliberately broken
    /// JSON reaches the endpoint untouched.
    pub async fn send(&self, url: &str, body: &str) -> Result<DeliveryResult> {
        StructuredLogger::log_info(
            &format!("Sending webhook to {}", url),
            None,
            None,
            Some(serde_json::json!({ "body_size": body.len() })),
        );

        let result = self.post_payload(url, body).await.map_err(|e| {
            StructuredLogger::log_error(&format!("Webhook send to {} failed: {}", url, e), None, None);
            e
        })?;

        if result.is_success() {
            StructuredLogger::log_info(
                &format!("Webhook accepted with status {}", result.status_code),
                None,
                None,
                Some(serde_json::json!({ "elapsed_ms": result.elapsed.as_millis() as u64 })),
            );
        } else {
            StructuredLogger::log_warning(
                &format!("Webhook rejected with status {}: {}", result.status_code, result.body),
                None,
                None,
            );
        }
        Ok(result)
    }

    pub async fn send_json(&self, url: &str, payload: &Value) -> Result<DeliveryResult> {
        self.send(url, &serde_json::to_string(payload)?).await
    }

    /// Checks that `url` is a usable http(s) address, then posts a minimal
    /// probe payload. Any HTTP answer counts as reachable.
    pub async fn check_endpoint(&self, url: &str) -> EndpointHealth {
        match Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.host_str().is_some() => {}
            _ => return EndpointHealth::failed(url, "Invalid webhook URL format".to_string(), 0.0),
        }

        let probe = serde_json::json!({ "test": "endpoint_validation" }).to_string();
        let started = Instant::now();

        let health = match self.post_payload(url, &probe).await {
            Ok(result) => EndpointHealth {
                url: url.to_string(),
                endpoint_reachable: true,
                status_code: Some(result.status_code),
                response_time: result.elapsed.as_secs_f64(),
                response_text: Some(truncate_text(&result.body, 500)),
                error: None,
            },
            Err(AppError::HttpRequest(e)) if e.is_timeout() => EndpointHealth::failed(
                url,
                format!("Endpoint timeout after {}s", self.timeout.as_secs()),
                started.elapsed().as_secs_f64(),
            ),
            Err(AppError::HttpRequest(e)) if e.is_connect() => EndpointHealth::failed(
                url,
                "Cannot connect to webhook endpoint".to_string(),
                started.elapsed().as_secs_f64(),
            ),
            Err(e) => EndpointHealth::failed(
                url,
                format!("Validation failed: {}", e),
                started.elapsed().as_secs_f64(),
            ),
        };

        if health.endpoint_reachable {
            StructuredLogger::log_info(
                "Webhook endpoint validation finished",
                None,
                None,
                Some(serde_json::to_value(&health).unwrap_or(Value::Null)),
            );
        } else {
            StructuredLogger::log_warning(
                &format!(
                    "Webhook endpoint validation failed: {}",
                    health.error.as_deref().unwrap_or("unknown error")
                ),
                None,
                None,
            );
        }
        health
    }
}

#[async_trait]
impl WebhookDelivery for WebhookSender {
    async fn post_payload(&self, url: &str, body: &str) -> Result<DeliveryResult> {
        let started = Instant::now();
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .body(body.to_string())
            .send()
            .await?;

        let status_code = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();

        Ok(DeliveryResult {
            status_code,
            body,
            elapsed: started.elapsed(),
        })
    }
}

/// Cuts `text` to at most `max_chars` characters.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
