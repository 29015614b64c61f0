use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::config::{HarnessConfig, TestUser, ValidationRule};
use crate::models::{AssignmentCheck, ProspectRecord};
use crate::providers::StructuredLogger;
use crate::utils::error::{AppError, Result};
use crate::utils::{value_as_text, value_at_path};

pub const PROSPECTS_PATH: &str = "/api/v3/prospects";
pub const ON_BEHALF_OF_HEADER: &str = "On-Behalf-Of";

/// Outcome of one configured rule against one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleResult {
    pub field: String,
    pub expected: String,
    pub actual: Option<String>,
    pub passed: bool,
}

/// Thin typed wrapper over the prospects endpoint. A superuser key reads
/// other users' records through the `On-Behalf-Of` header. No retries.
#[derive(Clone)]
pub struct ValidationClient {
    client: Client,
    base_url: Url,
    api_key: String,
    page_limit: u32,
}

impl ValidationClient {
    pub fn new(base_url: &str, api_key: &str, page_limit: u32, timeout_secs: u64) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.to_string(),
            page_limit,
        })
    }

    pub fn from_harness(config: &HarnessConfig) -> Result<Self> {
        Self::new(
            &config.api_base_url,
            &config.superuser_api_key,
            config.api_page_limit,
            config.webhook_settings.timeout,
        )
    }

    /// `GET /api/v3/prospects` as `on_behalf_of`. The body may be
    /// `{"data": [...]}` or a bare array; entries missing required fields
    /// are skipped.
    pub async fn fetch_prospects(
        &self,
        on_behalf_of: i64,
        created_after: Option<&str>,
    ) -> Result<Vec<ProspectRecord>> {
        let mut url = self.base_url.join(PROSPECTS_PATH)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &self.page_limit.to_string());
            if let Some(created_after) = created_after {
                query.append_pair("created_after", created_after);
            }
        }

        StructuredLogger::log_info(
            &format!("Getting prospects for user {}", on_behalf_of),
            None,
            None,
            Some(serde_json::json!({ "url": url.as_str() })),
        );

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header(ON_BEHALF_OF_HEADER, on_behalf_of.to_string())
            .send()
            .await?;

        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let body: Value = if text.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            serde_json::from_str(&text).unwrap_or_else(|_| serde_json::json!({ "raw_response": text }))
        };

        if status >= 400 {
            let detail = body
                .get("message")
                .or_else(|| body.get("error"))
                .map(value_as_text)
                .unwrap_or_else(|| text.clone());
            StructuredLogger::log_error(
                &format!("Prospects request for user {} failed with status {}: {}", on_behalf_of, status, detail),
                None,
                None,
            );
            return Err(AppError::api(status, detail));
        }

        let entries = match body {
            Value::Array(entries) => entries,
            Value::Object(mut object) => match object.remove("data") {
                Some(Value::Array(entries)) => entries,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };

        let mut prospects = Vec::with_capacity(entries.len());
        for entry in entries {
            match serde_json::from_value::<ProspectRecord>(entry.clone()) {
                Ok(mut record) => {
                    record.raw = entry;
                    prospects.push(record);
                }
                Err(e) => StructuredLogger::log_warning(
                    &format!("Skipping prospect due to missing field ({}): {}", e, entry),
                    None,
                    None,
                ),
            }
        }

        StructuredLogger::log_info(
            &format!("Retrieved {} prospects for user {}", prospects.len(), on_behalf_of),
            None,
            None,
            None,
        );
        Ok(prospects)
    }

    /// Records of `user_id` whose first, last or full name contains
    /// `pattern`, ignoring case.
    pub async fn find_test_prospects(
        &self,
        user_id: i64,
        pattern: &str,
        created_after: Option<&str>,
    ) -> Result<Vec<ProspectRecord>> {
        let matches: Vec<ProspectRecord> = self
            .fetch_prospects(user_id, created_after)
            .await?
            .into_iter()
            .filter(|record| record.matches_pattern(pattern))
            .collect();

        StructuredLogger::log_info(
            &format!(
                "Found {} test prospects matching '{}' for user {}",
                matches.len(),
                pattern,
                user_id
            ),
            None,
            None,
            None,
        );
        Ok(matches)
    }

    /// Compares a record with the user it should be assigned to. A record
    /// without `assigned_to` is judged on `assigned_user` alone.
    pub fn validate_assignment(record: &ProspectRecord, user: &TestUser) -> AssignmentCheck {
        AssignmentCheck {
            user_email_match: record.assigned_user.email.eq_ignore_ascii_case(&user.email),
            user_id_match: record.assigned_user.id == user.user_id,
            team_id_match: record.business_entity_id == user.team_id,
            assigned_to_match: record.assigned_to.map_or(true, |id| id == user.user_id),
        }
    }

    pub fn evaluate_rules(record: &ProspectRecord, rules: &[ValidationRule], user: &TestUser) -> Vec<RuleResult> {
        rules
            .iter()
            .map(|rule| {
                let expected = expand_rule_template(&rule.expected, user);
                let actual = value_at_path(&record.raw, &rule.field).map(value_as_text);
                RuleResult {
                    field: rule.field.clone(),
                    passed: actual.as_deref() == Some(expected.as_str()),
                    expected,
                    actual,
                }
            })
            .collect()
    }
}

/// Fills `{user.email}`, `{user.id}` and `{team.id}` for one user.
pub fn expand_rule_template(template: &str, user: &TestUser) -> String {
    template
        .replace("{user.email}", &user.email)
        .replace("{user.id}", &user.user_id.to_string())
        .replace("{team.id}", &user.team_id.to_string())
}
