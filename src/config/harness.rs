use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::WebClientConfig;
use crate::utils::error::{AppError, Result};
use crate::utils::{read_required, title_case};

/// A platform user the bulk harness sends records for and later queries
/// on behalf of.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestUser {
    pub name: String,
    pub email: String,
    pub user_id: i64,
    pub team_id: i64,
    /// Relative share under `weighted` distribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u32>,
    /// Exact record count under `custom` distribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    #[default]
    Even,
    Weighted,
    Custom,
}

/// Extra per-record check against the raw API record. `expected` may use
/// `{user.email}`, `{user.id}` and `{team.id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    pub field: String,
    pub expected: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestDataSettings {
    pub first_name_pattern: String,
    pub last_name_pattern: String,
    pub email_domain: String,
    pub phone_area_code: String,
}

impl Default for TestDataSettings {
    fn default() -> Self {
        Self {
            first_name_pattern: "TestRecord".to_string(),
            last_name_pattern: "Test".to_string(),
            email_domain: "bonzobuddy.test".to_string(),
            phone_area_code: "555".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub test_name: String,
    pub webhook_url: String,
    /// Endpoint for payloads that name the user explicitly; falls back to
    /// `webhook_url`.
    #[serde(default)]
    pub superuser_webhook_url: Option<String>,
    pub superuser_api_key: String,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_api_page_limit")]
    pub api_page_limit: u32,
    pub integration_type: String,
    pub test_records: usize,
    #[serde(default)]
    pub distribution: Distribution,
    /// Seconds to wait for downstream processing before validating.
    pub processing_delay: u64,
    #[serde(default = "default_min_success_rate")]
    pub min_success_rate: f64,
    #[serde(default = "default_min_creation_rate")]
    pub min_creation_rate: f64,
    #[serde(default = "default_min_assignment_rate")]
    pub min_assignment_rate: f64,
    /// Share of found records that must pass every validation rule.
    #[serde(default = "default_min_mapping_rate")]
    pub min_mapping_rate: f64,
    pub payload_schema: PathBuf,
    #[serde(default)]
    pub superuser_payload_schema: Option<PathBuf>,
    pub test_users: Vec<TestUser>,
    #[serde(default)]
    pub validation_rules: Vec<ValidationRule>,
    #[serde(default)]
    pub test_data_settings: TestDataSettings,
    #[serde(default)]
    pub webhook_settings: WebClientConfig,
    /// Falls back to the application's `storage.reports_dir`.
    #[serde(default)]
    pub reports_dir: Option<PathBuf>,
}

fn default_api_base_url() -> String {
    "https://app.getbonzo.com".to_string()
}

fn default_api_page_limit() -> u32 {
    100
}

fn default_min_success_rate() -> f64 {
    95.0
}

fn default_min_creation_rate() -> f64 {
    90.0
}

fn default_min_assignment_rate() -> f64 {
    100.0
}

fn default_min_mapping_rate() -> f64 {
    95.0
}

const DEFAULT_REPORTS_DIR: &str = "reports/integration_health_reports";

/// Command-line overrides applied after the YAML is read.
#[derive(Debug, Clone, Default)]
pub struct HarnessOverrides {
    pub test_records: Option<usize>,
    pub processing_delay: Option<u64>,
    /// Used only when the harness file sets no `reports_dir`.
    pub reports_dir: Option<PathBuf>,
}

impl HarnessConfig {
    /// Loads and validates a harness file. Relative schema paths resolve
    /// against the file's directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = read_required(path, "Harness configuration file")?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_yaml_str(&contents, base_dir)
    }

    pub fn from_yaml_str(contents: &str, base_dir: &Path) -> Result<Self> {
        let mut config: HarnessConfig = serde_yaml::from_str(contents)?;
        config.payload_schema = resolve_relative(base_dir, &config.payload_schema);
        config.superuser_payload_schema = config
            .superuser_payload_schema
            .as_ref()
            .map(|p| resolve_relative(base_dir, p));
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &HarnessOverrides) -> Result<()> {
        if let Some(records) = overrides.test_records {
            self.test_records = records;
        }
        if let Some(delay) = overrides.processing_delay {
            self.processing_delay = delay;
        }
        if self.reports_dir.is_none() {
            self.reports_dir = overrides.reports_dir.clone();
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.test_users.is_empty() {
            return Err(AppError::configuration("test_users must not be empty"));
        }
        if self.test_records == 0 {
            return Err(AppError::configuration("test_records must be greater than zero"));
        }
        if self.webhook_settings.concurrent_requests == 0 {
            return Err(AppError::configuration(
                "webhook_settings.concurrent_requests must be greater than zero",
            ));
        }

        parse_http_url(&self.webhook_url, "webhook_url")?;
        if let Some(url) = &self.superuser_webhook_url {
            parse_http_url(url, "superuser_webhook_url")?;
        }
        parse_http_url(&self.api_base_url, "api_base_url")?;

        for (name, rate) in [
            ("min_success_rate", self.min_success_rate),
            ("min_creation_rate", self.min_creation_rate),
            ("min_assignment_rate", self.min_assignment_rate),
            ("min_mapping_rate", self.min_mapping_rate),
        ] {
            if !(0.0..=100.0).contains(&rate) {
                return Err(AppError::configuration(format!(
                    "{} must be between 0 and 100, got {}",
                    name, rate
                )));
            }
        }

        let mut seen = HashSet::new();
        for user in &self.test_users {
            if !seen.insert(user.email.to_lowercase()) {
                return Err(AppError::configuration(format!(
                    "duplicate test user email: {}",
                    user.email
                )));
            }
        }

        match self.distribution {
            Distribution::Even => {}
            Distribution::Weighted => {
                let total: u64 = self
                    .test_users
                    .iter()
                    .map(|u| u64::from(u.weight.unwrap_or(1)))
                    .sum();
                if total == 0 {
                    return Err(AppError::configuration(
                        "weighted distribution needs at least one non-zero weight",
                    ));
                }
            }
            Distribution::Custom => {
                let mut total = 0;
                for user in &self.test_users {
                    total += user.count.ok_or_else(|| {
                        AppError::configuration(format!(
                            "custom distribution needs a count for user {}",
                            user.name
                        ))
                    })?;
                }
                if total != self.test_records {
                    return Err(AppError::configuration(format!(
                        "custom counts add up to {} but test_records is {}",
                        total, self.test_records
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn reports_dir(&self) -> &Path {
        self.reports_dir
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_REPORTS_DIR))
    }

    pub fn delivery_url(&self, superuser: bool) -> &str {
        match (&self.superuser_webhook_url, superuser) {
            (Some(url), true) => url,
            _ => &self.webhook_url,
        }
    }

    pub fn schema_path(&self, superuser: bool) -> &Path {
        match (&self.superuser_payload_schema, superuser) {
            (Some(path), true) => path,
            _ => &self.payload_schema,
        }
    }

    /// Tag embedded in every generated contact of a run.
    pub fn contact_tag(&self, run_id: &str) -> String {
        format!("{}_{}", title_case(&self.integration_type), run_id)
    }

    /// Name fragment shared by the records of every run of this
    /// integration.
    pub fn integration_pattern(&self) -> String {
        format!(
            "{}_{}",
            self.test_data_settings.first_name_pattern,
            title_case(&self.integration_type)
        )
    }

    /// Name fragment that identifies this run's records in the API.
    pub fn test_pattern(&self, run_id: &str) -> String {
        format!(
            "{}_{}",
            self.test_data_settings.first_name_pattern,
            self.contact_tag(run_id)
        )
    }
}

fn resolve_relative(base_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

fn parse_http_url(raw: &str, field: &str) -> Result<Url> {
    let url = Url::parse(raw)?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(AppError::configuration(format!(
            "{} must be an http(s) URL, got {}",
            field, raw
        )));
    }
    Ok(url)
}
