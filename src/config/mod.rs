use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::utils::error::Result;

pub mod harness;

pub use harness::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub storage: StorageConfig,
    pub webclient: WebClientConfig,
    pub logger: LoggerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Holds `org_webhooks.json` and `generated_prospects.json`.
    pub data_dir: PathBuf,
    pub schemas_dir: PathBuf,
    pub reports_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebClientConfig {
    /// Seconds.
    pub timeout: u64,
    pub max_retries: u32,
    /// Seconds between attempts.
    pub retry_delay: u64,
    pub concurrent_requests: usize,
}

impl Default for WebClientConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            max_retries: 3,
            retry_delay: 5,
            concurrent_requests: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    pub dir: String,
    pub file_name: String,
    pub max_backups: u32,
    pub local_time: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        Self::load_from("config.yaml")
    }

    /// Reads `path` when it exists, then `APP_*` environment overrides
    /// (`APP_WEBCLIENT__TIMEOUT=10`), on top of built-in defaults.
    pub fn load_from(path: &str) -> Result<Self> {
        let defaults = WebClientConfig::default();
        let settings = config::Config::builder()
            .set_default("storage.data_dir", ".")?
            .set_default("storage.schemas_dir", "schemas")?
            .set_default("storage.reports_dir", "reports/integration_health_reports")?
            .set_default("webclient.timeout", defaults.timeout)?
            .set_default("webclient.max_retries", defaults.max_retries as u64)?
            .set_default("webclient.retry_delay", defaults.retry_delay)?
            .set_default("webclient.concurrent_requests", defaults.concurrent_requests as u64)?
            .set_default("logger.dir", "log")?
            .set_default("logger.file_name", "webhook-testkit")?
            .set_default("logger.max_backups", 7_u64)?
            .set_default("logger.local_time", true)?
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
