use chrono::{Local, Utc};
use serde_json::{json, Map, Value};
use std::sync::{Arc, OnceLock, RwLock};
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use crate::config::LoggerConfig;
use crate::utils::error::Result;

pub struct StructuredLogger;

static LOGGER_CONFIG: OnceLock<Arc<RwLock<Option<LoggerConfig>>>> = OnceLock::new();

impl StructuredLogger {
    pub fn init(level: &str, logger_config: Option<LoggerConfig>) -> Result<()> {
        let filter = match level.to_lowercase().as_str() {
            "error" => "error",
            "warn" => "warn",
            "info" => "info",
            "debug" => "debug",
            "trace" => "trace",
            _ => "info",
        };

        let config_lock = LOGGER_CONFIG.get_or_init(|| Arc::new(RwLock::new(None)));
        if let Ok(mut config_guard) = config_lock.write() {
            *config_guard = logger_config.clone();
        }

        if let Some(config) = logger_config {
            std::fs::create_dir_all(&config.dir)?;
            // Warnings and errors also go to a daily file, rolled at UTC midnight.
            let error_file = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix(&config.file_name)
                .filename_suffix("error.log")
                .max_log_files(config.max_backups.max(1) as usize)
                .build(&config.dir)?;

            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr.and(error_file.with_max_level(Level::WARN)))
                .try_init()
                .ok();
        } else {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .ok();
        }

        Ok(())
    }

    pub fn log_error(error: &str, run_id: Option<&str>, record_id: Option<&str>) {
        let log_entry = Self::entry("error", error, run_id, record_id, None);
        tracing::error!("{}", log_entry);
    }

    pub fn log_info(
        message: &str,
        run_id: Option<&str>,
        record_id: Option<&str>,
        additional_data: Option<Value>,
    ) {
        let log_entry = Self::entry("info", message, run_id, record_id, additional_data);
        tracing::info!("{}", log_entry);
    }

    pub fn log_warning(message: &str, run_id: Option<&str>, record_id: Option<&str>) {
        let log_entry = Self::entry("warning", message, run_id, record_id, None);
        tracing::warn!("{}", log_entry);
    }

    fn entry(
        severity: &str,
        message: &str,
        run_id: Option<&str>,
        record_id: Option<&str>,
        additional_data: Option<Value>,
    ) -> Value {
        let run_id = run_id.unwrap_or("MAIN");

        let mut body = Map::new();
        body.insert(severity.to_string(), Value::from(message));

        let mut log_entry = json!({
            "message": body,
            "timestamp": Self::timestamp("%Y-%m-%d %H:%M:%S%.3f"),
            "runId": run_id,
        });

        if let Value::Object(ref mut map) = log_entry {
            if let Some(record_id) = record_id {
                map.insert("recordId".to_string(), Value::from(record_id));
            }
            if let Some(Value::Object(data_map)) = additional_data {
                for (key, value) in data_map {
                    map.insert(key, value);
                }
            }
        }

        log_entry
    }

    fn use_local_time() -> bool {
        LOGGER_CONFIG
            .get()
            .and_then(|config_lock| config_lock.read().ok())
            .and_then(|config_guard| config_guard.as_ref().map(|c| c.local_time))
            .unwrap_or(false)
    }

    fn timestamp(format: &str) -> String {
        if Self::use_local_time() {
            Local::now().format(format).to_string()
        } else {
            Utc::now().format(format).to_string()
        }
    }
}
