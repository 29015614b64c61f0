use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Schema error in '{field}': {message}")]
    MalformedSchema { field: String, message: String },

    #[error("Unknown dynamic kind '{kind}' for field '{field}'")]
    UnknownDynamicKind { field: String, kind: String },

    #[error("Field '{field}' uses dynamic kind '{kind}' which needs {requirement}")]
    MissingGenerationContext {
        field: String,
        kind: String,
        requirement: String,
    },

    #[error("Partner not found: {partner}")]
    PartnerNotFound { partner: String },

    #[error("Partner '{partner}' has no schema variants")]
    NoVariants { partner: String },

    #[error("Partner '{partner}' has several variants, choose one of: {}", variants.join(", "))]
    VariantRequired { partner: String, variants: Vec<String> },

    #[error("Schema variant '{variant}' not found for partner '{partner}'")]
    SchemaNotFound { partner: String, variant: String },

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("API request failed with status {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Atomic write failed: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Logging initialization error: {0}")]
    LoggingInit(#[from] tracing_appender::rolling::InitError),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl AppError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn malformed_schema(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedSchema {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn store(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
        }
    }

    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Configuration problems are fatal at load time and never retried.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::Configuration { .. }
                | Self::Yaml(_)
                | Self::InvalidUrl(_)
                | Self::MalformedSchema { .. }
                | Self::UnknownDynamicKind { .. }
                | Self::MissingGenerationContext { .. }
                | Self::PartnerNotFound { .. }
                | Self::NoVariants { .. }
                | Self::VariantRequired { .. }
                | Self::SchemaNotFound { .. }
        )
    }
}

impl AppError {
    /// Timeouts, refused connections and 5xx answers are worth another
    /// attempt; everything else is final.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpRequest(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
