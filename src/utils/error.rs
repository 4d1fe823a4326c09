use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Network failure or non-2xx status. Retried on the next scheduled tick.
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Structured data block absent or malformed.
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Persistence of a sync delta failed and was rolled back.
    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn fetch(url: impl Into<String>, message: impl std::fmt::Display) -> Self {
        AppError::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound {
            resource: resource.into(),
        }
    }

    /// Whether a later tick may succeed without user action.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Fetch { .. } | AppError::Transaction(_) | AppError::Database(_)
        )
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(format!("{}", err))
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::Validation(format!("invalid URL: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
