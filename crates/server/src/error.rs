use hyper::StatusCode;
use sea_orm::DbErr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("Timeout after {0:?} while fetching the relay directory")]
    Timeout(std::time::Duration),
    #[error("HTTP {status} while fetching the relay directory: {context}")]
    Http { status: StatusCode, context: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("TLS error: {0}")]
    Tls(String),
    #[error("Invalid directory URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid JSON body: {0}")]
    InvalidJson(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Database(#[from] DbErr),
    #[error("Invalid {entity} row {key}: {reason}")]
    InvalidRow {
        entity: &'static str,
        key: String,
        reason: String,
    },
    #[error("Failed to generate random token: {0}")]
    Token(String),
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Invalid email address {address}: {reason}")]
    Address { address: String, reason: String },
    #[error("Failed to render email: {0}")]
    Template(String),
    #[error("Failed to build email message: {0}")]
    Message(String),
    #[error("SMTP delivery failed: {0}")]
    Transport(String),
}

impl DirectoryError {
    /// Whether the next scheduled run is likely to succeed without intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            DirectoryError::Timeout(_) | DirectoryError::Network(_) => true,
            DirectoryError::Http { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}
