// Central Error Type for the Application

use thiserror::Error;

use crate::port::DeliveryError;

/// Application-level error type
///
/// `Queue` is the only variant a runner pass ever returns: per-job problems are
/// captured as [`crate::application::runner::JobFailure`] instead.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Delivery(#[from] DeliveryError),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Errors running delayed jobs:\n{}", .0.join("\n"))]
    JobsFailed(Vec<String>),
}

impl AppError {
    /// True for errors caused by the remote service rejecting our credentials
    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::Delivery(DeliveryError::Auth(_)))
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error and reqwest::Error conversions live in the infra crates
// (orphan rules), mapped to AppError::Queue / DeliveryError::Transport.
