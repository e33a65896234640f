use axum::http::StatusCode;
use thiserror::Error;

use crate::scheduler::JobId;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Missing required fields: {0}")]
    Validation(String),

    #[error("Worker is offline, retry later")]
    WorkerOffline,

    #[error("Timed out waiting for worker to finish job {0}")]
    RendezvousTimeout(JobId),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl RelayError {
    /// HTTP status reported to the submitting caller.
    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::WorkerOffline => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::RendezvousTimeout(_) => StatusCode::REQUEST_TIMEOUT,
            RelayError::Internal(_) | RelayError::Io(_) | RelayError::Client(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            RelayError::Validation("username".to_string()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            RelayError::WorkerOffline.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            RelayError::RendezvousTimeout(JobId::from("abc")).status_code(),
            StatusCode::REQUEST_TIMEOUT
        );
        assert_eq!(
            RelayError::Internal("boom".to_string()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn validation_message_lists_fields() {
        let err = RelayError::Validation("schoolName, password".to_string());
        assert_eq!(
            err.to_string(),
            "Missing required fields: schoolName, password"
        );
    }
}
