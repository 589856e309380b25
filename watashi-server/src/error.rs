use crate::llm::ProviderError;
use crate::prompt::OffTopic;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};
use watashi_shared::{ErrorBody, ValidationIssue};

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid request format")]
    Invalid(Vec<ValidationIssue>),
    #[error(transparent)]
    OffTopic(#[from] OffTopic),
    #[error("model provider failed: {0}")]
    Provider(#[from] ProviderError),
    #[error("model provider did not respond within {}s", .0.as_secs())]
    Timeout(Duration),
}

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Invalid(_) | RelayError::OffTopic(_) => StatusCode::BAD_REQUEST,
            RelayError::Provider(_) | RelayError::Timeout(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let description = self.to_string();
        let body = match self {
            RelayError::Invalid(details) => {
                warn!("Rejected request with {} validation issue(s)", details.len());
                ErrorBody {
                    error: "Invalid request format".to_string(),
                    details: Some(details),
                    message: None,
                }
            }
            RelayError::OffTopic(reason) => {
                warn!("Rejected off-topic conversation");
                ErrorBody {
                    error: reason.to_string(),
                    details: None,
                    message: None,
                }
            }
            RelayError::Provider(e) => {
                error!("Error processing request: {}", description);
                ErrorBody {
                    error: "Internal server error".to_string(),
                    details: None,
                    message: Some(e.to_string()),
                }
            }
            RelayError::Timeout(_) => {
                error!("Error processing request: {}", description);
                ErrorBody {
                    error: "Internal server error".to_string(),
                    details: None,
                    message: Some(description),
                }
            }
        };
        (status, Json(body)).into_response()
    }
}
