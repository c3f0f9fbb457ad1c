use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use schema::ErrorBody;
use std::io;
use thiserror::Error;

/// Message returned for every upstream failure; the inference service's own
/// error detail is never forwarded.
pub const RELAY_FAILURE_MESSAGE: &str = "Object detection failed";

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("No image uploaded")]
    MissingInput,

    #[error("Failed to read upload")]
    Upload(#[from] MultipartError),

    #[error("Failed to stage upload")]
    Staging(#[source] io::Error),

    #[error("inference service answered {0}")]
    UpstreamStatus(StatusCode),

    #[error("inference service timed out")]
    Timeout(#[source] reqwest::Error),

    #[error("inference service unreachable")]
    Unreachable(#[source] reqwest::Error),

    #[error("inference service returned an unreadable body")]
    InvalidUpstreamBody(#[source] serde_json::Error),
}

impl RelayError {
    /// Splits transport failures into timeouts and everything else.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RelayError::Timeout(err)
        } else {
            RelayError::Unreachable(err)
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::MissingInput => StatusCode::BAD_REQUEST,
            RelayError::Upload(e) => e.status(),
            RelayError::Staging(_) => StatusCode::INTERNAL_SERVER_ERROR,
            RelayError::UpstreamStatus(status) => *status,
            RelayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            RelayError::Unreachable(_) | RelayError::InvalidUpstreamBody(_) => {
                StatusCode::BAD_GATEWAY
            }
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            RelayError::MissingInput | RelayError::Upload(_) | RelayError::Staging(_) => {
                ErrorBody::new(self.to_string())
            }
            RelayError::UpstreamStatus(_)
            | RelayError::Timeout(_)
            | RelayError::Unreachable(_)
            | RelayError::InvalidUpstreamBody(_) => ErrorBody::new(RELAY_FAILURE_MESSAGE),
        }
    }

    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            RelayError::UpstreamStatus(_)
                | RelayError::Timeout(_)
                | RelayError::Unreachable(_)
                | RelayError::InvalidUpstreamBody(_)
        )
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() || self.is_upstream() {
            tracing::error!(error = ?self, %status, "Relay failed");
        } else {
            tracing::warn!(error = %self, %status, "Rejected detect request");
        }
        (status, Json(self.body())).into_response()
    }
}
