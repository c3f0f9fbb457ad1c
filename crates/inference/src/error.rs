use crate::processing::pre::IngestError;
use axum::{
    Json,
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use schema::ErrorBody;
use std::io;
use thiserror::Error;

/// Everything that can go wrong while serving `POST /predict`.
#[derive(Error, Debug)]
pub enum PredictError {
    #[error("No file provided")]
    MissingInput,

    #[error("Failed to read upload")]
    Upload(#[from] MultipartError),

    #[error("Failed to decode image")]
    Decode(#[from] IngestError),

    #[error("Inference failed")]
    Inference(#[source] anyhow::Error),

    #[error("Failed to save JSON response")]
    Persistence(#[source] io::Error),
}

impl PredictError {
    pub fn status(&self) -> StatusCode {
        match self {
            PredictError::MissingInput | PredictError::Decode(_) => StatusCode::BAD_REQUEST,
            PredictError::Upload(e) => e.status(),
            PredictError::Inference(_) | PredictError::Persistence(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            PredictError::MissingInput | PredictError::Decode(_) => ErrorBody::new(self.to_string()),
            PredictError::Upload(e) => ErrorBody::with_details(self.to_string(), e.body_text()),
            PredictError::Inference(e) => ErrorBody::with_details(self.to_string(), format!("{e:#}")),
            PredictError::Persistence(e) => ErrorBody::with_details(self.to_string(), e.to_string()),
        }
    }
}

impl IntoResponse for PredictError {
    fn into_response(self) -> Response {
        let status = self.status();
        match &self {
            PredictError::MissingInput | PredictError::Decode(_) | PredictError::Upload(_) => {
                tracing::warn!(error = ?self, %status, "Rejected predict request");
            }
            PredictError::Inference(_) | PredictError::Persistence(_) => {
                tracing::error!(error = ?self, %status, "Predict request failed");
            }
        }
        (status, Json(self.body())).into_response()
    }
}
