use crate::{error::RelayError, staging::StagedUpload};
use reqwest::{
    Body, Client, StatusCode,
    multipart::{Form, Part},
};
use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use std::time::{Duration, Instant};
use tokio_util::io::ReaderStream;

/// Multipart field the inference service reads the image from.
pub const IMAGE_FIELD: &str = "image";

/// `{"detections": ...}` as sent back to the client.
///
/// The detections are kept as raw JSON so the relay passes them through
/// without re-encoding.
#[derive(Debug, Serialize)]
pub struct RelayResponse {
    pub detections: Box<RawValue>,
}

#[derive(Deserialize)]
struct UpstreamEnvelope {
    #[serde(default)]
    detections: Option<Box<RawValue>>,
}

/// Forwards staged uploads to the inference service: one attempt, bounded by
/// the client timeout.
#[derive(Debug, Clone)]
pub struct InferenceClient {
    client: Client,
    endpoint: String,
}

impl InferenceClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    #[tracing::instrument(skip_all, fields(endpoint = %self.endpoint, filename = staged.filename()))]
    pub async fn forward(&self, staged: &StagedUpload) -> Result<RelayResponse, RelayError> {
        let file = tokio::fs::File::open(staged.path())
            .await
            .map_err(RelayError::Staging)?;
        let len = file.metadata().await.map_err(RelayError::Staging)?.len();

        let part = Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), len)
            .file_name(staged.filename().to_string());
        let form = Form::new().part(IMAGE_FIELD, part);

        let start = Instant::now();
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(RelayError::from_transport)?;

        let status = response.status();
        tracing::debug!(
            %status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Inference service responded"
        );

        if status != StatusCode::OK {
            return Err(RelayError::UpstreamStatus(status));
        }

        let body = response.bytes().await.map_err(RelayError::from_transport)?;
        parse_upstream(&body)
    }
}

/// Pulls `detections` out of a successful upstream body, defaulting to `[]`.
pub fn parse_upstream(body: &[u8]) -> Result<RelayResponse, RelayError> {
    let envelope: UpstreamEnvelope =
        serde_json::from_slice(body).map_err(RelayError::InvalidUpstreamBody)?;

    let detections = match envelope.detections {
        Some(raw) => raw,
        None => RawValue::from_string("[]".to_string()).map_err(RelayError::InvalidUpstreamBody)?,
    };

    Ok(RelayResponse { detections })
}
