use crate::{
    backend::InferenceBackend,
    config::InferenceConfig,
    error::PredictError,
    labels::LabelVocabulary,
    metrics::PredictMetrics,
    processing::{
        post::PostProcessor,
        pre::{PreProcessor, decode_image},
    },
    store::ResultStore,
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    routing::{get, post},
};
use schema::DetectionResponse;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tower_http::trace::TraceLayer;

/// Multipart field carrying the image, on both services.
pub const IMAGE_FIELD: &str = "image";
const DEFAULT_FILENAME: &str = "image";

/// Read-only per-process state handed to every request.
pub struct AppState<B> {
    backend: Arc<Mutex<B>>,
    labels: Arc<LabelVocabulary>,
    preprocessor: PreProcessor,
    postprocessor: PostProcessor,
    store: ResultStore,
    metrics: PredictMetrics,
}

impl<B> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            labels: Arc::clone(&self.labels),
            preprocessor: self.preprocessor,
            postprocessor: self.postprocessor,
            store: self.store.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

impl<B: InferenceBackend + Send + 'static> AppState<B> {
    pub fn new(backend: B, labels: LabelVocabulary, config: &InferenceConfig) -> Self {
        Self {
            backend: Arc::new(Mutex::new(backend)),
            labels: Arc::new(labels),
            preprocessor: PreProcessor::new(config.input_size),
            postprocessor: PostProcessor::new(config.confidence_threshold, config.score_offset),
            store: ResultStore::new(&config.output_dir),
            metrics: PredictMetrics::new("inference"),
        }
    }

    /// Decode, run the model and decode its output on the blocking pool.
    async fn detect(&self, bytes: Bytes) -> Result<DetectionResponse, PredictError> {
        let state = self.clone();
        tokio::task::spawn_blocking(move || state.run_pipeline(&bytes))
            .await
            .map_err(|e| {
                PredictError::Inference(anyhow::Error::new(e).context("inference task aborted"))
            })?
    }

    fn run_pipeline(&self, bytes: &[u8]) -> Result<DetectionResponse, PredictError> {
        let image = decode_image(bytes)?;
        let input = self.preprocessor.build_input(&image);

        let output = {
            let mut backend = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
            backend.infer(&input).map_err(PredictError::Inference)?
        };

        let detections = self
            .postprocessor
            .decode(&output.outputs, image.width, image.height, &self.labels)
            .map_err(|e| {
                PredictError::Inference(anyhow::Error::new(e).context("decoding model output"))
            })?;

        Ok(DetectionResponse::new(detections))
    }
}

pub struct InferenceService<B> {
    state: AppState<B>,
    config: InferenceConfig,
}

impl<B: InferenceBackend + Send + 'static> InferenceService<B> {
    pub fn new(backend: B, labels: LabelVocabulary, config: InferenceConfig) -> Self {
        let state = AppState::new(backend, labels, &config);
        Self { state, config }
    }

    pub fn router(&self) -> Router {
        router(self.state.clone(), self.config.body_limit_bytes)
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.config.output_dir).await?;

        let listener = tokio::net::TcpListener::bind(&self.config.listen_addr).await?;
        tracing::info!(
            addr = %listener.local_addr()?,
            output_dir = %self.config.output_dir.display(),
            labels = self.state.labels.len(),
            "Inference service listening"
        );

        axum::serve(listener, self.router())
            .with_graceful_shutdown(common::shutdown_signal())
            .await?;

        tracing::info!("Inference service stopped");
        Ok(())
    }
}

pub fn router<B: InferenceBackend + Send + 'static>(
    state: AppState<B>,
    body_limit_bytes: usize,
) -> Router {
    Router::new()
        .route("/predict", post(predict::<B>))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

struct Upload {
    filename: String,
    bytes: Bytes,
}

/// Finds the `image` file part, if any. Other fields, and an `image` part
/// sent as a plain form value without a filename, are skipped.
async fn read_image_field(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Option<Upload>, PredictError> {
    let Ok(mut multipart) = multipart else {
        return Ok(None);
    };

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name() else {
            continue;
        };
        let filename = match filename {
            "" => DEFAULT_FILENAME,
            name => name,
        }
        .to_string();
        let bytes = field.bytes().await?;
        return Ok(Some(Upload { filename, bytes }));
    }

    Ok(None)
}

async fn predict<B: InferenceBackend + Send + 'static>(
    State(state): State<AppState<B>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectionResponse>, PredictError> {
    let start = Instant::now();
    let result = serve_predict(&state, multipart).await;

    let (outcome, count) = match &result {
        Ok(response) => ("ok", response.len()),
        Err(e) if e.status().is_client_error() => ("client_error", 0),
        Err(_) => ("server_error", 0),
    };
    state
        .metrics
        .record(outcome, start.elapsed().as_secs_f64(), count);

    result.map(Json)
}

async fn serve_predict<B: InferenceBackend + Send + 'static>(
    state: &AppState<B>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<DetectionResponse, PredictError> {
    let upload = read_image_field(multipart)
        .await?
        .ok_or(PredictError::MissingInput)?;

    tracing::debug!(
        filename = %upload.filename,
        bytes = upload.bytes.len(),
        "Received image"
    );

    let response = state.detect(upload.bytes).await?;

    let path = state
        .store
        .persist(&upload.filename, &response)
        .await
        .map_err(PredictError::Persistence)?;

    tracing::info!(
        filename = %upload.filename,
        detections = response.len(),
        artifact = %path.display(),
        "Detection complete"
    );

    Ok(response)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
