use crate::{
    config::Config,
    error::RelayError,
    relay::{IMAGE_FIELD, RelayResponse},
    staging::StagedUpload,
    state::AppState,
};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, State, multipart::MultipartRejection},
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn router(state: AppState, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/detect", post(detect))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(body_limit_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run(config: Config) -> anyhow::Result<()> {
    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let state = AppState::new(&config)?;
    let app = router(state.clone(), config.body_limit_bytes);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        inference_url = state.client.endpoint(),
        timeout_ms = config.relay_timeout_ms,
        "Gateway listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(common::shutdown_signal())
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}

struct Upload {
    filename: String,
    bytes: Bytes,
}

/// Only a file part counts: an `image` form value without a filename is skipped.
async fn read_image_field(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Option<Upload>, RelayError> {
    let Ok(mut multipart) = multipart else {
        return Ok(None);
    };

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field.bytes().await?;
        return Ok(Some(Upload { filename, bytes }));
    }

    Ok(None)
}

/// Stage the upload, forward it once, and hand back the upstream detections.
///
/// Dropping this future (client disconnect) cancels the outbound request and
/// removes the staged file.
async fn detect(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<RelayResponse>, RelayError> {
    state.metrics.record_request();

    let result = relay_upload(&state, multipart).await;
    if let Err(e) = &result {
        state.metrics.record_failure(e.status().as_u16());
    }
    result.map(Json)
}

async fn relay_upload(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<RelayResponse, RelayError> {
    let upload = read_image_field(multipart)
        .await?
        .ok_or(RelayError::MissingInput)?;

    let staged = StagedUpload::write(&state.upload_dir, &upload.filename, &upload.bytes)
        .await
        .map_err(RelayError::Staging)?;

    let response = state.client.forward(&staged).await?;
    tracing::info!(filename = staged.filename(), "Relayed detections");

    Ok(response)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
