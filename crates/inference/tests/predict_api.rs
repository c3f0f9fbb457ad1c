use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use image::{ImageFormat, Rgb, RgbImage};
use inference::{
    AppState, InferenceBackend, InferenceConfig, InferenceOutput, LabelVocabulary, service,
};
use ndarray::{Array, Array2, IxDyn};
use std::io::Cursor;
use std::path::Path;
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use tempfile::tempdir;
use tower::ServiceExt; // for `oneshot`

const BOUNDARY: &str = "----predict-test-boundary";

/// Backend that replays a canned output and counts forward passes.
struct StubBackend {
    output: InferenceOutput,
    calls: Arc<AtomicUsize>,
}

impl InferenceBackend for StubBackend {
    fn load_model(_path: &str) -> anyhow::Result<Self> {
        anyhow::bail!("stub backend has no model file")
    }

    fn infer(&mut self, input: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        assert_eq!(input.shape(), &[1, 3, 416, 416]);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

/// One darknet-style row: box, objectness, class scores.
fn yolo_row(cxcywh: [f32; 4], scores: &[f32]) -> Vec<f32> {
    let mut row = cxcywh.to_vec();
    row.push(1.0);
    row.extend_from_slice(scores);
    row
}

fn single_head(rows: Vec<Vec<f32>>) -> InferenceOutput {
    let cols = rows[0].len();
    let data: Vec<f32> = rows.into_iter().flatten().collect();
    InferenceOutput {
        outputs: vec![Array2::from_shape_vec((data.len() / cols, cols), data).unwrap()],
    }
}

fn person_output() -> InferenceOutput {
    single_head(vec![
        yolo_row([0.5, 0.5, 0.2, 0.2], &[0.93, 0.01, 0.0]),
        yolo_row([0.1, 0.1, 0.1, 0.1], &[0.2, 0.1, 0.0]),
    ])
}

fn test_app(output: InferenceOutput, output_dir: &Path) -> (Router, Arc<AtomicUsize>) {
    let limit = InferenceConfig::test_default().body_limit_bytes;
    test_app_with_limit(output, output_dir, limit)
}

fn test_app_with_limit(
    output: InferenceOutput,
    output_dir: &Path,
    body_limit_bytes: usize,
) -> (Router, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let backend = StubBackend {
        output,
        calls: Arc::clone(&calls),
    };
    let labels: LabelVocabulary = ["person", "bicycle", "car"].into_iter().collect();

    let mut config = InferenceConfig::test_default();
    config.output_dir = output_dir.to_path_buf();
    config.body_limit_bytes = body_limit_bytes;

    let state = AppState::new(backend, labels, &config);
    (service::router(state, config.body_limit_bytes), calls)
}

fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb([120, 60, 30]));
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

fn multipart_request(field: &str, filename: &str, payload: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n\
         Content-Type: application/octet-stream\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(payload);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// An `image` part sent as a plain form value, without a filename.
fn text_field_request(field: &str, value: &str) -> Request<Body> {
    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"{field}\"\r\n\r\n\
         {value}\r\n--{BOUNDARY}--\r\n"
    );

    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_predict_returns_detections_and_persists_them() {
    let dir = tempdir().unwrap();
    let (app, calls) = test_app(person_output(), dir.path());

    let (status, body) = send(app, multipart_request("image", "street.png", &png_bytes(200, 100))).await;

    // 200x100 image: cx=100, cy=50, w=40, h=20 -> x=80, y=40
    let expected = r#"{"detections":[{"class":"person","confidence":0.93,"box":[80,40,40,20]}]}"#;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, expected);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let artifact = std::fs::read_to_string(dir.path().join("street_detections.json")).unwrap();
    assert_eq!(artifact, expected);
}

#[tokio::test]
async fn test_predict_with_nothing_above_threshold_returns_empty_list() {
    let dir = tempdir().unwrap();
    let output = single_head(vec![yolo_row([0.5, 0.5, 0.2, 0.2], &[0.5, 0.3, 0.1])]);
    let (app, _) = test_app(output, dir.path());

    let (status, body) = send(app, multipart_request("image", "empty.jpg", &png_bytes(64, 64))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"detections":[]}"#);
    assert!(dir.path().join("empty_detections.json").exists());
}

#[tokio::test]
async fn test_predict_without_image_field_is_bad_request() {
    let dir = tempdir().unwrap();
    let (app, calls) = test_app(person_output(), dir.path());

    let (status, body) = send(app, multipart_request("photo", "a.png", &png_bytes(8, 8))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"No file provided"}"#);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_predict_with_image_as_text_field_is_bad_request() {
    let dir = tempdir().unwrap();
    let (app, calls) = test_app(person_output(), dir.path());

    let (status, body) = send(app, text_field_request("image", "hello")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"No file provided"}"#);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_predict_with_empty_filename_uses_default_name() {
    let dir = tempdir().unwrap();
    let (app, _) = test_app(person_output(), dir.path());

    let (status, _) = send(app, multipart_request("image", "", &png_bytes(32, 32))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(dir.path().join("image_detections.json").exists());
}

#[tokio::test]
async fn test_predict_over_body_limit_is_payload_too_large() {
    let dir = tempdir().unwrap();
    let (app, calls) = test_app_with_limit(person_output(), dir.path(), 1024);

    let (status, body) = send(app, multipart_request("image", "big.png", &[7u8; 4096])).await;

    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "Failed to read upload");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(!dir.path().join("big_detections.json").exists());
}

#[tokio::test]
async fn test_predict_with_non_multipart_body_is_bad_request() {
    let dir = tempdir().unwrap();
    let (app, calls) = test_app(person_output(), dir.path());

    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header("content-type", "application/json")
        .body(Body::from("{}"))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, r#"{"error":"No file provided"}"#);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_predict_with_undecodable_image_is_bad_request() {
    let dir = tempdir().unwrap();
    let (app, calls) = test_app(person_output(), dir.path());

    let (status, body) = send(
        app,
        multipart_request("image", "broken.jpg", b"\x00\x01 this is not an image"),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "Failed to decode image");
    assert_eq!(calls.load(Ordering::SeqCst), 0, "no inference attempted");
    assert!(
        !dir.path().join("broken_detections.json").exists(),
        "no persistence attempted"
    );
}

#[tokio::test]
async fn test_predict_with_empty_file_is_bad_request() {
    let dir = tempdir().unwrap();
    let (app, _) = test_app(person_output(), dir.path());

    let (status, body) = send(app, multipart_request("image", "empty.png", b"")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("\"error\""));
}

#[tokio::test]
async fn test_predict_persistence_failure_is_server_error() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("output-is-a-file");
    std::fs::write(&blocker, b"").unwrap();
    let (app, calls) = test_app(person_output(), &blocker);

    let (status, body) = send(app, multipart_request("image", "street.png", &png_bytes(32, 32))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(calls.load(Ordering::SeqCst), 1, "detection itself ran");
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "Failed to save JSON response");
    assert!(json["details"].as_str().is_some_and(|d| !d.is_empty()));
    assert!(json.get("detections").is_none());
}

#[tokio::test]
async fn test_predict_with_vocabulary_mismatch_is_server_error() {
    let dir = tempdir().unwrap();
    let output = single_head(vec![yolo_row([0.5, 0.5, 0.2, 0.2], &[0.0, 0.0, 0.0, 0.99])]);
    let (app, _) = test_app(output, dir.path());

    let (status, body) = send(app, multipart_request("image", "x.png", &png_bytes(16, 16))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let json: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "Inference failed");
    assert!(json["details"].as_str().unwrap().contains("vocabulary"));
    assert!(!dir.path().join("x_detections.json").exists());
}

#[tokio::test]
async fn test_health() {
    let dir = tempdir().unwrap();
    let (app, _) = test_app(person_output(), dir.path());

    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"status":"ok"}"#);
}
