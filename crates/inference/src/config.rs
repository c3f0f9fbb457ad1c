use common::env_or;
use std::env;
use std::path::PathBuf;

pub use common::Environment;

pub const DEFAULT_INPUT_SIZE: (u32, u32) = (416, 416);
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;
/// Darknet YOLO rows are `cx, cy, w, h, objectness, class scores...`.
pub const DEFAULT_SCORE_OFFSET: usize = 5;
pub const DEFAULT_BODY_LIMIT_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct InferenceConfig {
    pub environment: Environment,
    pub listen_addr: String,
    pub model_path: String,
    pub labels_path: PathBuf,
    pub output_dir: PathBuf,
    pub input_size: (u32, u32),
    pub confidence_threshold: f32,
    pub score_offset: usize,
    pub transpose_output: bool,
    pub body_limit_bytes: usize,
    pub otel_endpoint: Option<String>,
}

impl InferenceConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        let environment = Environment::from_env();

        let listen_addr =
            env::var("INFERENCE_ADDR").unwrap_or_else(|_| "0.0.0.0:5001".to_string());

        let model_path =
            env::var("MODEL_PATH").unwrap_or_else(|_| "models/yolov3-tiny.onnx".to_string());

        let labels_path = env::var("LABELS_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("models/coco.names"));

        let output_dir = env::var("OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("output"));

        let input_width = env_or("INPUT_WIDTH", DEFAULT_INPUT_SIZE.0);
        let input_height = env_or("INPUT_HEIGHT", DEFAULT_INPUT_SIZE.1);
        if input_width == 0 || input_height == 0 {
            anyhow::bail!("INPUT_WIDTH and INPUT_HEIGHT must be non-zero");
        }

        let confidence_threshold = env_or("CONFIDENCE_THRESHOLD", DEFAULT_CONFIDENCE_THRESHOLD);
        if !(0.0..1.0).contains(&confidence_threshold) {
            anyhow::bail!(
                "CONFIDENCE_THRESHOLD must be in [0, 1), got {}",
                confidence_threshold
            );
        }

        let score_offset = env_or("SCORE_OFFSET", DEFAULT_SCORE_OFFSET);
        if score_offset < 4 {
            anyhow::bail!("SCORE_OFFSET must leave room for the 4 box columns");
        }

        Ok(Self {
            environment,
            listen_addr,
            model_path,
            labels_path,
            output_dir,
            input_size: (input_width, input_height),
            confidence_threshold,
            score_offset,
            transpose_output: env_or("TRANSPOSE_OUTPUT", false),
            body_limit_bytes: env_or("BODY_LIMIT_BYTES", DEFAULT_BODY_LIMIT_BYTES),
            otel_endpoint: env::var("OTEL_ENDPOINT").ok().filter(|s| !s.is_empty()),
        })
    }

    /// Create default configuration for testing
    pub fn test_default() -> Self {
        Self {
            environment: Environment::Development,
            listen_addr: "127.0.0.1:0".to_string(),
            model_path: "/models/model.onnx".to_string(),
            labels_path: PathBuf::from("/models/coco.names"),
            output_dir: PathBuf::from("output"),
            input_size: DEFAULT_INPUT_SIZE,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            score_offset: DEFAULT_SCORE_OFFSET,
            transpose_output: false,
            body_limit_bytes: DEFAULT_BODY_LIMIT_BYTES,
            otel_endpoint: None,
        }
    }
}
