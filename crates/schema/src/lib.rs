//! JSON wire types shared by the inference service and the upload gateway.

use serde::{Deserialize, Serialize};

/// A single decoded detection.
///
/// `bbox` is `[x, y, width, height]` in absolute pixels of the original
/// image, origin at the top-left corner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub label: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: [i32; 4],
}

/// Body of a successful `/predict` or `/detect` call, also the persisted artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub detections: Vec<Detection>,
}

impl DetectionResponse {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }
}

/// Error body returned by both services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}
