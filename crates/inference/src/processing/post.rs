use crate::config::{DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_SCORE_OFFSET};
use crate::labels::LabelVocabulary;
use ndarray::{Array2, ArrayView1, s};
use schema::Detection;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum DecodeTensorError {
    #[error("output {output} row {row} has {len} columns, expected more than {score_offset}")]
    RowTooShort {
        output: usize,
        row: usize,
        len: usize,
        score_offset: usize,
    },

    #[error("class index {class_id} is outside the {vocabulary_len}-label vocabulary")]
    ClassOutOfRange {
        class_id: usize,
        vocabulary_len: usize,
    },
}

/// Turns raw detector rows into labelled pixel-space detections.
///
/// Each row is `cx, cy, w, h` (normalized to the image size) followed, from
/// `score_offset` on, by one score per class. Stateless: the same inputs
/// always produce the same detections.
#[derive(Debug, Clone, Copy)]
pub struct PostProcessor {
    pub confidence_threshold: f32,
    pub score_offset: usize,
}

impl Default for PostProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD, DEFAULT_SCORE_OFFSET)
    }
}

impl PostProcessor {
    pub fn new(confidence_threshold: f32, score_offset: usize) -> Self {
        Self {
            confidence_threshold,
            score_offset,
        }
    }

    /// Decode every row of every output, in scan order.
    ///
    /// Rows whose best class score is not strictly above the threshold are
    /// skipped. Overlapping boxes are all kept; no suppression is applied.
    #[tracing::instrument(skip(self, outputs, labels))]
    pub fn decode(
        &self,
        outputs: &[Array2<f32>],
        image_width: u32,
        image_height: u32,
        labels: &LabelVocabulary,
    ) -> Result<Vec<Detection>, DecodeTensorError> {
        let mut detections = Vec::new();

        for (output_idx, output) in outputs.iter().enumerate() {
            for (row_idx, row) in output.rows().into_iter().enumerate() {
                if row.len() <= self.score_offset {
                    return Err(DecodeTensorError::RowTooShort {
                        output: output_idx,
                        row: row_idx,
                        len: row.len(),
                        score_offset: self.score_offset,
                    });
                }

                let (class_id, confidence) = best_class(row.slice(s![self.score_offset..]));
                if confidence <= self.confidence_threshold {
                    continue;
                }

                let label = labels
                    .get(class_id)
                    .ok_or(DecodeTensorError::ClassOutOfRange {
                        class_id,
                        vocabulary_len: labels.len(),
                    })?;

                detections.push(Detection {
                    label: label.to_string(),
                    confidence,
                    bbox: to_pixel_box(
                        [row[0], row[1], row[2], row[3]],
                        image_width,
                        image_height,
                    ),
                });
            }
        }

        tracing::debug!(count = detections.len(), "Decoded detections");
        Ok(detections)
    }
}

/// Argmax over class scores. The first maximum wins on ties.
#[inline]
fn best_class(scores: ArrayView1<f32>) -> (usize, f32) {
    let mut best = (0usize, f32::NEG_INFINITY);
    for (idx, &score) in scores.iter().enumerate() {
        if score > best.1 {
            best = (idx, score);
        }
    }
    best
}

/// Normalized `cx, cy, w, h` to pixel `[x, y, w, h]` with a top-left origin.
///
/// Each scaled value is truncated toward zero before the corner is derived,
/// and the corner is truncated again.
#[inline]
fn to_pixel_box(cxcywh: [f32; 4], image_width: u32, image_height: u32) -> [i32; 4] {
    let (width, height) = (image_width as f32, image_height as f32);
    let cx = (cxcywh[0] * width) as i32;
    let cy = (cxcywh[1] * height) as i32;
    let w = (cxcywh[2] * width) as i32;
    let h = (cxcywh[3] * height) as i32;

    let x = (cx as f32 - w as f32 / 2.0) as i32;
    let y = (cy as f32 - h as f32 / 2.0) as i32;
    [x, y, w, h]
}
