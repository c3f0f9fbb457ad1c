use super::{InferenceBackend, InferenceOutput, into_rows};
use ndarray::{Array, IxDyn};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};

pub struct OrtBackend {
    session: Session,
    transpose_output: bool,
}

impl OrtBackend {
    /// Load an ONNX detection model on the CPU execution provider.
    pub fn load_model_with_options(path: &str, transpose_output: bool) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(path)?;

        tracing::info!(path, transpose_output, "Model loaded");
        Ok(Self {
            session,
            transpose_output,
        })
    }
}

impl InferenceBackend for OrtBackend {
    fn load_model(path: &str) -> anyhow::Result<Self> {
        Self::load_model_with_options(path, false)
    }

    fn infer(&mut self, input: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput> {
        let outputs = self
            .session
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut rows = Vec::with_capacity(outputs.len());
        for (name, value) in outputs.iter() {
            let array = value.try_extract_array::<f32>()?.into_owned();
            tracing::trace!(output = name, shape = ?array.shape(), "Model output");
            rows.push(into_rows(array, self.transpose_output)?);
        }

        Ok(InferenceOutput { outputs: rows })
    }
}
