use ndarray::{Array, Array2, ArrayD, Axis, Ix2, IxDyn};

#[cfg(feature = "ort-backend")]
pub mod ort;

pub trait InferenceBackend {
    fn load_model(path: &str) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Run one forward pass over an NCHW input tensor.
    fn infer(&mut self, input: &Array<f32, IxDyn>) -> anyhow::Result<InferenceOutput>;
}

/// Raw model output: one 2-D array per output head, one candidate per row.
#[derive(Debug, Clone, Default)]
pub struct InferenceOutput {
    pub outputs: Vec<Array2<f32>>,
}

/// Normalizes one output tensor into a `[candidates, attributes]` matrix.
///
/// Accepts `[rows, attrs]` or `[1, rows, attrs]`. With `transpose` set the
/// tensor is read as `[attrs, rows]` instead, as some exporters emit it.
pub fn into_rows(output: ArrayD<f32>, transpose: bool) -> anyhow::Result<Array2<f32>> {
    let shape = output.shape().to_vec();
    let matrix = match shape.as_slice() {
        [_, _] => output.into_dimensionality::<Ix2>()?,
        [1, _, _] => output
            .index_axis_move(Axis(0), 0)
            .into_dimensionality::<Ix2>()?,
        _ => anyhow::bail!("unsupported output tensor shape {:?}", shape),
    };

    if transpose {
        Ok(matrix.reversed_axes().as_standard_layout().into_owned())
    } else {
        Ok(matrix)
    }
}
