//! Format-specific converters.
//!
//! Each source format has one converter. A converter first *loads* the model
//! (resolving the compiler input, staging intermediates and probing the input
//! shape) and then *converts* the loaded model with a quantization plan. The
//! conversion step may run twice when the fallback controller degrades.

mod onnx;
mod pytorch;
mod tensorflow;

use std::path::Path;

use async_trait::async_trait;
use tracing::warn;

use super::quantization::QuantizationPlan;
use super::scratch::{IntermediateArtifact, ScratchSpace};
use super::toolchain::Toolchain;
use super::types::{ModelSource, SourceFormat};
use crate::Result;

pub use onnx::OnnxConverter;
pub use pytorch::PyTorchConverter;
pub use tensorflow::TensorFlowConverter;

/// A model ready for compilation.
///
/// Owns the guards of any intermediate artifacts staged while loading;
/// dropping the model deletes them.
#[derive(Debug)]
pub struct LoadedModel {
    source: ModelSource,
    input_shape: Option<Vec<i64>>,
    intermediates: Vec<IntermediateArtifact>,
}

impl LoadedModel {
    pub fn new(source: ModelSource, input_shape: Option<Vec<i64>>) -> Self {
        Self {
            source,
            input_shape,
            intermediates: Vec::new(),
        }
    }

    /// Attach an intermediate whose lifetime is tied to this model.
    pub fn with_intermediate(mut self, artifact: IntermediateArtifact) -> Self {
        self.intermediates.push(artifact);
        self
    }

    pub fn source(&self) -> &ModelSource {
        &self.source
    }

    /// Declared input shape, batch dimension included.
    pub fn input_shape(&self) -> Option<&[i64]> {
        self.input_shape.as_deref()
    }

    pub fn intermediate_paths(&self) -> Vec<&Path> {
        self.intermediates.iter().map(IntermediateArtifact::path).collect()
    }
}

/// Converts one source format into a TFLite binary.
#[async_trait]
pub trait FormatConverter: Send + Sync {
    fn format(&self) -> SourceFormat;

    /// Prepare the model at `path` for compilation.
    ///
    /// Intermediates are staged in `scratch` and owned by the returned model.
    async fn load(&self, path: &Path, scratch: &ScratchSpace) -> Result<LoadedModel>;

    /// Compile a loaded model with `plan` applied.
    async fn convert_to_embedded(&self, model: &LoadedModel, plan: &QuantizationPlan)
        -> Result<Vec<u8>>;
}

/// Declared input shape of `source`, or `None` when it cannot be read.
///
/// Lookup failures are logged; the model still converts without full
/// integer quantization.
pub(crate) async fn read_input_shape(
    toolchain: &dyn Toolchain,
    source: &ModelSource,
) -> Option<Vec<i64>> {
    match toolchain.probe_input_shape(source).await {
        Ok(shape) => shape,
        Err(e) => {
            warn!(
                "Could not read the input shape of {}: {}; full integer quantization is unavailable",
                source.path().display(),
                e
            );
            None
        }
    }
}
