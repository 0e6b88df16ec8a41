//! ONNX converter: ONNX graph → SavedModel → TFLite.

use std::path::Path;

use async_trait::async_trait;
use tracing::info;

use super::{read_input_shape, FormatConverter, LoadedModel};
use crate::conversion::quantization::QuantizationPlan;
use crate::conversion::scratch::{IntermediateArtifact, ScratchSpace};
use crate::conversion::toolchain::DynToolchain;
use crate::conversion::types::{ModelSource, SourceFormat};
use crate::Result;

/// Converts ONNX graphs by translating them into a SavedModel beside the
/// output path. The SavedModel directory lives as long as the loaded model.
pub struct OnnxConverter {
    toolchain: DynToolchain,
}

impl OnnxConverter {
    pub fn new(toolchain: DynToolchain) -> Self {
        Self { toolchain }
    }
}

#[async_trait]
impl FormatConverter for OnnxConverter {
    fn format(&self) -> SourceFormat {
        SourceFormat::Onnx
    }

    async fn load(&self, path: &Path, scratch: &ScratchSpace) -> Result<LoadedModel> {
        scratch.prepare()?;
        let saved_model = IntermediateArtifact::claim(scratch.saved_model_dir())?;

        info!(
            "Translating ONNX graph {} to SavedModel at {}",
            path.display(),
            saved_model.path().display()
        );
        self.toolchain
            .onnx_to_saved_model(path, saved_model.path())
            .await?;

        let source = ModelSource::SavedModel(saved_model.path().to_path_buf());
        let input_shape = read_input_shape(self.toolchain.as_ref(), &source).await;
        Ok(LoadedModel::new(source, input_shape).with_intermediate(saved_model))
    }

    async fn convert_to_embedded(
        &self,
        model: &LoadedModel,
        plan: &QuantizationPlan,
    ) -> Result<Vec<u8>> {
        self.toolchain.compile(model.source(), plan).await
    }
}
