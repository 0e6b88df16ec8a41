//! PyTorch converter: module → ONNX → SavedModel → TFLite.

use std::path::Path;

use async_trait::async_trait;
use tracing::{info, warn};

use super::onnx::OnnxConverter;
use super::{FormatConverter, LoadedModel};
use crate::config::ConverterConfig;
use crate::conversion::quantization::QuantizationPlan;
use crate::conversion::scratch::{IntermediateArtifact, ScratchSpace};
use crate::conversion::toolchain::DynToolchain;
use crate::conversion::types::SourceFormat;
use crate::Result;

/// Converts pickled PyTorch modules by exporting them to ONNX and handing
/// the graph to [`OnnxConverter`].
///
/// The export traces the module with a synthetic input of shape
/// `[1, 3, 224, 224]`; models expecting another input cannot be exported.
pub struct PyTorchConverter {
    toolchain: DynToolchain,
    onnx: OnnxConverter,
}

impl PyTorchConverter {
    pub fn new(toolchain: DynToolchain) -> Self {
        Self {
            onnx: OnnxConverter::new(toolchain.clone()),
            toolchain,
        }
    }
}

#[async_trait]
impl FormatConverter for PyTorchConverter {
    fn format(&self) -> SourceFormat {
        SourceFormat::PyTorch
    }

    async fn load(&self, path: &Path, scratch: &ScratchSpace) -> Result<LoadedModel> {
        scratch.prepare()?;
        let onnx_file = IntermediateArtifact::claim(scratch.onnx_path())?;
        let export_shape = ConverterConfig::PYTORCH_EXPORT_INPUT_SHAPE;

        warn!(
            "Tracing PyTorch model with synthetic input {:?}; models with a different input shape will fail to export",
            export_shape
        );
        info!(
            "Exporting {} to ONNX (opset {})",
            path.display(),
            ConverterConfig::ONNX_OPSET_VERSION
        );
        self.toolchain
            .export_torch_to_onnx(
                path,
                onnx_file.path(),
                &export_shape,
                ConverterConfig::ONNX_OPSET_VERSION,
            )
            .await?;

        let model = self.onnx.load(onnx_file.path(), scratch).await?;
        Ok(model.with_intermediate(onnx_file))
    }

    async fn convert_to_embedded(
        &self,
        model: &LoadedModel,
        plan: &QuantizationPlan,
    ) -> Result<Vec<u8>> {
        self.onnx.convert_to_embedded(model, plan).await
    }
}
