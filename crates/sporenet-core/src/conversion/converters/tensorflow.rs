//! TensorFlow/Keras converter.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::info;

use super::{read_input_shape, FormatConverter, LoadedModel};
use crate::conversion::quantization::QuantizationPlan;
use crate::conversion::scratch::ScratchSpace;
use crate::conversion::toolchain::DynToolchain;
use crate::conversion::types::{ModelSource, SourceFormat};
use crate::error::{Result, SporeError};

/// Converts Keras model files and SavedModel directories.
pub struct TensorFlowConverter {
    toolchain: DynToolchain,
}

impl TensorFlowConverter {
    pub fn new(toolchain: DynToolchain) -> Self {
        Self { toolchain }
    }

    /// Decide how the model at `path` is read.
    ///
    /// - `.h5` / `.keras` file: a Keras model file
    /// - directory: a SavedModel
    /// - `.pb` file: the SavedModel directory containing it
    pub fn resolve_source(path: &Path) -> Result<ModelSource> {
        if path.is_dir() {
            return Ok(ModelSource::SavedModel(path.to_path_buf()));
        }

        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "h5" | "keras" => Ok(ModelSource::KerasFile(path.to_path_buf())),
            "pb" => {
                let dir = path
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| PathBuf::from("."));
                Ok(ModelSource::SavedModel(dir))
            }
            _ => Err(SporeError::UnsupportedFormat {
                format: SourceFormat::TensorFlow.to_string(),
                detail: format!(
                    "cannot read {}; expected a .h5/.keras file, a .pb file or a SavedModel directory",
                    path.display()
                ),
            }),
        }
    }
}

#[async_trait]
impl FormatConverter for TensorFlowConverter {
    fn format(&self) -> SourceFormat {
        SourceFormat::TensorFlow
    }

    async fn load(&self, path: &Path, _scratch: &ScratchSpace) -> Result<LoadedModel> {
        let source = Self::resolve_source(path)?;
        info!("Loading TensorFlow model {} as {}", path.display(), source.kind());
        let input_shape = read_input_shape(self.toolchain.as_ref(), &source).await;
        Ok(LoadedModel::new(source, input_shape))
    }

    async fn convert_to_embedded(
        &self,
        model: &LoadedModel,
        plan: &QuantizationPlan,
    ) -> Result<Vec<u8>> {
        self.toolchain.compile(model.source(), plan).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversion::converters::test_support::RecordingToolchain;
    use crate::conversion::quantization;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_resolve_keras_files() {
        for name in ["model.h5", "model.H5", "model.keras"] {
            let source = TensorFlowConverter::resolve_source(Path::new(name)).unwrap();
            assert_eq!(source, ModelSource::KerasFile(PathBuf::from(name)));
        }
    }

    #[test]
    fn test_resolve_saved_model() {
        let temp = TempDir::new().unwrap();
        assert_eq!(
            TensorFlowConverter::resolve_source(temp.path()).unwrap(),
            ModelSource::SavedModel(temp.path().to_path_buf())
        );

        let pb = temp.path().join("saved_model.pb");
        assert_eq!(
            TensorFlowConverter::resolve_source(&pb).unwrap(),
            ModelSource::SavedModel(temp.path().to_path_buf())
        );
        assert_eq!(
            TensorFlowConverter::resolve_source(Path::new("saved_model.pb")).unwrap(),
            ModelSource::SavedModel(PathBuf::from("."))
        );
    }

    #[test]
    fn test_resolve_rejects_other_files() {
        let err = TensorFlowConverter::resolve_source(Path::new("model.tflite")).unwrap_err();
        assert!(matches!(err, SporeError::UnsupportedFormat { .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[tokio::test]
    async fn test_load_probes_then_compiles_with_plan() {
        let toolchain = Arc::new(RecordingToolchain::with_shape(&[1, 28, 28, 1]));
        let converter = TensorFlowConverter::new(toolchain.clone());
        let scratch = ScratchSpace::beside(Path::new("out.tflite"));

        let model = converter.load(Path::new("mnist.h5"), &scratch).await.unwrap();
        assert_eq!(model.input_shape(), Some(&[1, 28, 28, 1][..]));
        assert!(model.intermediate_paths().is_empty());

        let plan = quantization::plan(model.input_shape(), true);
        converter.convert_to_embedded(&model, &plan).await.unwrap();
        assert_eq!(toolchain.calls(), vec!["probe:keras", "compile:keras:int8"]);
    }

    #[tokio::test]
    async fn test_unreadable_shape_is_left_unknown() {
        let toolchain = Arc::new(RecordingToolchain {
            shape_unreadable: true,
            ..RecordingToolchain::with_shape(&[1, 28, 28, 1])
        });
        let converter = TensorFlowConverter::new(toolchain.clone());
        let scratch = ScratchSpace::beside(Path::new("out.tflite"));

        let model = converter.load(Path::new("subclassed.keras"), &scratch).await.unwrap();
        assert_eq!(model.input_shape(), None);

        let plan = quantization::plan(model.input_shape(), true);
        converter.convert_to_embedded(&model, &plan).await.unwrap();
        assert_eq!(toolchain.calls(), vec!["probe:keras", "compile:keras:default"]);
    }
}
