//! Types for model conversion requests, plans and results.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::artifact::{ArtifactInspector, TensorSignature};
use crate::error::{Result, SporeError};

/// Source ecosystem of a trained model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Keras `.h5`/`.keras` files and SavedModel directories.
    TensorFlow,
    /// Pickled `torch.nn.Module` files, exported through ONNX.
    PyTorch,
    /// ONNX graphs, translated through a SavedModel.
    Onnx,
}

impl SourceFormat {
    pub const ALL: [SourceFormat; 3] = [
        SourceFormat::TensorFlow,
        SourceFormat::PyTorch,
        SourceFormat::Onnx,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceFormat::TensorFlow => "tensorflow",
            SourceFormat::PyTorch => "pytorch",
            SourceFormat::Onnx => "onnx",
        }
    }

    /// External dependencies the converter for this format needs.
    pub fn required_dependencies(&self) -> &'static [Dependency] {
        match self {
            SourceFormat::TensorFlow => &[Dependency::TensorFlow],
            SourceFormat::PyTorch => &[Dependency::TensorFlow, Dependency::Torch, Dependency::Onnx],
            SourceFormat::Onnx => &[Dependency::TensorFlow, Dependency::Onnx],
        }
    }
}

impl FromStr for SourceFormat {
    type Err = SporeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "tensorflow" | "tf" | "keras" => Ok(SourceFormat::TensorFlow),
            "pytorch" | "torch" => Ok(SourceFormat::PyTorch),
            "onnx" => Ok(SourceFormat::Onnx),
            _ => Err(SporeError::UnsupportedFormat {
                format: s.to_string(),
                detail: "expected one of: tensorflow, pytorch, onnx".to_string(),
            }),
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An external Python package a converter relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dependency {
    TensorFlow,
    Torch,
    /// `onnx` together with `onnx2tf`.
    Onnx,
}

impl Dependency {
    pub const ALL: [Dependency; 3] = [Dependency::TensorFlow, Dependency::Torch, Dependency::Onnx];

    /// Python modules that must import for this dependency to count as present.
    pub fn python_modules(&self) -> &'static [&'static str] {
        match self {
            Dependency::TensorFlow => &["tensorflow"],
            Dependency::Torch => &["torch"],
            Dependency::Onnx => &["onnx", "onnx2tf"],
        }
    }

    /// pip install hint shown when the dependency is missing.
    pub fn install_hint(&self) -> &'static str {
        match self {
            Dependency::TensorFlow => "pip install tensorflow",
            Dependency::Torch => "pip install torch torchvision",
            Dependency::Onnx => "pip install onnx onnx2tf",
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Dependency::TensorFlow => "TensorFlow",
            Dependency::Torch => "PyTorch",
            Dependency::Onnx => "ONNX",
        })
    }
}

/// Request to convert one model into an embedded-inference binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConversionRequest {
    pub source_path: PathBuf,
    pub source_format: SourceFormat,
    pub output_path: PathBuf,
    #[serde(default = "default_quantize")]
    pub quantize: bool,
}

fn default_quantize() -> bool {
    true
}

impl ConversionRequest {
    pub fn new(
        source_path: impl Into<PathBuf>,
        source_format: SourceFormat,
        output_path: impl Into<PathBuf>,
        quantize: bool,
    ) -> Self {
        Self {
            source_path: source_path.into(),
            source_format,
            output_path: output_path.into(),
            quantize,
        }
    }

    /// Build a request from a user-supplied format name.
    pub fn parse(
        source_path: impl Into<PathBuf>,
        source_format: &str,
        output_path: impl Into<PathBuf>,
        quantize: bool,
    ) -> Result<Self> {
        Ok(Self::new(
            source_path,
            source_format.parse()?,
            output_path,
            quantize,
        ))
    }
}

/// Optimization applied by the converter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantizationMode {
    /// Plain float conversion.
    None,
    /// Dynamic-range weight quantization; no calibration data needed.
    DefaultOptimize,
    /// Full integer quantization calibrated with a representative dataset.
    Integer8Bit,
}

impl QuantizationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuantizationMode::None => "none",
            QuantizationMode::DefaultOptimize => "default",
            QuantizationMode::Integer8Bit => "int8",
        }
    }
}

impl fmt::Display for QuantizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compiler input prepared by a converter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "path", rename_all = "snake_case")]
pub enum ModelSource {
    /// A single Keras model file.
    KerasFile(PathBuf),
    /// A SavedModel directory.
    SavedModel(PathBuf),
}

impl ModelSource {
    pub fn path(&self) -> &Path {
        match self {
            ModelSource::KerasFile(path) | ModelSource::SavedModel(path) => path,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ModelSource::KerasFile(_) => "keras",
            ModelSource::SavedModel(_) => "saved_model",
        }
    }
}

/// A successfully converted and inspected embedded-inference binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    #[serde(skip)]
    pub binary: Vec<u8>,
    pub size_bytes: usize,
    pub input_signature: TensorSignature,
    pub output_signature: TensorSignature,
    /// Optimization that actually produced `binary`.
    pub applied_mode: QuantizationMode,
    /// Number of converter invocations (1, or 2 after a fallback).
    pub attempts: u32,
}

impl ConversionResult {
    /// Inspect `binary` and build the result from its declared tensors.
    pub fn from_binary(binary: Vec<u8>, applied_mode: QuantizationMode, attempts: u32) -> Result<Self> {
        let signatures = ArtifactInspector::inspect(&binary)?;
        Ok(Self {
            size_bytes: binary.len(),
            binary,
            input_signature: signatures.input,
            output_signature: signatures.output,
            applied_mode,
            attempts,
        })
    }

    /// Whether conversion had to fall back to an unquantized plan.
    pub fn was_degraded(&self) -> bool {
        self.attempts > 1
    }

    /// Human-readable multi-line summary of the artifact.
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!(
                "Size: {} bytes ({:.1} KB)",
                self.size_bytes,
                self.size_bytes as f64 / 1024.0
            ),
            format!(
                "Input shape: {:?} ({})",
                self.input_signature.shape,
                self.input_signature.describe_elements()
            ),
            format!(
                "Output shape: {:?} ({})",
                self.output_signature.shape,
                self.output_signature.describe_elements()
            ),
            format!("Input type: {}", self.input_signature.element_type),
            format!("Output type: {}", self.output_signature.element_type),
            format!("Quantization: {}", self.applied_mode),
        ];
        if self.was_degraded() {
            lines.push("Note: quantization failed, binary was converted without it".to_string());
        }
        lines.join("\n")
    }
}

/// Final outcome of a conversion request.
#[derive(Debug)]
pub enum ConversionOutcome {
    Success(ConversionResult),
    Failure(SporeError),
}

impl ConversionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConversionOutcome::Success(_))
    }

    pub fn into_result(self) -> Result<ConversionResult> {
        self.into()
    }
}

impl From<Result<ConversionResult>> for ConversionOutcome {
    fn from(result: Result<ConversionResult>) -> Self {
        match result {
            Ok(result) => ConversionOutcome::Success(result),
            Err(err) => ConversionOutcome::Failure(err),
        }
    }
}

impl From<ConversionOutcome> for Result<ConversionResult> {
    fn from(outcome: ConversionOutcome) -> Self {
        match outcome {
            ConversionOutcome::Success(result) => Ok(result),
            ConversionOutcome::Failure(err) => Err(err),
        }
    }
}

/// JSON line emitted by the toolchain helper script on stdout.
#[derive(Debug, Clone, Deserialize)]
pub struct ScriptLine {
    pub stage: String,
    #[serde(default)]
    pub message: Option<String>,
    /// Declared model input shape; `None` entries are dynamic dimensions.
    #[serde(default)]
    pub input_shape: Option<Vec<Option<i64>>>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub output_size: Option<u64>,
}
