//! Toolchain trait: the boundary to the external model frameworks.
//!
//! Loading framework models, exporting between formats and running the
//! TFLite converter all happen outside this crate. Converters talk to the
//! frameworks only through this trait, so tests can substitute a scripted
//! implementation.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use super::quantization::QuantizationPlan;
use super::types::{Dependency, ModelSource};
use crate::Result;

/// Operations the external model toolchain provides.
///
/// Every fallible operation reports toolchain-level failures as
/// `SporeError::ConversionFailed`.
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Whether `dependency` can be imported by the toolchain.
    async fn dependency_available(&self, dependency: Dependency) -> bool;

    /// Declared input shape of a model (batch dimension included, dynamic
    /// dimensions as `-1`). `None` when the model does not declare one.
    async fn probe_input_shape(&self, source: &ModelSource) -> Result<Option<Vec<i64>>>;

    /// Trace a pickled PyTorch module with a synthetic input and write ONNX.
    async fn export_torch_to_onnx(
        &self,
        model: &Path,
        onnx_out: &Path,
        input_shape: &[i64],
        opset: u32,
    ) -> Result<()>;

    /// Translate an ONNX graph into a SavedModel directory.
    async fn onnx_to_saved_model(&self, onnx: &Path, out_dir: &Path) -> Result<()>;

    /// Run the TFLite converter on `source` with `plan` applied.
    async fn compile(&self, source: &ModelSource, plan: &QuantizationPlan) -> Result<Vec<u8>>;
}

/// Shared handle to a toolchain.
pub type DynToolchain = Arc<dyn Toolchain>;
