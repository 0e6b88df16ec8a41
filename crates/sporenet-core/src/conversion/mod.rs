//! Model conversion into embedded-inference binaries.
//!
//! The [`Dispatcher`] validates a [`ConversionRequest`], picks the converter
//! for its [`SourceFormat`], plans quantization from the model's input shape
//! and runs the converter under a single degrade-and-retry fallback.
//!
//! The model frameworks themselves run behind the [`Toolchain`] trait; the
//! production implementation is [`PythonToolchain`], which drives an embedded
//! helper script in a dedicated virtual environment.

mod capabilities;
pub mod converters;
mod dispatcher;
pub mod fallback;
pub(crate) mod pipeline;
mod python;
pub mod quantization;
pub mod scratch;
mod scripts;
mod toolchain;
mod types;

pub use capabilities::{Capabilities, FormatStatus};
pub use converters::{
    FormatConverter, LoadedModel, OnnxConverter, PyTorchConverter, TensorFlowConverter,
};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use fallback::{run_with_fallback, FallbackReport, FallbackState};
pub use python::PythonToolchain;
pub use quantization::{QuantizationPlan, RepresentativeDataset};
pub use scratch::{IntermediateArtifact, ScratchSpace};
pub use scripts::{REQUIREMENTS, TOOLCHAIN_SCRIPT};
pub use toolchain::{DynToolchain, Toolchain};
pub use types::{
    ConversionOutcome, ConversionRequest, ConversionResult, Dependency, ModelSource,
    QuantizationMode, ScriptLine, SourceFormat,
};
