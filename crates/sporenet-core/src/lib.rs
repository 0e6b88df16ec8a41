//! SporeNet Core - model conversion pipeline for embedded inference.
//!
//! Converts trained TensorFlow/Keras, PyTorch and ONNX models into quantized
//! TensorFlow Lite binaries and renders them as C source for firmware builds.
//! It can be used programmatically without the CLI.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use sporenet_core::{ConversionRequest, Dispatcher, PythonToolchain, SourceFormat, ToolchainConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> sporenet_core::Result<()> {
//!     let toolchain = Arc::new(PythonToolchain::new(ToolchainConfig::from_env()));
//!     let dispatcher = Dispatcher::builder(toolchain).build().await;
//!
//!     let request = ConversionRequest::new("mnist.h5", SourceFormat::TensorFlow, "mnist.tflite", true);
//!     let result = dispatcher.convert(&request).await.into_result()?;
//!     println!("{}", result.summary());
//!
//!     let source = sporenet_core::emit_as_source(&result.binary, "sporenet_model_data");
//!     std::fs::write("model_data.cc", source)?;
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod config;
pub mod conversion;
pub mod error;

// Re-export commonly used types
pub use artifact::{
    emit_as_source, emit_header, is_valid_symbol, parse_source_bytes, write_header_beside,
    ArtifactInspector, ArtifactSignatures, ElementType, TensorSignature,
};
pub use config::{AppConfig, ConverterConfig, EmitConfig, ToolchainConfig};
pub use conversion::{
    Capabilities, ConversionOutcome, ConversionRequest, ConversionResult, Dependency, Dispatcher,
    DispatcherBuilder, DynToolchain, FormatConverter, PythonToolchain, QuantizationMode,
    QuantizationPlan, SourceFormat, Toolchain,
};
pub use error::{Result, SporeError};
