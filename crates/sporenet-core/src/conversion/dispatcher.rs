//! Conversion dispatcher: validates a request, routes it to the converter
//! for its format and drives the pipeline to a [`ConversionOutcome`].

use std::path::Path;

use tracing::{debug, info};

use super::capabilities::Capabilities;
use super::converters::{FormatConverter, OnnxConverter, PyTorchConverter, TensorFlowConverter};
use super::fallback::run_with_fallback;
use super::quantization::{self, QuantizationPlan};
use super::scratch::ScratchSpace;
use super::toolchain::DynToolchain;
use super::types::{ConversionOutcome, ConversionRequest, ConversionResult, SourceFormat};
use crate::error::{IoResultExt, Result, SporeError};

/// Routes conversion requests to format-specific converters.
pub struct Dispatcher {
    toolchain: DynToolchain,
    capabilities: Capabilities,
    write_output: bool,
}

impl Dispatcher {
    /// Start configuring a dispatcher over `toolchain`.
    pub fn builder(toolchain: DynToolchain) -> DispatcherBuilder {
        DispatcherBuilder::new(toolchain)
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// Convert one model.
    ///
    /// Never panics on bad input; every failure is reported through
    /// [`ConversionOutcome::Failure`]. Intermediate artifacts are removed
    /// before this returns, on success and failure alike.
    pub async fn convert(&self, request: &ConversionRequest) -> ConversionOutcome {
        self.run(request).await.into()
    }

    async fn run(&self, request: &ConversionRequest) -> Result<ConversionResult> {
        if !request.source_path.exists() {
            return Err(SporeError::InputNotFound {
                path: request.source_path.clone(),
            });
        }
        self.capabilities.require(request.source_format)?;

        let converter = self.converter_for(request.source_format);
        info!(
            "Converting {} model {} -> {}",
            request.source_format,
            request.source_path.display(),
            request.output_path.display()
        );

        let scratch = ScratchSpace::beside(&request.output_path);
        let model = converter.load(&request.source_path, &scratch).await?;

        let plan = quantization::plan(model.input_shape(), request.quantize);
        log_plan(&plan, model.input_shape());

        let converter_ref = converter.as_ref();
        let model_ref = &model;
        let report = run_with_fallback(plan, move |plan| async move {
            converter_ref.convert_to_embedded(model_ref, &plan).await
        })
        .await;

        // Intermediates go away before the result is inspected or returned.
        drop(model);

        let binary = report.result?;
        let result = ConversionResult::from_binary(binary, report.applied_plan.mode, report.attempts)?;

        if self.write_output {
            write_binary(&request.output_path, &result.binary).await?;
        }
        info!(
            "Converted {} ({} bytes, {} quantization, {} attempt(s))",
            request.output_path.display(),
            result.size_bytes,
            result.applied_mode,
            result.attempts
        );
        Ok(result)
    }

    fn converter_for(&self, format: SourceFormat) -> Box<dyn FormatConverter> {
        let toolchain = self.toolchain.clone();
        match format {
            SourceFormat::TensorFlow => Box::new(TensorFlowConverter::new(toolchain)),
            SourceFormat::PyTorch => Box::new(PyTorchConverter::new(toolchain)),
            SourceFormat::Onnx => Box::new(OnnxConverter::new(toolchain)),
        }
    }
}

fn log_plan(plan: &QuantizationPlan, input_shape: Option<&[i64]>) {
    match &plan.representative_input_shape {
        Some(shape) => info!(
            "Quantization: {} with {} representative samples of shape {:?}",
            plan.mode, plan.sample_count, shape
        ),
        None if plan.enabled => info!(
            "Quantization: {} (no usable input shape in {:?})",
            plan.mode, input_shape
        ),
        None => info!("Quantization disabled"),
    }
}

async fn write_binary(path: &Path, binary: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.with_path(parent)?;
    }
    tokio::fs::write(path, binary).await.with_path(path)?;
    debug!("Wrote {} bytes to {}", binary.len(), path.display());
    Ok(())
}

/// Builder for [`Dispatcher`].
///
/// # Example
///
/// ```rust,ignore
/// let dispatcher = Dispatcher::builder(Arc::new(PythonToolchain::new(config)))
///     .build()
///     .await;
/// let outcome = dispatcher.convert(&request).await;
/// ```
pub struct DispatcherBuilder {
    toolchain: DynToolchain,
    capabilities: Option<Capabilities>,
    write_output: bool,
}

impl DispatcherBuilder {
    pub fn new(toolchain: DynToolchain) -> Self {
        Self {
            toolchain,
            capabilities: None,
            write_output: true,
        }
    }

    /// Use a fixed capability registry instead of probing the toolchain.
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Write the binary to the request's output path.
    ///
    /// Default: `true`
    pub fn write_output(mut self, enable: bool) -> Self {
        self.write_output = enable;
        self
    }

    /// Build the dispatcher, probing the toolchain for capabilities unless a
    /// registry was supplied.
    pub async fn build(self) -> Dispatcher {
        let capabilities = match self.capabilities {
            Some(capabilities) => capabilities,
            None => Capabilities::probe(self.toolchain.as_ref()).await,
        };
        Dispatcher {
            toolchain: self.toolchain,
            capabilities,
            write_output: self.write_output,
        }
    }
}
