//! Subcommand implementations.

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::json;
use sporenet_core::{
    emit_header, is_valid_symbol, write_header_beside, ArtifactInspector, ConversionRequest,
    Dispatcher, PythonToolchain, SporeError, ToolchainConfig,
};
use tracing::{info, warn};

use crate::{ConvertArgs, HeaderArgs};

pub async fn convert(args: ConvertArgs, config: ToolchainConfig) -> Result<()> {
    if args.generate_header && !is_valid_symbol(&args.symbol) {
        bail!("'{}' is not a valid C identifier", args.symbol);
    }
    let request = ConversionRequest::new(
        &args.model,
        args.framework.into(),
        &args.output,
        !args.no_quantize,
    );

    let toolchain = Arc::new(PythonToolchain::new(config));
    if !toolchain.is_environment_ready() {
        warn!("Toolchain environment not set up; run `sporenet-convert setup` if conversion fails");
    }
    let dispatcher = Dispatcher::builder(toolchain).build().await;

    let result = dispatcher.convert(&request).await.into_result()?;

    let header = if args.generate_header {
        let path = write_header_beside(&request.output_path, &result.binary, &args.symbol)?;
        info!("C header written to {}", path.display());
        Some(path)
    } else {
        None
    };

    if args.json {
        let report = json!({
            "success": true,
            "output": request.output_path,
            "header": header,
            "result": result,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("Model saved to {}", request.output_path.display());
        println!("{}", result.summary());
        if let Some(path) = header {
            println!("Header: {}", path.display());
        }
    }
    Ok(())
}

pub fn header(args: HeaderArgs) -> Result<()> {
    if !is_valid_symbol(&args.symbol) {
        bail!("'{}' is not a valid C identifier", args.symbol);
    }
    if !args.model.exists() {
        return Err(SporeError::InputNotFound { path: args.model }.into());
    }
    let binary = std::fs::read(&args.model)
        .with_context(|| format!("Failed to read {}", args.model.display()))?;
    let signatures = ArtifactInspector::inspect(&binary)?;

    let path = match &args.output {
        Some(output) => {
            write_header_to(output, &binary, &args.symbol)?;
            output.clone()
        }
        None => write_header_beside(&args.model, &binary, &args.symbol)?,
    };
    println!(
        "Header written to {} ({} bytes, input {:?} {}, output {:?} {})",
        path.display(),
        binary.len(),
        signatures.input.shape,
        signatures.input.element_type,
        signatures.output.shape,
        signatures.output.element_type
    );
    Ok(())
}

fn write_header_to(path: &Path, binary: &[u8], symbol: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(path, emit_header(binary, symbol))
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub async fn check(config: ToolchainConfig, json_output: bool) -> Result<()> {
    let toolchain = Arc::new(PythonToolchain::new(config));
    let python = toolchain.python();
    let ready = toolchain.is_environment_ready();
    let dispatcher = Dispatcher::builder(toolchain).build().await;
    let report = dispatcher.capabilities().report();

    if json_output {
        let value = json!({
            "python": python,
            "environment_ready": ready,
            "formats": report,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Python: {}", python.display());
    println!("Toolchain environment: {}", if ready { "ready" } else { "not set up" });
    for status in report {
        if status.enabled {
            println!("  {:<11} enabled", status.format);
        } else {
            let missing: Vec<String> = status
                .missing
                .iter()
                .map(|dep| format!("{} ({})", dep, dep.install_hint()))
                .collect();
            println!("  {:<11} disabled, missing {}", status.format, missing.join(", "));
        }
    }
    Ok(())
}

pub async fn setup(config: ToolchainConfig, with_torch: bool) -> Result<()> {
    let toolchain = PythonToolchain::new(config);
    toolchain
        .ensure_environment(with_torch)
        .await
        .context("Failed to set up the toolchain environment")?;
    println!("Toolchain ready: {}", toolchain.python().display());
    Ok(())
}
