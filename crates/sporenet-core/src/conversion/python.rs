//! Python-backed toolchain.
//!
//! Runs the embedded toolchain script in a dedicated virtual environment (or
//! any interpreter the caller points at) and parses its JSON line output.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::pipeline::{find_stage, run_script};
use super::quantization::QuantizationPlan;
use super::scripts;
use super::toolchain::Toolchain;
use super::types::{Dependency, ModelSource, ScriptLine};
use crate::config::{PathsConfig, ToolchainConfig};
use crate::error::{Result, SporeError};

const PROCESS_NAME: &str = "toolchain";

/// Toolchain backed by TensorFlow, PyTorch and onnx2tf through Python.
pub struct PythonToolchain {
    config: ToolchainConfig,
}

impl PythonToolchain {
    pub fn new(config: ToolchainConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    /// Interpreter used to run the toolchain script.
    pub fn python(&self) -> PathBuf {
        self.config.resolve_python()
    }

    /// Check if the dedicated virtual environment exists.
    pub fn is_environment_ready(&self) -> bool {
        self.config.venv_python().exists()
    }

    /// Ensure the Python toolchain environment is set up.
    ///
    /// Creates the virtual environment and installs required packages if
    /// needed. `with_torch` additionally installs PyTorch.
    pub async fn ensure_environment(&self, with_torch: bool) -> Result<()> {
        let scripts_dir = self.config.scripts_dir();
        scripts::ensure_scripts_deployed(&scripts_dir)?;

        let venv_path = self.config.venv_dir();
        let python_path = self.config.venv_python();

        if python_path.exists() {
            debug!("Toolchain venv already exists at {}", venv_path.display());
        } else {
            let base_python = self
                .config
                .python
                .clone()
                .unwrap_or_else(|| PathBuf::from(PathsConfig::DEFAULT_PYTHON));
            info!("Creating toolchain virtual environment at {}", venv_path.display());

            let output = Command::new(&base_python)
                .arg("-m")
                .arg("venv")
                .arg(&venv_path)
                .output()
                .await
                .map_err(|e| SporeError::Other(format!("Failed to create venv: {e}")))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(SporeError::Other(format!(
                    "Failed to create Python venv. Ensure {} is installed. Error: {stderr}",
                    base_python.display()
                )));
            }

            // Upgrade pip
            let output = Command::new(&python_path)
                .args(["-m", "pip", "install", "--upgrade", "pip"])
                .output()
                .await
                .map_err(|e| SporeError::Other(format!("Failed to upgrade pip: {e}")))?;

            if !output.status.success() {
                warn!(
                    "pip upgrade failed (non-fatal): {}",
                    String::from_utf8_lossy(&output.stderr)
                );
            }
        }

        let mut requirement_files = vec![scripts_dir.join(PathsConfig::REQUIREMENTS_NAME)];
        if with_torch {
            requirement_files.push(scripts_dir.join(PathsConfig::TORCH_REQUIREMENTS_NAME));
        }

        for requirements_path in requirement_files {
            info!("Installing toolchain dependencies from {}...", requirements_path.display());
            let output = Command::new(&python_path)
                .args(["-m", "pip", "install", "-r"])
                .arg(&requirements_path)
                .output()
                .await
                .map_err(|e| SporeError::Other(format!("Failed to install dependencies: {e}")))?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(SporeError::Other(format!(
                    "Failed to install toolchain dependencies: {stderr}"
                )));
            }
        }

        info!("Toolchain environment ready");
        Ok(())
    }

    async fn run(&self, args: Vec<OsString>) -> Result<Vec<ScriptLine>> {
        let script = scripts::ensure_scripts_deployed(&self.config.scripts_dir())?;
        run_script(&self.python(), &script, args, PROCESS_NAME).await
    }
}

#[async_trait]
impl Toolchain for PythonToolchain {
    async fn dependency_available(&self, dependency: Dependency) -> bool {
        let python = self.python();
        for module in dependency.python_modules() {
            let status = Command::new(&python)
                .arg("-c")
                .arg(format!("import {module}"))
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;
            match status {
                Ok(status) if status.success() => {}
                Ok(_) => {
                    debug!("Python module '{}' is not importable", module);
                    return false;
                }
                Err(e) => {
                    debug!("Could not run {}: {}", python.display(), e);
                    return false;
                }
            }
        }
        true
    }

    async fn probe_input_shape(&self, source: &ModelSource) -> Result<Option<Vec<i64>>> {
        let lines = self
            .run(args([
                "probe".into(),
                "--kind".into(),
                source.kind().into(),
                "--path".into(),
                source.path().into(),
            ]))
            .await?;

        let shape = find_stage(&lines, "probed")
            .and_then(|line| line.input_shape.clone())
            .map(|dims| dims.into_iter().map(|d| d.unwrap_or(-1)).collect());
        debug!("Probed input shape of {}: {:?}", source.path().display(), shape);
        Ok(shape)
    }

    async fn export_torch_to_onnx(
        &self,
        model: &Path,
        onnx_out: &Path,
        input_shape: &[i64],
        opset: u32,
    ) -> Result<()> {
        let shape = input_shape
            .iter()
            .map(i64::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.run(args([
            "export-onnx".into(),
            "--model".into(),
            model.into(),
            "--output".into(),
            onnx_out.into(),
            "--input-shape".into(),
            shape.into(),
            "--opset".into(),
            opset.to_string().into(),
        ]))
        .await?;

        require_exists(onnx_out, "ONNX export")
    }

    async fn onnx_to_saved_model(&self, onnx: &Path, out_dir: &Path) -> Result<()> {
        self.run(args([
            "onnx-to-saved-model".into(),
            "--model".into(),
            onnx.into(),
            "--output-dir".into(),
            out_dir.into(),
        ]))
        .await?;

        require_exists(out_dir, "ONNX translation")
    }

    async fn compile(&self, source: &ModelSource, plan: &QuantizationPlan) -> Result<Vec<u8>> {
        let work_dir = tempfile::Builder::new()
            .prefix("sporenet-compile-")
            .tempdir()
            .map_err(|e| SporeError::io("creating compile directory", std::env::temp_dir(), e))?;
        let output = work_dir.path().join("model.tflite");

        let mut command = args([
            "compile".into(),
            "--kind".into(),
            source.kind().into(),
            "--path".into(),
            source.path().into(),
            "--output".into(),
            output.as_path().into(),
            "--mode".into(),
            plan.mode.as_str().into(),
        ]);

        if let Some(dataset) = plan.representative_dataset() {
            let calibration = work_dir.path().join("calibration.f32");
            let written = dataset.write_f32_le(&calibration)?;
            let sample_shape = dataset
                .sample_shape()
                .iter()
                .map(i64::to_string)
                .collect::<Vec<_>>()
                .join(",");
            debug!(
                "Wrote {} representative samples of shape {:?}",
                written,
                dataset.tensor_shape()
            );
            command.extend(args([
                "--calibration".into(),
                calibration.as_path().into(),
                "--sample-shape".into(),
                sample_shape.into(),
                "--samples".into(),
                written.to_string().into(),
            ]));
        }

        self.run(command).await?;

        tokio::fs::read(&output).await.map_err(|e| {
            SporeError::conversion_failed(format!(
                "converter reported success but produced no output at {}: {e}",
                output.display()
            ))
        })
    }
}

fn args<const N: usize>(values: [Arg<'_>; N]) -> Vec<OsString> {
    values.into_iter().map(Arg::into_os_string).collect()
}

/// A command-line argument: text or a path.
enum Arg<'a> {
    Text(String),
    Path(&'a Path),
}

impl Arg<'_> {
    fn into_os_string(self) -> OsString {
        match self {
            Arg::Text(text) => text.into(),
            Arg::Path(path) => path.as_os_str().to_os_string(),
        }
    }
}

impl From<&str> for Arg<'_> {
    fn from(text: &str) -> Self {
        Arg::Text(text.to_string())
    }
}

impl From<String> for Arg<'_> {
    fn from(text: String) -> Self {
        Arg::Text(text)
    }
}

impl<'a> From<&'a Path> for Arg<'a> {
    fn from(path: &'a Path) -> Self {
        Arg::Path(path)
    }
}

fn require_exists(path: &Path, step: &str) -> Result<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(SporeError::conversion_failed(format!(
            "{step} reported success but {} was not created",
            path.display()
        )))
    }
}
