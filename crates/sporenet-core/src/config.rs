//! Centralized configuration for the conversion pipeline.
//!
//! Fixed pipeline parameters live in associated-constant groups; the only
//! runtime-resolved settings are the toolchain interpreter and data directory.

use std::path::{Path, PathBuf};

/// Application-level configuration.
pub struct AppConfig;

impl AppConfig {
    pub const APP_NAME: &'static str = "SporeNet Model Converter";
    pub const VERSION: &'static str = env!("CARGO_PKG_VERSION");
}

/// Converter and quantization parameters.
pub struct ConverterConfig;

impl ConverterConfig {
    /// Number of representative samples drawn for int8 calibration.
    pub const REPRESENTATIVE_SAMPLE_COUNT: usize = 100;
    /// Seed for the representative dataset so restarts replay the same draws.
    pub const REPRESENTATIVE_SEED: u64 = 0x5907_E4E7;
    /// Synthetic input used to trace PyTorch models; the true input shape is
    /// not recoverable from a pickled module.
    pub const PYTORCH_EXPORT_INPUT_SHAPE: [i64; 4] = [1, 3, 224, 224];
    /// ONNX opset used for the PyTorch export.
    pub const ONNX_OPSET_VERSION: u32 = 11;
    /// Default output path when none is given.
    pub const DEFAULT_OUTPUT: &'static str = "converted_model.tflite";
}

/// Byte-array source emission parameters.
pub struct EmitConfig;

impl EmitConfig {
    pub const BYTES_PER_LINE: usize = 16;
    pub const DEFAULT_SYMBOL: &'static str = "sporenet_model_data";
    pub const INDENT: &'static str = "  ";
}

/// Directory and file names under the data directory.
pub struct PathsConfig;

impl PathsConfig {
    pub const DATA_DIR_NAME: &'static str = "sporenet";
    pub const SCRIPTS_DIR_NAME: &'static str = "toolchain-scripts";
    pub const VENV_DIR_NAME: &'static str = "toolchain-venv";
    pub const TOOLCHAIN_SCRIPT_NAME: &'static str = "sporenet_toolchain.py";
    pub const REQUIREMENTS_NAME: &'static str = "requirements.txt";
    pub const TORCH_REQUIREMENTS_NAME: &'static str = "requirements-torch.txt";
    pub const INTERMEDIATE_ONNX_SUFFIX: &'static str = ".intermediate.onnx";
    pub const INTERMEDIATE_SAVED_MODEL_SUFFIX: &'static str = "_tf_model";
    pub const PYTHON_ENV: &'static str = "SPORENET_PYTHON";
    pub const DATA_DIR_ENV: &'static str = "SPORENET_DATA_DIR";
    pub const DEFAULT_PYTHON: &'static str = "python3";
}

/// Runtime configuration for the external Python toolchain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainConfig {
    /// Interpreter override. When unset, the venv interpreter is used if it
    /// exists, otherwise `python3` from `PATH`.
    pub python: Option<PathBuf>,
    /// Root for deployed scripts and the virtual environment.
    pub data_dir: PathBuf,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            python: None,
            data_dir: default_data_dir(),
        }
    }
}

impl ToolchainConfig {
    /// Resolve configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let python = std::env::var_os(PathsConfig::PYTHON_ENV).map(PathBuf::from);
        let data_dir = std::env::var_os(PathsConfig::DATA_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(default_data_dir);
        Self { python, data_dir }
    }

    pub fn with_python(mut self, python: impl Into<PathBuf>) -> Self {
        self.python = Some(python.into());
        self
    }

    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.data_dir.join(PathsConfig::SCRIPTS_DIR_NAME)
    }

    pub fn venv_dir(&self) -> PathBuf {
        self.data_dir.join(PathsConfig::VENV_DIR_NAME)
    }

    pub fn venv_python(&self) -> PathBuf {
        venv_python_in(&self.venv_dir())
    }

    /// The interpreter that will run the toolchain script.
    pub fn resolve_python(&self) -> PathBuf {
        if let Some(python) = &self.python {
            return python.clone();
        }
        let venv_python = self.venv_python();
        if venv_python.exists() {
            venv_python
        } else {
            PathBuf::from(PathsConfig::DEFAULT_PYTHON)
        }
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(PathsConfig::DATA_DIR_NAME)
}

#[cfg(windows)]
fn venv_python_in(venv: &Path) -> PathBuf {
    venv.join("Scripts").join("python.exe")
}

#[cfg(not(windows))]
fn venv_python_in(venv: &Path) -> PathBuf {
    venv.join("bin").join("python")
}
