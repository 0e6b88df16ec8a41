//! SporeNet model converter - command-line front end for sporenet-core.
//!
//! Converts TensorFlow/Keras, PyTorch and ONNX models into quantized TFLite
//! binaries for embedded deployment and optionally emits a C header.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{Parser, Subcommand, ValueEnum};
use sporenet_core::{ConverterConfig, EmitConfig, SourceFormat, SporeError, ToolchainConfig};
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "sporenet-convert", version)]
#[command(about = "Convert ML models to TensorFlow Lite for embedded deployment")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Python interpreter for the model toolchain (default: toolchain venv, then python3)
    #[arg(long, global = true)]
    python: Option<PathBuf>,

    /// Directory for the toolchain scripts and virtual environment
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a model to a TFLite binary
    Convert(ConvertArgs),
    /// Render an existing TFLite binary as a C header
    Header(HeaderArgs),
    /// Report which source formats the toolchain supports
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create the toolchain virtual environment and install its packages
    Setup {
        /// Also install PyTorch
        #[arg(long)]
        with_torch: bool,
    },
}

#[derive(clap::Args, Debug)]
struct ConvertArgs {
    /// Path to the input model
    #[arg(short, long)]
    model: PathBuf,

    /// Framework the model was saved with
    #[arg(short, long, value_enum, ignore_case = true)]
    framework: Framework,

    /// Output TFLite file path
    #[arg(short, long, default_value = ConverterConfig::DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Disable model quantization
    #[arg(long)]
    no_quantize: bool,

    /// Generate a C header next to the output file
    #[arg(long)]
    generate_header: bool,

    /// C symbol for the generated header
    #[arg(long, default_value = EmitConfig::DEFAULT_SYMBOL)]
    symbol: String,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

/// Source frameworks accepted by `--framework`.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Framework {
    /// Keras .h5/.keras files or a SavedModel directory
    #[value(alias = "tf", alias = "keras")]
    Tensorflow,
    /// Pickled .pt/.pth modules, exported through ONNX
    #[value(alias = "torch")]
    Pytorch,
    /// ONNX graphs
    Onnx,
}

impl From<Framework> for SourceFormat {
    fn from(framework: Framework) -> Self {
        match framework {
            Framework::Tensorflow => SourceFormat::TensorFlow,
            Framework::Pytorch => SourceFormat::PyTorch,
            Framework::Onnx => SourceFormat::Onnx,
        }
    }
}

#[derive(clap::Args, Debug)]
struct HeaderArgs {
    /// TFLite binary to render
    #[arg(short, long)]
    model: PathBuf,

    /// Header path (default: model path with a .h extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// C symbol for the byte array
    #[arg(long, default_value = EmitConfig::DEFAULT_SYMBOL)]
    symbol: String,
}

impl Args {
    fn toolchain_config(&self) -> ToolchainConfig {
        let mut config = ToolchainConfig::from_env();
        if let Some(python) = &self.python {
            config = config.with_python(python);
        }
        if let Some(data_dir) = &self.data_dir {
            config = config.with_data_dir(data_dir);
        }
        config
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            let code = unsupported_framework(&err)
                .map(|e| i32::from(e.exit_code()))
                .unwrap_or_else(|| err.exit_code());
            let _ = err.print();
            return ExitCode::from(u8::try_from(code).unwrap_or(1));
        }
    };

    // Set up logging; stdout is reserved for results
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_writer(std::io::stderr)
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let config = args.toolchain_config();
    let result = match args.command {
        Command::Convert(convert) => commands::convert(convert, config).await,
        Command::Header(header) => commands::header(header),
        Command::Check { json } => commands::check(config, json).await,
        Command::Setup { with_torch } => commands::setup(config, with_torch).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

/// An unknown `--framework` value, as the pipeline error it stands for.
///
/// Other usage errors keep clap's exit code.
fn unsupported_framework(err: &clap::Error) -> Option<SporeError> {
    if err.kind() != ErrorKind::InvalidValue {
        return None;
    }
    match err.get(ContextKind::InvalidArg) {
        Some(ContextValue::String(arg)) if arg.starts_with("--framework") => {}
        _ => return None,
    }
    let format = match err.get(ContextKind::InvalidValue) {
        Some(ContextValue::String(value)) => value.clone(),
        _ => String::new(),
    };
    Some(SporeError::UnsupportedFormat {
        format,
        detail: "expected one of: tensorflow, pytorch, onnx".to_string(),
    })
}

/// Exit code for a failed command; pipeline errors keep their own code.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<SporeError>()
        .map(SporeError::exit_code)
        .unwrap_or(1)
}
