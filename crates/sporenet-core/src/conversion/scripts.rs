//! Embedded Python toolchain script and deployment utilities.
//!
//! The script is stored as a string constant and written to disk on first use
//! or when the embedded version changes (detected via hash comparison).

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::PathsConfig;
use crate::error::IoResultExt;
use crate::Result;

/// Python requirements for the toolchain virtual environment.
pub const REQUIREMENTS: &str = "\
numpy>=1.24.0
tensorflow>=2.13.0
onnx>=1.14.0
onnx2tf>=1.17.0
";

/// Extra requirements for PyTorch model support.
pub const TORCH_REQUIREMENTS: &str = "\
torch>=2.0.0
torchvision>=0.15.0
";

/// Python script wrapping TensorFlow, PyTorch and onnx2tf.
///
/// Subcommands: `probe`, `export-onnx`, `onnx-to-saved-model`, `compile`.
/// Every subcommand reports JSON lines on stdout and exits non-zero after
/// emitting an `error` line.
pub const TOOLCHAIN_SCRIPT: &str = r#"#!/usr/bin/env python3
"""SporeNet model toolchain.

Loads TensorFlow, PyTorch and ONNX models, exports between formats and runs
the TFLite converter. Reports progress and results as JSON lines on stdout.
"""
import argparse
import json
import os
import sys


def emit(stage, **kwargs):
    """Emit a JSON line to stdout."""
    print(json.dumps({"stage": stage, **kwargs}), flush=True)


def parse_shape(text):
    return [int(d) for d in text.split(",") if d.strip()]


def normalize_shape(shape):
    if shape is None:
        return None
    return [None if d is None or d < 0 else int(d) for d in shape]


def load_keras(path):
    import tensorflow as tf
    return tf.keras.models.load_model(path, compile=False)


def keras_input_shape(model):
    shape = getattr(model, "input_shape", None)
    if isinstance(shape, list):
        shape = shape[0] if shape else None
    return shape


def saved_model_input_shape(loaded):
    import tensorflow as tf

    signatures = getattr(loaded, "signatures", None)
    if signatures is None:
        return None
    key = tf.saved_model.DEFAULT_SERVING_SIGNATURE_DEF_KEY
    if key not in signatures:
        return None
    specs = signatures[key].structured_input_signature[1]
    if not specs:
        return None
    return next(iter(specs.values())).shape.as_list()


def probe(args):
    import tensorflow as tf

    emit("loading", message=f"Reading {args.kind} model {args.path}")
    if args.kind == "keras":
        model = load_keras(args.path)
        lookup = lambda: keras_input_shape(model)
    else:
        loaded = tf.saved_model.load(args.path)
        lookup = lambda: saved_model_input_shape(loaded)

    # Subclassed models that were never called and unknown-rank signatures
    # have no shape; that only limits quantization.
    try:
        shape = lookup()
    except (AttributeError, ValueError, TypeError) as e:
        emit("warning", message=f"Input shape unavailable: {e}")
        shape = None
    emit("probed", input_shape=normalize_shape(list(shape) if shape is not None else None))


def export_onnx(args):
    import torch

    emit("exporting", message=f"Exporting {args.model} to ONNX (opset {args.opset})")
    try:
        model = torch.load(args.model, map_location="cpu", weights_only=False)
    except TypeError:
        model = torch.load(args.model, map_location="cpu")
    model.eval()
    dummy_input = torch.randn(*parse_shape(args.input_shape))
    torch.onnx.export(
        model,
        dummy_input,
        args.output,
        export_params=True,
        opset_version=args.opset,
        do_constant_folding=True,
        input_names=["input"],
        output_names=["output"],
    )
    emit("exported", output_path=args.output, output_size=os.path.getsize(args.output))


def onnx_to_saved_model(args):
    import onnx2tf

    emit("translating", message=f"Translating {args.model} to SavedModel")
    onnx2tf.convert(
        input_onnx_file_path=args.model,
        output_folder_path=args.output_dir,
        non_verbose=True,
    )
    emit("translated", output_path=args.output_dir)


def compile_tflite(args):
    import numpy as np
    import tensorflow as tf

    emit("converting", message=f"Compiling {args.kind} model with '{args.mode}' optimization")
    if args.kind == "keras":
        converter = tf.lite.TFLiteConverter.from_keras_model(load_keras(args.path))
    else:
        converter = tf.lite.TFLiteConverter.from_saved_model(args.path)

    if args.mode in ("default", "int8"):
        converter.optimizations = [tf.lite.Optimize.DEFAULT]

    if args.mode == "int8":
        sample_shape = parse_shape(args.sample_shape)
        data = np.fromfile(args.calibration, dtype="<f4")
        data = data.reshape((args.samples, 1, *sample_shape))

        def representative_dataset():
            for sample in data:
                yield [sample]

        converter.representative_dataset = representative_dataset
        converter.target_spec.supported_ops = [tf.lite.OpsSet.TFLITE_BUILTINS_INT8]
        converter.inference_input_type = tf.int8
        converter.inference_output_type = tf.int8

    tflite_model = converter.convert()
    with open(args.output, "wb") as f:
        f.write(tflite_model)
    emit("complete", output_path=args.output, output_size=len(tflite_model))


def main():
    parser = argparse.ArgumentParser(description="SporeNet model toolchain")
    sub = parser.add_subparsers(dest="command", required=True)

    p = sub.add_parser("probe")
    p.add_argument("--kind", choices=["keras", "saved_model"], required=True)
    p.add_argument("--path", required=True)
    p.set_defaults(func=probe)

    p = sub.add_parser("export-onnx")
    p.add_argument("--model", required=True)
    p.add_argument("--output", required=True)
    p.add_argument("--input-shape", required=True)
    p.add_argument("--opset", type=int, required=True)
    p.set_defaults(func=export_onnx)

    p = sub.add_parser("onnx-to-saved-model")
    p.add_argument("--model", required=True)
    p.add_argument("--output-dir", required=True)
    p.set_defaults(func=onnx_to_saved_model)

    p = sub.add_parser("compile")
    p.add_argument("--kind", choices=["keras", "saved_model"], required=True)
    p.add_argument("--path", required=True)
    p.add_argument("--output", required=True)
    p.add_argument("--mode", choices=["none", "default", "int8"], required=True)
    p.add_argument("--calibration", default=None)
    p.add_argument("--sample-shape", default="")
    p.add_argument("--samples", type=int, default=0)
    p.set_defaults(func=compile_tflite)

    args = parser.parse_args()
    try:
        args.func(args)
    except ImportError as e:
        emit("error", message=f"Missing required package: {e}")
        sys.exit(1)
    except Exception as e:
        emit("error", message=f"{type(e).__name__}: {e}")
        sys.exit(1)


if __name__ == "__main__":
    main()
"#;

/// Compute a short hash of a string for staleness checking.
fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let hash = hasher.finalize();
    hex::encode(&hash[..8])
}

/// Deploy the embedded script and requirements to `scripts_dir` if missing or
/// outdated. Returns the path of the toolchain script.
///
/// Uses a `.hash` sidecar file to detect when the embedded script has changed
/// and needs to be rewritten.
pub fn ensure_scripts_deployed(scripts_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(scripts_dir).with_path(scripts_dir)?;

    let script = deploy_script(scripts_dir, PathsConfig::TOOLCHAIN_SCRIPT_NAME, TOOLCHAIN_SCRIPT)?;
    deploy_script(scripts_dir, PathsConfig::REQUIREMENTS_NAME, REQUIREMENTS)?;
    deploy_script(scripts_dir, PathsConfig::TORCH_REQUIREMENTS_NAME, TORCH_REQUIREMENTS)?;

    Ok(script)
}

fn deploy_script(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let script_path = dir.join(filename);
    let hash_path = dir.join(format!("{}.hash", filename));
    let current_hash = content_hash(content);

    // Check if script is already up to date
    if script_path.exists() {
        if let Ok(stored_hash) = std::fs::read_to_string(&hash_path) {
            if stored_hash.trim() == current_hash {
                return Ok(script_path);
            }
        }
    }

    std::fs::write(&script_path, content).with_path(&script_path)?;
    std::fs::write(&hash_path, &current_hash).with_path(&hash_path)?;
    info!("Deployed {} to {}", filename, dir.display());
    Ok(script_path)
}
