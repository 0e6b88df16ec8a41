//! Shared fixtures: a TFLite flatbuffer builder and a scripted toolchain.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use flatbuffers::FlatBufferBuilder;
use sporenet_core::artifact::schema::{tensor_type, vt, TFLITE_FILE_ID};
use sporenet_core::conversion::{ModelSource, QuantizationMode, QuantizationPlan, Toolchain};
use sporenet_core::{Dependency, Result, SporeError};

/// Minimal single-subgraph TFLite model: one input tensor, one output tensor
/// and a constant buffer of `weight_bytes` bytes.
pub fn build_tflite(
    input_shape: &[i32],
    output_shape: &[i32],
    element_type: i8,
    weight_bytes: usize,
) -> Vec<u8> {
    let mut fbb = FlatBufferBuilder::with_capacity(weight_bytes + 1024);

    let input_name = fbb.create_string("serving_default_input:0");
    let output_name = fbb.create_string("StatefulPartitionedCall:0");
    let desc = fbb.create_string("sporenet test fixture");
    let input_dims = fbb.create_vector(input_shape);
    let output_dims = fbb.create_vector(output_shape);
    let sg_inputs = fbb.create_vector(&[0i32]);
    let sg_outputs = fbb.create_vector(&[1i32]);

    let weights = fbb.create_vector(&vec![0x5au8; weight_bytes]);
    let empty_buffer = {
        let start = fbb.start_table();
        fbb.end_table(start)
    };
    let weight_buffer = {
        let start = fbb.start_table();
        fbb.push_slot_always(vt::buffer::DATA, weights);
        fbb.end_table(start)
    };
    let buffers = fbb.create_vector(&[empty_buffer, weight_buffer]);

    let input = {
        let start = fbb.start_table();
        fbb.push_slot_always(vt::tensor::SHAPE, input_dims);
        fbb.push_slot::<i8>(vt::tensor::TYPE, element_type, 0);
        fbb.push_slot::<u32>(vt::tensor::BUFFER, 0, 0);
        fbb.push_slot_always(vt::tensor::NAME, input_name);
        fbb.end_table(start)
    };
    let output = {
        let start = fbb.start_table();
        fbb.push_slot_always(vt::tensor::SHAPE, output_dims);
        fbb.push_slot::<i8>(vt::tensor::TYPE, element_type, 0);
        fbb.push_slot::<u32>(vt::tensor::BUFFER, 0, 0);
        fbb.push_slot_always(vt::tensor::NAME, output_name);
        fbb.end_table(start)
    };
    let tensors = fbb.create_vector(&[input, output]);

    let subgraph = {
        let start = fbb.start_table();
        fbb.push_slot_always(vt::sub_graph::TENSORS, tensors);
        fbb.push_slot_always(vt::sub_graph::INPUTS, sg_inputs);
        fbb.push_slot_always(vt::sub_graph::OUTPUTS, sg_outputs);
        fbb.end_table(start)
    };
    let subgraphs = fbb.create_vector(&[subgraph]);

    let model = {
        let start = fbb.start_table();
        fbb.push_slot::<u32>(vt::model::VERSION, 3, 0);
        fbb.push_slot_always(vt::model::SUBGRAPHS, subgraphs);
        fbb.push_slot_always(vt::model::DESCRIPTION, desc);
        fbb.push_slot_always(vt::model::BUFFERS, buffers);
        fbb.end_table(start)
    };
    fbb.finish(model, Some(TFLITE_FILE_ID));
    fbb.finished_data().to_vec()
}

/// The part of a model that [`build_incomplete_tflite`] leaves empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Subgraphs,
    Tensors,
    Inputs,
    Outputs,
}

/// A well-identified TFLite model with one structural vector left empty.
pub fn build_incomplete_tflite(missing: Missing) -> Vec<u8> {
    let mut fbb = FlatBufferBuilder::new();

    let dims = fbb.create_vector(&[1i32, 4]);
    let tensor = {
        let start = fbb.start_table();
        fbb.push_slot_always(vt::tensor::SHAPE, dims);
        fbb.push_slot::<i8>(vt::tensor::TYPE, tensor_type::FLOAT32, 0);
        fbb.end_table(start)
    };
    let tensor_list = if missing == Missing::Tensors {
        Vec::new()
    } else {
        vec![tensor, tensor]
    };
    let tensors = fbb.create_vector(&tensor_list);
    let input_list: Vec<i32> = if missing == Missing::Inputs { Vec::new() } else { vec![0] };
    let inputs = fbb.create_vector(&input_list);
    let output_list: Vec<i32> = if missing == Missing::Outputs { Vec::new() } else { vec![1] };
    let outputs = fbb.create_vector(&output_list);

    let subgraph = {
        let start = fbb.start_table();
        fbb.push_slot_always(vt::sub_graph::TENSORS, tensors);
        fbb.push_slot_always(vt::sub_graph::INPUTS, inputs);
        fbb.push_slot_always(vt::sub_graph::OUTPUTS, outputs);
        fbb.end_table(start)
    };
    let subgraph_list = if missing == Missing::Subgraphs {
        Vec::new()
    } else {
        vec![subgraph]
    };
    let subgraphs = fbb.create_vector(&subgraph_list);

    let model = {
        let start = fbb.start_table();
        fbb.push_slot::<u32>(vt::model::VERSION, 3, 0);
        fbb.push_slot_always(vt::model::SUBGRAPHS, subgraphs);
        fbb.end_table(start)
    };
    fbb.finish(model, Some(TFLITE_FILE_ID));
    fbb.finished_data().to_vec()
}

/// What the scripted toolchain's compile step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileOutput {
    /// A well-formed model sized from the compiler input.
    Model,
    /// Bytes that are not a TFLite model.
    Garbage,
}

/// Toolchain fake that behaves like the Python helper on disk.
///
/// Intermediate files are really created so cleanup can be observed. The
/// compiled model's tensor types follow the plan: int8 I/O for full integer
/// quantization, float32 otherwise. Weights shrink to a quarter of the input
/// size whenever quantization is on.
pub struct ScriptedToolchain {
    pub input_shape: Option<Vec<i64>>,
    pub output_classes: i32,
    /// Modes whose compile call fails with a toolchain error.
    pub failing_modes: Vec<QuantizationMode>,
    pub output: CompileOutput,
    /// Fail the input shape lookup the way a never-called Keras model does.
    pub shape_unreadable: bool,
    calls: Mutex<Vec<String>>,
    intermediates_seen: Mutex<Vec<PathBuf>>,
}

impl ScriptedToolchain {
    pub fn new(input_shape: &[i64]) -> Self {
        Self {
            input_shape: Some(input_shape.to_vec()),
            output_classes: 10,
            failing_modes: Vec::new(),
            output: CompileOutput::Model,
            shape_unreadable: false,
            calls: Mutex::new(Vec::new()),
            intermediates_seen: Mutex::new(Vec::new()),
        }
    }

    pub fn without_shape() -> Self {
        Self {
            input_shape: None,
            ..Self::new(&[])
        }
    }

    pub fn failing(mut self, modes: &[QuantizationMode]) -> Self {
        self.failing_modes = modes.to_vec();
        self
    }

    pub fn unreadable_shape(mut self) -> Self {
        self.shape_unreadable = true;
        self
    }

    pub fn producing(mut self, output: CompileOutput) -> Self {
        self.output = output;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn compile_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with("compile:"))
            .collect()
    }

    /// Every intermediate path the toolchain was asked to write.
    pub fn intermediates_seen(&self) -> Vec<PathBuf> {
        self.intermediates_seen.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn compiled_shape(&self, plan: &QuantizationPlan) -> Vec<i32> {
        let shape: Vec<i64> = match (&plan.representative_input_shape, &self.input_shape) {
            (Some(sample), _) => std::iter::once(1).chain(sample.iter().copied()).collect(),
            (None, Some(declared)) => declared.iter().map(|d| (*d).max(1)).collect(),
            (None, None) => vec![1, 4],
        };
        shape.into_iter().map(|d| d as i32).collect()
    }
}

fn source_size(source: &ModelSource) -> u64 {
    let path = match source {
        ModelSource::KerasFile(path) => path.clone(),
        ModelSource::SavedModel(dir) => dir.join("saved_model.pb"),
    };
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

#[async_trait]
impl Toolchain for ScriptedToolchain {
    async fn dependency_available(&self, _dependency: Dependency) -> bool {
        true
    }

    async fn probe_input_shape(&self, source: &ModelSource) -> Result<Option<Vec<i64>>> {
        self.record(format!("probe:{}", source.kind()));
        if self.shape_unreadable {
            return Err(SporeError::conversion_failed(
                "AttributeError: The layer has never been called and thus has no defined input shape",
            ));
        }
        Ok(self.input_shape.clone())
    }

    async fn export_torch_to_onnx(
        &self,
        model: &Path,
        onnx_out: &Path,
        _input_shape: &[i64],
        _opset: u32,
    ) -> Result<()> {
        self.record("export");
        self.intermediates_seen.lock().unwrap().push(onnx_out.to_path_buf());
        std::fs::copy(model, onnx_out).map_err(|e| SporeError::io("export", onnx_out, e))?;
        Ok(())
    }

    async fn onnx_to_saved_model(&self, onnx: &Path, out_dir: &Path) -> Result<()> {
        self.record("translate");
        self.intermediates_seen.lock().unwrap().push(out_dir.to_path_buf());
        std::fs::create_dir_all(out_dir.join("variables"))
            .map_err(|e| SporeError::io("translate", out_dir, e))?;
        let graph = out_dir.join("saved_model.pb");
        std::fs::copy(onnx, &graph).map_err(|e| SporeError::io("translate", &graph, e))?;
        Ok(())
    }

    async fn compile(&self, source: &ModelSource, plan: &QuantizationPlan) -> Result<Vec<u8>> {
        self.record(format!("compile:{}:{}", source.kind(), plan.mode));

        if let Some(dataset) = plan.representative_dataset() {
            let elements = dataset.sample_elements();
            let draws = dataset.iter().inspect(|s| assert_eq!(s.len(), elements)).count();
            assert_eq!(draws, plan.sample_count);
        }

        if self.failing_modes.contains(&plan.mode) {
            return Err(SporeError::conversion_failed(format!(
                "converter rejected {} plan",
                plan.mode
            )));
        }
        if self.output == CompileOutput::Garbage {
            return Ok(b"this is not a flatbuffer".to_vec());
        }

        let size = source_size(source) as usize;
        let (element_type, weight_bytes) = match plan.mode {
            QuantizationMode::Integer8Bit => (tensor_type::INT8, size / 4),
            QuantizationMode::DefaultOptimize => (tensor_type::FLOAT32, size / 4),
            QuantizationMode::None => (tensor_type::FLOAT32, size),
        };
        Ok(build_tflite(
            &self.compiled_shape(plan),
            &[1, self.output_classes],
            element_type,
            weight_bytes,
        ))
    }
}

/// Write a synthetic source model of `size` bytes.
pub fn write_model(dir: &Path, name: &str, size: usize) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, vec![0x42u8; size]).unwrap();
    path
}

/// Every entry directly under `dir`, sorted.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}
