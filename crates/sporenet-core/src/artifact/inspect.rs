//! Structural inspection of produced TFLite binaries.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::flatbuffer::{FlatBuffer, Table};
use super::schema::{tensor_type, vt, TFLITE_FILE_ID};
use crate::error::{Result, SporeError};

/// Element type of a model tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Float32,
    Float16,
    Int32,
    UInt8,
    Int64,
    String,
    Bool,
    Int16,
    Complex64,
    Int8,
    Float64,
    Complex128,
    UInt64,
    Resource,
    Variant,
    UInt32,
    UInt16,
    Int4,
}

impl ElementType {
    /// Map a schema `TensorType` value; `None` for codes this reader does not know.
    pub fn from_tflite(code: i8) -> Option<Self> {
        Some(match code {
            tensor_type::FLOAT32 => ElementType::Float32,
            tensor_type::FLOAT16 => ElementType::Float16,
            tensor_type::INT32 => ElementType::Int32,
            tensor_type::UINT8 => ElementType::UInt8,
            tensor_type::INT64 => ElementType::Int64,
            tensor_type::STRING => ElementType::String,
            tensor_type::BOOL => ElementType::Bool,
            tensor_type::INT16 => ElementType::Int16,
            tensor_type::COMPLEX64 => ElementType::Complex64,
            tensor_type::INT8 => ElementType::Int8,
            tensor_type::FLOAT64 => ElementType::Float64,
            tensor_type::COMPLEX128 => ElementType::Complex128,
            tensor_type::UINT64 => ElementType::UInt64,
            tensor_type::RESOURCE => ElementType::Resource,
            tensor_type::VARIANT => ElementType::Variant,
            tensor_type::UINT32 => ElementType::UInt32,
            tensor_type::UINT16 => ElementType::UInt16,
            tensor_type::INT4 => ElementType::Int4,
            _ => return None,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Float32 => "float32",
            ElementType::Float16 => "float16",
            ElementType::Int32 => "int32",
            ElementType::UInt8 => "uint8",
            ElementType::Int64 => "int64",
            ElementType::String => "string",
            ElementType::Bool => "bool",
            ElementType::Int16 => "int16",
            ElementType::Complex64 => "complex64",
            ElementType::Int8 => "int8",
            ElementType::Float64 => "float64",
            ElementType::Complex128 => "complex128",
            ElementType::UInt64 => "uint64",
            ElementType::Resource => "resource",
            ElementType::Variant => "variant",
            ElementType::UInt32 => "uint32",
            ElementType::UInt16 => "uint16",
            ElementType::Int4 => "int4",
        }
    }

    pub fn is_floating_point(&self) -> bool {
        matches!(
            self,
            ElementType::Float16 | ElementType::Float32 | ElementType::Float64
        )
    }

    /// Whether this is one of the 8-bit quantized integer types.
    pub fn is_integer_8bit(&self) -> bool {
        matches!(self, ElementType::Int8 | ElementType::UInt8)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared name, shape and element type of one model tensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TensorSignature {
    #[serde(default)]
    pub name: String,
    pub shape: Vec<i64>,
    pub element_type: ElementType,
}

impl TensorSignature {
    /// Whether any dimension is dynamic (negative).
    pub fn is_dynamic(&self) -> bool {
        self.shape.iter().any(|dim| *dim < 0)
    }

    /// Number of elements implied by the shape (1 for a scalar).
    ///
    /// `None` when a dimension is dynamic or the count does not fit in `u64`.
    pub fn element_count(&self) -> Option<u64> {
        checked_product(&self.shape)
    }

    /// Element count as shown to users.
    ///
    /// A dynamic batch dimension is reported per sample.
    pub fn describe_elements(&self) -> String {
        if let Some(count) = self.element_count() {
            return format!("{count} elements");
        }
        match self.shape.split_first() {
            Some((batch, sample)) if *batch < 0 => match checked_product(sample) {
                Some(count) => format!("{count} elements per sample"),
                None if sample.iter().any(|dim| *dim < 0) => "dynamic element count".to_string(),
                None => "element count overflows".to_string(),
            },
            _ if self.is_dynamic() => "dynamic element count".to_string(),
            _ => "element count overflows".to_string(),
        }
    }
}

fn checked_product(dims: &[i64]) -> Option<u64> {
    dims.iter().try_fold(1u64, |count, dim| {
        u64::try_from(*dim).ok().and_then(|dim| count.checked_mul(dim))
    })
}

/// Everything the inspector learns from a binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSignatures {
    /// First input of the primary subgraph.
    pub input: TensorSignature,
    /// First output of the primary subgraph.
    pub output: TensorSignature,
    pub version: u32,
    pub subgraph_count: usize,
    pub tensor_count: usize,
    pub operator_count: usize,
    #[serde(default)]
    pub description: Option<String>,
}

/// Reads the declared tensor signatures of a TFLite binary.
pub struct ArtifactInspector;

impl ArtifactInspector {
    /// Validate `binary` and extract its input/output signatures.
    ///
    /// Fails with `ArtifactInvalid` if the binary cannot be read as a TFLite
    /// model, has no subgraph, declares no tensors, or lacks an input or
    /// output.
    pub fn inspect(binary: &[u8]) -> Result<ArtifactSignatures> {
        if binary.is_empty() {
            return Err(SporeError::artifact_invalid("binary is empty"));
        }

        let fb = FlatBuffer::new(binary);
        match fb.file_identifier() {
            Some(id) if id == TFLITE_FILE_ID.as_bytes() => {}
            Some(id) => {
                return Err(SporeError::artifact_invalid(format!(
                    "unexpected file identifier {:?} (expected {TFLITE_FILE_ID})",
                    String::from_utf8_lossy(id)
                )))
            }
            None => return Err(SporeError::artifact_invalid("binary is truncated")),
        }

        let model = fb.root()?;
        let version = model.u32_field(vt::model::VERSION, 0)?;
        let description = model.string(vt::model::DESCRIPTION)?.map(str::to_string);

        let subgraphs = model
            .vector(vt::model::SUBGRAPHS)?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SporeError::artifact_invalid("model has no subgraphs"))?;
        let subgraph = subgraphs.table_at(0)?;

        let tensors = subgraph
            .vector(vt::sub_graph::TENSORS)?
            .filter(|v| !v.is_empty())
            .ok_or_else(|| SporeError::artifact_invalid("subgraph declares no tensors"))?;
        let operator_count = subgraph
            .vector(vt::sub_graph::OPERATORS)?
            .map(|v| v.len())
            .unwrap_or(0);

        let input_index = first_index(&subgraph, vt::sub_graph::INPUTS, "inputs")?;
        let output_index = first_index(&subgraph, vt::sub_graph::OUTPUTS, "outputs")?;

        let tensor_at = |index: i32, role: &str| -> Result<TensorSignature> {
            let position = usize::try_from(index)
                .ok()
                .filter(|i| *i < tensors.len())
                .ok_or_else(|| {
                    SporeError::artifact_invalid(format!(
                        "{role} tensor index {index} out of range ({} tensors)",
                        tensors.len()
                    ))
                })?;
            read_tensor(&tensors.table_at(position)?)
        };

        let signatures = ArtifactSignatures {
            input: tensor_at(input_index, "input")?,
            output: tensor_at(output_index, "output")?,
            version,
            subgraph_count: subgraphs.len(),
            tensor_count: tensors.len(),
            operator_count,
            description,
        };
        debug!(
            "Inspected artifact: version {}, {} tensors, {} operators",
            signatures.version, signatures.tensor_count, signatures.operator_count
        );
        Ok(signatures)
    }
}

fn first_index(subgraph: &Table<'_>, voffset: u16, what: &str) -> Result<i32> {
    let indices = subgraph
        .vector(voffset)?
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SporeError::artifact_invalid(format!("subgraph declares no {what}")))?;
    indices.i32_at(0)
}

fn read_tensor(tensor: &Table<'_>) -> Result<TensorSignature> {
    let shape: Vec<i64> = match tensor.vector(vt::tensor::SHAPE)? {
        Some(dims) => dims.to_i32_vec()?.into_iter().map(i64::from).collect(),
        None => Vec::new(),
    };
    let code = tensor.i8_field(vt::tensor::TYPE, tensor_type::FLOAT32)?;
    let element_type = ElementType::from_tflite(code).ok_or_else(|| {
        SporeError::artifact_invalid(format!("unknown tensor element type {code}"))
    })?;
    let name = tensor
        .string(vt::tensor::NAME)?
        .unwrap_or_default()
        .to_string();

    // Dynamic dimensions count as 1 here; only fixed sizes can overflow.
    let fixed: Vec<i64> = shape.iter().map(|dim| (*dim).max(1)).collect();
    if checked_product(&fixed).is_none() {
        return Err(SporeError::artifact_invalid(format!(
            "tensor '{name}' has shape {shape:?}, too many elements to address"
        )));
    }
    Ok(TensorSignature {
        name,
        shape,
        element_type,
    })
}
