//! Inspection and C emission of real TFLite flatbuffers.

mod common;

use common::{build_incomplete_tflite, build_tflite, Missing};
use sporenet_core::artifact::schema::tensor_type;
use sporenet_core::{
    emit_as_source, parse_source_bytes, write_header_beside, ArtifactInspector, ConversionResult,
    ElementType, QuantizationMode, SporeError,
};
use tempfile::TempDir;

#[test]
fn test_inspect_reads_declared_signatures() {
    let binary = build_tflite(&[1, 28, 28, 1], &[1, 10], tensor_type::INT8, 256);
    let signatures = ArtifactInspector::inspect(&binary).unwrap();

    assert_eq!(signatures.version, 3);
    assert_eq!(signatures.subgraph_count, 1);
    assert_eq!(signatures.tensor_count, 2);
    assert_eq!(signatures.operator_count, 0);
    assert_eq!(signatures.description.as_deref(), Some("sporenet test fixture"));

    assert_eq!(signatures.input.name, "serving_default_input:0");
    assert_eq!(signatures.input.shape, vec![1, 28, 28, 1]);
    assert_eq!(signatures.input.element_type, ElementType::Int8);
    assert_eq!(signatures.input.element_count(), Some(784));
    assert_eq!(signatures.output.shape, vec![1, 10]);
    assert_eq!(signatures.output.element_type, ElementType::Int8);
}

#[test]
fn test_inspect_float_model() {
    let binary = build_tflite(&[1, 3, 224, 224], &[1, 1000], tensor_type::FLOAT32, 64);
    let signatures = ArtifactInspector::inspect(&binary).unwrap();
    assert!(signatures.input.element_type.is_floating_point());
    assert!(!signatures.input.element_type.is_integer_8bit());
    assert_eq!(signatures.output.element_count(), Some(1000));
}

#[test]
fn test_inspect_rejects_wrong_identifier() {
    let mut binary = build_tflite(&[1, 4], &[1, 2], tensor_type::FLOAT32, 0);
    binary[4..8].copy_from_slice(b"XXXX");
    let err = ArtifactInspector::inspect(&binary).unwrap_err();
    assert!(matches!(err, SporeError::ArtifactInvalid { .. }));
    assert!(err.to_string().contains("identifier"));
}

#[test]
fn test_inspect_rejects_truncated_binary() {
    let binary = build_tflite(&[1, 4], &[1, 2], tensor_type::FLOAT32, 128);
    let err = ArtifactInspector::inspect(&binary[..binary.len() / 3]).unwrap_err();
    assert!(matches!(err, SporeError::ArtifactInvalid { .. }));
}

#[test]
fn test_inspect_rejects_unknown_tensor_type() {
    let binary = build_tflite(&[1, 4], &[1, 2], 99, 0);
    let err = ArtifactInspector::inspect(&binary).unwrap_err();
    assert!(matches!(err, SporeError::ArtifactInvalid { .. }));
}

#[test]
fn test_inspect_rejects_structurally_empty_models() {
    let cases = [
        (Missing::Subgraphs, "model has no subgraphs"),
        (Missing::Tensors, "subgraph declares no tensors"),
        (Missing::Inputs, "subgraph declares no inputs"),
        (Missing::Outputs, "subgraph declares no outputs"),
    ];
    for (missing, message) in cases {
        let binary = build_incomplete_tflite(missing);
        let err = ArtifactInspector::inspect(&binary).unwrap_err();
        assert!(
            matches!(err, SporeError::ArtifactInvalid { .. }),
            "{missing:?}: {err}"
        );
        assert!(err.to_string().contains(message), "{missing:?}: {err}");
        assert_eq!(err.exit_code(), 6);
    }
}

#[test]
fn test_inspect_rejects_shape_too_large_to_count() {
    let huge = [i32::MAX, i32::MAX, i32::MAX];
    let binary = build_tflite(&huge, &[1, 10], tensor_type::INT8, 0);
    let err = ArtifactInspector::inspect(&binary).unwrap_err();
    assert!(matches!(err, SporeError::ArtifactInvalid { .. }));
    assert!(err.to_string().contains("too many elements"));

    assert!(ConversionResult::from_binary(binary, QuantizationMode::Integer8Bit, 1).is_err());
}

#[test]
fn test_summary_reports_dynamic_batch_per_sample() {
    let binary = build_tflite(&[-1, 28, 28, 1], &[-1, 10], tensor_type::INT8, 16);
    let result = ConversionResult::from_binary(binary, QuantizationMode::Integer8Bit, 1).unwrap();

    assert_eq!(result.input_signature.element_count(), None);
    let summary = result.summary();
    assert!(summary.contains("Input shape: [-1, 28, 28, 1] (784 elements per sample)"));
    assert!(summary.contains("Output shape: [-1, 10] (10 elements per sample)"));
    assert!(!summary.contains("(0 elements)"));
}

#[test]
fn test_emitted_source_carries_model_bytes() {
    let binary = build_tflite(&[1, 28, 28, 1], &[1, 10], tensor_type::INT8, 100);
    let source = emit_as_source(&binary, "sporenet_model_data");

    assert!(source.starts_with(&format!("// Model size: {} bytes\n", binary.len())));
    assert!(source.contains(&format!("const int sporenet_model_data_len = {};", binary.len())));
    assert_eq!(parse_source_bytes(&source).unwrap(), binary);
}

#[test]
fn test_header_written_beside_output() {
    let temp = TempDir::new().unwrap();
    let output = temp.path().join("mnist.tflite");
    let binary = build_tflite(&[1, 28, 28, 1], &[1, 10], tensor_type::INT8, 32);

    let header = write_header_beside(&output, &binary, "mnist_model").unwrap();
    assert_eq!(header, temp.path().join("mnist.h"));

    let text = std::fs::read_to_string(&header).unwrap();
    assert!(text.contains("#ifndef MNIST_MODEL_H"));
    assert!(text.contains("extern const unsigned char mnist_model[];"));
    assert_eq!(parse_source_bytes(&text).unwrap(), binary);
}
