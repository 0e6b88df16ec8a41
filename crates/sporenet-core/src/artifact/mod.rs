//! Embedded-inference artifacts: inspection of produced TFLite binaries and
//! rendering them as C source for firmware builds.

mod emit;
mod flatbuffer;
mod inspect;
pub mod schema;

pub use emit::{
    emit_as_source, emit_header, is_valid_symbol, parse_source_bytes, write_header_beside,
};
pub use inspect::{ArtifactInspector, ArtifactSignatures, ElementType, TensorSignature};
