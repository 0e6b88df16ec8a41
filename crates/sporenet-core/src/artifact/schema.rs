//! TFLite schema constants: file identifier, vtable offsets and tensor types.
//!
//! VTable offsets follow the flatbuffers convention `4 + 2 * field_index`
//! and match `tensorflow/lite/schema/schema.fbs`.

/// File identifier stored at bytes 4..8 of every TFLite model.
pub const TFLITE_FILE_ID: &str = "TFL3";

/// VTable offsets for the tables the inspector walks.
pub mod vt {
    pub mod model {
        pub const VERSION: u16 = 4;
        pub const OPERATOR_CODES: u16 = 6;
        pub const SUBGRAPHS: u16 = 8;
        pub const DESCRIPTION: u16 = 10;
        pub const BUFFERS: u16 = 12;
    }

    pub mod sub_graph {
        pub const TENSORS: u16 = 4;
        pub const INPUTS: u16 = 6;
        pub const OUTPUTS: u16 = 8;
        pub const OPERATORS: u16 = 10;
        pub const NAME: u16 = 12;
    }

    pub mod tensor {
        pub const SHAPE: u16 = 4;
        pub const TYPE: u16 = 6;
        pub const BUFFER: u16 = 8;
        pub const NAME: u16 = 10;
        pub const QUANTIZATION: u16 = 12;
    }

    pub mod buffer {
        pub const DATA: u16 = 4;
    }
}

/// `TensorType` enum values.
pub mod tensor_type {
    pub const FLOAT32: i8 = 0;
    pub const FLOAT16: i8 = 1;
    pub const INT32: i8 = 2;
    pub const UINT8: i8 = 3;
    pub const INT64: i8 = 4;
    pub const STRING: i8 = 5;
    pub const BOOL: i8 = 6;
    pub const INT16: i8 = 7;
    pub const COMPLEX64: i8 = 8;
    pub const INT8: i8 = 9;
    pub const FLOAT64: i8 = 10;
    pub const COMPLEX128: i8 = 11;
    pub const UINT64: i8 = 12;
    pub const RESOURCE: i8 = 13;
    pub const VARIANT: i8 = 14;
    pub const UINT32: i8 = 15;
    pub const UINT16: i8 = 16;
    pub const INT4: i8 = 17;
}
