//! Error types for the SporeNet conversion pipeline.
//!
//! Every fatal condition a conversion request can hit maps to one variant
//! here, and every variant maps to a distinct process exit code so callers
//! (and shell scripts) can tell failures apart.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::conversion::{Dependency, SourceFormat};

/// Main error type for the conversion pipeline.
#[derive(Debug, Error)]
pub enum SporeError {
    // Request validation errors
    #[error("Model file not found: {}", path.display())]
    InputNotFound { path: PathBuf },

    #[error("Unsupported model format '{format}': {detail}")]
    UnsupportedFormat { format: String, detail: String },

    #[error("{dependency} is not available; {format} models are disabled")]
    DependencyUnavailable {
        format: SourceFormat,
        dependency: Dependency,
    },

    // Toolchain errors
    #[error("Conversion failed: {message}")]
    ConversionFailed { message: String },

    // Artifact errors
    #[error("Produced artifact is invalid: {reason}")]
    ArtifactInvalid { reason: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, SporeError>;

impl From<std::io::Error> for SporeError {
    fn from(err: std::io::Error) -> Self {
        SporeError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl SporeError {
    /// Create an IO error with a description of what was being done.
    pub fn io(action: &str, path: impl AsRef<Path>, err: std::io::Error) -> Self {
        SporeError::Io {
            message: format!("{action}: {err}"),
            path: Some(path.as_ref().to_path_buf()),
            source: Some(err),
        }
    }

    /// Shorthand for a toolchain failure carrying its cause.
    pub fn conversion_failed(message: impl Into<String>) -> Self {
        SporeError::ConversionFailed {
            message: message.into(),
        }
    }

    /// Shorthand for an unreadable or structurally broken artifact.
    pub fn artifact_invalid(reason: impl Into<String>) -> Self {
        SporeError::ArtifactInvalid {
            reason: reason.into(),
        }
    }

    /// Process exit code for this error.
    ///
    /// - 2: input not found
    /// - 3: unsupported format
    /// - 4: dependency unavailable
    /// - 5: conversion failed
    /// - 6: artifact invalid
    /// - 1: anything else
    pub fn exit_code(&self) -> u8 {
        match self {
            SporeError::InputNotFound { .. } => 2,
            SporeError::UnsupportedFormat { .. } => 3,
            SporeError::DependencyUnavailable { .. } => 4,
            SporeError::ConversionFailed { .. } => 5,
            SporeError::ArtifactInvalid { .. } => 6,
            SporeError::Io { .. } | SporeError::Other(_) => 1,
        }
    }

    /// Whether the fallback controller may degrade and retry after this error.
    ///
    /// Only failures raised by the external toolchain qualify; request
    /// validation and artifact errors are final.
    pub fn is_toolchain_failure(&self) -> bool {
        matches!(self, SporeError::ConversionFailed { .. })
    }
}

/// Attach a path to `std::io::Error` results.
pub trait IoResultExt<T> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_path(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|err| SporeError::Io {
            message: err.to_string(),
            path: Some(path.as_ref().to_path_buf()),
            source: Some(err),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SporeError::InputNotFound {
            path: PathBuf::from("/models/missing.h5"),
        };
        assert_eq!(err.to_string(), "Model file not found: /models/missing.h5");

        let err = SporeError::DependencyUnavailable {
            format: SourceFormat::PyTorch,
            dependency: Dependency::Torch,
        };
        assert_eq!(
            err.to_string(),
            "PyTorch is not available; pytorch models are disabled"
        );
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let errors = [
            SporeError::InputNotFound {
                path: PathBuf::from("x"),
            },
            SporeError::UnsupportedFormat {
                format: "caffe".into(),
                detail: "unknown".into(),
            },
            SporeError::DependencyUnavailable {
                format: SourceFormat::Onnx,
                dependency: Dependency::Onnx,
            },
            SporeError::conversion_failed("boom"),
            SporeError::artifact_invalid("empty"),
        ];
        let mut codes: Vec<u8> = errors.iter().map(SporeError::exit_code).collect();
        assert!(codes.iter().all(|c| *c > 1));
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_only_toolchain_failures_are_recoverable() {
        assert!(SporeError::conversion_failed("converter raised").is_toolchain_failure());
        assert!(!SporeError::artifact_invalid("no tensors").is_toolchain_failure());
        assert!(!SporeError::InputNotFound {
            path: PathBuf::from("x")
        }
        .is_toolchain_failure());
    }

    #[test]
    fn test_with_path_attaches_context() {
        let res: std::result::Result<(), std::io::Error> = Err(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        match res.with_path("/tmp/out.tflite") {
            Err(SporeError::Io { path, .. }) => {
                assert_eq!(path, Some(PathBuf::from("/tmp/out.tflite")))
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
