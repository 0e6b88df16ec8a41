//! Intermediate artifacts written beside the requested output.
//!
//! PyTorch and ONNX conversions stage an ONNX file or a SavedModel directory
//! next to the output path. Each one is owned by an [`IntermediateArtifact`]
//! guard that deletes it on drop, so every exit path of a conversion cleans
//! up after itself.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::config::PathsConfig;
use crate::error::{IoResultExt, Result};

/// Derives intermediate paths from the requested output path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScratchSpace {
    dir: PathBuf,
    stem: String,
}

impl ScratchSpace {
    /// Scratch space beside `output_path`.
    pub fn beside(output_path: &Path) -> Self {
        let dir = output_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let stem = output_path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "model".to_string());
        Self { dir, stem }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// `<stem>.intermediate.onnx`
    pub fn onnx_path(&self) -> PathBuf {
        self.dir
            .join(format!("{}{}", self.stem, PathsConfig::INTERMEDIATE_ONNX_SUFFIX))
    }

    /// `<stem>_tf_model/`
    pub fn saved_model_dir(&self) -> PathBuf {
        self.dir.join(format!(
            "{}{}",
            self.stem,
            PathsConfig::INTERMEDIATE_SAVED_MODEL_SUFFIX
        ))
    }

    /// Make sure the scratch directory exists.
    pub fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).with_path(&self.dir)
    }
}

/// An intermediate file or directory that is deleted when dropped.
#[derive(Debug)]
pub struct IntermediateArtifact {
    path: PathBuf,
}

impl IntermediateArtifact {
    /// Claim `path`, removing anything a previous run left there.
    pub fn claim(path: PathBuf) -> Result<Self> {
        if path.exists() {
            debug!("Removing stale intermediate {}", path.display());
            remove_path(&path).with_path(&path)?;
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IntermediateArtifact {
    fn drop(&mut self) {
        if !self.path.exists() {
            return;
        }
        match remove_path(&self.path) {
            Ok(()) => debug!("Removed intermediate {}", self.path.display()),
            Err(e) => warn!(
                "Failed to remove intermediate {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_paths_beside_output() {
        let scratch = ScratchSpace::beside(Path::new("/work/out/net.tflite"));
        assert_eq!(scratch.onnx_path(), PathBuf::from("/work/out/net.intermediate.onnx"));
        assert_eq!(scratch.saved_model_dir(), PathBuf::from("/work/out/net_tf_model"));
    }

    #[test]
    fn test_bare_file_name_uses_current_dir() {
        let scratch = ScratchSpace::beside(Path::new("converted_model.tflite"));
        assert_eq!(scratch.dir(), Path::new("."));
        assert_eq!(
            scratch.saved_model_dir(),
            PathBuf::from("./converted_model_tf_model")
        );
    }

    #[test]
    fn test_guard_removes_file_and_dir() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.onnx");
        let dir = temp.path().join("a_tf_model");

        {
            let file_guard = IntermediateArtifact::claim(file.clone()).unwrap();
            let dir_guard = IntermediateArtifact::claim(dir.clone()).unwrap();
            std::fs::write(file_guard.path(), b"onnx").unwrap();
            std::fs::create_dir_all(dir_guard.path().join("variables")).unwrap();
            std::fs::write(dir_guard.path().join("saved_model.pb"), b"pb").unwrap();
        }

        assert!(!file.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn test_claim_clears_stale_leftovers() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("old_tf_model");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("stale.pb"), b"old").unwrap();

        let guard = IntermediateArtifact::claim(dir.clone()).unwrap();
        assert!(!dir.exists());
        drop(guard);
        assert!(!dir.exists());
    }

    #[test]
    fn test_guard_tolerates_never_created_path() {
        let temp = TempDir::new().unwrap();
        let guard = IntermediateArtifact::claim(temp.path().join("never")).unwrap();
        drop(guard);
    }
}
