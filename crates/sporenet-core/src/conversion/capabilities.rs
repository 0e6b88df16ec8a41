//! Registry of the external dependencies available at startup.
//!
//! Probed once and passed to the dispatcher; a missing optional dependency
//! disables only the formats that need it.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, warn};

use super::toolchain::Toolchain;
use super::types::{Dependency, SourceFormat};
use crate::error::{Result, SporeError};

/// The set of dependencies found importable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    available: BTreeSet<Dependency>,
}

/// One row of the capability report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatStatus {
    pub format: SourceFormat,
    pub enabled: bool,
    /// Dependencies this format is missing.
    pub missing: Vec<Dependency>,
}

impl Capabilities {
    /// Registry with exactly the given dependencies available.
    pub fn with_available(dependencies: impl IntoIterator<Item = Dependency>) -> Self {
        Self {
            available: dependencies.into_iter().collect(),
        }
    }

    /// Registry with every dependency available.
    pub fn all() -> Self {
        Self::with_available(Dependency::ALL)
    }

    /// Probe every dependency through `toolchain`.
    ///
    /// Missing dependencies are logged with the formats they disable.
    pub async fn probe(toolchain: &dyn Toolchain) -> Self {
        let mut available = Vec::new();
        for dependency in Dependency::ALL {
            if toolchain.dependency_available(dependency).await {
                available.push(dependency);
            }
        }
        let capabilities = Self::with_available(available);

        for dependency in Dependency::ALL {
            if capabilities.has(dependency) {
                continue;
            }
            let disabled: Vec<&str> = SourceFormat::ALL
                .iter()
                .filter(|format| format.required_dependencies().contains(&dependency))
                .map(SourceFormat::as_str)
                .collect();
            warn!(
                "{} not found ({}); disabled formats: {}",
                dependency,
                dependency.install_hint(),
                disabled.join(", ")
            );
        }
        info!(
            "Enabled formats: {}",
            capabilities
                .enabled_formats()
                .iter()
                .map(SourceFormat::as_str)
                .collect::<Vec<_>>()
                .join(", ")
        );
        capabilities
    }

    pub fn has(&self, dependency: Dependency) -> bool {
        self.available.contains(&dependency)
    }

    /// Check that every dependency of `format` is available.
    pub fn require(&self, format: SourceFormat) -> Result<()> {
        match self.first_missing(format) {
            Some(dependency) => Err(SporeError::DependencyUnavailable { format, dependency }),
            None => Ok(()),
        }
    }

    pub fn supports(&self, format: SourceFormat) -> bool {
        self.first_missing(format).is_none()
    }

    pub fn enabled_formats(&self) -> Vec<SourceFormat> {
        SourceFormat::ALL
            .into_iter()
            .filter(|format| self.supports(*format))
            .collect()
    }

    /// Per-format availability, for reporting.
    pub fn report(&self) -> Vec<FormatStatus> {
        SourceFormat::ALL
            .into_iter()
            .map(|format| {
                let missing: Vec<Dependency> = format
                    .required_dependencies()
                    .iter()
                    .copied()
                    .filter(|dependency| !self.has(*dependency))
                    .collect();
                FormatStatus {
                    format,
                    enabled: missing.is_empty(),
                    missing,
                }
            })
            .collect()
    }

    fn first_missing(&self, format: SourceFormat) -> Option<Dependency> {
        format
            .required_dependencies()
            .iter()
            .copied()
            .find(|dependency| !self.has(*dependency))
    }
}
