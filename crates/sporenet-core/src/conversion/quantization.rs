//! Quantization planning and representative calibration data.
//!
//! The plan is derived from the loaded model's declared input shape: full
//! integer quantization needs calibration samples shaped like the real
//! input, so a model without a usable shape only gets the default
//! (dynamic-range) optimization.

use std::io::{BufWriter, Write};
use std::path::Path;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::types::QuantizationMode;
use crate::config::ConverterConfig;
use crate::error::{IoResultExt, Result};

/// Optimization settings handed to a converter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizationPlan {
    pub enabled: bool,
    pub mode: QuantizationMode,
    /// Input shape without the batch dimension (only for `Integer8Bit`).
    #[serde(default)]
    pub representative_input_shape: Option<Vec<i64>>,
    #[serde(default)]
    pub sample_count: usize,
}

impl QuantizationPlan {
    /// Plain float conversion; also the fallback plan after a failed attempt.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            mode: QuantizationMode::None,
            representative_input_shape: None,
            sample_count: 0,
        }
    }

    /// Calibration samples for this plan, if it calls for integer quantization.
    pub fn representative_dataset(&self) -> Option<RepresentativeDataset> {
        match (&self.mode, &self.representative_input_shape) {
            (QuantizationMode::Integer8Bit, Some(shape)) => Some(RepresentativeDataset::new(
                shape.clone(),
                self.sample_count,
                ConverterConfig::REPRESENTATIVE_SEED,
            )),
            _ => None,
        }
    }
}

/// Decide optimization settings for a model.
///
/// `model_input_shape` includes the batch dimension; dynamic dimensions are
/// negative. The batch dimension is stripped from the representative shape.
pub fn plan(model_input_shape: Option<&[i64]>, quantize_requested: bool) -> QuantizationPlan {
    if !quantize_requested {
        return QuantizationPlan::disabled();
    }

    match model_input_shape.and_then(usable_sample_shape) {
        Some(sample_shape) => QuantizationPlan {
            enabled: true,
            mode: QuantizationMode::Integer8Bit,
            representative_input_shape: Some(sample_shape),
            sample_count: ConverterConfig::REPRESENTATIVE_SAMPLE_COUNT,
        },
        None => QuantizationPlan {
            enabled: true,
            mode: QuantizationMode::DefaultOptimize,
            representative_input_shape: None,
            sample_count: 0,
        },
    }
}

/// The per-sample shape, if every non-batch dimension is concrete and one
/// sample's element count fits in memory.
fn usable_sample_shape(shape: &[i64]) -> Option<Vec<i64>> {
    let (_batch, sample) = shape.split_first()?;
    if sample.is_empty() || sample.iter().any(|dim| *dim <= 0) {
        return None;
    }
    checked_elements(sample)?;
    Some(sample.to_vec())
}

fn checked_elements(shape: &[i64]) -> Option<usize> {
    shape.iter().try_fold(1usize, |count, dim| {
        usize::try_from(*dim).ok().and_then(|dim| count.checked_mul(dim))
    })
}

/// A finite, lazily generated set of uniform `[0, 1)` float32 input tensors.
///
/// Each call to [`iter`](Self::iter) restarts the sequence from the same seed,
/// so a converter retry sees identical calibration data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepresentativeDataset {
    sample_shape: Vec<i64>,
    sample_count: usize,
    seed: u64,
}

impl RepresentativeDataset {
    pub fn new(sample_shape: Vec<i64>, sample_count: usize, seed: u64) -> Self {
        Self {
            sample_shape,
            sample_count,
            seed,
        }
    }

    /// Shape of one draw, batch dimension of 1 included.
    pub fn tensor_shape(&self) -> Vec<i64> {
        std::iter::once(1).chain(self.sample_shape.iter().copied()).collect()
    }

    pub fn sample_shape(&self) -> &[i64] {
        &self.sample_shape
    }

    pub fn len(&self) -> usize {
        self.sample_count
    }

    pub fn is_empty(&self) -> bool {
        self.sample_count == 0
    }

    /// Number of float32 values in one draw.
    ///
    /// Zero when the shape has a negative dimension or its element count
    /// overflows `usize`; plans never carry such shapes.
    pub fn sample_elements(&self) -> usize {
        checked_elements(&self.sample_shape).unwrap_or(0)
    }

    pub fn iter(&self) -> RepresentativeSamples {
        RepresentativeSamples {
            rng: StdRng::seed_from_u64(self.seed),
            remaining: self.sample_count,
            sample_elements: self.sample_elements(),
        }
    }

    /// Stream every draw to `path` as little-endian float32 values.
    ///
    /// Returns the number of samples written.
    pub fn write_f32_le(&self, path: &Path) -> Result<usize> {
        let file = std::fs::File::create(path).with_path(path)?;
        let mut writer = BufWriter::new(file);
        let mut written = 0;
        for sample in self.iter() {
            for value in sample {
                writer.write_all(&value.to_le_bytes()).with_path(path)?;
            }
            written += 1;
        }
        writer.flush().with_path(path)?;
        Ok(written)
    }
}

impl<'a> IntoIterator for &'a RepresentativeDataset {
    type Item = Vec<f32>;
    type IntoIter = RepresentativeSamples;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over representative samples; each item is one flattened tensor.
pub struct RepresentativeSamples {
    rng: StdRng,
    remaining: usize,
    sample_elements: usize,
}

impl Iterator for RepresentativeSamples {
    type Item = Vec<f32>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(
            (0..self.sample_elements)
                .map(|_| self.rng.random::<f32>())
                .collect(),
        )
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl ExactSizeIterator for RepresentativeSamples {}
