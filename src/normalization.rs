//! Predictor scaling: per-time-step (non-global) min-max or z-score, the
//! inverse transform, and global z-score parameters loaded from JSON.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use ndarray::{Array2, Array4, ArrayViewMut2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{Channel, ChannelSpec, NormalizationParams, NormalizationType};
use crate::errors::ExampleError;
use crate::types::{FieldName, PressureMb};

/// Replace non-finite values in each (example, channel) image with the mean of
/// that image's finite values, or zero when the image has none.
pub fn fill_missing_values(predictors: &mut Array4<f32>) {
    for mut example in predictors.outer_iter_mut() {
        for mut image in example.axis_iter_mut(Axis(2)) {
            fill_image(image.view_mut());
        }
    }
}

fn fill_image(mut image: ArrayViewMut2<'_, f32>) {
    let (sum, count) = image
        .iter()
        .filter(|value| value.is_finite())
        .fold((0.0_f64, 0_usize), |(sum, count), value| {
            (sum + f64::from(*value), count + 1)
        });
    if count == image.len() {
        return;
    }
    let fill = if count == 0 {
        0.0
    } else {
        (sum / count as f64) as f32
    };
    image.mapv_inplace(|value| if value.is_finite() { value } else { fill });
}

/// Normalize every (example, channel) image by its own statistics.
/// Returns E-by-C parameters that [`denormalize`] inverts.
pub fn normalize_nonglobal(
    predictors: &mut Array4<f32>,
    kind: NormalizationType,
) -> NormalizationParams {
    let (num_examples, _, _, num_channels) = predictors.dim();
    let mut first = Array2::zeros((num_examples, num_channels));
    let mut second = Array2::zeros((num_examples, num_channels));
    for (example_index, mut example) in predictors.outer_iter_mut().enumerate() {
        for (channel, mut image) in example.axis_iter_mut(Axis(2)).enumerate() {
            let (a, b) = image_statistics(image.iter().copied(), kind);
            scale_in_place(image.view_mut(), kind, a, b);
            first[[example_index, channel]] = a;
            second[[example_index, channel]] = b;
        }
    }
    NormalizationParams {
        kind,
        first,
        second,
    }
}

fn image_statistics(values: impl Iterator<Item = f32> + Clone, kind: NormalizationType) -> (f32, f32) {
    match kind {
        NormalizationType::MinMax => {
            let (min, max) = values.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
            if min.is_finite() { (min, max) } else { (0.0, 0.0) }
        }
        NormalizationType::ZScore => {
            let (sum, count) = values
                .clone()
                .fold((0.0_f64, 0_usize), |(s, c), v| (s + f64::from(v), c + 1));
            if count == 0 {
                return (0.0, 0.0);
            }
            let mean = sum / count as f64;
            let variance = values
                .map(|v| (f64::from(v) - mean).powi(2))
                .sum::<f64>()
                / count as f64;
            (mean as f32, variance.sqrt() as f32)
        }
    }
}

fn scale_in_place(mut image: ArrayViewMut2<'_, f32>, kind: NormalizationType, a: f32, b: f32) {
    let denominator = match kind {
        NormalizationType::MinMax => b - a,
        NormalizationType::ZScore => b,
    };
    // Constant images map to zero; the stored params still invert exactly.
    let denominator = if denominator > 0.0 { denominator } else { 1.0 };
    image.mapv_inplace(|value| (value - a) / denominator);
}

/// Undo [`normalize_nonglobal`] or [`normalize_global`] using per-example params.
pub fn denormalize(
    predictors: &mut Array4<f32>,
    params: &NormalizationParams,
) -> Result<(), ExampleError> {
    let (num_examples, _, _, num_channels) = predictors.dim();
    if params.first.dim() != (num_examples, num_channels) {
        return Err(ExampleError::Configuration(format!(
            "normalization parameters have shape {:?}, predictors need ({num_examples}, {num_channels})",
            params.first.dim()
        )));
    }
    for (example_index, mut example) in predictors.outer_iter_mut().enumerate() {
        for (channel, mut image) in example.axis_iter_mut(Axis(2)).enumerate() {
            let a = params.first[[example_index, channel]];
            let b = params.second[[example_index, channel]];
            let scale = match params.kind {
                NormalizationType::MinMax if b - a > 0.0 => b - a,
                NormalizationType::ZScore if b > 0.0 => b,
                _ => 1.0,
            };
            image.mapv_inplace(|value| value * scale + a);
        }
    }
    Ok(())
}

/// One entry of a global normalization file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GlobalParamEntry {
    /// Predictor field name.
    pub field: FieldName,
    /// Pressure level in millibars.
    pub pressure_mb: PressureMb,
    /// Dataset-wide mean.
    pub mean: f32,
    /// Dataset-wide standard deviation.
    pub stdev: f32,
}

/// Dataset-wide z-score parameters keyed by channel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GlobalNormalization {
    entries: HashMap<Channel, (f32, f32)>,
}

#[derive(Serialize, Deserialize)]
struct GlobalNormalizationFile {
    entries: Vec<GlobalParamEntry>,
}

impl GlobalNormalization {
    /// Later entries for the same channel replace earlier ones.
    pub fn new(entries: impl IntoIterator<Item = GlobalParamEntry>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|entry| {
                    (
                        Channel::new(entry.field, entry.pressure_mb),
                        (entry.mean, entry.stdev),
                    )
                })
                .collect(),
        }
    }

    /// Read a JSON file of the form `{"entries": [{"field", "pressure_mb", "mean", "stdev"}]}`.
    pub fn from_json_file(path: &Path) -> Result<Self, ExampleError> {
        if !path.is_file() {
            return Err(ExampleError::MissingResource {
                kind: "global normalization",
                path: path.to_path_buf(),
            });
        }
        let raw = fs::read_to_string(path)?;
        let file: GlobalNormalizationFile = serde_json::from_str(&raw).map_err(|err| {
            ExampleError::Configuration(format!(
                "invalid normalization file {}: {err}",
                path.display()
            ))
        })?;
        debug!(
            "[frontgen:norm] loaded {} global parameters from {}",
            file.entries.len(),
            path.display()
        );
        Ok(Self::new(file.entries))
    }

    /// Write the same format [`GlobalNormalization::from_json_file`] reads.
    pub fn write_json_file(&self, path: &Path) -> Result<(), ExampleError> {
        let mut entries: Vec<GlobalParamEntry> = self
            .entries
            .iter()
            .map(|(channel, (mean, stdev))| GlobalParamEntry {
                field: channel.field.clone(),
                pressure_mb: channel.pressure_mb,
                mean: *mean,
                stdev: *stdev,
            })
            .collect();
        entries.sort_by(|a, b| {
            a.field
                .cmp(&b.field)
                .then_with(|| a.pressure_mb.cmp(&b.pressure_mb))
        });
        let raw = serde_json::to_string_pretty(&GlobalNormalizationFile { entries })
            .map_err(|err| ExampleError::Configuration(err.to_string()))?;
        fs::write(path, raw)?;
        Ok(())
    }

    /// `(mean, stdev)` for `channel`.
    pub fn params_for(&self, channel: &Channel) -> Result<(f32, f32), ExampleError> {
        self.entries.get(channel).copied().ok_or_else(|| {
            ExampleError::Configuration(format!(
                "global normalization has no parameters for {channel}"
            ))
        })
    }
}

/// Z-score every channel with dataset-wide parameters.
pub fn normalize_global(
    predictors: &mut Array4<f32>,
    channels: &ChannelSpec,
    global: &GlobalNormalization,
) -> Result<NormalizationParams, ExampleError> {
    let (num_examples, _, _, num_channels) = predictors.dim();
    if num_channels != channels.len() {
        return Err(ExampleError::Configuration(format!(
            "predictor tensor has {num_channels} channels, spec has {}",
            channels.len()
        )));
    }
    let per_channel = channels
        .iter()
        .map(|channel| global.params_for(channel))
        .collect::<Result<Vec<_>, _>>()?;
    for mut example in predictors.outer_iter_mut() {
        for (channel, mut image) in example.axis_iter_mut(Axis(2)).enumerate() {
            let (mean, stdev) = per_channel[channel];
            scale_in_place(image.view_mut(), NormalizationType::ZScore, mean, stdev);
        }
    }
    let first = Array2::from_shape_fn((num_examples, num_channels), |(_, c)| per_channel[c].0);
    let second = Array2::from_shape_fn((num_examples, num_channels), |(_, c)| per_channel[c].1);
    Ok(NormalizationParams {
        kind: NormalizationType::ZScore,
        first,
        second,
    })
}

/// How raw full-grid predictors are scaled before windowing.
#[derive(Clone, Debug)]
pub enum NormalizationMode {
    /// Per time step and channel, from the grid's own statistics.
    NonGlobal(NormalizationType),
    /// Z-score with dataset-wide parameters.
    Global(Arc<GlobalNormalization>),
}

impl Default for NormalizationMode {
    fn default() -> Self {
        NormalizationMode::NonGlobal(NormalizationType::ZScore)
    }
}

impl NormalizationMode {
    /// Normalization type recorded in the resulting schema.
    pub fn kind(&self) -> NormalizationType {
        match self {
            NormalizationMode::NonGlobal(kind) => *kind,
            NormalizationMode::Global(_) => NormalizationType::ZScore,
        }
    }

    /// Normalize `predictors` in place and return the parameters used.
    pub fn apply(
        &self,
        predictors: &mut Array4<f32>,
        channels: &ChannelSpec,
    ) -> Result<NormalizationParams, ExampleError> {
        match self {
            NormalizationMode::NonGlobal(kind) => Ok(normalize_nonglobal(predictors, *kind)),
            NormalizationMode::Global(global) => normalize_global(predictors, channels, global),
        }
    }
}
