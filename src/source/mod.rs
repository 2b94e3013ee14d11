//! Upstream data interfaces.
//!
//! Ownership model:
//! - `PredictorSource` locates and reads the full-grid predictor fields for a
//!   valid time. A missing predictor file is a hard error.
//! - `FrontSource` locates and reads gridded front labels. A missing label file
//!   is an expected gap and reported as `None` so callers can skip the time.

use std::path::{Path, PathBuf};

use ndarray::{Array3, Axis};
use tracing::{info, warn};

use crate::data::ChannelSpec;
use crate::errors::ExampleError;
use crate::labels::FrontTable;
use crate::types::UnixSeconds;

/// JSON-file backed sources laid out under one root directory.
pub mod json_dir;
/// In-memory sources used by tests and demos.
pub mod memory;

pub use json_dir::JsonGridDirectory;
pub use memory::{InMemoryFrontSource, InMemoryPredictorSource};

/// Predictor fields of one valid time on the full grid.
#[derive(Clone, Debug, PartialEq)]
pub struct PredictorGrid {
    /// M-by-N-by-C values, last axis ordered as `channels`.
    pub values: Array3<f32>,
    /// Channel of each slice along the last axis.
    pub channels: ChannelSpec,
}

impl PredictorGrid {
    /// Fails when the channel axis does not match `channels`.
    pub fn new(values: Array3<f32>, channels: ChannelSpec) -> Result<Self, ExampleError> {
        if values.len_of(Axis(2)) != channels.len() {
            return Err(ExampleError::Configuration(format!(
                "predictor grid has {} channels, spec lists {}",
                values.len_of(Axis(2)),
                channels.len()
            )));
        }
        Ok(Self { values, channels })
    }

    /// Grid size as (rows, columns).
    pub fn shape(&self) -> (usize, usize) {
        let (rows, columns, _) = self.values.dim();
        (rows, columns)
    }

    /// Keep (and reorder to) the requested channels.
    pub fn select_channels(&self, requested: &ChannelSpec) -> Result<Self, ExampleError> {
        let indices = self.channels.indices_of(requested)?;
        Ok(Self {
            values: self.values.select(Axis(2), &indices),
            channels: requested.clone(),
        })
    }
}

/// Source of full-grid predictor fields.
pub trait PredictorSource: Send + Sync {
    /// Path of the predictor file for `valid_time`.
    ///
    /// Returns `ExampleError::MissingResource` when the file does not exist.
    fn find_file(&self, valid_time: UnixSeconds) -> Result<PathBuf, ExampleError>;

    /// Read `channels` from a predictor file, in the requested order.
    fn read_file(&self, path: &Path, channels: &ChannelSpec)
    -> Result<PredictorGrid, ExampleError>;
}

/// Source of gridded front labels.
pub trait FrontSource: Send + Sync {
    /// Path of the label file for `valid_time`, or `None` if it is absent.
    fn find_gridded_file(&self, valid_time: UnixSeconds) -> Option<PathBuf>;

    /// Read the front table stored at `path`.
    fn read_grid(&self, path: &Path) -> Result<FrontTable, ExampleError>;
}

/// Predictors and labels of one valid time, read together.
#[derive(Clone, Debug)]
pub(crate) struct TimeStep {
    pub valid_time: UnixSeconds,
    pub predictors: PredictorGrid,
    pub fronts: FrontTable,
}

/// Read one valid time. Label files are looked up first: when one is
/// missing the time is skipped with a warning and `Ok(None)` is returned.
pub(crate) fn read_time_step(
    predictors: &dyn PredictorSource,
    fronts: &dyn FrontSource,
    valid_time: UnixSeconds,
    channels: &ChannelSpec,
) -> Result<Option<TimeStep>, ExampleError> {
    let Some(front_path) = fronts.find_gridded_file(valid_time) else {
        warn!("[frontgen:source] no front labels for valid time {valid_time}; skipping");
        return Ok(None);
    };
    let predictor_path = predictors.find_file(valid_time)?;
    info!("[frontgen:source] reading predictors from {}", predictor_path.display());
    let grid = predictors.read_file(&predictor_path, channels)?;
    info!("[frontgen:source] reading front labels from {}", front_path.display());
    let table = fronts.read_grid(&front_path)?;
    Ok(Some(TimeStep {
        valid_time,
        predictors: grid,
        fronts: table,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Channel;

    fn spec(names: &[&str]) -> ChannelSpec {
        ChannelSpec::new(names.iter().map(|name| Channel::new(*name, 850)).collect()).unwrap()
    }

    #[test]
    fn grid_rejects_channel_count_mismatch() {
        assert!(PredictorGrid::new(Array3::zeros((3, 3, 2)), spec(&["t"])).is_err());
    }

    #[test]
    fn select_channels_reorders_last_axis() {
        let values = Array3::from_shape_fn((2, 2, 2), |(_, _, k)| k as f32);
        let grid = PredictorGrid::new(values, spec(&["t", "u"])).unwrap();
        let picked = grid.select_channels(&spec(&["u"])).unwrap();
        assert!(picked.values.iter().all(|value| *value == 1.0));
        assert!(grid.select_channels(&spec(&["v"])).is_err());
    }

    #[test]
    fn missing_front_labels_skip_the_time() {
        let predictors = InMemoryPredictorSource::new("/data/predictors");
        let fronts = InMemoryFrontSource::new("/data/fronts");
        let step = read_time_step(&predictors, &fronts, 10_800, &spec(&["t"])).unwrap();
        assert!(step.is_none());
    }

    #[test]
    fn missing_predictors_are_fatal() {
        let predictors = InMemoryPredictorSource::new("/data/predictors");
        let mut fronts = InMemoryFrontSource::new("/data/fronts");
        fronts.insert(10_800, FrontTable::default()).unwrap();
        assert!(matches!(
            read_time_step(&predictors, &fronts, 10_800, &spec(&["t"])),
            Err(ExampleError::MissingResource { .. })
        ));
    }
}
