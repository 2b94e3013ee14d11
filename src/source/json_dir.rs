use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::data::{Channel, ChannelSpec};
use crate::errors::ExampleError;
use crate::labels::FrontTable;
use crate::source::{FrontSource, PredictorGrid, PredictorSource};
use crate::times::format_time;
use crate::types::UnixSeconds;

const PREDICTOR_DIR: &str = "predictors";
const FRONT_DIR: &str = "fronts";

#[derive(Serialize, Deserialize)]
struct PredictorFile {
    rows: usize,
    columns: usize,
    channels: Vec<Channel>,
    /// Row-major rows x columns x channels.
    values: Vec<f32>,
}

/// Directory of JSON grid files, one per valid time:
///
/// ```text
/// <root>/predictors/<yyyymm>/predictors_<yyyymmddHH>.json
/// <root>/fronts/<yyyymm>/frontal_grid_<yyyymmddHH>.json
/// ```
#[derive(Clone, Debug)]
pub struct JsonGridDirectory {
    root: PathBuf,
}

impl JsonGridDirectory {
    /// Directory rooted at `root`; nothing is read until a lookup.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where the predictor file for `valid_time` lives (whether or not it exists).
    pub fn predictor_path(&self, valid_time: UnixSeconds) -> Result<PathBuf, ExampleError> {
        self.time_path(PREDICTOR_DIR, "predictors", valid_time)
    }

    /// Where the front label file for `valid_time` lives.
    pub fn front_path(&self, valid_time: UnixSeconds) -> Result<PathBuf, ExampleError> {
        self.time_path(FRONT_DIR, "frontal_grid", valid_time)
    }

    fn time_path(
        &self,
        subdir: &str,
        prefix: &str,
        valid_time: UnixSeconds,
    ) -> Result<PathBuf, ExampleError> {
        let stamp = format_time(valid_time)?;
        Ok(self
            .root
            .join(subdir)
            .join(&stamp[..6])
            .join(format!("{prefix}_{stamp}.json")))
    }

    /// Write the predictor grid for `valid_time`, creating directories as needed.
    pub fn write_predictors(
        &self,
        valid_time: UnixSeconds,
        grid: &PredictorGrid,
    ) -> Result<PathBuf, ExampleError> {
        let (rows, columns, _) = grid.values.dim();
        let file = PredictorFile {
            rows,
            columns,
            channels: grid.channels.channels().to_vec(),
            values: grid.values.iter().copied().collect(),
        };
        let path = self.predictor_path(valid_time)?;
        write_json(&path, &file)?;
        Ok(path)
    }

    /// Write the front table for `valid_time`.
    pub fn write_fronts(
        &self,
        valid_time: UnixSeconds,
        table: &FrontTable,
    ) -> Result<PathBuf, ExampleError> {
        let path = self.front_path(valid_time)?;
        write_json(&path, table)?;
        Ok(path)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ExampleError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_vec(value)
        .map_err(|err| ExampleError::Configuration(format!("{}: {err}", path.display())))?;
    fs::write(path, raw)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ExampleError> {
    let raw = fs::read(path)?;
    serde_json::from_slice(&raw)
        .map_err(|err| ExampleError::Configuration(format!("invalid grid file {}: {err}", path.display())))
}

impl PredictorSource for JsonGridDirectory {
    fn find_file(&self, valid_time: UnixSeconds) -> Result<PathBuf, ExampleError> {
        let path = self.predictor_path(valid_time)?;
        if !path.is_file() {
            return Err(ExampleError::MissingResource {
                kind: "predictor",
                path,
            });
        }
        Ok(path)
    }

    fn read_file(
        &self,
        path: &Path,
        channels: &ChannelSpec,
    ) -> Result<PredictorGrid, ExampleError> {
        debug!("[frontgen:json] decoding {}", path.display());
        let file: PredictorFile = read_json(path)?;
        let stored = ChannelSpec::new(file.channels)?;
        let values = Array3::from_shape_vec((file.rows, file.columns, stored.len()), file.values)
            .map_err(|err| {
                ExampleError::Configuration(format!("{}: {err}", path.display()))
            })?;
        PredictorGrid::new(values, stored)?.select_channels(channels)
    }
}

impl FrontSource for JsonGridDirectory {
    fn find_gridded_file(&self, valid_time: UnixSeconds) -> Option<PathBuf> {
        let path = self.front_path(valid_time).ok()?;
        path.is_file().then_some(path)
    }

    fn read_grid(&self, path: &Path) -> Result<FrontTable, ExampleError> {
        read_json(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn written_files_are_found_and_read_back() {
        let dir = tempdir().unwrap();
        let source = JsonGridDirectory::new(dir.path());
        let channels =
            ChannelSpec::new(vec![Channel::new("t", 850), Channel::new("u", 850)]).unwrap();
        let values = Array3::from_shape_fn((3, 4, 2), |(r, c, k)| (r * 10 + c + k * 100) as f32);
        let grid = PredictorGrid::new(values, channels).unwrap();
        let written = source.write_predictors(1_199_145_600, &grid).unwrap();
        assert!(written.ends_with("predictors/200801/predictors_2008010100.json"));

        let found = source.find_file(1_199_145_600).unwrap();
        let only_u = ChannelSpec::new(vec![Channel::new("u", 850)]).unwrap();
        let read = source.read_file(&found, &only_u).unwrap();
        assert_eq!(read.values[[2, 3, 0]], 123.0);

        let table = FrontTable {
            warm_cells: vec![(1, 1)],
            cold_cells: vec![(2, 3)],
        };
        source.write_fronts(1_199_145_600, &table).unwrap();
        let label_path = source.find_gridded_file(1_199_145_600).unwrap();
        assert_eq!(source.read_grid(&label_path).unwrap(), table);
        assert!(source.find_gridded_file(1_199_145_600 + 10_800).is_none());
    }
}
