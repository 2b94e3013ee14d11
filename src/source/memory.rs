use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::data::ChannelSpec;
use crate::errors::ExampleError;
use crate::labels::FrontTable;
use crate::source::{FrontSource, PredictorGrid, PredictorSource};
use crate::times::format_time;
use crate::types::UnixSeconds;

fn keyed_path(root: &Path, prefix: &str, valid_time: UnixSeconds) -> Result<PathBuf, ExampleError> {
    Ok(root.join(format!("{prefix}_{}", format_time(valid_time)?)))
}

/// Predictor grids held in memory, addressed by synthetic per-time paths.
#[derive(Clone, Debug, Default)]
pub struct InMemoryPredictorSource {
    root: PathBuf,
    grids: HashMap<PathBuf, PredictorGrid>,
}

impl InMemoryPredictorSource {
    /// `root` only prefixes the synthetic paths.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            grids: HashMap::new(),
        }
    }

    /// Register the grid for `valid_time`, replacing any previous one.
    pub fn insert(&mut self, valid_time: UnixSeconds, grid: PredictorGrid) -> Result<(), ExampleError> {
        let path = keyed_path(&self.root, "predictors", valid_time)?;
        self.grids.insert(path, grid);
        Ok(())
    }

    /// Number of registered grids.
    pub fn len(&self) -> usize {
        self.grids.len()
    }

    /// Whether no grid is registered.
    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}

impl PredictorSource for InMemoryPredictorSource {
    fn find_file(&self, valid_time: UnixSeconds) -> Result<PathBuf, ExampleError> {
        let path = keyed_path(&self.root, "predictors", valid_time)?;
        if self.grids.contains_key(&path) {
            Ok(path)
        } else {
            Err(ExampleError::MissingResource {
                kind: "predictor",
                path,
            })
        }
    }

    fn read_file(
        &self,
        path: &Path,
        channels: &ChannelSpec,
    ) -> Result<PredictorGrid, ExampleError> {
        self.grids
            .get(path)
            .ok_or_else(|| ExampleError::MissingResource {
                kind: "predictor",
                path: path.to_path_buf(),
            })?
            .select_channels(channels)
    }
}

/// Front tables held in memory, addressed like [`InMemoryPredictorSource`].
#[derive(Clone, Debug, Default)]
pub struct InMemoryFrontSource {
    root: PathBuf,
    tables: HashMap<PathBuf, FrontTable>,
}

impl InMemoryFrontSource {
    /// `root` only prefixes the synthetic paths.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tables: HashMap::new(),
        }
    }

    /// Register the front table for `valid_time`, replacing any previous one.
    pub fn insert(&mut self, valid_time: UnixSeconds, table: FrontTable) -> Result<(), ExampleError> {
        let path = keyed_path(&self.root, "fronts", valid_time)?;
        self.tables.insert(path, table);
        Ok(())
    }
}

impl FrontSource for InMemoryFrontSource {
    fn find_gridded_file(&self, valid_time: UnixSeconds) -> Option<PathBuf> {
        let path = keyed_path(&self.root, "fronts", valid_time).ok()?;
        self.tables.contains_key(&path).then_some(path)
    }

    fn read_grid(&self, path: &Path) -> Result<FrontTable, ExampleError> {
        self.tables
            .get(path)
            .cloned()
            .ok_or_else(|| ExampleError::MissingResource {
                kind: "front label",
                path: path.to_path_buf(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Channel;
    use ndarray::Array3;

    #[test]
    fn paths_are_keyed_by_formatted_time() {
        let channels = ChannelSpec::new(vec![Channel::new("t", 850)]).unwrap();
        let mut source = InMemoryPredictorSource::new("/narr");
        source
            .insert(
                1_199_145_600,
                PredictorGrid::new(Array3::zeros((2, 2, 1)), channels.clone()).unwrap(),
            )
            .unwrap();
        let path = source.find_file(1_199_145_600).unwrap();
        assert_eq!(path, PathBuf::from("/narr/predictors_2008010100"));
        assert_eq!(source.read_file(&path, &channels).unwrap().shape(), (2, 2));
        assert!(source.find_file(1_199_145_600 + 10_800).is_err());
    }

    #[test]
    fn absent_front_table_is_none() {
        let mut source = InMemoryFrontSource::new("/fronts");
        source.insert(0, FrontTable::default()).unwrap();
        assert!(source.find_gridded_file(0).is_some());
        assert!(source.find_gridded_file(10_800).is_none());
    }
}
