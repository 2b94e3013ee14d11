use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use ndarray::Array2;
use serde::Deserialize;
use tracing::info;

use crate::errors::ExampleError;

/// Supplies the static full-grid orography (metres above sea level) used to
/// synthesize the surface-height channel.
pub trait ReferenceGridProvider: Send + Sync {
    /// Full-grid surface height in metres, M-by-N.
    fn orography(&self) -> Result<&Array2<f32>, ExampleError>;
}

/// Provider holding a grid that is already in memory.
#[derive(Clone, Debug)]
pub struct StaticReferenceGrid {
    grid: Array2<f32>,
}

impl StaticReferenceGrid {
    /// Serve `grid` as the orography.
    pub fn new(grid: Array2<f32>) -> Self {
        Self { grid }
    }
}

impl ReferenceGridProvider for StaticReferenceGrid {
    fn orography(&self) -> Result<&Array2<f32>, ExampleError> {
        Ok(&self.grid)
    }
}

type GridLoader = Box<dyn Fn() -> Result<Array2<f32>, ExampleError> + Send + Sync>;

/// Provider that runs its loader on first use and keeps the result for its
/// own lifetime.
pub struct LazyReferenceGrid {
    loader: GridLoader,
    grid: OnceLock<Array2<f32>>,
}

#[derive(Deserialize)]
struct GridFile {
    rows: usize,
    columns: usize,
    values: Vec<f32>,
}

impl LazyReferenceGrid {
    /// Wrap a loader; it runs at most once.
    pub fn new(
        loader: impl Fn() -> Result<Array2<f32>, ExampleError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            loader: Box::new(loader),
            grid: OnceLock::new(),
        }
    }

    /// Lazily read a JSON grid file `{"rows", "columns", "values"}` (row-major).
    pub fn from_json_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self::new(move || read_grid_file(&path))
    }

    /// Whether the loader has already run.
    pub fn is_loaded(&self) -> bool {
        self.grid.get().is_some()
    }
}

impl ReferenceGridProvider for LazyReferenceGrid {
    fn orography(&self) -> Result<&Array2<f32>, ExampleError> {
        if let Some(grid) = self.grid.get() {
            return Ok(grid);
        }
        let loaded = (self.loader)()?;
        Ok(self.grid.get_or_init(|| loaded))
    }
}

fn read_grid_file(path: &Path) -> Result<Array2<f32>, ExampleError> {
    if !path.is_file() {
        return Err(ExampleError::MissingResource {
            kind: "reference orography",
            path: path.to_path_buf(),
        });
    }
    info!("[frontgen:reference] reading orography from {}", path.display());
    let raw = fs::read_to_string(path)?;
    let file: GridFile = serde_json::from_str(&raw).map_err(|err| {
        ExampleError::Configuration(format!("invalid orography file {}: {err}", path.display()))
    })?;
    Array2::from_shape_vec((file.rows, file.columns), file.values)
        .map_err(|err| ExampleError::Configuration(format!("orography grid shape: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[test]
    fn lazy_grid_loads_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let provider = LazyReferenceGrid::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Array2::from_elem((2, 3), 100.0))
        });
        assert!(!provider.is_loaded());
        assert_eq!(provider.orography().unwrap().dim(), (2, 3));
        assert_eq!(provider.orography().unwrap()[[1, 2]], 100.0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn json_grid_file_is_row_major() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("orography.json");
        fs::write(&path, r#"{"rows": 2, "columns": 2, "values": [1, 2, 3, 4]}"#).unwrap();
        let provider = LazyReferenceGrid::from_json_file(&path);
        assert_eq!(provider.orography().unwrap()[[1, 0]], 3.0);
    }

    #[test]
    fn missing_grid_file_surfaces_on_first_use() {
        let dir = tempdir().unwrap();
        let provider = LazyReferenceGrid::from_json_file(dir.path().join("absent.json"));
        assert!(matches!(
            provider.orography(),
            Err(ExampleError::MissingResource { .. })
        ));
    }
}
