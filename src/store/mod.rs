//! Persisted example container.
//!
//! One store file is a SQLite database with two tables:
//! - `schema`: the file-level attributes, written once at creation.
//! - `examples`: one row per example with indexed metadata columns and a
//!   bitcode payload holding its tensors.
//!
//! A single writer may append at a time; concurrent appends to one file, or
//! reads racing an append, are not supported.

mod paths;
mod records;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use ndarray::{Array2, Array3, Array4, ArrayView1, ArrayView3, Axis, concatenate};
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, info};

pub use paths::{
    StoreRange, StoreSelector, example_file_path, find_example_file, find_many_example_files,
};

use crate::constants::store::SCHEMA_KEY;
use crate::data::{
    Channel, ChannelSpec, ExampleMetadata, ExampleSchema, ExampleSet, FrontClass,
    NormalizationParams, NormalizationType, class_indices,
};
use crate::errors::ExampleError;
use crate::ids::{ExampleId, find_example_ids};
use crate::normalization::{GlobalNormalization, normalize_global, normalize_nonglobal};
use crate::reference::ReferenceGridProvider;
use crate::sampling::TargetPoints;
use crate::types::{ExampleIdString, UnixSeconds};
use crate::windowing::window_around_points;
use records::{ExampleRecord, decode_example, decode_schema, encode_example, encode_schema};

const CREATE_TABLES: &str = "
    CREATE TABLE schema (
        key TEXT PRIMARY KEY,
        payload BLOB NOT NULL
    );
    CREATE TABLE examples (
        idx INTEGER PRIMARY KEY,
        valid_time INTEGER NOT NULL,
        row_index INTEGER NOT NULL,
        column_index INTEGER NOT NULL,
        class_index INTEGER NOT NULL,
        payload BLOB NOT NULL
    );
    CREATE INDEX examples_valid_time ON examples (valid_time);
";

/// What to read from a store file.
///
/// `ids` and `time_range` are alternative selections; when both are set the
/// ids win. Neither set means every example.
#[derive(Clone, Debug, Default)]
pub struct ReadOptions {
    /// Channels to keep, in the order wanted. The orography channel is
    /// synthesized (and placed last) when the file does not store it.
    pub channels: Option<ChannelSpec>,
    /// Smaller half-window to center-crop to.
    pub half_window: Option<(usize, usize)>,
    /// Inclusive valid-time range.
    pub time_range: Option<(UnixSeconds, UnixSeconds)>,
    /// Explicit identifiers; results follow this order. Every id must exist.
    pub ids: Option<Vec<ExampleIdString>>,
    /// Convert the stored normalization to these global z-score parameters.
    pub global_normalization: Option<Arc<GlobalNormalization>>,
}

impl ReadOptions {
    /// Keep and reorder to `channels`.
    pub fn with_channels(mut self, channels: ChannelSpec) -> Self {
        self.channels = Some(channels);
        self
    }

    /// Center-crop to a smaller half-window.
    pub fn with_half_window(mut self, half_rows: usize, half_columns: usize) -> Self {
        self.half_window = Some((half_rows, half_columns));
        self
    }

    /// Keep valid times in `first..=last`.
    pub fn with_time_range(mut self, first: UnixSeconds, last: UnixSeconds) -> Self {
        self.time_range = Some((first, last));
        self
    }

    /// Read exactly these ids, in this order.
    pub fn with_ids(mut self, ids: Vec<ExampleIdString>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Renormalize with dataset-wide parameters.
    pub fn with_global_normalization(mut self, global: Arc<GlobalNormalization>) -> Self {
        self.global_normalization = Some(global);
        self
    }
}

#[derive(Clone, Debug)]
struct MetadataRow {
    idx: i64,
    valid_time: UnixSeconds,
    row: usize,
    column: usize,
}

impl MetadataRow {
    fn id_string(&self) -> Result<ExampleIdString, ExampleError> {
        Ok(ExampleId::new(self.valid_time, self.row, self.column)?.to_string())
    }
}

/// Handle on one example-store file.
pub struct ExampleStore {
    path: PathBuf,
    conn: Connection,
    schema: ExampleSchema,
    reference: Option<Arc<dyn ReferenceGridProvider>>,
}

impl ExampleStore {
    /// Create a new, empty store. Fails if `path` already exists.
    pub fn create(path: impl AsRef<Path>, schema: &ExampleSchema) -> Result<Self, ExampleError> {
        let path = path.as_ref();
        if path.exists() {
            return Err(ExampleError::Configuration(format!(
                "example store {} already exists",
                path.display()
            )));
        }
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        conn.execute(
            "INSERT INTO schema (key, payload) VALUES (?1, ?2)",
            params![SCHEMA_KEY, encode_schema(schema)?],
        )?;
        info!(
            "[frontgen:store] created {} ({} channels, {}x{} half-window)",
            path.display(),
            schema.channels.len(),
            schema.half_rows,
            schema.half_columns
        );
        Ok(Self {
            path: path.to_path_buf(),
            conn,
            schema: schema.clone(),
            reference: None,
        })
    }

    /// Open an existing store.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ExampleError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ExampleError::MissingResource {
                kind: "example store",
                path: path.to_path_buf(),
            });
        }
        let conn = Connection::open(path)?;
        let payload: Option<Vec<u8>> = conn
            .query_row(
                "SELECT payload FROM schema WHERE key = ?1",
                params![SCHEMA_KEY],
                |row| row.get(0),
            )
            .optional()?;
        let Some(payload) = payload else {
            return Err(ExampleError::Store(format!(
                "{} has no schema record",
                path.display()
            )));
        };
        Ok(Self {
            path: path.to_path_buf(),
            conn,
            schema: decode_schema(&payload)?,
            reference: None,
        })
    }

    /// Append `examples` to the store at `path`, creating it with their schema
    /// if it does not exist yet.
    pub fn create_or_append(
        path: impl AsRef<Path>,
        examples: &ExampleSet,
    ) -> Result<Self, ExampleError> {
        let path = path.as_ref();
        let mut store = if path.exists() {
            Self::open(path)?
        } else {
            Self::create(path, &examples.schema)?
        };
        store.append(examples)?;
        Ok(store)
    }

    /// Attach the provider used to synthesize the orography channel on read.
    pub fn with_reference_grid(mut self, reference: Arc<dyn ReferenceGridProvider>) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Path of the SQLite file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attributes recorded when the file was created.
    pub fn schema(&self) -> &ExampleSchema {
        &self.schema
    }

    /// Number of stored examples.
    pub fn len(&self) -> Result<usize, ExampleError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM examples", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Whether the store holds no examples.
    pub fn is_empty(&self) -> Result<bool, ExampleError> {
        Ok(self.len()? == 0)
    }

    /// Append examples after a strict schema check. Existing rows are never
    /// rewritten. Returns the number of rows added.
    pub fn append(&mut self, examples: &ExampleSet) -> Result<usize, ExampleError> {
        self.schema.check_matches(&examples.schema)?;
        let ids = examples.ids()?;
        let classes = class_indices(examples.targets.view());
        let start: i64 = self
            .conn
            .query_row("SELECT COALESCE(MAX(idx) + 1, 0) FROM examples", [], |row| {
                row.get(0)
            })?;

        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO examples (idx, valid_time, row_index, column_index, class_index, payload)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for (i, id) in ids.iter().enumerate() {
                let record = ExampleRecord::from_views(
                    examples.predictors.index_axis(Axis(0), i),
                    examples.targets.row(i),
                    examples.normalization.first.row(i),
                    examples.normalization.second.row(i),
                );
                insert.execute(params![
                    start + i as i64,
                    id.valid_time,
                    id.row as i64,
                    id.column as i64,
                    classes[i] as i64,
                    encode_example(&record),
                ])?;
            }
        }
        tx.commit()?;
        info!(
            "[frontgen:store] appended {} examples to {} (rows {}..{})",
            ids.len(),
            self.path.display(),
            start,
            start + ids.len() as i64
        );
        Ok(ids.len())
    }

    /// Identifier of every stored example, in storage order.
    pub fn all_ids(&self) -> Result<Vec<ExampleIdString>, ExampleError> {
        self.query_rows(None)?
            .iter()
            .map(MetadataRow::id_string)
            .collect()
    }

    /// Number of stored examples per class, read from the metadata columns.
    pub fn class_counts(&self) -> Result<Vec<usize>, ExampleError> {
        let mut counts = vec![0usize; self.schema.scheme.num_classes()];
        let mut stmt = self
            .conn
            .prepare("SELECT class_index, COUNT(*) FROM examples GROUP BY class_index")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (class, count) = row?;
            let slot = counts.get_mut(class as usize).ok_or_else(|| {
                ExampleError::Store(format!("stored class index {class} is out of range"))
            })?;
            *slot = count as usize;
        }
        Ok(counts)
    }

    /// Metadata of the selected examples, without touching tensor payloads.
    pub fn read_metadata(
        &self,
        options: &ReadOptions,
    ) -> Result<Option<ExampleMetadata>, ExampleError> {
        let Some(selected) = self.select_rows(options)? else {
            return Ok(None);
        };
        let mut schema = self.schema.clone();
        if let Some((half_rows, half_columns)) = options.half_window {
            self.check_crop(half_rows, half_columns)?;
            schema.half_rows = half_rows;
            schema.half_columns = half_columns;
        }
        if let Some(requested) = &options.channels {
            let (stored, synthesize) = self.split_requested(requested);
            let mut channels = match stored {
                Some(stored) => {
                    self.schema.channels.indices_of(&stored)?;
                    stored.channels().to_vec()
                }
                None => Vec::new(),
            };
            if synthesize {
                channels.push(Channel::orography());
            }
            schema.channels = ChannelSpec::new(channels)?;
        }
        if options.global_normalization.is_some() {
            schema.normalization = NormalizationType::ZScore;
        }
        Ok(Some(ExampleMetadata {
            schema,
            valid_times: selected.iter().map(|row| row.valid_time).collect(),
            rows: selected.iter().map(|row| row.row).collect(),
            columns: selected.iter().map(|row| row.column).collect(),
        }))
    }

    /// Read the selected examples with their tensors.
    ///
    /// Steps, in order: select rows, center-crop, keep requested channels,
    /// convert to global normalization, synthesize orography. Returns
    /// `Ok(None)` when the selection is empty.
    pub fn read(&self, options: &ReadOptions) -> Result<Option<ExampleSet>, ExampleError> {
        let Some(selected) = self.select_rows(options)? else {
            return Ok(None);
        };
        debug!(
            "[frontgen:store] reading {} examples from {}",
            selected.len(),
            self.path.display()
        );
        let mut set = self.load_payloads(&selected)?;

        if let Some((half_rows, half_columns)) = options.half_window {
            set = set.crop(half_rows, half_columns)?;
        }

        let (stored, synthesize) = match &options.channels {
            Some(requested) => self.split_requested(requested),
            None => (Some(set.schema.channels.clone()), false),
        };
        let global = options.global_normalization.as_deref();
        let keep_stored = stored.is_some();
        if let Some(stored) = stored {
            set = set.select_channels(&stored)?;
            if let Some(global) = global {
                let mut physical = set.denormalize()?;
                set.normalization = normalize_global(&mut physical, &set.schema.channels, global)?;
                set.predictors = physical;
                set.schema.normalization = NormalizationType::ZScore;
            }
        }
        if synthesize {
            set = self.add_orography(set, keep_stored, global)?;
        }
        Ok(Some(set))
    }

    fn split_requested(&self, requested: &ChannelSpec) -> (Option<ChannelSpec>, bool) {
        let synthesize =
            requested.contains_orography() && !self.schema.channels.contains_orography();
        if synthesize {
            (requested.without_orography(), true)
        } else {
            (Some(requested.clone()), false)
        }
    }

    fn check_crop(&self, half_rows: usize, half_columns: usize) -> Result<(), ExampleError> {
        if half_rows > self.schema.half_rows || half_columns > self.schema.half_columns {
            return Err(ExampleError::Configuration(format!(
                "requested half-window {half_rows}x{half_columns} exceeds stored {}x{}",
                self.schema.half_rows, self.schema.half_columns
            )));
        }
        Ok(())
    }

    fn query_rows(
        &self,
        time_range: Option<(UnixSeconds, UnixSeconds)>,
    ) -> Result<Vec<MetadataRow>, ExampleError> {
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<MetadataRow> {
            Ok(MetadataRow {
                idx: row.get(0)?,
                valid_time: row.get(1)?,
                row: row.get::<_, i64>(2)? as usize,
                column: row.get::<_, i64>(3)? as usize,
            })
        };
        let rows = match time_range {
            Some((first, last)) => {
                let mut stmt = self.conn.prepare(
                    "SELECT idx, valid_time, row_index, column_index FROM examples
                     WHERE valid_time BETWEEN ?1 AND ?2 ORDER BY idx",
                )?;
                stmt.query_map(params![first, last], map_row)?
                    .collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = self.conn.prepare(
                    "SELECT idx, valid_time, row_index, column_index FROM examples ORDER BY idx",
                )?;
                stmt.query_map([], map_row)?
                    .collect::<Result<Vec<_>, _>>()?
            }
        };
        Ok(rows)
    }

    fn select_rows(&self, options: &ReadOptions) -> Result<Option<Vec<MetadataRow>>, ExampleError> {
        let selected = if let Some(desired) = &options.ids {
            let all_rows = self.query_rows(None)?;
            let all_ids = all_rows
                .iter()
                .map(MetadataRow::id_string)
                .collect::<Result<Vec<_>, _>>()?;
            find_example_ids(&all_ids, desired, false)?
                .into_iter()
                .flatten()
                .map(|position| all_rows[position].clone())
                .collect()
        } else if let Some((first, last)) = options.time_range {
            if last < first {
                return Err(ExampleError::Configuration(format!(
                    "last time {last} precedes first time {first}"
                )));
            }
            self.query_rows(Some((first, last)))?
        } else {
            self.query_rows(None)?
        };
        if selected.is_empty() {
            return Ok(None);
        }
        Ok(Some(selected))
    }

    fn load_payloads(&self, selected: &[MetadataRow]) -> Result<ExampleSet, ExampleError> {
        let schema = &self.schema;
        let (window_rows, window_columns) = (schema.window_rows(), schema.window_columns());
        let num_channels = schema.channels.len();
        let num_classes = schema.scheme.num_classes();
        let num_examples = selected.len();

        let mut predictors = Array4::zeros((num_examples, window_rows, window_columns, num_channels));
        let mut targets = Array2::zeros((num_examples, num_classes));
        let mut first = Array2::zeros((num_examples, num_channels));
        let mut second = Array2::zeros((num_examples, num_channels));

        let mut stmt = self
            .conn
            .prepare("SELECT payload FROM examples WHERE idx = ?1")?;
        for (i, row) in selected.iter().enumerate() {
            let bytes: Vec<u8> = stmt.query_row(params![row.idx], |r| r.get(0))?;
            let record = decode_example(&bytes)?;
            if record.target.len() != num_classes
                || record.norm_first.len() != num_channels
                || record.norm_second.len() != num_channels
            {
                return Err(ExampleError::Store(format!(
                    "example {} in {} does not match the file schema",
                    row.idx,
                    self.path.display()
                )));
            }
            let window = ArrayView3::from_shape(
                (window_rows, window_columns, num_channels),
                record.predictors.as_slice(),
            )
            .map_err(|err| ExampleError::Store(format!("example {}: {err}", row.idx)))?;
            predictors.index_axis_mut(Axis(0), i).assign(&window);
            targets.row_mut(i).assign(&ArrayView1::from(record.target.as_slice()));
            first.row_mut(i).assign(&ArrayView1::from(record.norm_first.as_slice()));
            second.row_mut(i).assign(&ArrayView1::from(record.norm_second.as_slice()));
        }

        ExampleSet::new(
            schema.clone(),
            predictors,
            targets,
            selected.iter().map(|row| row.valid_time).collect(),
            selected.iter().map(|row| row.row).collect(),
            selected.iter().map(|row| row.column).collect(),
            NormalizationParams::new(schema.normalization, first, second)?,
        )
    }

    fn add_orography(
        &self,
        set: ExampleSet,
        keep_stored: bool,
        global: Option<&GlobalNormalization>,
    ) -> Result<ExampleSet, ExampleError> {
        let Some(reference) = &self.reference else {
            return Err(ExampleError::Configuration(format!(
                "orography requested from {} but no reference grid is attached",
                self.path.display()
            )));
        };
        let grid = reference.orography()?;
        if grid.dim() != self.schema.mask.shape() {
            return Err(ExampleError::Configuration(format!(
                "reference grid is {:?}, store grid is {:?}",
                grid.dim(),
                self.schema.mask.shape()
            )));
        }
        let (num_rows, num_columns) = grid.dim();
        let points = TargetPoints::single_time(set.rows.clone(), set.columns.clone());
        let dummy_targets = Array3::from_elem((1, num_rows, num_columns), FrontClass::NoFront);
        let full = grid.view().insert_axis(Axis(0)).insert_axis(Axis(3));
        let mut orography = window_around_points(
            full,
            dummy_targets.view(),
            set.schema.half_rows,
            set.schema.half_columns,
            &points,
        )?
        .predictors;

        let orography_spec = ChannelSpec::new(vec![Channel::orography()])?;
        let params = match global {
            Some(global) => normalize_global(&mut orography, &orography_spec, global)?,
            None => normalize_nonglobal(&mut orography, set.schema.normalization),
        };

        let mut schema = set.schema.clone();
        let (predictors, normalization) = if keep_stored {
            schema.channels = set.schema.channels.with_orography()?;
            let predictors = concatenate(Axis(3), &[set.predictors.view(), orography.view()])
                .map_err(|err| ExampleError::Configuration(err.to_string()))?;
            (predictors, set.normalization.append_channels(&params)?)
        } else {
            schema.channels = orography_spec;
            schema.normalization = params.kind;
            (orography, params)
        };
        ExampleSet::new(
            schema,
            predictors,
            set.targets,
            set.valid_times,
            set.rows,
            set.columns,
            normalization,
        )
    }
}

/// Read examples by id from the per-time store files under `directory`.
///
/// Ids are grouped by valid time, each group is read from the single-time file
/// for that time, and the result follows the order of `ids`. Selection fields
/// of `options` are ignored.
pub fn read_specific_examples_many_files(
    directory: &Path,
    ids: &[ExampleIdString],
    options: &ReadOptions,
    reference: Option<Arc<dyn ReferenceGridProvider>>,
) -> Result<Option<ExampleSet>, ExampleError> {
    let mut by_time: IndexMap<UnixSeconds, Vec<ExampleIdString>> = IndexMap::new();
    for text in ids {
        let id: ExampleId = text.parse()?;
        by_time.entry(id.valid_time).or_default().push(text.clone());
    }

    let mut parts = Vec::with_capacity(by_time.len());
    for (valid_time, group) in by_time {
        let path = find_example_file(
            directory,
            &StoreSelector::Times {
                first: valid_time,
                last: valid_time,
            },
        )?;
        info!("[frontgen:store] reading {} examples from {}", group.len(), path.display());
        let mut store = ExampleStore::open(&path)?;
        if let Some(reference) = &reference {
            store = store.with_reference_grid(Arc::clone(reference));
        }
        let group_options = ReadOptions {
            ids: Some(group),
            time_range: None,
            ..options.clone()
        };
        if let Some(part) = store.read(&group_options)? {
            parts.push(part);
        }
    }

    let Some(merged) = ExampleSet::concat(&parts)? else {
        return Ok(None);
    };
    let positions: HashMap<ExampleIdString, usize> = merged
        .ids()?
        .into_iter()
        .enumerate()
        .map(|(position, id)| (id.to_string(), position))
        .collect();
    let order = ids
        .iter()
        .map(|id| {
            positions.get(id).copied().ok_or_else(|| ExampleError::MissingIds {
                missing: vec![id.clone()],
                desired: ids.len(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    merged.subset(&order).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ClassScheme, ValidityMask, one_hot};
    use crate::reference::StaticReferenceGrid;
    use tempfile::tempdir;

    fn schema() -> ExampleSchema {
        ExampleSchema {
            channels: ChannelSpec::new(vec![Channel::new("t", 850), Channel::new("u", 850)])
                .unwrap(),
            dilation_distance_metres: 50_000.0,
            mask: ValidityMask::all_valid(8, 8),
            normalization: NormalizationType::MinMax,
            half_rows: 2,
            half_columns: 2,
            scheme: ClassScheme::Ternary,
        }
    }

    fn examples(valid_time: UnixSeconds, count: usize) -> ExampleSet {
        let schema = schema();
        let predictors = Array4::from_shape_fn((count, 5, 5, 2), |(e, r, c, k)| {
            (e * 1000 + r * 10 + c) as f32 / 10_000.0 + k as f32
        });
        let classes: Vec<FrontClass> = (0..count)
            .map(|i| [FrontClass::NoFront, FrontClass::WarmFront, FrontClass::ColdFront][i % 3])
            .collect();
        ExampleSet::new(
            schema,
            predictors,
            one_hot(&classes, ClassScheme::Ternary),
            vec![valid_time; count],
            (0..count).map(|i| 2 + i % 4).collect(),
            (0..count).map(|i| 2 + i / 4).collect(),
            NormalizationParams::new(
                NormalizationType::MinMax,
                Array2::from_elem((count, 2), 10.0),
                Array2::from_elem((count, 2), 20.0),
            )
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn create_refuses_existing_path() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.sqlite");
        ExampleStore::create(&path, &schema()).unwrap();
        assert!(ExampleStore::create(&path, &schema()).is_err());
    }

    #[test]
    fn open_missing_file_is_missing_resource() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            ExampleStore::open(dir.path().join("absent.sqlite")),
            Err(ExampleError::MissingResource { .. })
        ));
    }

    #[test]
    fn append_grows_and_counts_classes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.sqlite");
        let mut store = ExampleStore::create(&path, &schema()).unwrap();
        assert!(store.is_empty().unwrap());
        assert_eq!(store.append(&examples(10_800, 4)).unwrap(), 4);
        assert_eq!(store.append(&examples(21_600, 2)).unwrap(), 2);
        assert_eq!(store.len().unwrap(), 6);
        assert_eq!(store.class_counts().unwrap(), vec![3, 2, 1]);
    }

    #[test]
    fn metadata_read_respects_time_range_and_crop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.sqlite");
        let mut store = ExampleStore::create(&path, &schema()).unwrap();
        store.append(&examples(10_800, 3)).unwrap();
        store.append(&examples(21_600, 2)).unwrap();
        let metadata = store
            .read_metadata(&ReadOptions::default().with_time_range(20_000, 30_000).with_half_window(1, 1))
            .unwrap()
            .unwrap();
        assert_eq!(metadata.valid_times, vec![21_600, 21_600]);
        assert_eq!(metadata.schema.half_rows, 1);
        assert!(store
            .read_metadata(&ReadOptions::default().with_time_range(0, 10))
            .unwrap()
            .is_none());
        assert!(store
            .read_metadata(&ReadOptions::default().with_half_window(3, 1))
            .is_err());
    }

    #[test]
    fn orography_is_synthesized_last_and_normalized() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.sqlite");
        let mut store = ExampleStore::create(&path, &schema()).unwrap();
        store.append(&examples(10_800, 2)).unwrap();
        let grid = Array2::from_shape_fn((8, 8), |(r, c)| (r * 8 + c) as f32 * 10.0);
        let store = store.with_reference_grid(Arc::new(StaticReferenceGrid::new(grid)));
        let requested = ChannelSpec::new(vec![Channel::orography(), Channel::new("u", 850)]).unwrap();
        let set = store
            .read(&ReadOptions::default().with_channels(requested))
            .unwrap()
            .unwrap();
        assert_eq!(set.schema.channels.channels().last(), Some(&Channel::orography()));
        assert_eq!(set.predictors.dim(), (2, 5, 5, 2));
        // Min-max over the window: the top-left corner is the minimum.
        assert_eq!(set.predictors[[0, 0, 0, 1]], 0.0);
        assert_eq!(set.normalization.first[[0, 1]], 0.0);
        let physical = set.denormalize().unwrap();
        assert_eq!(physical[[0, 2, 2, 1]], 180.0);
    }

    #[test]
    fn orography_without_reference_grid_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.sqlite");
        let mut store = ExampleStore::create(&path, &schema()).unwrap();
        store.append(&examples(10_800, 1)).unwrap();
        let requested = ChannelSpec::new(vec![Channel::orography()]).unwrap();
        assert!(store
            .read(&ReadOptions::default().with_channels(requested))
            .is_err());
    }

    #[test]
    fn ids_take_precedence_over_time_range() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.sqlite");
        let mut store = ExampleStore::create(&path, &schema()).unwrap();
        store.append(&examples(10_800, 3)).unwrap();
        let ids = store.all_ids().unwrap();
        let set = store
            .read(
                &ReadOptions::default()
                    .with_time_range(50_000, 60_000)
                    .with_ids(vec![ids[2].clone(), ids[0].clone()]),
            )
            .unwrap()
            .unwrap();
        assert_eq!(set.rows, vec![4, 2]);
    }
}
