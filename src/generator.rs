//! Infinite, restartable batch producers.
//!
//! Each generator owns its cursor and buffer and is driven by explicit
//! [`next_batch`](ScratchBatchGenerator::next_batch) calls (or the
//! `Iterator` impl, which never returns `None`). Internally every generator
//! alternates between refilling its buffer and emitting a batch; unusable
//! time steps or files are skipped inside the refill loop. A whole pass over
//! the population without usable data ends in [`ExampleError::Exhausted`].
//! `restart` rewinds to the state right after construction, so the same seed
//! replays the same batches.

use std::path::PathBuf;
use std::sync::Arc;

use ndarray::{Array2, Array3, Array4, Axis, concatenate};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::augmentation::Augmenter;
use crate::config::{
    FullSizeGeneratorConfig, RowWindowConfig, ScratchGeneratorConfig, StoreGeneratorConfig,
};
use crate::constants::grid::TIME_INTERVAL_SECONDS;
use crate::constants::store::MAX_BATCH_NUMBER;
use crate::data::{ChannelSpec, ClassScheme, FrontClass, ValidityMask, class_indices, one_hot};
use crate::epoch::EpochCursor;
use crate::errors::ExampleError;
use crate::labels::labels_for_time;
use crate::metrics::class_counts;
use crate::normalization::{NormalizationMode, fill_missing_values};
use crate::reference::ReferenceGridProvider;
use crate::sampling::{ClassFractions, TargetPoints, sample_target_points};
use crate::source::{FrontSource, PredictorSource, read_time_step};
use crate::store::{ExampleStore, ReadOptions, StoreRange, find_many_example_files};
use crate::times::time_range;
use crate::types::UnixSeconds;
use crate::windowing::window_around_points;

/// Windowed predictors with one-hot targets.
#[derive(Clone, Debug, PartialEq)]
pub struct Batch {
    /// E-by-m-by-n-by-C.
    pub predictors: Array4<f32>,
    /// E-by-K.
    pub targets: Array2<f32>,
}

impl Batch {
    /// Number of examples.
    pub fn len(&self) -> usize {
        self.targets.nrows()
    }

    /// Whether the batch holds no examples.
    pub fn is_empty(&self) -> bool {
        self.targets.nrows() == 0
    }

    /// Examples per class, by argmax of the targets.
    pub fn class_counts(&self) -> Vec<usize> {
        class_counts(self.targets.view())
    }
}

/// Whole-grid predictors with per-cell one-hot targets.
#[derive(Clone, Debug, PartialEq)]
pub struct FullSizeBatch {
    /// T-by-M-by-N-by-C.
    pub predictors: Array4<f32>,
    /// T-by-M-by-N-by-K.
    pub targets: Array4<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    Refilling,
    BatchReady,
}

fn one_hot_f32(classes: &[FrontClass], scheme: ClassScheme) -> Array2<f32> {
    one_hot(classes, scheme).mapv(f32::from)
}

fn shape_error(err: ndarray::ShapeError) -> ExampleError {
    ExampleError::Configuration(format!("buffered arrays disagree in shape: {err}"))
}

fn valid_times(first: UnixSeconds, last: UnixSeconds) -> Result<Vec<UnixSeconds>, ExampleError> {
    time_range(first, last, TIME_INTERVAL_SECONDS)
}

/// One time step after missing-value fill, normalization, and labelling.
#[derive(Clone, Debug)]
struct LabelledGrid {
    /// 1-by-M-by-N-by-C.
    predictors: Array4<f32>,
    /// 1-by-M-by-N.
    labels: Array3<FrontClass>,
}

/// Reads and prepares full grids for the grid-based generators.
#[derive(Clone)]
struct GridReader {
    predictors: Arc<dyn PredictorSource>,
    fronts: Arc<dyn FrontSource>,
    channels: ChannelSpec,
    normalization: NormalizationMode,
    dilation_distance_metres: f64,
    scheme: ClassScheme,
}

impl GridReader {
    /// `Ok(None)` when the time has no front labels.
    fn read(&self, valid_time: UnixSeconds) -> Result<Option<LabelledGrid>, ExampleError> {
        let Some(step) = read_time_step(
            self.predictors.as_ref(),
            self.fronts.as_ref(),
            valid_time,
            &self.channels,
        )?
        else {
            return Ok(None);
        };
        let (num_rows, num_columns) = step.predictors.shape();
        let mut predictors = step.predictors.values.insert_axis(Axis(0));
        fill_missing_values(&mut predictors);
        self.normalization.apply(&mut predictors, &self.channels)?;
        let labels = labels_for_time(
            &step.fronts,
            num_rows,
            num_columns,
            self.dilation_distance_metres,
            self.scheme,
        )?;
        Ok(Some(LabelledGrid { predictors, labels }))
    }
}

fn stack_grids(grids: &[LabelledGrid]) -> Result<(Array4<f32>, Array3<FrontClass>), ExampleError> {
    let predictor_views: Vec<_> = grids.iter().map(|grid| grid.predictors.view()).collect();
    let label_views: Vec<_> = grids.iter().map(|grid| grid.labels.view()).collect();
    let predictors = concatenate(Axis(0), &predictor_views).map_err(shape_error)?;
    let labels = concatenate(Axis(0), &label_views).map_err(shape_error)?;
    Ok((predictors, labels))
}

/// Advance `cursor` to the next readable grid, skipping times without
/// labels. Errors once a whole pass is skipped in a row.
fn read_next_grid(
    reader: &GridReader,
    cursor: &mut EpochCursor<UnixSeconds>,
    rng: &mut StdRng,
) -> Result<LabelledGrid, ExampleError> {
    loop {
        let Some(valid_time) = cursor.next_item(rng) else {
            return Err(ExampleError::Exhausted("no valid times to read".into()));
        };
        debug!(
            "[frontgen:grids] valid time {valid_time} (epoch {})",
            cursor.epoch()
        );
        if let Some(grid) = reader.read(valid_time)? {
            cursor.record_use();
            return Ok(grid);
        }
        if cursor.record_skip() {
            return Err(ExampleError::Exhausted(format!(
                "none of {} valid times has front labels",
                cursor.len()
            )));
        }
    }
}

fn augment_batch(augmenter: Option<&mut Augmenter>, batch: Batch) -> Result<Batch, ExampleError> {
    match augmenter {
        Some(augmenter) => {
            let (predictors, targets) = augmenter.augment(&batch.predictors, &batch.targets)?;
            Ok(Batch {
                predictors,
                targets,
            })
        }
        None => Ok(batch),
    }
}

/// Windows raw grids on the fly into class-balanced batches.
pub struct ScratchBatchGenerator {
    config: ScratchGeneratorConfig,
    reader: GridReader,
    fractions: ClassFractions,
    rng: StdRng,
    times: EpochCursor<UnixSeconds>,
    augmenter: Option<Augmenter>,
    buffer: Vec<LabelledGrid>,
    phase: Phase,
    empty_samplings: usize,
}

impl ScratchBatchGenerator {
    /// Validate `config` and shuffle the valid times of its period.
    pub fn new(
        config: ScratchGeneratorConfig,
        predictors: Arc<dyn PredictorSource>,
        fronts: Arc<dyn FrontSource>,
    ) -> Result<Self, ExampleError> {
        config.validate()?;
        let fractions = config.class_fractions()?;
        let reader = GridReader {
            predictors,
            fronts,
            channels: config.channel_spec()?,
            normalization: config.normalization.clone(),
            dilation_distance_metres: config.dilation_distance_metres,
            scheme: fractions.scheme(),
        };
        let mut rng = StdRng::seed_from_u64(config.seed);
        let times = EpochCursor::new(valid_times(config.first_time, config.last_time)?, &mut rng);
        let augmenter = config.augmentation.clone().map(Augmenter::new).transpose()?;
        Ok(Self {
            config,
            reader,
            fractions,
            rng,
            times,
            augmenter,
            buffer: Vec::new(),
            phase: Phase::Refilling,
            empty_samplings: 0,
        })
    }

    /// Settings this generator was built with.
    pub fn config(&self) -> &ScratchGeneratorConfig {
        &self.config
    }

    /// Rewind to the freshly constructed state.
    pub fn restart(&mut self) -> Result<(), ExampleError> {
        self.rng = StdRng::seed_from_u64(self.config.seed);
        self.times = EpochCursor::new(
            valid_times(self.config.first_time, self.config.last_time)?,
            &mut self.rng,
        );
        self.augmenter = self.config.augmentation.clone().map(Augmenter::new).transpose()?;
        self.buffer.clear();
        self.phase = Phase::Refilling;
        self.empty_samplings = 0;
        Ok(())
    }

    /// Refill the grid buffer as needed and build the next batch.
    pub fn next_batch(&mut self) -> Result<Batch, ExampleError> {
        loop {
            match self.phase {
                Phase::Refilling => {
                    let grid = read_next_grid(&self.reader, &mut self.times, &mut self.rng)?;
                    self.buffer.push(grid);
                    if self.buffer.len() >= self.config.times_in_memory() {
                        self.phase = Phase::BatchReady;
                    }
                }
                Phase::BatchReady => {
                    let batch = self.sample_buffer();
                    self.buffer.clear();
                    self.phase = Phase::Refilling;
                    if let Some(batch) = batch? {
                        self.empty_samplings = 0;
                        return augment_batch(self.augmenter.as_mut(), batch);
                    }
                    self.empty_samplings += 1;
                    if self.empty_samplings > self.times.len() {
                        return Err(ExampleError::Exhausted(
                            "buffered grids repeatedly yielded no window centers".into(),
                        ));
                    }
                }
            }
        }
    }

    fn sample_buffer(&mut self) -> Result<Option<Batch>, ExampleError> {
        let (predictors, labels) = stack_grids(&self.buffer)?;
        let (_, num_rows, num_columns) = labels.dim();
        let (half_rows, half_columns) = (self.config.half_rows, self.config.half_columns);
        let mask = self
            .config
            .mask
            .clone()
            .unwrap_or_else(|| ValidityMask::all_valid(num_rows, num_columns));
        let centers = mask.interior(half_rows, half_columns);
        let Some(points) = sample_target_points(
            labels.view(),
            &self.fractions,
            self.config.batch_size,
            Some(&centers),
            &mut self.rng,
        )?
        else {
            warn!(
                "[frontgen:scratch] no window centers in {} buffered grids",
                self.buffer.len()
            );
            return Ok(None);
        };
        let windows =
            window_around_points(predictors.view(), labels.view(), half_rows, half_columns, &points)?;
        let targets = one_hot_f32(&windows.target_classes, self.reader.scheme);

        let mut order: Vec<usize> = (0..windows.len()).collect();
        order.shuffle(&mut self.rng);
        let batch = Batch {
            predictors: windows.predictors.select(Axis(0), &order),
            targets: targets.select(Axis(0), &order),
        };
        debug!(
            "[frontgen:scratch] batch of {} examples; per class {:?}",
            batch.len(),
            batch.class_counts()
        );
        Ok(Some(batch))
    }
}

impl Iterator for ScratchBatchGenerator {
    type Item = Result<Batch, ExampleError>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

/// Reads pre-windowed examples from shuffled store files into batches.
pub struct StoreBatchGenerator {
    config: StoreGeneratorConfig,
    options: ReadOptions,
    scheme: ClassScheme,
    reference: Option<Arc<dyn ReferenceGridProvider>>,
    file_list: Vec<PathBuf>,
    rng: StdRng,
    files: EpochCursor<PathBuf>,
    augmenter: Option<Augmenter>,
    buffer: Vec<(Array4<f32>, Array2<u8>)>,
    buffered: usize,
    phase: Phase,
}

impl StoreBatchGenerator {
    /// Discover every batch-numbered store file under the configured
    /// directory. Finding none is a hard error.
    pub fn new(config: StoreGeneratorConfig) -> Result<Self, ExampleError> {
        config.validate()?;
        let file_list = find_many_example_files(
            &config.directory,
            &StoreRange::Batches {
                first: 0,
                last: MAX_BATCH_NUMBER,
            },
        )?;
        info!(
            "[frontgen:store-gen] {} store files under {}",
            file_list.len(),
            config.directory.display()
        );

        let mut options = ReadOptions::default();
        if let Some(channels) = config.channel_spec()? {
            options = options.with_channels(channels);
        }
        if let Some((half_rows, half_columns)) = config.half_window {
            options = options.with_half_window(half_rows, half_columns);
        }
        if let Some((first, last)) = config.time_range {
            options = options.with_time_range(first, last);
        }
        if let Some(global) = &config.global_normalization {
            options = options.with_global_normalization(Arc::clone(global));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let files = EpochCursor::new(file_list.clone(), &mut rng);
        let augmenter = config.augmentation.clone().map(Augmenter::new).transpose()?;
        Ok(Self {
            scheme: config.scheme()?,
            config,
            options,
            reference: None,
            file_list,
            rng,
            files,
            augmenter,
            buffer: Vec::new(),
            buffered: 0,
            phase: Phase::Refilling,
        })
    }

    /// Reference grid used when files lack a requested orography channel.
    pub fn with_reference_grid(mut self, reference: Arc<dyn ReferenceGridProvider>) -> Self {
        self.reference = Some(reference);
        self
    }

    /// Settings this generator was built with.
    pub fn config(&self) -> &StoreGeneratorConfig {
        &self.config
    }

    /// Number of store files being cycled.
    pub fn num_files(&self) -> usize {
        self.file_list.len()
    }

    /// Re-seed from the config and forget buffered examples.
    pub fn restart(&mut self) -> Result<(), ExampleError> {
        self.rng = StdRng::seed_from_u64(self.config.seed);
        self.files = EpochCursor::new(self.file_list.clone(), &mut self.rng);
        self.augmenter = self.config.augmentation.clone().map(Augmenter::new).transpose()?;
        self.buffer.clear();
        self.buffered = 0;
        self.phase = Phase::Refilling;
        Ok(())
    }

    /// Read files until `batch_size` examples are buffered, then build a batch.
    pub fn next_batch(&mut self) -> Result<Batch, ExampleError> {
        loop {
            match self.phase {
                Phase::Refilling => {
                    self.read_next_file()?;
                    if self.buffered >= self.config.batch_size {
                        self.phase = Phase::BatchReady;
                    }
                }
                Phase::BatchReady => {
                    let batch = self.take_batch();
                    self.buffer.clear();
                    self.buffered = 0;
                    self.phase = Phase::Refilling;
                    return augment_batch(self.augmenter.as_mut(), batch?);
                }
            }
        }
    }

    fn read_next_file(&mut self) -> Result<(), ExampleError> {
        loop {
            let Some(path) = self.files.next_item(&mut self.rng) else {
                return Err(ExampleError::Exhausted("no store files to read".into()));
            };
            info!("[frontgen:store-gen] reading {}", path.display());
            let mut store = ExampleStore::open(&path)?;
            if let Some(reference) = &self.reference {
                store = store.with_reference_grid(Arc::clone(reference));
            }
            match store.read(&self.options)? {
                Some(examples) if !examples.is_empty() => {
                    self.files.record_use();
                    self.buffered += examples.len();
                    self.buffer.push((examples.predictors, examples.targets));
                    return Ok(());
                }
                _ => {
                    debug!(
                        "[frontgen:store-gen] no matching examples in {}",
                        path.display()
                    );
                    if self.files.record_skip() {
                        return Err(ExampleError::Exhausted(format!(
                            "none of {} store files has matching examples",
                            self.files.len()
                        )));
                    }
                }
            }
        }
    }

    fn take_batch(&mut self) -> Result<Batch, ExampleError> {
        let predictor_views: Vec<_> = self.buffer.iter().map(|(p, _)| p.view()).collect();
        let target_views: Vec<_> = self.buffer.iter().map(|(_, t)| t.view()).collect();
        let predictors = concatenate(Axis(0), &predictor_views).map_err(shape_error)?;
        let targets = concatenate(Axis(0), &target_views).map_err(shape_error)?;

        let mut order: Vec<usize> = (0..targets.nrows()).collect();
        order.shuffle(&mut self.rng);
        order.truncate(self.config.batch_size);
        let predictors = predictors.select(Axis(0), &order);
        let targets = targets.select(Axis(0), &order);

        let targets = match self.scheme {
            ClassScheme::Binary => {
                let mut collapsed = Array2::zeros((targets.nrows(), 2));
                for (row, class) in class_indices(targets.view()).into_iter().enumerate() {
                    collapsed[[row, class.min(1)]] = 1.0;
                }
                collapsed
            }
            ClassScheme::Ternary if targets.ncols() == 3 => targets.mapv(f32::from),
            ClassScheme::Ternary => {
                return Err(ExampleError::Configuration(format!(
                    "store files hold {}-class targets, 3 classes requested",
                    targets.ncols()
                )));
            }
        };
        let batch = Batch {
            predictors,
            targets,
        };
        debug!(
            "[frontgen:store-gen] batch of {} examples; per class {:?}",
            batch.len(),
            batch.class_counts()
        );
        Ok(batch)
    }
}

impl Iterator for StoreBatchGenerator {
    type Item = Result<Batch, ExampleError>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

/// Whole-grid batches for segmentation models.
pub struct FullSizeBatchGenerator {
    config: FullSizeGeneratorConfig,
    reader: GridReader,
    rng: StdRng,
    times: EpochCursor<UnixSeconds>,
    buffer: Vec<LabelledGrid>,
    phase: Phase,
}

impl FullSizeBatchGenerator {
    /// Validate `config` and shuffle the valid times of its period.
    pub fn new(
        config: FullSizeGeneratorConfig,
        predictors: Arc<dyn PredictorSource>,
        fronts: Arc<dyn FrontSource>,
    ) -> Result<Self, ExampleError> {
        config.validate()?;
        let reader = GridReader {
            predictors,
            fronts,
            channels: config.channel_spec()?,
            normalization: config.normalization.clone(),
            dilation_distance_metres: config.dilation_distance_metres,
            scheme: config.scheme()?,
        };
        let mut rng = StdRng::seed_from_u64(config.seed);
        let times = EpochCursor::new(valid_times(config.first_time, config.last_time)?, &mut rng);
        Ok(Self {
            config,
            reader,
            rng,
            times,
            buffer: Vec::new(),
            phase: Phase::Refilling,
        })
    }

    /// Settings this generator was built with.
    pub fn config(&self) -> &FullSizeGeneratorConfig {
        &self.config
    }

    /// Re-seed from the config and forget buffered grids.
    pub fn restart(&mut self) -> Result<(), ExampleError> {
        self.rng = StdRng::seed_from_u64(self.config.seed);
        self.times = EpochCursor::new(
            valid_times(self.config.first_time, self.config.last_time)?,
            &mut self.rng,
        );
        self.buffer.clear();
        self.phase = Phase::Refilling;
        Ok(())
    }

    /// Read `times_per_batch` labelled grids and stack them.
    pub fn next_batch(&mut self) -> Result<FullSizeBatch, ExampleError> {
        loop {
            match self.phase {
                Phase::Refilling => {
                    let grid = read_next_grid(&self.reader, &mut self.times, &mut self.rng)?;
                    self.buffer.push(grid);
                    if self.buffer.len() >= self.config.times_per_batch {
                        self.phase = Phase::BatchReady;
                    }
                }
                Phase::BatchReady => {
                    let stacked = stack_grids(&self.buffer);
                    self.buffer.clear();
                    self.phase = Phase::Refilling;
                    let (predictors, labels) = stacked?;
                    return Ok(self.encode(predictors, labels));
                }
            }
        }
    }

    fn encode(&mut self, predictors: Array4<f32>, labels: Array3<FrontClass>) -> FullSizeBatch {
        let scheme = self.reader.scheme;
        let (num_times, num_rows, num_columns) = labels.dim();
        let mut targets = Array4::zeros((num_times, num_rows, num_columns, scheme.num_classes()));
        for ((time, row, column), class) in labels.indexed_iter() {
            targets[[time, row, column, class.index(scheme)]] = 1.0;
        }
        let mut order: Vec<usize> = (0..num_times).collect();
        order.shuffle(&mut self.rng);
        debug!("[frontgen:full-size] batch of {num_times} grids");
        FullSizeBatch {
            predictors: predictors.select(Axis(0), &order),
            targets: targets.select(Axis(0), &order),
        }
    }
}

impl Iterator for FullSizeBatchGenerator {
    type Item = Result<FullSizeBatch, ExampleError>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

/// Windows every interior cell of one valid time, one grid row per batch,
/// cycling over the rows forever. Used to run a trained model over a grid.
pub struct RowWindowGenerator {
    config: RowWindowConfig,
    reader: GridReader,
    grid: Option<LabelledGrid>,
    next_row: usize,
}

impl RowWindowGenerator {
    /// The grid itself is read on the first call to `next_batch`.
    pub fn new(
        config: RowWindowConfig,
        predictors: Arc<dyn PredictorSource>,
        fronts: Arc<dyn FrontSource>,
    ) -> Result<Self, ExampleError> {
        config.validate()?;
        let reader = GridReader {
            predictors,
            fronts,
            channels: config.channel_spec()?,
            normalization: config.normalization.clone(),
            dilation_distance_metres: config.dilation_distance_metres,
            scheme: config.scheme()?,
        };
        Ok(Self {
            next_row: config.half_rows,
            config,
            reader,
            grid: None,
        })
    }

    /// Full-grid row the next batch will be centered on.
    pub fn next_row(&self) -> usize {
        self.next_row
    }

    /// Go back to the first interior row.
    pub fn restart(&mut self) {
        self.next_row = self.config.half_rows;
    }

    fn load(&mut self) -> Result<&LabelledGrid, ExampleError> {
        if self.grid.is_none() {
            let valid_time = self.config.valid_time;
            let grid = self.reader.read(valid_time)?.ok_or_else(|| {
                ExampleError::Exhausted(format!("no front labels for valid time {valid_time}"))
            })?;
            let (_, num_rows, num_columns, _) = grid.predictors.dim();
            if num_rows <= 2 * self.config.half_rows || num_columns <= 2 * self.config.half_columns
            {
                return Err(ExampleError::Configuration(format!(
                    "grid {num_rows}x{num_columns} has no interior for half-window {}x{}",
                    self.config.half_rows, self.config.half_columns
                )));
            }
            self.grid = Some(grid);
        }
        self.grid
            .as_ref()
            .ok_or_else(|| ExampleError::Exhausted("grid not loaded".into()))
    }

    /// Windows for every interior column of the next row.
    pub fn next_batch(&mut self) -> Result<Batch, ExampleError> {
        let (half_rows, half_columns) = (self.config.half_rows, self.config.half_columns);
        let scheme = self.reader.scheme;
        let row = self.next_row;
        let grid = self.load()?;
        let (_, num_rows, num_columns, _) = grid.predictors.dim();

        let columns: Vec<usize> = (half_columns..num_columns - half_columns).collect();
        let points = TargetPoints::single_time(vec![row; columns.len()], columns);
        let windows = window_around_points(
            grid.predictors.view(),
            grid.labels.view(),
            half_rows,
            half_columns,
            &points,
        )?;
        let batch = Batch {
            targets: one_hot_f32(&windows.target_classes, scheme),
            predictors: windows.predictors,
        };

        self.next_row = if row + 1 >= num_rows - half_rows {
            half_rows
        } else {
            row + 1
        };
        Ok(batch)
    }
}

impl Iterator for RowWindowGenerator {
    type Item = Result<Batch, ExampleError>;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_batch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Channel;
    use crate::labels::FrontTable;
    use crate::source::{InMemoryFrontSource, InMemoryPredictorSource, PredictorGrid};
    use ndarray::Array3;

    const FIRST: UnixSeconds = 1_199_145_600;

    fn channels() -> Vec<Channel> {
        vec![Channel::new("t", 850), Channel::new("u", 850)]
    }

    /// Five times on a 12x12 grid; the time at index `missing` has no labels.
    fn sources(missing: Option<usize>) -> (Arc<dyn PredictorSource>, Arc<dyn FrontSource>) {
        let spec = ChannelSpec::new(channels()).unwrap();
        let mut predictors = InMemoryPredictorSource::new("/p");
        let mut fronts = InMemoryFrontSource::new("/f");
        for i in 0..5 {
            let time = FIRST + i as i64 * TIME_INTERVAL_SECONDS;
            let values =
                Array3::from_shape_fn((12, 12, 2), |(r, c, k)| (i + r * 12 + c + k * 50) as f32);
            predictors
                .insert(time, PredictorGrid::new(values, spec.clone()).unwrap())
                .unwrap();
            if missing != Some(i) {
                let table = FrontTable {
                    warm_cells: vec![(5, 4), (5, 5), (5, 6)],
                    cold_cells: vec![(8, 3), (8, 4)],
                };
                fronts.insert(time, table).unwrap();
            }
        }
        (Arc::new(predictors), Arc::new(fronts))
    }

    fn scratch_config() -> ScratchGeneratorConfig {
        ScratchGeneratorConfig {
            seed: 5,
            first_time: FIRST,
            last_time: FIRST + 4 * TIME_INTERVAL_SECONDS,
            channels: channels(),
            half_rows: 2,
            half_columns: 2,
            dilation_distance_metres: 0.0,
            class_fractions: vec![0.5, 0.25, 0.25],
            batch_size: 16,
            examples_per_time: 8,
            ..ScratchGeneratorConfig::default()
        }
    }

    #[test]
    fn scratch_batches_are_windowed_and_one_hot() {
        let (predictors, fronts) = sources(Some(2));
        let mut generator = ScratchBatchGenerator::new(scratch_config(), predictors, fronts).unwrap();
        for _ in 0..4 {
            let batch = generator.next_batch().unwrap();
            assert_eq!(batch.predictors.dim(), (16, 5, 5, 2));
            assert_eq!(batch.targets.dim(), (16, 3));
            assert!(batch.targets.rows().into_iter().all(|row| row.sum() == 1.0));
            let counts = batch.class_counts();
            assert_eq!(counts[0], 8);
            assert!(counts[1] <= 4 && counts[2] <= 4);
        }
    }

    #[test]
    fn scratch_restart_replays_batches() {
        let (predictors, fronts) = sources(None);
        let mut generator = ScratchBatchGenerator::new(scratch_config(), predictors, fronts).unwrap();
        let first: Vec<Batch> = generator.by_ref().take(3).map(Result::unwrap).collect();
        generator.restart().unwrap();
        let again: Vec<Batch> = generator.by_ref().take(3).map(Result::unwrap).collect();
        assert_eq!(first, again);
    }

    #[test]
    fn scratch_without_any_labels_is_exhausted() {
        let predictors = sources(None).0;
        let fronts: Arc<dyn FrontSource> = Arc::new(InMemoryFrontSource::new("/f"));
        let mut generator = ScratchBatchGenerator::new(scratch_config(), predictors, fronts).unwrap();
        assert!(matches!(
            generator.next_batch(),
            Err(ExampleError::Exhausted(_))
        ));
    }

    #[test]
    fn scratch_augmentation_multiplies_batch() {
        let (predictors, fronts) = sources(None);
        let config = ScratchGeneratorConfig {
            augmentation: Some(crate::config::AugmentationConfig {
                x_translations: vec![1],
                y_translations: vec![1],
                num_noisings: 1,
                noise_stdev: 0.05,
                ..Default::default()
            }),
            ..scratch_config()
        };
        let mut generator = ScratchBatchGenerator::new(config, predictors, fronts).unwrap();
        let batch = generator.next_batch().unwrap();
        assert_eq!(batch.len(), 48);
    }

    #[test]
    fn full_size_batches_cover_whole_grids() {
        let (predictors, fronts) = sources(Some(0));
        let config = FullSizeGeneratorConfig {
            seed: 1,
            first_time: FIRST,
            last_time: FIRST + 4 * TIME_INTERVAL_SECONDS,
            channels: channels(),
            dilation_distance_metres: 0.0,
            num_classes: 2,
            times_per_batch: 4,
            ..FullSizeGeneratorConfig::default()
        };
        let mut generator = FullSizeBatchGenerator::new(config, predictors, fronts).unwrap();
        let batch = generator.next_batch().unwrap();
        assert_eq!(batch.predictors.dim(), (4, 12, 12, 2));
        assert_eq!(batch.targets.dim(), (4, 12, 12, 2));
        for time in 0..4 {
            assert_eq!(batch.targets[[time, 5, 5, 1]], 1.0);
            assert_eq!(batch.targets[[time, 8, 3, 1]], 1.0);
            assert_eq!(batch.targets[[time, 0, 0, 0]], 1.0);
        }
    }

    #[test]
    fn row_generator_cycles_interior_rows() {
        let (predictors, fronts) = sources(None);
        let config = RowWindowConfig {
            valid_time: FIRST,
            channels: channels(),
            half_rows: 2,
            half_columns: 3,
            dilation_distance_metres: 0.0,
            num_classes: 3,
            ..RowWindowConfig::default()
        };
        let mut generator = RowWindowGenerator::new(config, predictors, fronts).unwrap();
        let mut rows = Vec::new();
        for _ in 0..9 {
            rows.push(generator.next_row());
            let batch = generator.next_batch().unwrap();
            assert_eq!(batch.predictors.dim(), (6, 5, 7, 2));
        }
        assert_eq!(rows, vec![2, 3, 4, 5, 6, 7, 8, 9, 2]);
    }

    #[test]
    fn row_generator_requires_labels() {
        let (predictors, fronts) = sources(Some(0));
        let config = RowWindowConfig {
            valid_time: FIRST,
            channels: channels(),
            half_rows: 2,
            half_columns: 2,
            ..RowWindowConfig::default()
        };
        let mut generator = RowWindowGenerator::new(config, predictors, fronts).unwrap();
        assert!(generator.next_batch().is_err());
    }
}
