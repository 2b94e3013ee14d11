use std::path::PathBuf;
use std::sync::Arc;

use crate::constants::sampling::{MIN_BATCH_SIZE, MIN_EXAMPLES_PER_TIME, MIN_TIMES_PER_BATCH};
use crate::data::{Channel, ChannelSpec, ClassScheme, NormalizationType, ValidityMask};
use crate::errors::ExampleError;
use crate::normalization::{GlobalNormalization, NormalizationMode};
use crate::sampling::ClassFractions;
use crate::types::UnixSeconds;

fn check_time_range(first: UnixSeconds, last: UnixSeconds) -> Result<(), ExampleError> {
    if last < first {
        return Err(ExampleError::Configuration(format!(
            "last time {last} precedes first time {first}"
        )));
    }
    Ok(())
}

fn check_mask(
    mask: Option<&ValidityMask>,
    half_rows: usize,
    half_columns: usize,
) -> Result<(), ExampleError> {
    if let Some(mask) = mask
        && mask.interior(half_rows, half_columns).num_valid() == 0
    {
        return Err(ExampleError::Configuration(format!(
            "validity mask leaves no window centers for half-window {half_rows}x{half_columns}"
        )));
    }
    Ok(())
}

/// Data augmentation applied to every generated batch.
///
/// Each translation, rotation, and noising appends one transformed copy of
/// the original batch.
#[derive(Clone, Debug, PartialEq)]
pub struct AugmentationConfig {
    /// RNG seed for the noise draws.
    pub seed: u64,
    /// Column offsets in pixels, paired index-wise with `y_translations`.
    pub x_translations: Vec<i32>,
    /// Row offsets in pixels.
    pub y_translations: Vec<i32>,
    /// Counterclockwise rotation angles in degrees.
    pub rotation_angles_deg: Vec<f64>,
    /// Standard deviation of the Gaussian noise, in normalized units.
    pub noise_stdev: f32,
    /// Number of independently noised copies.
    pub num_noisings: usize,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            x_translations: Vec::new(),
            y_translations: Vec::new(),
            rotation_angles_deg: Vec::new(),
            noise_stdev: 0.05,
            num_noisings: 0,
        }
    }
}

impl AugmentationConfig {
    /// Rejects mismatched translation lists and (0, 0) offsets.
    pub fn validate(&self) -> Result<(), ExampleError> {
        if self.x_translations.len() != self.y_translations.len() {
            return Err(ExampleError::Configuration(format!(
                "{} x-translations but {} y-translations",
                self.x_translations.len(),
                self.y_translations.len()
            )));
        }
        if let Some(index) = self
            .x_translations
            .iter()
            .zip(&self.y_translations)
            .position(|(x, y)| *x == 0 && *y == 0)
        {
            return Err(ExampleError::Configuration(format!(
                "translation {index} is (0, 0)"
            )));
        }
        if self.rotation_angles_deg.iter().any(|angle| !angle.is_finite()) {
            return Err(ExampleError::Configuration(
                "rotation angles must be finite".into(),
            ));
        }
        if self.num_noisings > 0 && !(self.noise_stdev.is_finite() && self.noise_stdev > 0.0) {
            return Err(ExampleError::Configuration(format!(
                "noise standard deviation must be positive, got {}",
                self.noise_stdev
            )));
        }
        Ok(())
    }

    /// Augmented copies appended per original example.
    pub fn num_copies(&self) -> usize {
        self.x_translations.len() + self.rotation_angles_deg.len() + self.num_noisings
    }
}

/// Settings for building examples from one valid time.
#[derive(Clone, Debug)]
pub struct FactoryConfig {
    /// RNG seed for point sampling.
    pub seed: u64,
    /// Predictor channels to read, in order.
    pub channels: Vec<Channel>,
    /// Half-height of each window, excluding the center row.
    pub half_rows: usize,
    /// Half-width of each window, excluding the center column.
    pub half_columns: usize,
    /// Label dilation distance in metres.
    pub dilation_distance_metres: f64,
    /// Class-balanced sampling fractions; `None` samples uniformly over the mask.
    pub class_fractions: Option<Vec<f64>>,
    /// Upper bound on examples created per valid time.
    pub max_examples: usize,
    /// Non-global normalization applied to each time step.
    pub normalization: NormalizationType,
    /// Cells allowed as window centers; `None` means every cell.
    pub mask: Option<ValidityMask>,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            channels: Vec::new(),
            half_rows: 16,
            half_columns: 16,
            dilation_distance_metres: 50_000.0,
            class_fractions: None,
            max_examples: 1000,
            normalization: NormalizationType::ZScore,
            mask: None,
        }
    }
}

impl FactoryConfig {
    /// Channels as a validated [`ChannelSpec`].
    pub fn channel_spec(&self) -> Result<ChannelSpec, ExampleError> {
        ChannelSpec::new(self.channels.clone())
    }

    /// Parsed fractions, or `None` for uniform sampling.
    pub fn class_fractions(&self) -> Result<Option<ClassFractions>, ExampleError> {
        self.class_fractions
            .clone()
            .map(ClassFractions::new)
            .transpose()
    }

    /// Class scheme of the created targets: taken from the fractions when
    /// given, ternary otherwise.
    pub fn scheme(&self) -> Result<ClassScheme, ExampleError> {
        Ok(self
            .class_fractions()?
            .map_or(ClassScheme::Ternary, |fractions| fractions.scheme()))
    }

    /// Checks channels, fractions, `max_examples` and the dilation distance.
    pub fn validate(&self) -> Result<(), ExampleError> {
        self.channel_spec()?;
        self.class_fractions()?;
        if self.max_examples == 0 {
            return Err(ExampleError::Configuration(
                "max_examples must be positive".into(),
            ));
        }
        if self.dilation_distance_metres.is_nan() || self.dilation_distance_metres < 0.0 {
            return Err(ExampleError::Configuration(format!(
                "dilation distance must be non-negative, got {}",
                self.dilation_distance_metres
            )));
        }
        Ok(())
    }
}

/// Settings for the generator that windows raw grids on the fly.
#[derive(Clone, Debug)]
pub struct ScratchGeneratorConfig {
    /// RNG seed controlling time order, point sampling, shuffling, and noise.
    pub seed: u64,
    /// First valid time of the period (inclusive).
    pub first_time: UnixSeconds,
    /// Last valid time of the period (inclusive).
    pub last_time: UnixSeconds,
    /// Predictor channels to read, in order.
    pub channels: Vec<Channel>,
    /// Half-height of each window, excluding the center row.
    pub half_rows: usize,
    /// Half-width of each window, excluding the center column.
    pub half_columns: usize,
    /// Label dilation distance in metres.
    pub dilation_distance_metres: f64,
    /// Sampling fraction per class; two entries give binary targets, three ternary.
    pub class_fractions: Vec<f64>,
    /// Examples per batch before augmentation.
    pub batch_size: usize,
    /// Average examples drawn per buffered time step; sets how many full
    /// grids are held in memory per batch.
    pub examples_per_time: usize,
    /// Cells allowed as window centers; `None` means every cell.
    pub mask: Option<ValidityMask>,
    /// Scaling applied to each full grid after reading.
    pub normalization: NormalizationMode,
    /// Copies appended to every batch.
    pub augmentation: Option<AugmentationConfig>,
}

impl Default for ScratchGeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            first_time: 0,
            last_time: 0,
            channels: Vec::new(),
            half_rows: 16,
            half_columns: 16,
            dilation_distance_metres: 50_000.0,
            class_fractions: vec![0.5, 0.25, 0.25],
            batch_size: 64,
            examples_per_time: 8,
            mask: None,
            normalization: NormalizationMode::default(),
            augmentation: None,
        }
    }
}

impl ScratchGeneratorConfig {
    /// Channels as a validated [`ChannelSpec`].
    pub fn channel_spec(&self) -> Result<ChannelSpec, ExampleError> {
        ChannelSpec::new(self.channels.clone())
    }

    /// Validated sampling fractions.
    pub fn class_fractions(&self) -> Result<ClassFractions, ExampleError> {
        ClassFractions::new(self.class_fractions.clone())
    }

    /// Full grids buffered per batch: `ceil(batch_size / examples_per_time)`.
    pub fn times_in_memory(&self) -> usize {
        self.batch_size.div_ceil(self.examples_per_time.max(1))
    }

    /// Checks the period, channels, fractions, batch sizing, mask and augmentation.
    pub fn validate(&self) -> Result<(), ExampleError> {
        check_time_range(self.first_time, self.last_time)?;
        self.channel_spec()?;
        self.class_fractions()?;
        if self.batch_size < MIN_BATCH_SIZE {
            return Err(ExampleError::Configuration(format!(
                "batch_size must be at least {MIN_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        if self.examples_per_time < MIN_EXAMPLES_PER_TIME {
            return Err(ExampleError::Configuration(format!(
                "examples_per_time must be at least {MIN_EXAMPLES_PER_TIME}, got {}",
                self.examples_per_time
            )));
        }
        check_mask(self.mask.as_ref(), self.half_rows, self.half_columns)?;
        if let Some(augmentation) = &self.augmentation {
            augmentation.validate()?;
        }
        Ok(())
    }
}

/// Settings for the generator that reads pre-windowed examples from store files.
#[derive(Clone, Debug)]
pub struct StoreGeneratorConfig {
    /// RNG seed controlling file order, batch shuffling, and noise.
    pub seed: u64,
    /// Directory holding shuffled (batch-numbered) store files.
    pub directory: PathBuf,
    /// Keep only examples whose valid time falls in this inclusive range.
    pub time_range: Option<(UnixSeconds, UnixSeconds)>,
    /// Channels to read; empty keeps every stored channel.
    pub channels: Vec<Channel>,
    /// Crop stored windows to this half-window.
    pub half_window: Option<(usize, usize)>,
    /// 3 keeps the stored classes; 2 merges warm and cold fronts.
    pub num_classes: usize,
    /// Examples per batch before augmentation.
    pub batch_size: usize,
    /// Convert stored normalization to these global parameters.
    pub global_normalization: Option<Arc<GlobalNormalization>>,
    /// Copies appended to every batch.
    pub augmentation: Option<AugmentationConfig>,
}

impl Default for StoreGeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            directory: PathBuf::new(),
            time_range: None,
            channels: Vec::new(),
            half_window: None,
            num_classes: 3,
            batch_size: 64,
            global_normalization: None,
            augmentation: None,
        }
    }
}

impl StoreGeneratorConfig {
    /// Requested channels, or `None` to keep what the files store.
    pub fn channel_spec(&self) -> Result<Option<ChannelSpec>, ExampleError> {
        if self.channels.is_empty() {
            return Ok(None);
        }
        ChannelSpec::new(self.channels.clone()).map(Some)
    }

    /// Binary for 2 classes, ternary for 3.
    pub fn scheme(&self) -> Result<ClassScheme, ExampleError> {
        ClassScheme::from_num_classes(self.num_classes)
    }

    /// Checks the time range, channels, class count and batch size.
    pub fn validate(&self) -> Result<(), ExampleError> {
        if let Some((first, last)) = self.time_range {
            check_time_range(first, last)?;
        }
        self.channel_spec()?;
        self.scheme()?;
        if self.batch_size < MIN_BATCH_SIZE {
            return Err(ExampleError::Configuration(format!(
                "batch_size must be at least {MIN_BATCH_SIZE}, got {}",
                self.batch_size
            )));
        }
        if let Some(augmentation) = &self.augmentation {
            augmentation.validate()?;
        }
        Ok(())
    }
}

/// Settings for the whole-grid (segmentation) generator.
#[derive(Clone, Debug)]
pub struct FullSizeGeneratorConfig {
    /// RNG seed controlling time order and batch shuffling.
    pub seed: u64,
    /// First valid time of the period (inclusive).
    pub first_time: UnixSeconds,
    /// Last valid time of the period (inclusive).
    pub last_time: UnixSeconds,
    /// Predictor channels to read, in order.
    pub channels: Vec<Channel>,
    /// Label dilation distance in metres.
    pub dilation_distance_metres: f64,
    /// 2 for binary targets, 3 for ternary.
    pub num_classes: usize,
    /// Full grids per batch.
    pub times_per_batch: usize,
    /// Scaling applied to each full grid after reading.
    pub normalization: NormalizationMode,
}

impl Default for FullSizeGeneratorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            first_time: 0,
            last_time: 0,
            channels: Vec::new(),
            dilation_distance_metres: 50_000.0,
            num_classes: 3,
            times_per_batch: MIN_TIMES_PER_BATCH,
            normalization: NormalizationMode::default(),
        }
    }
}

impl FullSizeGeneratorConfig {
    /// Channels as a validated [`ChannelSpec`].
    pub fn channel_spec(&self) -> Result<ChannelSpec, ExampleError> {
        ChannelSpec::new(self.channels.clone())
    }

    /// Binary for 2 classes, ternary for 3.
    pub fn scheme(&self) -> Result<ClassScheme, ExampleError> {
        ClassScheme::from_num_classes(self.num_classes)
    }

    /// Needs at least four times per batch.
    pub fn validate(&self) -> Result<(), ExampleError> {
        check_time_range(self.first_time, self.last_time)?;
        self.channel_spec()?;
        self.scheme()?;
        if self.times_per_batch < MIN_TIMES_PER_BATCH {
            return Err(ExampleError::Configuration(format!(
                "times_per_batch must be at least {MIN_TIMES_PER_BATCH}, got {}",
                self.times_per_batch
            )));
        }
        Ok(())
    }
}

/// Settings for the row-by-row windowing of one valid time.
#[derive(Clone, Debug)]
pub struct RowWindowConfig {
    /// The one valid time to window.
    pub valid_time: UnixSeconds,
    /// Predictor channels to read, in order.
    pub channels: Vec<Channel>,
    /// Half-height of each window, excluding the center row.
    pub half_rows: usize,
    /// Half-width of each window, excluding the center column.
    pub half_columns: usize,
    /// Label dilation distance in metres.
    pub dilation_distance_metres: f64,
    /// 2 for binary targets, 3 for ternary.
    pub num_classes: usize,
    /// Scaling applied to the grid after reading.
    pub normalization: NormalizationMode,
}

impl Default for RowWindowConfig {
    fn default() -> Self {
        Self {
            valid_time: 0,
            channels: Vec::new(),
            half_rows: 16,
            half_columns: 16,
            dilation_distance_metres: 50_000.0,
            num_classes: 2,
            normalization: NormalizationMode::default(),
        }
    }
}

impl RowWindowConfig {
    /// Channels as a validated [`ChannelSpec`].
    pub fn channel_spec(&self) -> Result<ChannelSpec, ExampleError> {
        ChannelSpec::new(self.channels.clone())
    }

    /// Binary for 2 classes, ternary for 3.
    pub fn scheme(&self) -> Result<ClassScheme, ExampleError> {
        ClassScheme::from_num_classes(self.num_classes)
    }

    /// Checks channels and class count.
    pub fn validate(&self) -> Result<(), ExampleError> {
        self.channel_spec()?;
        self.scheme()?;
        Ok(())
    }
}
