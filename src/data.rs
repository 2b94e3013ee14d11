use std::collections::HashSet;
use std::fmt;

use ndarray::{Array2, Array4, ArrayView2, Axis, concatenate};
use serde::{Deserialize, Serialize};

use crate::constants::grid::{DUMMY_SURFACE_PRESSURE_MB, HEIGHT_FIELD_NAME};
use crate::constants::sampling::{NUM_BINARY_CLASSES, NUM_TERNARY_CLASSES, TOLERANCE};
use crate::errors::ExampleError;
use crate::ids::ExampleId;
use crate::normalization;
use crate::windowing::center_crop;

pub use crate::types::{FieldName, PressureMb, UnixSeconds};

/// One predictor channel: a field at a pressure level.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    /// Field name, e.g. `temperature_kelvins`.
    pub field: FieldName,
    /// Pressure level in millibars.
    pub pressure_mb: PressureMb,
}

impl Channel {
    /// Channel for `field` at `pressure_mb`.
    pub fn new(field: impl Into<FieldName>, pressure_mb: PressureMb) -> Self {
        Self {
            field: field.into(),
            pressure_mb,
        }
    }

    /// Surface-height channel synthesized from the reference orography grid.
    pub fn orography() -> Self {
        Self::new(HEIGHT_FIELD_NAME, DUMMY_SURFACE_PRESSURE_MB)
    }

    /// Whether this is the synthesized surface-height channel.
    pub fn is_orography(&self) -> bool {
        self.field == HEIGHT_FIELD_NAME && self.pressure_mb == DUMMY_SURFACE_PRESSURE_MB
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}mb", self.field, self.pressure_mb)
    }
}

/// Ordered list of channels; position `k` describes the last-axis slot `k`
/// of every predictor tensor carrying this spec.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSpec {
    channels: Vec<Channel>,
}

impl ChannelSpec {
    /// Build a spec, rejecting empty lists and duplicate (field, level) pairs.
    pub fn new(channels: Vec<Channel>) -> Result<Self, ExampleError> {
        if channels.is_empty() {
            return Err(ExampleError::Configuration(
                "channel spec must contain at least one channel".into(),
            ));
        }
        let mut seen = HashSet::with_capacity(channels.len());
        for channel in &channels {
            if !seen.insert(channel) {
                return Err(ExampleError::Configuration(format!(
                    "channel spec contains duplicate channel {channel}"
                )));
            }
        }
        Ok(Self { channels })
    }

    /// Channels in tensor order.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Iterate channels in tensor order.
    pub fn iter(&self) -> impl Iterator<Item = &Channel> {
        self.channels.iter()
    }

    /// Number of channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether there are no channels; never true for a validated spec.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Position of `channel` on the channel axis.
    pub fn position(&self, channel: &Channel) -> Option<usize> {
        self.channels.iter().position(|candidate| candidate == channel)
    }

    /// Whether the orography channel is listed.
    pub fn contains_orography(&self) -> bool {
        self.channels.iter().any(Channel::is_orography)
    }

    /// The same channels with the synthesized orography channel removed.
    /// Returns `None` when nothing else is left.
    pub fn without_orography(&self) -> Option<ChannelSpec> {
        let kept: Vec<Channel> = self
            .channels
            .iter()
            .filter(|channel| !channel.is_orography())
            .cloned()
            .collect();
        if kept.is_empty() {
            None
        } else {
            Some(Self { channels: kept })
        }
    }

    /// Append the orography channel as the last slot.
    pub fn with_orography(&self) -> Result<ChannelSpec, ExampleError> {
        let mut channels = self.channels.clone();
        channels.push(Channel::orography());
        Self::new(channels)
    }

    /// Positions of `requested` channels in this spec, in requested order.
    pub fn indices_of(&self, requested: &ChannelSpec) -> Result<Vec<usize>, ExampleError> {
        requested
            .iter()
            .map(|channel| {
                self.position(channel).ok_or_else(|| {
                    ExampleError::Configuration(format!("channel {channel} is not available"))
                })
            })
            .collect()
    }
}

/// Front label of one grid cell.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FrontClass {
    /// Outside any dilated front.
    #[default]
    NoFront,
    /// Inside a dilated warm front.
    WarmFront,
    /// Inside a dilated cold front.
    ColdFront,
    /// Warm or cold, after the binary collapse.
    AnyFront,
}

impl FrontClass {
    /// Warm, cold or collapsed front.
    pub fn is_front(self) -> bool {
        !matches!(self, FrontClass::NoFront)
    }

    /// Collapse warm and cold into a single front class.
    pub fn binarized(self) -> Self {
        match self {
            FrontClass::NoFront => FrontClass::NoFront,
            _ => FrontClass::AnyFront,
        }
    }

    /// Class index under `scheme`.
    pub fn index(self, scheme: ClassScheme) -> usize {
        match (scheme, self) {
            (_, FrontClass::NoFront) => 0,
            (ClassScheme::Binary, _) => 1,
            (ClassScheme::Ternary, FrontClass::WarmFront | FrontClass::AnyFront) => 1,
            (ClassScheme::Ternary, FrontClass::ColdFront) => 2,
        }
    }

    /// Inverse of [`FrontClass::index`].
    pub fn from_index(index: usize, scheme: ClassScheme) -> Result<Self, ExampleError> {
        match (scheme, index) {
            (_, 0) => Ok(FrontClass::NoFront),
            (ClassScheme::Binary, 1) => Ok(FrontClass::AnyFront),
            (ClassScheme::Ternary, 1) => Ok(FrontClass::WarmFront),
            (ClassScheme::Ternary, 2) => Ok(FrontClass::ColdFront),
            _ => Err(ExampleError::Configuration(format!(
                "class index {index} is out of range for {} classes",
                scheme.num_classes()
            ))),
        }
    }
}

/// Number of target classes carried by a target tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ClassScheme {
    /// No front / front.
    Binary,
    /// No front / warm front / cold front.
    Ternary,
}

impl ClassScheme {
    /// 2 or 3.
    pub fn num_classes(self) -> usize {
        match self {
            ClassScheme::Binary => NUM_BINARY_CLASSES,
            ClassScheme::Ternary => NUM_TERNARY_CLASSES,
        }
    }

    /// Fails unless `num_classes` is 2 or 3.
    pub fn from_num_classes(num_classes: usize) -> Result<Self, ExampleError> {
        match num_classes {
            NUM_BINARY_CLASSES => Ok(ClassScheme::Binary),
            NUM_TERNARY_CLASSES => Ok(ClassScheme::Ternary),
            other => Err(ExampleError::Configuration(format!(
                "number of classes must be 2 or 3, got {other}"
            ))),
        }
    }
}

/// One-hot encode class labels as an E-by-K matrix.
pub fn one_hot(classes: &[FrontClass], scheme: ClassScheme) -> Array2<u8> {
    let mut encoded = Array2::zeros((classes.len(), scheme.num_classes()));
    for (row, class) in classes.iter().enumerate() {
        encoded[[row, class.index(scheme)]] = 1;
    }
    encoded
}

/// Decode an E-by-K one-hot matrix back into class indices (argmax per row).
pub fn class_indices(targets: ArrayView2<'_, u8>) -> Vec<usize> {
    targets
        .outer_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .max_by_key(|(_, value)| **value)
                .map(|(index, _)| index)
                .unwrap_or(0)
        })
        .collect()
}

/// Full-grid mask of cells allowed to be the center of an example.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidityMask {
    cells: Array2<bool>,
}

impl ValidityMask {
    /// Wrap a full-grid boolean mask.
    pub fn new(cells: Array2<bool>) -> Self {
        Self { cells }
    }

    /// Mask allowing every cell.
    pub fn all_valid(num_rows: usize, num_columns: usize) -> Self {
        Self::new(Array2::from_elem((num_rows, num_columns), true))
    }

    /// Build from a 0/1 integer grid; any other value is rejected.
    pub fn from_ints(values: &Array2<i32>) -> Result<Self, ExampleError> {
        if let Some(bad) = values.iter().find(|value| **value != 0 && **value != 1) {
            return Err(ExampleError::Configuration(format!(
                "validity mask may only contain 0 or 1, found {bad}"
            )));
        }
        Ok(Self::new(values.mapv(|value| value == 1)))
    }

    /// 0/1 integer form, as stored.
    pub fn to_ints(&self) -> Array2<i32> {
        self.cells.mapv(i32::from)
    }

    /// (rows, columns)
    pub fn shape(&self) -> (usize, usize) {
        self.cells.dim()
    }

    /// Underlying boolean grid.
    pub fn cells(&self) -> &Array2<bool> {
        &self.cells
    }

    /// Out-of-grid cells are invalid.
    pub fn is_valid(&self, row: usize, column: usize) -> bool {
        self.cells.get((row, column)).copied().unwrap_or(false)
    }

    /// Number of valid cells.
    pub fn num_valid(&self) -> usize {
        self.cells.iter().filter(|cell| **cell).count()
    }

    /// This mask restricted to cells at least `half_rows`/`half_columns` away
    /// from every grid edge.
    pub fn interior(&self, half_rows: usize, half_columns: usize) -> Self {
        let (num_rows, num_columns) = self.shape();
        let mut cells = self.cells.clone();
        for ((row, column), cell) in cells.indexed_iter_mut() {
            let inside = row >= half_rows
                && row + half_rows < num_rows
                && column >= half_columns
                && column + half_columns < num_columns;
            *cell = *cell && inside;
        }
        Self { cells }
    }
}

/// How predictor values were scaled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NormalizationType {
    /// First parameter is the minimum, second the maximum.
    MinMax,
    /// First parameter is the mean, second the standard deviation.
    ZScore,
}

impl NormalizationType {
    /// Name stored in example files.
    pub fn as_str(self) -> &'static str {
        match self {
            NormalizationType::MinMax => "minmax",
            NormalizationType::ZScore => "z_score",
        }
    }
}

impl fmt::Display for NormalizationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-example, per-channel normalization parameters (E-by-C each).
#[derive(Clone, Debug, PartialEq)]
pub struct NormalizationParams {
    /// Which pair `first`/`second` hold.
    pub kind: NormalizationType,
    /// E-by-C minima or means.
    pub first: Array2<f32>,
    /// E-by-C maxima or standard deviations.
    pub second: Array2<f32>,
}

impl NormalizationParams {
    /// Fails unless both arrays are E-by-C with the same shape.
    pub fn new(
        kind: NormalizationType,
        first: Array2<f32>,
        second: Array2<f32>,
    ) -> Result<Self, ExampleError> {
        if first.dim() != second.dim() {
            return Err(ExampleError::Configuration(format!(
                "normalization parameter shapes differ: {:?} vs {:?}",
                first.dim(),
                second.dim()
            )));
        }
        Ok(Self {
            kind,
            first,
            second,
        })
    }

    /// E
    pub fn num_examples(&self) -> usize {
        self.first.nrows()
    }

    /// C
    pub fn num_channels(&self) -> usize {
        self.first.ncols()
    }

    /// Rows for the given examples, in order (repeats allowed).
    pub fn select_examples(&self, indices: &[usize]) -> Self {
        Self {
            kind: self.kind,
            first: self.first.select(Axis(0), indices),
            second: self.second.select(Axis(0), indices),
        }
    }

    /// Columns for the given channels, in order.
    pub fn select_channels(&self, indices: &[usize]) -> Self {
        Self {
            kind: self.kind,
            first: self.first.select(Axis(1), indices),
            second: self.second.select(Axis(1), indices),
        }
    }

    /// Append the columns of `other` as extra channels.
    pub fn append_channels(&self, other: &NormalizationParams) -> Result<Self, ExampleError> {
        if other.kind != self.kind {
            return Err(ExampleError::Configuration(format!(
                "cannot mix {} and {} normalization parameters",
                self.kind, other.kind
            )));
        }
        let first = concatenate(Axis(1), &[self.first.view(), other.first.view()])
            .map_err(|err| ExampleError::Configuration(err.to_string()))?;
        let second = concatenate(Axis(1), &[self.second.view(), other.second.view()])
            .map_err(|err| ExampleError::Configuration(err.to_string()))?;
        Ok(Self {
            kind: self.kind,
            first,
            second,
        })
    }
}

/// File-level attributes shared by every example in a store or set.
#[derive(Clone, Debug, PartialEq)]
pub struct ExampleSchema {
    /// Predictor channels, in tensor order.
    pub channels: ChannelSpec,
    /// Label dilation distance in metres.
    pub dilation_distance_metres: f64,
    /// Cells allowed as window centers on the full grid.
    pub mask: ValidityMask,
    /// Normalization type of the stored predictors.
    pub normalization: NormalizationType,
    /// Half-height of every window.
    pub half_rows: usize,
    /// Half-width of every window.
    pub half_columns: usize,
    /// Number of target classes.
    pub scheme: ClassScheme,
}

impl ExampleSchema {
    /// 2 * half_rows + 1
    pub fn window_rows(&self) -> usize {
        2 * self.half_rows + 1
    }

    /// 2 * half_columns + 1
    pub fn window_columns(&self) -> usize {
        2 * self.half_columns + 1
    }

    /// Strict equality check used before appending to an existing store.
    pub fn check_matches(&self, other: &ExampleSchema) -> Result<(), ExampleError> {
        if self.channels != other.channels {
            let describe = |spec: &ChannelSpec| {
                spec.iter()
                    .map(Channel::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            return Err(ExampleError::SchemaMismatch {
                field: "channels",
                details: format!(
                    "file has [{}], examples have [{}]",
                    describe(&self.channels),
                    describe(&other.channels)
                ),
            });
        }
        if (self.dilation_distance_metres - other.dilation_distance_metres).abs() > TOLERANCE {
            return Err(ExampleError::SchemaMismatch {
                field: "dilation_distance_metres",
                details: format!(
                    "file has {}, examples have {}",
                    self.dilation_distance_metres, other.dilation_distance_metres
                ),
            });
        }
        if self.normalization != other.normalization {
            return Err(ExampleError::SchemaMismatch {
                field: "normalization_type",
                details: format!(
                    "file has {}, examples have {}",
                    self.normalization, other.normalization
                ),
            });
        }
        if self.mask != other.mask {
            return Err(ExampleError::SchemaMismatch {
                field: "validity_mask",
                details: format!(
                    "masks differ (file {:?} with {} valid cells, examples {:?} with {})",
                    self.mask.shape(),
                    self.mask.num_valid(),
                    other.mask.shape(),
                    other.mask.num_valid()
                ),
            });
        }
        if (self.half_rows, self.half_columns) != (other.half_rows, other.half_columns) {
            return Err(ExampleError::SchemaMismatch {
                field: "half_window",
                details: format!(
                    "file has {}x{}, examples have {}x{}",
                    self.half_rows, self.half_columns, other.half_rows, other.half_columns
                ),
            });
        }
        if self.scheme != other.scheme {
            return Err(ExampleError::SchemaMismatch {
                field: "num_classes",
                details: format!(
                    "file has {}, examples have {}",
                    self.scheme.num_classes(),
                    other.scheme.num_classes()
                ),
            });
        }
        Ok(())
    }
}

/// Metadata of a set of examples, without tensors.
#[derive(Clone, Debug, PartialEq)]
pub struct ExampleMetadata {
    /// Schema shared by the examples.
    pub schema: ExampleSchema,
    /// Valid time of each example.
    pub valid_times: Vec<UnixSeconds>,
    /// Full-grid row of each window center.
    pub rows: Vec<usize>,
    /// Full-grid column of each window center.
    pub columns: Vec<usize>,
}

impl ExampleMetadata {
    /// Number of examples.
    pub fn len(&self) -> usize {
        self.valid_times.len()
    }

    /// Whether there are no examples.
    pub fn is_empty(&self) -> bool {
        self.valid_times.is_empty()
    }

    /// Identifiers of every example, in order.
    pub fn ids(&self) -> Result<Vec<ExampleId>, ExampleError> {
        crate::ids::create_ids(&self.valid_times, &self.rows, &self.columns)
    }
}

/// A stack of windowed examples sharing one schema.
#[derive(Clone, Debug, PartialEq)]
pub struct ExampleSet {
    /// Schema shared by the examples.
    pub schema: ExampleSchema,
    /// E-by-m-by-n-by-C predictor windows.
    pub predictors: Array4<f32>,
    /// E-by-K one-hot targets.
    pub targets: Array2<u8>,
    /// Valid time of the grid each window was cut from.
    pub valid_times: Vec<UnixSeconds>,
    /// Full-grid row of each window center.
    pub rows: Vec<usize>,
    /// Full-grid column of each window center.
    pub columns: Vec<usize>,
    /// Parameters used to normalize each example.
    pub normalization: NormalizationParams,
}

impl ExampleSet {
    /// Assemble a set, checking every array against `schema` and each other.
    pub fn new(
        schema: ExampleSchema,
        predictors: Array4<f32>,
        targets: Array2<u8>,
        valid_times: Vec<UnixSeconds>,
        rows: Vec<usize>,
        columns: Vec<usize>,
        normalization: NormalizationParams,
    ) -> Result<Self, ExampleError> {
        let num_examples = predictors.len_of(Axis(0));
        let expected = (
            num_examples,
            schema.window_rows(),
            schema.window_columns(),
            schema.channels.len(),
        );
        if predictors.dim() != expected {
            return Err(ExampleError::Configuration(format!(
                "predictor tensor has shape {:?}, expected {:?}",
                predictors.dim(),
                expected
            )));
        }
        if targets.dim() != (num_examples, schema.scheme.num_classes()) {
            return Err(ExampleError::Configuration(format!(
                "target tensor has shape {:?}, expected ({num_examples}, {})",
                targets.dim(),
                schema.scheme.num_classes()
            )));
        }
        if valid_times.len() != num_examples
            || rows.len() != num_examples
            || columns.len() != num_examples
        {
            return Err(ExampleError::Configuration(format!(
                "metadata lengths ({}, {}, {}) do not match {num_examples} examples",
                valid_times.len(),
                rows.len(),
                columns.len()
            )));
        }
        if normalization.first.dim() != (num_examples, schema.channels.len()) {
            return Err(ExampleError::Configuration(format!(
                "normalization parameters have shape {:?}, expected ({num_examples}, {})",
                normalization.first.dim(),
                schema.channels.len()
            )));
        }
        if normalization.kind != schema.normalization {
            return Err(ExampleError::Configuration(format!(
                "normalization parameters are {}, schema says {}",
                normalization.kind, schema.normalization
            )));
        }
        Ok(Self {
            schema,
            predictors,
            targets,
            valid_times,
            rows,
            columns,
            normalization,
        })
    }

    /// Number of examples.
    pub fn len(&self) -> usize {
        self.valid_times.len()
    }

    /// Whether there are no examples.
    pub fn is_empty(&self) -> bool {
        self.valid_times.is_empty()
    }

    /// Identifiers of every example, in order.
    pub fn ids(&self) -> Result<Vec<ExampleId>, ExampleError> {
        crate::ids::create_ids(&self.valid_times, &self.rows, &self.columns)
    }

    /// Everything but the tensors.
    pub fn metadata(&self) -> ExampleMetadata {
        ExampleMetadata {
            schema: self.schema.clone(),
            valid_times: self.valid_times.clone(),
            rows: self.rows.clone(),
            columns: self.columns.clone(),
        }
    }

    /// Number of examples per class.
    pub fn class_counts(&self) -> Vec<usize> {
        self.targets
            .axis_iter(Axis(1))
            .map(|column| column.iter().map(|value| usize::from(*value)).sum())
            .collect()
    }

    /// Keep only the examples at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> Result<Self, ExampleError> {
        if let Some(bad) = indices.iter().find(|index| **index >= self.len()) {
            return Err(ExampleError::Configuration(format!(
                "example index {bad} is out of range for {} examples",
                self.len()
            )));
        }
        Ok(Self {
            schema: self.schema.clone(),
            predictors: self.predictors.select(Axis(0), indices),
            targets: self.targets.select(Axis(0), indices),
            valid_times: indices.iter().map(|i| self.valid_times[*i]).collect(),
            rows: indices.iter().map(|i| self.rows[*i]).collect(),
            columns: indices.iter().map(|i| self.columns[*i]).collect(),
            normalization: self.normalization.select_examples(indices),
        })
    }

    /// Keep (and reorder to) the requested channels.
    pub fn select_channels(&self, channels: &ChannelSpec) -> Result<Self, ExampleError> {
        let indices = self.schema.channels.indices_of(channels)?;
        let mut schema = self.schema.clone();
        schema.channels = channels.clone();
        Ok(Self {
            schema,
            predictors: self.predictors.select(Axis(3), &indices),
            targets: self.targets.clone(),
            valid_times: self.valid_times.clone(),
            rows: self.rows.clone(),
            columns: self.columns.clone(),
            normalization: self.normalization.select_channels(&indices),
        })
    }

    /// Center-crop every window to a smaller half-window.
    pub fn crop(&self, half_rows: usize, half_columns: usize) -> Result<Self, ExampleError> {
        let predictors = center_crop(&self.predictors, half_rows, half_columns)?;
        let mut schema = self.schema.clone();
        schema.half_rows = half_rows;
        schema.half_columns = half_columns;
        Ok(Self {
            schema,
            predictors,
            targets: self.targets.clone(),
            valid_times: self.valid_times.clone(),
            rows: self.rows.clone(),
            columns: self.columns.clone(),
            normalization: self.normalization.clone(),
        })
    }

    /// Predictors converted back to physical units.
    pub fn denormalize(&self) -> Result<Array4<f32>, ExampleError> {
        let mut physical = self.predictors.clone();
        normalization::denormalize(&mut physical, &self.normalization)?;
        Ok(physical)
    }

    /// Stack several sets along the example axis. All schemas must match.
    pub fn concat(sets: &[ExampleSet]) -> Result<Option<ExampleSet>, ExampleError> {
        let Some(first) = sets.first() else {
            return Ok(None);
        };
        for other in &sets[1..] {
            first.schema.check_matches(&other.schema)?;
        }
        let shape_err = |err: ndarray::ShapeError| ExampleError::Configuration(err.to_string());
        let predictors = concatenate(
            Axis(0),
            &sets.iter().map(|set| set.predictors.view()).collect::<Vec<_>>(),
        )
        .map_err(shape_err)?;
        let targets = concatenate(
            Axis(0),
            &sets.iter().map(|set| set.targets.view()).collect::<Vec<_>>(),
        )
        .map_err(shape_err)?;
        let first_params = concatenate(
            Axis(0),
            &sets
                .iter()
                .map(|set| set.normalization.first.view())
                .collect::<Vec<_>>(),
        )
        .map_err(shape_err)?;
        let second_params = concatenate(
            Axis(0),
            &sets
                .iter()
                .map(|set| set.normalization.second.view())
                .collect::<Vec<_>>(),
        )
        .map_err(shape_err)?;
        let merged = ExampleSet::new(
            first.schema.clone(),
            predictors,
            targets,
            sets.iter().flat_map(|set| set.valid_times.iter().copied()).collect(),
            sets.iter().flat_map(|set| set.rows.iter().copied()).collect(),
            sets.iter().flat_map(|set| set.columns.iter().copied()).collect(),
            NormalizationParams::new(first.normalization.kind, first_params, second_params)?,
        )?;
        Ok(Some(merged))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn schema(channels: ChannelSpec) -> ExampleSchema {
        ExampleSchema {
            channels,
            dilation_distance_metres: 50_000.0,
            mask: ValidityMask::all_valid(5, 5),
            normalization: NormalizationType::ZScore,
            half_rows: 1,
            half_columns: 1,
            scheme: ClassScheme::Ternary,
        }
    }

    fn two_channel_set() -> ExampleSet {
        let channels = ChannelSpec::new(vec![
            Channel::new("temperature_kelvins", 850),
            Channel::new("u_wind_m_s01", 850),
        ])
        .unwrap();
        let mut predictors = Array4::zeros((2, 3, 3, 2));
        predictors.slice_mut(ndarray::s![.., .., .., 1]).fill(1.0);
        ExampleSet::new(
            schema(channels),
            predictors,
            one_hot(&[FrontClass::NoFront, FrontClass::ColdFront], ClassScheme::Ternary),
            vec![10_800, 21_600],
            vec![2, 3],
            vec![2, 2],
            NormalizationParams::new(
                NormalizationType::ZScore,
                array![[280.0, 5.0], [281.0, 6.0]],
                array![[2.0, 1.0], [3.0, 1.5]],
            )
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn channel_spec_rejects_duplicates() {
        let err = ChannelSpec::new(vec![
            Channel::new("temperature_kelvins", 850),
            Channel::new("temperature_kelvins", 850),
        ])
        .unwrap_err();
        assert!(matches!(err, ExampleError::Configuration(_)));
    }

    #[test]
    fn orography_is_recognized_only_at_surface_sentinel() {
        assert!(Channel::orography().is_orography());
        assert!(!Channel::new(HEIGHT_FIELD_NAME, 500).is_orography());
        let spec = ChannelSpec::new(vec![Channel::new("t", 850), Channel::orography()]).unwrap();
        assert!(spec.contains_orography());
        assert_eq!(spec.without_orography().unwrap().len(), 1);
    }

    #[test]
    fn binary_scheme_merges_warm_and_cold() {
        assert_eq!(FrontClass::WarmFront.index(ClassScheme::Binary), 1);
        assert_eq!(FrontClass::ColdFront.index(ClassScheme::Binary), 1);
        assert_eq!(FrontClass::ColdFront.index(ClassScheme::Ternary), 2);
        assert_eq!(FrontClass::ColdFront.binarized(), FrontClass::AnyFront);
        assert!(FrontClass::from_index(2, ClassScheme::Binary).is_err());
    }

    #[test]
    fn mask_from_ints_rejects_other_values() {
        assert!(ValidityMask::from_ints(&array![[0, 1], [1, 2]]).is_err());
        let mask = ValidityMask::from_ints(&array![[0, 1], [1, 1]]).unwrap();
        assert_eq!(mask.num_valid(), 3);
    }

    #[test]
    fn interior_mask_drops_edges() {
        let mask = ValidityMask::all_valid(5, 7).interior(1, 2);
        assert_eq!(mask.num_valid(), 3 * 3);
        assert!(!mask.is_valid(0, 3));
        assert!(!mask.is_valid(2, 1));
        assert!(mask.is_valid(2, 2));
        assert!(mask.is_valid(3, 4));
    }

    #[test]
    fn example_set_rejects_wrong_window_shape() {
        let set = two_channel_set();
        let err = ExampleSet::new(
            set.schema.clone(),
            Array4::zeros((2, 5, 5, 2)),
            set.targets.clone(),
            set.valid_times.clone(),
            set.rows.clone(),
            set.columns.clone(),
            set.normalization.clone(),
        )
        .unwrap_err();
        assert!(matches!(err, ExampleError::Configuration(_)));
    }

    #[test]
    fn select_channels_reorders_tensors_and_params() {
        let set = two_channel_set();
        let requested = ChannelSpec::new(vec![Channel::new("u_wind_m_s01", 850)]).unwrap();
        let subset = set.select_channels(&requested).unwrap();
        assert_eq!(subset.predictors.dim(), (2, 3, 3, 1));
        assert!(subset.predictors.iter().all(|value| *value == 1.0));
        assert_eq!(subset.normalization.first, array![[5.0], [6.0]]);
        let missing = ChannelSpec::new(vec![Channel::new("v_wind_m_s01", 850)]).unwrap();
        assert!(set.select_channels(&missing).is_err());
    }

    #[test]
    fn subset_and_concat_keep_alignment() {
        let set = two_channel_set();
        let reversed = set.subset(&[1, 0]).unwrap();
        assert_eq!(reversed.valid_times, vec![21_600, 10_800]);
        assert_eq!(reversed.class_counts(), vec![1, 0, 1]);
        let merged = ExampleSet::concat(&[set.clone(), reversed]).unwrap().unwrap();
        assert_eq!(merged.len(), 4);
        assert_eq!(merged.rows, vec![2, 3, 3, 2]);
        assert!(set.subset(&[2]).is_err());
    }

    #[test]
    fn schema_mismatch_names_the_field() {
        let set = two_channel_set();
        let mut other = set.schema.clone();
        other.dilation_distance_metres = 50_000.5;
        match set.schema.check_matches(&other) {
            Err(ExampleError::SchemaMismatch { field, .. }) => {
                assert_eq!(field, "dilation_distance_metres")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn class_indices_decode_one_hot_rows() {
        let encoded = one_hot(
            &[FrontClass::WarmFront, FrontClass::NoFront, FrontClass::ColdFront],
            ClassScheme::Ternary,
        );
        assert_eq!(class_indices(encoded.view()), vec![1, 0, 2]);
    }
}
