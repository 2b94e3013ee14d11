use ndarray::ArrayView3;
use rand::Rng;
use rand::seq::SliceRandom;
use rand::seq::index;
use tracing::debug;

use crate::constants::sampling::TOLERANCE;
use crate::data::{ClassScheme, FrontClass, ValidityMask};
use crate::errors::ExampleError;

/// Desired share of sampled points per class (no front, warm, cold) or
/// (no front, front).
#[derive(Clone, Debug, PartialEq)]
pub struct ClassFractions {
    fractions: Vec<f64>,
}

impl ClassFractions {
    /// Fails unless there are 2 or 3 non-negative fractions summing to 1.
    pub fn new(fractions: Vec<f64>) -> Result<Self, ExampleError> {
        ClassScheme::from_num_classes(fractions.len())?;
        if fractions.iter().any(|f| !f.is_finite() || *f < 0.0) {
            return Err(ExampleError::Configuration(format!(
                "class fractions must be non-negative, got {fractions:?}"
            )));
        }
        let total: f64 = fractions.iter().sum();
        if (total - 1.0).abs() > TOLERANCE {
            return Err(ExampleError::Configuration(format!(
                "class fractions must sum to 1, got {total}"
            )));
        }
        Ok(Self { fractions })
    }

    /// Fractions in class-index order.
    pub fn as_slice(&self) -> &[f64] {
        &self.fractions
    }

    /// Binary for 2 fractions, ternary for 3.
    pub fn scheme(&self) -> ClassScheme {
        if self.fractions.len() == 2 {
            ClassScheme::Binary
        } else {
            ClassScheme::Ternary
        }
    }

    /// Integer quota per class: `round(fraction * num_points)`.
    pub fn quotas(&self, num_points: usize) -> Vec<usize> {
        self.fractions
            .iter()
            .map(|f| (f * num_points as f64).round() as usize)
            .collect()
    }
}

/// Sampled window centers, grouped by the time step they were drawn from.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TargetPoints {
    /// Center rows, one list per time step.
    pub rows_by_time: Vec<Vec<usize>>,
    /// Center columns, parallel to `rows_by_time`.
    pub columns_by_time: Vec<Vec<usize>>,
}

impl TargetPoints {
    /// No points yet, `num_times` empty groups.
    pub fn with_times(num_times: usize) -> Self {
        Self {
            rows_by_time: vec![Vec::new(); num_times],
            columns_by_time: vec![Vec::new(); num_times],
        }
    }

    /// Every (row, column) pair of a single time step.
    pub fn single_time(rows: Vec<usize>, columns: Vec<usize>) -> Self {
        Self {
            rows_by_time: vec![rows],
            columns_by_time: vec![columns],
        }
    }

    /// Add a center drawn from time step `time_index`.
    pub fn push(&mut self, time_index: usize, row: usize, column: usize) {
        self.rows_by_time[time_index].push(row);
        self.columns_by_time[time_index].push(column);
    }

    /// Total points across time steps.
    pub fn num_points(&self) -> usize {
        self.rows_by_time.iter().map(Vec::len).sum()
    }

    /// `(time_index, row, column)` in time-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        self.rows_by_time
            .iter()
            .zip(&self.columns_by_time)
            .enumerate()
            .flat_map(|(time, (rows, columns))| {
                rows.iter().zip(columns).map(move |(r, c)| (time, *r, *c))
            })
    }
}

fn check_mask(
    targets: &ArrayView3<'_, FrontClass>,
    mask: Option<&ValidityMask>,
) -> Result<(), ExampleError> {
    let (_, num_rows, num_columns) = targets.dim();
    if let Some(mask) = mask
        && mask.shape() != (num_rows, num_columns)
    {
        return Err(ExampleError::Configuration(format!(
            "mask has shape {:?}, grid is {num_rows}x{num_columns}",
            mask.shape()
        )));
    }
    Ok(())
}

fn masked_cells<'a, 'b: 'a>(
    targets: &'a ArrayView3<'b, FrontClass>,
    mask: Option<&'a ValidityMask>,
) -> impl Iterator<Item = ((usize, usize, usize), FrontClass)> + 'a {
    targets
        .indexed_iter()
        .filter(move |((_, row, column), _)| mask.is_none_or(|m| m.is_valid(*row, *column)))
        .map(|(index, class)| (index, *class))
}

/// Class-balanced draw of window centers across every time step of `targets`.
///
/// Each class contributes `round(fraction * num_points)` cells chosen without
/// replacement; a class with fewer cells contributes all it has. Returns
/// `Ok(None)` when nothing could be drawn.
pub fn sample_target_points<R: Rng + ?Sized>(
    targets: ArrayView3<'_, FrontClass>,
    fractions: &ClassFractions,
    num_points: usize,
    mask: Option<&ValidityMask>,
    rng: &mut R,
) -> Result<Option<TargetPoints>, ExampleError> {
    check_mask(&targets, mask)?;
    let scheme = fractions.scheme();
    let mut candidates: Vec<Vec<(usize, usize, usize)>> = vec![Vec::new(); scheme.num_classes()];
    for (cell, class) in masked_cells(&targets, mask) {
        candidates[class.index(scheme)].push(cell);
    }

    let quotas = fractions.quotas(num_points);
    let mut points = TargetPoints::with_times(targets.len_of(ndarray::Axis(0)));
    for (class_index, (pool, quota)) in candidates.iter().zip(&quotas).enumerate() {
        let amount = (*quota).min(pool.len());
        debug!(
            "[frontgen:sample] class {class_index}: quota={quota} available={} drawn={amount}",
            pool.len()
        );
        for position in index::sample(rng, pool.len(), amount) {
            let (time, row, column) = pool[position];
            points.push(time, row, column);
        }
    }
    if points.num_points() == 0 {
        return Ok(None);
    }
    Ok(Some(points))
}

/// Unweighted draw: every masked cell is equally likely, at most `num_points`
/// are kept. Returns `Ok(None)` when the mask leaves no cells.
pub fn sample_uniform_points<R: Rng + ?Sized>(
    targets: ArrayView3<'_, FrontClass>,
    num_points: usize,
    mask: Option<&ValidityMask>,
    rng: &mut R,
) -> Result<Option<TargetPoints>, ExampleError> {
    check_mask(&targets, mask)?;
    let mut cells: Vec<(usize, usize, usize)> =
        masked_cells(&targets, mask).map(|(cell, _)| cell).collect();
    cells.shuffle(rng);
    cells.truncate(num_points);
    if cells.is_empty() {
        return Ok(None);
    }
    let mut points = TargetPoints::with_times(targets.len_of(ndarray::Axis(0)));
    for (time, row, column) in cells {
        points.push(time, row, column);
    }
    Ok(Some(points))
}
