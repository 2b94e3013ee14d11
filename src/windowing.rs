use ndarray::{Array4, ArrayView3, ArrayView4, Axis, s};

use crate::data::FrontClass;
use crate::errors::ExampleError;
use crate::sampling::TargetPoints;

/// Windows cut around sampled points, aligned one-to-one.
#[derive(Clone, Debug, PartialEq)]
pub struct Windows {
    /// E-by-(2*half_rows+1)-by-(2*half_columns+1)-by-C predictor windows.
    pub predictors: Array4<f32>,
    /// Label of each window's center cell.
    pub target_classes: Vec<FrontClass>,
    /// Index of the source time step along the first axis of the full grid.
    pub time_indices: Vec<usize>,
    /// Full-grid row of each center.
    pub rows: Vec<usize>,
    /// Full-grid column of each center.
    pub columns: Vec<usize>,
}

impl Windows {
    /// Number of windows.
    pub fn len(&self) -> usize {
        self.target_classes.len()
    }

    /// Whether there are no windows.
    pub fn is_empty(&self) -> bool {
        self.target_classes.is_empty()
    }
}

/// Cut a fixed-size window of `predictors` around every point.
///
/// `predictors` is T-by-M-by-N-by-C and `targets` T-by-M-by-N. Every point must
/// lie at least `half_rows`/`half_columns` cells inside the grid; sampling
/// with an interior mask guarantees this.
pub fn window_around_points(
    predictors: ArrayView4<'_, f32>,
    targets: ArrayView3<'_, FrontClass>,
    half_rows: usize,
    half_columns: usize,
    points: &TargetPoints,
) -> Result<Windows, ExampleError> {
    let (num_times, num_rows, num_columns, num_channels) = predictors.dim();
    if targets.dim() != (num_times, num_rows, num_columns) {
        return Err(ExampleError::Configuration(format!(
            "target grid {:?} does not match predictor grid {:?}",
            targets.dim(),
            (num_times, num_rows, num_columns)
        )));
    }
    if points.rows_by_time.len() > num_times {
        return Err(ExampleError::Configuration(format!(
            "points reference {} time steps, grid has {num_times}",
            points.rows_by_time.len()
        )));
    }

    let num_points = points.num_points();
    let mut windows = Windows {
        predictors: Array4::zeros((
            num_points,
            2 * half_rows + 1,
            2 * half_columns + 1,
            num_channels,
        )),
        target_classes: Vec::with_capacity(num_points),
        time_indices: Vec::with_capacity(num_points),
        rows: Vec::with_capacity(num_points),
        columns: Vec::with_capacity(num_points),
    };
    for (example, (time, row, column)) in points.iter().enumerate() {
        let inside = row >= half_rows
            && row + half_rows < num_rows
            && column >= half_columns
            && column + half_columns < num_columns;
        if !inside {
            return Err(ExampleError::Configuration(format!(
                "point ({row}, {column}) is closer than {half_rows}x{half_columns} to the edge of a {num_rows}x{num_columns} grid"
            )));
        }
        let window = predictors.slice(s![
            time,
            row - half_rows..=row + half_rows,
            column - half_columns..=column + half_columns,
            ..
        ]);
        windows
            .predictors
            .index_axis_mut(Axis(0), example)
            .assign(&window);
        windows.target_classes.push(targets[[time, row, column]]);
        windows.time_indices.push(time);
        windows.rows.push(row);
        windows.columns.push(column);
    }
    Ok(windows)
}

/// Keep the central `(2*half_rows+1) x (2*half_columns+1)` part of each window.
pub fn center_crop(
    predictors: &Array4<f32>,
    half_rows: usize,
    half_columns: usize,
) -> Result<Array4<f32>, ExampleError> {
    let (_, num_rows, num_columns, _) = predictors.dim();
    let stored_half_rows = num_rows / 2;
    let stored_half_columns = num_columns / 2;
    if half_rows > stored_half_rows || half_columns > stored_half_columns {
        return Err(ExampleError::Configuration(format!(
            "cannot crop {stored_half_rows}x{stored_half_columns} half-window to {half_rows}x{half_columns}"
        )));
    }
    let row_offset = stored_half_rows - half_rows;
    let column_offset = stored_half_columns - half_columns;
    Ok(predictors
        .slice(s![
            ..,
            row_offset..row_offset + 2 * half_rows + 1,
            column_offset..column_offset + 2 * half_columns + 1,
            ..
        ])
        .to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn coordinate_grid(num_times: usize, num_rows: usize, num_columns: usize) -> Array4<f32> {
        Array4::from_shape_fn((num_times, num_rows, num_columns, 2), |(t, r, c, k)| {
            (t * 10_000 + r * 100 + c) as f32 + k as f32 * 0.5
        })
    }

    #[test]
    fn window_shape_matches_points_and_half_window() {
        let predictors = coordinate_grid(2, 9, 11);
        let targets = Array3::from_elem((2, 9, 11), FrontClass::NoFront);
        let mut points = TargetPoints::with_times(2);
        points.push(0, 2, 3);
        points.push(1, 6, 7);
        points.push(1, 4, 5);
        let windows =
            window_around_points(predictors.view(), targets.view(), 2, 3, &points).unwrap();
        assert_eq!(windows.predictors.dim(), (3, 5, 7, 2));
        assert_eq!(windows.time_indices, vec![0, 1, 1]);
    }

    #[test]
    fn window_is_centered_on_point() {
        let predictors = coordinate_grid(1, 7, 7);
        let mut targets = Array3::from_elem((1, 7, 7), FrontClass::NoFront);
        targets[[0, 3, 4]] = FrontClass::ColdFront;
        let points = TargetPoints::single_time(vec![3], vec![4]);
        let windows =
            window_around_points(predictors.view(), targets.view(), 1, 2, &points).unwrap();
        assert_eq!(windows.predictors[[0, 1, 2, 0]], 304.0);
        assert_eq!(windows.predictors[[0, 0, 0, 1]], 202.5);
        assert_eq!(windows.target_classes, vec![FrontClass::ColdFront]);
        assert_eq!((windows.rows[0], windows.columns[0]), (3, 4));
    }

    #[test]
    fn edge_points_are_rejected() {
        let predictors = coordinate_grid(1, 5, 5);
        let targets = Array3::from_elem((1, 5, 5), FrontClass::NoFront);
        let points = TargetPoints::single_time(vec![0], vec![2]);
        assert!(window_around_points(predictors.view(), targets.view(), 1, 1, &points).is_err());
    }

    #[test]
    fn center_crop_keeps_middle() {
        let predictors = coordinate_grid(1, 7, 9);
        let cropped = center_crop(&predictors, 1, 2).unwrap();
        assert_eq!(cropped.dim(), (1, 3, 5, 2));
        assert_eq!(cropped[[0, 1, 2, 0]], predictors[[0, 3, 4, 0]]);
        assert!(center_crop(&predictors, 4, 1).is_err());
    }
}
