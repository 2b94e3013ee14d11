use ndarray::{Array2, Array3, Axis};
use serde::{Deserialize, Serialize};

use crate::constants::grid::GRID_SPACING_METRES;
use crate::data::{ClassScheme, FrontClass};
use crate::errors::ExampleError;

/// Grid cells covered by warm and cold fronts at one valid time.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrontTable {
    /// (row, column) of each warm-front cell.
    pub warm_cells: Vec<(usize, usize)>,
    /// (row, column) of each cold-front cell.
    pub cold_cells: Vec<(usize, usize)>,
}

/// Paint a front table onto an empty label image. A cell listed as both
/// warm and cold ends up cold.
pub fn rasterize(
    table: &FrontTable,
    num_rows: usize,
    num_columns: usize,
) -> Result<Array2<FrontClass>, ExampleError> {
    let mut labels = Array2::from_elem((num_rows, num_columns), FrontClass::NoFront);
    let cells = table
        .warm_cells
        .iter()
        .map(|cell| (cell, FrontClass::WarmFront))
        .chain(table.cold_cells.iter().map(|cell| (cell, FrontClass::ColdFront)));
    for (&(row, column), class) in cells {
        let Some(slot) = labels.get_mut((row, column)) else {
            return Err(ExampleError::Configuration(format!(
                "front cell ({row}, {column}) lies outside the {num_rows}x{num_columns} grid"
            )));
        };
        *slot = class;
    }
    Ok(labels)
}

/// Grow front labels to every cell within `distance_metres` of a front.
///
/// Cells already on a front keep their class. A no-front cell in range of
/// both types takes the nearer one; on equal distance it becomes cold.
pub fn dilate(labels: &Array2<FrontClass>, distance_metres: f64) -> Array2<FrontClass> {
    if distance_metres <= 0.0 {
        return labels.clone();
    }
    let (num_rows, num_columns) = labels.dim();
    let radius = (distance_metres / GRID_SPACING_METRES).floor() as usize;
    let mut nearest_warm = Array2::from_elem((num_rows, num_columns), f64::INFINITY);
    let mut nearest_cold = Array2::from_elem((num_rows, num_columns), f64::INFINITY);

    for ((row, column), class) in labels.indexed_iter() {
        let nearest = match class {
            FrontClass::WarmFront | FrontClass::AnyFront => &mut nearest_warm,
            FrontClass::ColdFront => &mut nearest_cold,
            FrontClass::NoFront => continue,
        };
        let first_row = row.saturating_sub(radius);
        let last_row = (row + radius).min(num_rows - 1);
        let first_column = column.saturating_sub(radius);
        let last_column = (column + radius).min(num_columns - 1);
        for r in first_row..=last_row {
            for c in first_column..=last_column {
                let dr = r.abs_diff(row) as f64;
                let dc = c.abs_diff(column) as f64;
                let distance = (dr * dr + dc * dc).sqrt() * GRID_SPACING_METRES;
                if distance <= distance_metres && distance < nearest[[r, c]] {
                    nearest[[r, c]] = distance;
                }
            }
        }
    }

    let warm_class = if labels.iter().any(|class| *class == FrontClass::AnyFront) {
        FrontClass::AnyFront
    } else {
        FrontClass::WarmFront
    };
    let mut dilated = labels.clone();
    for ((row, column), class) in dilated.indexed_iter_mut() {
        if class.is_front() {
            continue;
        }
        let warm = nearest_warm[[row, column]];
        let cold = nearest_cold[[row, column]];
        if cold.is_finite() && cold <= warm {
            *class = FrontClass::ColdFront;
        } else if warm.is_finite() {
            *class = warm_class;
        }
    }
    dilated
}

/// Collapse warm and cold labels into [`FrontClass::AnyFront`].
pub fn binarize(labels: &mut Array3<FrontClass>) {
    labels.mapv_inplace(FrontClass::binarized);
}

/// Rasterize, dilate, and (for the binary scheme) collapse one time step.
pub fn labels_for_time(
    table: &FrontTable,
    num_rows: usize,
    num_columns: usize,
    dilation_distance_metres: f64,
    scheme: ClassScheme,
) -> Result<Array3<FrontClass>, ExampleError> {
    let raster = rasterize(table, num_rows, num_columns)?;
    let mut labels = dilate(&raster, dilation_distance_metres).insert_axis(Axis(0));
    if scheme == ClassScheme::Binary {
        binarize(&mut labels);
    }
    Ok(labels)
}
