//! Batch augmentation: translation, rotation, and Gaussian noise.
//!
//! Every transform works on E-by-M-by-N-by-C predictor batches, one
//! (example, channel) image at a time. Pixels shifted in from outside the
//! image are zero.

use ndarray::{Array2, Array4, ArrayView2, ArrayView4, ArrayViewMut2, Axis, concatenate};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use tracing::debug;

use crate::config::AugmentationConfig;
use crate::errors::ExampleError;

/// Shift every image by `x_offset` columns and `y_offset` rows. Positive
/// offsets move content toward higher column and row indices.
pub fn translate(images: ArrayView4<'_, f32>, x_offset: i32, y_offset: i32) -> Array4<f32> {
    let mut shifted = Array4::zeros(images.raw_dim());
    for (source, mut target) in images.outer_iter().zip(shifted.outer_iter_mut()) {
        for (image, out) in source.axis_iter(Axis(2)).zip(target.axis_iter_mut(Axis(2))) {
            translate_image(image, out, x_offset as isize, y_offset as isize);
        }
    }
    shifted
}

fn translate_image(
    image: ArrayView2<'_, f32>,
    mut out: ArrayViewMut2<'_, f32>,
    x_offset: isize,
    y_offset: isize,
) {
    let (num_rows, num_columns) = image.dim();
    for ((row, column), value) in out.indexed_iter_mut() {
        let source_row = row as isize - y_offset;
        let source_column = column as isize - x_offset;
        if (0..num_rows as isize).contains(&source_row)
            && (0..num_columns as isize).contains(&source_column)
        {
            *value = image[[source_row as usize, source_column as usize]];
        }
    }
}

/// Rotate every image counterclockwise about its center, with bilinear
/// interpolation. The output keeps the input size.
pub fn rotate(images: ArrayView4<'_, f32>, ccw_angle_deg: f64) -> Array4<f32> {
    let mut rotated = Array4::zeros(images.raw_dim());
    let (sin, cos) = ccw_angle_deg.to_radians().sin_cos();
    for (source, mut target) in images.outer_iter().zip(rotated.outer_iter_mut()) {
        for (image, out) in source.axis_iter(Axis(2)).zip(target.axis_iter_mut(Axis(2))) {
            rotate_image(image, out, sin, cos);
        }
    }
    rotated
}

fn rotate_image(image: ArrayView2<'_, f32>, mut out: ArrayViewMut2<'_, f32>, sin: f64, cos: f64) {
    let (num_rows, num_columns) = image.dim();
    let center_row = (num_rows as f64 - 1.0) / 2.0;
    let center_column = (num_columns as f64 - 1.0) / 2.0;
    for ((row, column), value) in out.indexed_iter_mut() {
        // x to the right, y up.
        let x = column as f64 - center_column;
        let y = center_row - row as f64;
        let source_x = x * cos + y * sin;
        let source_y = -x * sin + y * cos;
        *value = bilinear(&image, center_row - source_y, center_column + source_x);
    }
}

fn bilinear(image: &ArrayView2<'_, f32>, row: f64, column: f64) -> f32 {
    let (num_rows, num_columns) = image.dim();
    let row0 = row.floor();
    let column0 = column.floor();
    let row_weight = row - row0;
    let column_weight = column - column0;
    let sample = |r: f64, c: f64| -> f64 {
        if r < 0.0 || c < 0.0 || r >= num_rows as f64 || c >= num_columns as f64 {
            0.0
        } else {
            f64::from(image[[r as usize, c as usize]])
        }
    };
    let top = sample(row0, column0) * (1.0 - column_weight)
        + sample(row0, column0 + 1.0) * column_weight;
    let bottom = sample(row0 + 1.0, column0) * (1.0 - column_weight)
        + sample(row0 + 1.0, column0 + 1.0) * column_weight;
    (top * (1.0 - row_weight) + bottom * row_weight) as f32
}

/// Add independent zero-mean Gaussian noise to every value.
pub fn add_noise<R: rand::Rng + ?Sized>(
    images: ArrayView4<'_, f32>,
    stdev: f32,
    rng: &mut R,
) -> Result<Array4<f32>, ExampleError> {
    let normal = Normal::new(0.0_f32, stdev)
        .map_err(|err| ExampleError::Configuration(format!("noise distribution: {err}")))?;
    Ok(images.mapv(|value| value + normal.sample(rng)))
}

/// Applies an [`AugmentationConfig`] to whole batches.
#[derive(Clone, Debug)]
pub struct Augmenter {
    config: AugmentationConfig,
    rng: StdRng,
}

impl Augmenter {
    /// Validate `config` and seed the noise RNG from it.
    pub fn new(config: AugmentationConfig) -> Result<Self, ExampleError> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self { config, rng })
    }

    /// Settings this augmenter was built with.
    pub fn config(&self) -> &AugmentationConfig {
        &self.config
    }

    /// Append one transformed copy of the original batch per translation,
    /// then per rotation, then per noising. Targets are repeated unchanged,
    /// so example `i` of the original and example `i + k * E` share a label.
    pub fn augment(
        &mut self,
        predictors: &Array4<f32>,
        targets: &Array2<f32>,
    ) -> Result<(Array4<f32>, Array2<f32>), ExampleError> {
        if predictors.len_of(Axis(0)) != targets.nrows() {
            return Err(ExampleError::Configuration(format!(
                "{} predictor examples but {} targets",
                predictors.len_of(Axis(0)),
                targets.nrows()
            )));
        }
        debug!(
            "[frontgen:augment] {} translations, {} rotations, {} noisings",
            self.config.x_translations.len(),
            self.config.rotation_angles_deg.len(),
            self.config.num_noisings
        );
        let original = predictors.view();
        let mut copies = vec![predictors.clone()];
        for (x, y) in self
            .config
            .x_translations
            .iter()
            .zip(&self.config.y_translations)
        {
            copies.push(translate(original, *x, *y));
        }
        for angle in &self.config.rotation_angles_deg {
            copies.push(rotate(original, *angle));
        }
        for _ in 0..self.config.num_noisings {
            copies.push(add_noise(original, self.config.noise_stdev, &mut self.rng)?);
        }

        let shape_err = |err: ndarray::ShapeError| ExampleError::Configuration(err.to_string());
        let views: Vec<_> = copies.iter().map(|copy| copy.view()).collect();
        let all_predictors = concatenate(Axis(0), &views).map_err(shape_err)?;
        let target_views = vec![targets.view(); copies.len()];
        let all_targets = concatenate(Axis(0), &target_views).map_err(shape_err)?;
        Ok((all_predictors, all_targets))
    }
}
