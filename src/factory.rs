use std::path::Path;
use std::sync::Arc;

use ndarray::Axis;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{debug, info};

use crate::config::FactoryConfig;
use crate::data::{ChannelSpec, ClassScheme, ExampleSchema, ExampleSet, ValidityMask, one_hot};
use crate::errors::ExampleError;
use crate::labels::labels_for_time;
use crate::normalization::{fill_missing_values, normalize_nonglobal};
use crate::sampling::{ClassFractions, sample_target_points, sample_uniform_points};
use crate::source::{FrontSource, PredictorSource, read_time_step};
use crate::store::ExampleStore;
use crate::types::UnixSeconds;
use crate::windowing::window_around_points;

/// Turns one valid time of raw grids into windowed examples.
pub struct ExampleFactory {
    config: FactoryConfig,
    channels: ChannelSpec,
    fractions: Option<ClassFractions>,
    scheme: ClassScheme,
    predictors: Arc<dyn PredictorSource>,
    fronts: Arc<dyn FrontSource>,
    rng: StdRng,
}

impl ExampleFactory {
    /// Validate `config` and seed the sampler from it.
    pub fn new(
        config: FactoryConfig,
        predictors: Arc<dyn PredictorSource>,
        fronts: Arc<dyn FrontSource>,
    ) -> Result<Self, ExampleError> {
        config.validate()?;
        Ok(Self {
            channels: config.channel_spec()?,
            fractions: config.class_fractions()?,
            scheme: config.scheme()?,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            predictors,
            fronts,
        })
    }

    /// Settings this factory was built with.
    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// Build examples for `valid_time`.
    ///
    /// Returns `Ok(None)` when the time has no front labels or no window
    /// center could be sampled. A missing predictor file is an error.
    pub fn create_examples(
        &mut self,
        valid_time: UnixSeconds,
    ) -> Result<Option<ExampleSet>, ExampleError> {
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
        let mut values = step.predictors.values.insert_axis(Axis(0));
        fill_missing_values(&mut values);

        let mask = match &self.config.mask {
            Some(mask) if mask.shape() != (num_rows, num_columns) => {
                return Err(ExampleError::Configuration(format!(
                    "mask is {:?} but the predictor grid is {num_rows}x{num_columns}",
                    mask.shape()
                )));
            }
            Some(mask) => mask.clone(),
            None => ValidityMask::all_valid(num_rows, num_columns),
        };
        let params = normalize_nonglobal(&mut values, self.config.normalization);

        let labels = labels_for_time(
            &step.fronts,
            num_rows,
            num_columns,
            self.config.dilation_distance_metres,
            self.scheme,
        )?;

        let (half_rows, half_columns) = (self.config.half_rows, self.config.half_columns);
        let centers = mask.interior(half_rows, half_columns);
        let points = match &self.fractions {
            Some(fractions) => sample_target_points(
                labels.view(),
                fractions,
                self.config.max_examples,
                Some(&centers),
                &mut self.rng,
            )?,
            None => sample_uniform_points(
                labels.view(),
                self.config.max_examples,
                Some(&centers),
                &mut self.rng,
            )?,
        };
        let Some(points) = points else {
            debug!("[frontgen:factory] no window centers sampled for valid time {valid_time}");
            return Ok(None);
        };

        let windows =
            window_around_points(values.view(), labels.view(), half_rows, half_columns, &points)?;
        let targets = one_hot(&windows.target_classes, self.scheme);
        let normalization = params.select_examples(&windows.time_indices);
        let schema = ExampleSchema {
            channels: self.channels.clone(),
            dilation_distance_metres: self.config.dilation_distance_metres,
            mask,
            normalization: self.config.normalization,
            half_rows,
            half_columns,
            scheme: self.scheme,
        };
        let count = windows.len();
        let examples = ExampleSet::new(
            schema,
            windows.predictors,
            targets,
            vec![step.valid_time; count],
            windows.rows,
            windows.columns,
            normalization,
        )?;
        info!(
            "[frontgen:factory] created {count} examples for valid time {valid_time}; per class {:?}",
            examples.class_counts()
        );
        Ok(Some(examples))
    }

    /// Create examples for `valid_time` and append them to the store at
    /// `path` (creating it on first use). Returns how many were written.
    pub fn create_and_store(
        &mut self,
        valid_time: UnixSeconds,
        path: &Path,
    ) -> Result<Option<usize>, ExampleError> {
        let Some(examples) = self.create_examples(valid_time)? else {
            return Ok(None);
        };
        ExampleStore::create_or_append(path, &examples)?;
        Ok(Some(examples.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Channel, FrontClass, NormalizationType, class_indices};
    use crate::labels::FrontTable;
    use crate::source::{InMemoryFrontSource, InMemoryPredictorSource, PredictorGrid};
    use ndarray::Array3;

    const TIME: UnixSeconds = 1_199_145_600;

    fn sources(with_fronts: bool) -> (Arc<InMemoryPredictorSource>, Arc<InMemoryFrontSource>) {
        let channels =
            ChannelSpec::new(vec![Channel::new("t", 850), Channel::new("u", 850)]).unwrap();
        let values = Array3::from_shape_fn((12, 12, 2), |(r, c, k)| {
            if r == 0 && c == 0 {
                f32::NAN
            } else {
                (r * 12 + c) as f32 + k as f32 * 1000.0
            }
        });
        let mut predictors = InMemoryPredictorSource::new("/predictors");
        predictors
            .insert(TIME, PredictorGrid::new(values, channels).unwrap())
            .unwrap();
        let mut fronts = InMemoryFrontSource::new("/fronts");
        if with_fronts {
            fronts
                .insert(
                    TIME,
                    FrontTable {
                        warm_cells: vec![(4, 4), (4, 5)],
                        cold_cells: vec![(7, 7), (7, 8)],
                    },
                )
                .unwrap();
        }
        (Arc::new(predictors), Arc::new(fronts))
    }

    fn config() -> FactoryConfig {
        FactoryConfig {
            seed: 7,
            channels: vec![Channel::new("u", 850), Channel::new("t", 850)],
            half_rows: 2,
            half_columns: 2,
            dilation_distance_metres: 0.0,
            class_fractions: Some(vec![0.5, 0.25, 0.25]),
            max_examples: 8,
            normalization: NormalizationType::MinMax,
            mask: None,
        }
    }

    #[test]
    fn missing_front_file_is_soft_none() {
        let (predictors, fronts) = sources(false);
        let mut factory = ExampleFactory::new(config(), predictors, fronts).unwrap();
        assert!(factory.create_examples(TIME).unwrap().is_none());
    }

    #[test]
    fn missing_predictor_file_is_fatal() {
        let (predictors, _) = sources(true);
        let mut fronts = InMemoryFrontSource::new("/fronts");
        fronts.insert(TIME + 10_800, FrontTable::default()).unwrap();
        let mut factory = ExampleFactory::new(config(), predictors, Arc::new(fronts)).unwrap();
        assert!(matches!(
            factory.create_examples(TIME + 10_800),
            Err(ExampleError::MissingResource { .. })
        ));
    }

    #[test]
    fn balanced_examples_carry_schema_and_params() {
        let (predictors, fronts) = sources(true);
        let mut factory = ExampleFactory::new(config(), predictors, fronts).unwrap();
        let examples = factory.create_examples(TIME).unwrap().unwrap();
        assert_eq!(examples.predictors.dim(), (8, 5, 5, 2));
        assert_eq!(examples.class_counts(), vec![4, 2, 2]);
        assert!(examples.valid_times.iter().all(|time| *time == TIME));
        assert!(examples.predictors.iter().all(|value| value.is_finite()));
        // Min-max params come from the whole grid of each channel.
        assert_eq!(examples.normalization.first[[0, 1]], 1.0);
        assert_eq!(examples.normalization.second[[0, 0]], 1143.0);
        for (i, class) in class_indices(examples.targets.view()).into_iter().enumerate() {
            let (row, column) = (examples.rows[i], examples.columns[i]);
            assert!((2..10).contains(&row) && (2..10).contains(&column));
            let expected = match (row, column) {
                (4, 4) | (4, 5) => FrontClass::WarmFront,
                (7, 7) | (7, 8) => FrontClass::ColdFront,
                _ => FrontClass::NoFront,
            };
            assert_eq!(class, expected.index(ClassScheme::Ternary));
        }
    }

    #[test]
    fn uniform_sampling_truncates_to_max_examples() {
        let (predictors, fronts) = sources(true);
        let uniform = FactoryConfig {
            class_fractions: None,
            max_examples: 5,
            ..config()
        };
        let mut factory = ExampleFactory::new(uniform, predictors, fronts).unwrap();
        let examples = factory.create_examples(TIME).unwrap().unwrap();
        assert_eq!(examples.len(), 5);
        assert_eq!(examples.schema.scheme, ClassScheme::Ternary);
    }

    #[test]
    fn empty_mask_without_fractions_yields_no_examples() {
        let (predictors, fronts) = sources(true);
        let masked = FactoryConfig {
            class_fractions: None,
            mask: Some(ValidityMask::new(ndarray::Array2::from_elem((12, 12), false))),
            ..config()
        };
        let mut factory = ExampleFactory::new(masked, predictors, fronts).unwrap();
        assert!(factory.create_examples(TIME).unwrap().is_none());
    }

    #[test]
    fn created_examples_can_be_stored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("examples.sqlite");
        let (predictors, fronts) = sources(true);
        let mut factory = ExampleFactory::new(config(), predictors, fronts).unwrap();
        assert_eq!(factory.create_and_store(TIME, &path).unwrap(), Some(8));
        let store = ExampleStore::open(&path).unwrap();
        assert_eq!(store.len().unwrap(), 8);
    }
}
