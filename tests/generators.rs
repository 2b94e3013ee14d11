use std::path::Path;
use std::sync::Arc;

use frontgen::store::example_file_path;
use frontgen::{
    AugmentationConfig, Channel, ChannelSpec, ExampleError, ExampleFactory, ExampleStore,
    FactoryConfig, FrontTable, JsonGridDirectory, NormalizationMode, NormalizationType,
    PredictorGrid, ScratchBatchGenerator, ScratchGeneratorConfig, StoreBatchGenerator,
    StoreGeneratorConfig, StoreSelector,
};
use ndarray::Array3;
use tempfile::tempdir;

const FIRST: i64 = 1_199_145_600;
const STEP: i64 = 10_800;

fn channels() -> Vec<Channel> {
    vec![Channel::new("t", 850), Channel::new("q", 850), Channel::new("z", 500)]
}

/// Six valid times; the fourth has no front labels.
fn write_grids(root: &Path) -> Arc<JsonGridDirectory> {
    let grids = JsonGridDirectory::new(root);
    let spec = ChannelSpec::new(channels()).unwrap();
    for i in 0..6 {
        let time = FIRST + i * STEP;
        let values = Array3::from_shape_fn((14, 14, 3), |(r, c, k)| {
            ((r as i64 * 7 + c as i64 * 3 + k as i64 * 11 + i) % 17) as f32
        });
        grids
            .write_predictors(time, &PredictorGrid::new(values, spec.clone()).unwrap())
            .unwrap();
        if i != 3 {
            grids
                .write_fronts(
                    time,
                    &FrontTable {
                        warm_cells: vec![(4, 4), (4, 5), (4, 6), (5, 6)],
                        cold_cells: vec![(9, 8), (9, 9), (10, 9)],
                    },
                )
                .unwrap();
        }
    }
    Arc::new(grids)
}

fn scratch_config() -> ScratchGeneratorConfig {
    ScratchGeneratorConfig {
        seed: 21,
        first_time: FIRST,
        last_time: FIRST + 5 * STEP,
        channels: channels(),
        half_rows: 2,
        half_columns: 2,
        dilation_distance_metres: 0.0,
        class_fractions: vec![0.5, 0.5],
        batch_size: 16,
        examples_per_time: 4,
        normalization: NormalizationMode::NonGlobal(NormalizationType::MinMax),
        ..ScratchGeneratorConfig::default()
    }
}

#[test]
fn scratch_generator_skips_unlabelled_times_forever() {
    let dir = tempdir().unwrap();
    let grids = write_grids(dir.path());
    let mut generator =
        ScratchBatchGenerator::new(scratch_config(), grids.clone(), grids).unwrap();
    // Four grids per batch over five usable times: several wraparounds.
    for batch in generator.by_ref().take(6) {
        let batch = batch.unwrap();
        assert_eq!(batch.predictors.dim(), (16, 5, 5, 3));
        assert_eq!(batch.targets.ncols(), 2);
        assert_eq!(batch.class_counts(), vec![8, 8]);
        assert!(
            batch
                .predictors
                .iter()
                .all(|value| (0.0..=1.0).contains(value))
        );
    }
}

#[test]
fn scratch_generator_augments_before_yielding() {
    let dir = tempdir().unwrap();
    let grids = write_grids(dir.path());
    let config = ScratchGeneratorConfig {
        augmentation: Some(AugmentationConfig {
            x_translations: vec![1, 0],
            y_translations: vec![0, -1],
            rotation_angles_deg: vec![90.0],
            ..AugmentationConfig::default()
        }),
        ..scratch_config()
    };
    let mut generator = ScratchBatchGenerator::new(config, grids.clone(), grids).unwrap();
    let batch = generator.next_batch().unwrap();
    assert_eq!(batch.len(), 64);
    for i in 0..16 {
        for copy in 1..4 {
            assert_eq!(batch.targets.row(i), batch.targets.row(i + 16 * copy));
        }
    }
}

/// Three shuffled batch files of ternary examples, built by the factory.
fn write_batch_files(dir: &Path) -> std::path::PathBuf {
    let grids = write_grids(&dir.join("grids"));
    let config = FactoryConfig {
        seed: 3,
        channels: channels(),
        half_rows: 2,
        half_columns: 2,
        dilation_distance_metres: 0.0,
        class_fractions: Some(vec![0.4, 0.3, 0.3]),
        max_examples: 10,
        normalization: NormalizationType::ZScore,
        mask: None,
    };
    let mut factory = ExampleFactory::new(config, grids.clone(), grids).unwrap();
    let store_dir = dir.join("shuffled");
    for batch in 0..3u64 {
        let path = example_file_path(&store_dir, &StoreSelector::Batch(batch)).unwrap();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let time = FIRST + batch as i64 * STEP;
        let examples = factory.create_examples(time).unwrap().unwrap();
        ExampleStore::create_or_append(&path, &examples).unwrap();
    }
    store_dir
}

fn store_config(directory: std::path::PathBuf) -> StoreGeneratorConfig {
    StoreGeneratorConfig {
        seed: 8,
        directory,
        batch_size: 16,
        ..StoreGeneratorConfig::default()
    }
}

#[test]
fn store_generator_fills_batches_across_files() {
    let dir = tempdir().unwrap();
    let store_dir = write_batch_files(dir.path());
    let mut generator = StoreBatchGenerator::new(store_config(store_dir)).unwrap();
    assert_eq!(generator.num_files(), 3);
    for _ in 0..5 {
        let batch = generator.next_batch().unwrap();
        assert_eq!(batch.predictors.dim(), (16, 5, 5, 3));
        assert_eq!(batch.targets.ncols(), 3);
    }
}

#[test]
fn store_generator_collapses_fronts_for_two_classes() {
    let dir = tempdir().unwrap();
    let store_dir = write_batch_files(dir.path());
    let config = StoreGeneratorConfig {
        num_classes: 2,
        channels: vec![Channel::new("z", 500)],
        half_window: Some((1, 1)),
        ..store_config(store_dir)
    };
    let mut generator = StoreBatchGenerator::new(config).unwrap();
    let batch = generator.next_batch().unwrap();
    assert_eq!(batch.predictors.dim(), (16, 3, 3, 1));
    assert_eq!(batch.targets.ncols(), 2);
    assert_eq!(batch.class_counts().iter().sum::<usize>(), 16);
    assert!(batch.class_counts()[1] > 0);
}

#[test]
fn store_generator_restart_replays() {
    let dir = tempdir().unwrap();
    let store_dir = write_batch_files(dir.path());
    let mut generator = StoreBatchGenerator::new(store_config(store_dir)).unwrap();
    let first: Vec<_> = (0..3).map(|_| generator.next_batch().unwrap()).collect();
    generator.restart().unwrap();
    let again: Vec<_> = (0..3).map(|_| generator.next_batch().unwrap()).collect();
    assert_eq!(first, again);
}

#[test]
fn store_generator_with_no_matching_times_is_exhausted() {
    let dir = tempdir().unwrap();
    let store_dir = write_batch_files(dir.path());
    let config = StoreGeneratorConfig {
        time_range: Some((FIRST - 10 * STEP, FIRST - STEP)),
        ..store_config(store_dir)
    };
    let mut generator = StoreBatchGenerator::new(config).unwrap();
    assert!(matches!(
        generator.next_batch(),
        Err(ExampleError::Exhausted(_))
    ));
}

#[test]
fn store_generator_needs_files() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        StoreBatchGenerator::new(store_config(dir.path().to_path_buf())),
        Err(ExampleError::MissingResource { .. })
    ));
}
