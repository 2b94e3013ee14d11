#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Batch augmentation: translation, rotation, and noise.
pub mod augmentation;
/// Reusable command-line runners behind the demo binaries.
pub mod apps;
/// Factory, generator, and augmentation configuration types.
pub mod config;
/// Centralized constants used across sampling, storage, and identifiers.
pub mod constants;
/// Channel, class, mask, schema, and example-set types.
pub mod data;
mod epoch;
/// Per-time example creation from raw grids.
pub mod factory;
/// Infinite, restartable batch generators.
pub mod generator;
/// Memory and buffering estimates.
pub mod heuristics;
/// Example identifiers and identifier-only files.
pub mod ids;
/// Front-label rasterization, dilation, and binarization.
pub mod labels;
/// Class-balance metrics.
pub mod metrics;
/// Predictor normalization and missing-value fill.
pub mod normalization;
/// Static reference grids (orography).
pub mod reference;
/// Class-balanced and uniform window-center sampling.
pub mod sampling;
/// Predictor and front-label sources.
pub mod source;
/// Persistent example stores and store-file discovery.
pub mod store;
/// Valid-time formatting and ranges.
pub mod times;
/// Shared type aliases.
pub mod types;
/// Window extraction around sampled points.
pub mod windowing;

mod errors;

pub use augmentation::Augmenter;
pub use config::{
    AugmentationConfig, FactoryConfig, FullSizeGeneratorConfig, RowWindowConfig,
    ScratchGeneratorConfig, StoreGeneratorConfig,
};
pub use data::{
    Channel, ChannelSpec, ClassScheme, ExampleMetadata, ExampleSchema, ExampleSet, FrontClass,
    NormalizationParams, NormalizationType, ValidityMask,
};
pub use errors::ExampleError;
pub use factory::ExampleFactory;
pub use generator::{
    Batch, FullSizeBatch, FullSizeBatchGenerator, RowWindowGenerator, ScratchBatchGenerator,
    StoreBatchGenerator,
};
pub use ids::ExampleId;
pub use labels::FrontTable;
pub use normalization::{GlobalNormalization, NormalizationMode};
pub use reference::{LazyReferenceGrid, ReferenceGridProvider, StaticReferenceGrid};
pub use sampling::{ClassFractions, TargetPoints};
pub use source::{
    FrontSource, InMemoryFrontSource, InMemoryPredictorSource, JsonGridDirectory, PredictorGrid,
    PredictorSource,
};
pub use store::{ExampleStore, ReadOptions, StoreRange, StoreSelector};
pub use types::{BatchNumber, ExampleIdString, FieldName, PressureMb, UnixSeconds};
