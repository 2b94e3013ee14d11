/// Constants describing the fixed analysis grid.
pub mod grid {
    /// Grid spacing of the NARR domain, in metres.
    pub const GRID_SPACING_METRES: f64 = 32_463.0;
    /// Seconds between consecutive analysis times.
    pub const TIME_INTERVAL_SECONDS: i64 = 10_800;
    /// Field name of the orography (surface height) channel.
    pub const HEIGHT_FIELD_NAME: &str = "height_m_asl";
    /// Pressure-level sentinel meaning "surface".
    pub const DUMMY_SURFACE_PRESSURE_MB: i32 = 1013;
}

/// Constants shared by the sampling, windowing, and generator paths.
pub mod sampling {
    /// Tolerance used for fractional and floating-point equality checks.
    pub const TOLERANCE: f64 = 1e-6;
    /// Smallest batch accepted by the windowed generators.
    pub const MIN_BATCH_SIZE: usize = 16;
    /// Smallest examples-per-time accepted by the from-scratch generator.
    pub const MIN_EXAMPLES_PER_TIME: usize = 2;
    /// Smallest number of whole grids per batch for the full-size generator.
    pub const MIN_TIMES_PER_BATCH: usize = 4;
    /// Number of classes in the ternary front scheme.
    pub const NUM_TERNARY_CLASSES: usize = 3;
    /// Number of classes in the binary front scheme.
    pub const NUM_BINARY_CLASSES: usize = 2;
}

/// Constants used by example-store naming and on-disk layout.
pub mod store {
    /// File-name prefix for example-store files.
    pub const FILE_PREFIX: &str = "downsized_3d_examples";
    /// Extension for example-store files.
    pub const STORE_EXTENSION: &str = "sqlite";
    /// Extension for identifier-only files.
    pub const ID_FILE_EXTENSION: &str = "ids.json";
    /// Number of batch files grouped under one directory.
    pub const NUM_BATCHES_PER_DIRECTORY: u64 = 1000;
    /// Width of zero-padded batch numbers in paths.
    pub const BATCH_NUMBER_WIDTH: usize = 7;
    /// Largest batch number that fits `BATCH_NUMBER_WIDTH` digits.
    pub const MAX_BATCH_NUMBER: u64 = 9_999_999;
    /// `chrono` format of valid times embedded in paths and CLI arguments.
    pub const TIME_FORMAT: &str = "%Y%m%d%H";

    /// Key of the schema row in the `schema` table.
    pub const SCHEMA_KEY: &str = "schema";
    /// Version tag for persisted schema records.
    pub const SCHEMA_RECORD_VERSION: u8 = 1;
    /// Version tag for persisted example payload records.
    pub const EXAMPLE_RECORD_VERSION: u8 = 1;
    /// Prefix marker for bitcode-encoded payloads.
    pub const BITCODE_PREFIX: u8 = b'B';
}

/// Constants used by example-identifier encoding.
pub mod ids {
    /// Digits used for the valid time in an encoded identifier.
    pub const TIME_WIDTH: usize = 10;
    /// Digits used for the row and column in an encoded identifier.
    pub const ROW_COLUMN_WIDTH: usize = 3;
    /// Largest valid time representable in an identifier.
    pub const MAX_TIME: i64 = 9_999_999_999;
    /// Largest row or column representable in an identifier.
    pub const MAX_ROW_COLUMN: usize = 999;
}
