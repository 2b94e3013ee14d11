use crate::config::{ScratchGeneratorConfig, StoreGeneratorConfig};

const BYTES_PER_VALUE: u128 = std::mem::size_of::<f32>() as u128;

/// Rough per-batch memory of a generator, in bytes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MemoryEstimate {
    /// Full grids (or raw examples) held while refilling.
    pub buffer_bytes: u128,
    /// Windowed batch after augmentation.
    pub batch_bytes: u128,
}

impl MemoryEstimate {
    /// Buffer plus batch bytes.
    pub fn total(&self) -> u128 {
        self.buffer_bytes.saturating_add(self.batch_bytes)
    }
}

fn window_values(half_rows: usize, half_columns: usize, num_channels: usize) -> u128 {
    ((2 * half_rows + 1) * (2 * half_columns + 1) * num_channels) as u128
}

fn augmented_examples(batch_size: usize, copies: usize) -> u128 {
    batch_size as u128 * (1 + copies as u128)
}

/// Memory of the from-scratch generator on an `num_rows`-by-`num_columns`
/// grid: the buffered full grids (predictors plus labels) and one batch.
pub fn estimate_scratch_memory(
    config: &ScratchGeneratorConfig,
    num_rows: usize,
    num_columns: usize,
) -> MemoryEstimate {
    let num_channels = config.channels.len();
    let cells = (num_rows * num_columns) as u128;
    let per_grid = cells * (num_channels as u128 * BYTES_PER_VALUE + 1);
    let copies = config.augmentation.as_ref().map_or(0, |a| a.num_copies());
    let examples = augmented_examples(config.batch_size, copies);
    MemoryEstimate {
        buffer_bytes: per_grid.saturating_mul(config.times_in_memory() as u128),
        batch_bytes: examples
            * (window_values(config.half_rows, config.half_columns, num_channels)
                + config.class_fractions.len() as u128)
            * BYTES_PER_VALUE,
    }
}

/// Memory of the from-store generator. The buffer may overshoot the batch by
/// up to one file, so `examples_per_file` is added to the batch size.
pub fn estimate_store_memory(
    config: &StoreGeneratorConfig,
    half_rows: usize,
    half_columns: usize,
    num_channels: usize,
    examples_per_file: usize,
) -> MemoryEstimate {
    let per_example = window_values(half_rows, half_columns, num_channels) * BYTES_PER_VALUE
        + config.num_classes as u128;
    let copies = config.augmentation.as_ref().map_or(0, |a| a.num_copies());
    MemoryEstimate {
        buffer_bytes: per_example * (config.batch_size + examples_per_file) as u128,
        batch_bytes: augmented_examples(config.batch_size, copies)
            * (window_values(half_rows, half_columns, num_channels) + config.num_classes as u128)
            * BYTES_PER_VALUE,
    }
}

/// Grids to buffer so that `batch_size` examples average at most
/// `max_examples_per_time` per grid.
pub fn times_in_flight(batch_size: usize, max_examples_per_time: usize) -> usize {
    batch_size.div_ceil(max_examples_per_time.max(1))
}

/// Smallest examples-per-time (so the most buffered grids) whose estimate
/// fits in `budget_bytes`, or `None` when even a single grid does not fit.
pub fn examples_per_time_for_budget(
    config: &ScratchGeneratorConfig,
    num_rows: usize,
    num_columns: usize,
    budget_bytes: u128,
) -> Option<usize> {
    (1..=config.batch_size.max(1)).find(|examples_per_time| {
        let trial = ScratchGeneratorConfig {
            examples_per_time: *examples_per_time,
            ..config.clone()
        };
        estimate_scratch_memory(&trial, num_rows, num_columns).total() <= budget_bytes
    })
}

/// Render `value` with thousands separators.
pub fn format_u128_with_commas(value: u128) -> String {
    let raw = value.to_string();
    let mut grouped_reversed = String::with_capacity(raw.len() + (raw.len() / 3));
    for (idx, ch) in raw.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            grouped_reversed.push(',');
        }
        grouped_reversed.push(ch);
    }
    grouped_reversed.chars().rev().collect()
}
