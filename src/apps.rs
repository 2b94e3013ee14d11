use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum, error::ErrorKind};

use crate::config::{FactoryConfig, ScratchGeneratorConfig, StoreGeneratorConfig};
use crate::constants::grid::TIME_INTERVAL_SECONDS;
use crate::data::{Channel, NormalizationType};
use crate::factory::ExampleFactory;
use crate::heuristics::{
    MemoryEstimate, estimate_scratch_memory, estimate_store_memory, examples_per_time_for_budget,
    format_u128_with_commas, times_in_flight,
};
use crate::metrics::class_skew;
use crate::source::JsonGridDirectory;
use crate::store::{
    ExampleStore, ReadOptions, StoreRange, StoreSelector, example_file_path,
    find_many_example_files,
};
use crate::times::{format_time, parse_time, time_range};
use crate::types::{BatchNumber, UnixSeconds};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NormalizationArg {
    MinMax,
    ZScore,
}

impl From<NormalizationArg> for NormalizationType {
    fn from(value: NormalizationArg) -> Self {
        match value {
            NormalizationArg::MinMax => NormalizationType::MinMax,
            NormalizationArg::ZScore => NormalizationType::ZScore,
        }
    }
}

/// Comma-separated class fractions, parsed as one argument.
#[derive(Debug, Clone)]
struct FractionsArg(Vec<f64>);

#[derive(Debug, Parser)]
#[command(
    name = "inspect_store",
    disable_help_subcommand = true,
    about = "Summarize an example-store file",
    long_about = "Print the schema, example count, valid-time span, and class balance of one example-store file. Only metadata columns are read."
)]
struct InspectStoreCli {
    #[arg(value_name = "STORE_PATH", help = "Example-store file to inspect")]
    path: PathBuf,
    #[arg(long, help = "Also print every example identifier")]
    ids: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "find_examples",
    disable_help_subcommand = true,
    about = "List example-store files in a directory",
    long_about = "List the store files under a directory that hold a batch-number range or overlap a valid-time range.",
    after_help = "Give either --first-batch/--last-batch or --first-time/--last-time (yyyymmddHH)."
)]
struct FindExamplesCli {
    #[arg(long, value_name = "DIR", help = "Directory holding store files")]
    directory: PathBuf,
    #[arg(long = "first-batch", requires = "last_batch")]
    first_batch: Option<BatchNumber>,
    #[arg(long = "last-batch", requires = "first_batch")]
    last_batch: Option<BatchNumber>,
    #[arg(
        long = "first-time",
        value_parser = parse_time_arg,
        requires = "last_time",
        conflicts_with = "first_batch"
    )]
    first_time: Option<UnixSeconds>,
    #[arg(long = "last-time", value_parser = parse_time_arg, requires = "first_time")]
    last_time: Option<UnixSeconds>,
}

#[derive(Debug, Parser)]
#[command(
    name = "create_examples",
    disable_help_subcommand = true,
    about = "Window raw grids into example-store files",
    long_about = "Create class-balanced windowed examples for every valid time in a range and write one store file per time.",
    after_help = "The input directory uses the JSON grid layout: predictors/<yyyymm>/predictors_<time>.json and fronts/<yyyymm>/frontal_grid_<time>.json."
)]
struct CreateExamplesCli {
    #[arg(long = "input-dir", value_name = "DIR")]
    input_dir: PathBuf,
    #[arg(long = "output-dir", value_name = "DIR")]
    output_dir: PathBuf,
    #[arg(long = "first-time", value_parser = parse_time_arg)]
    first_time: UnixSeconds,
    #[arg(long = "last-time", value_parser = parse_time_arg)]
    last_time: UnixSeconds,
    #[arg(
        long = "channel",
        value_name = "FIELD:MB",
        value_parser = parse_channel_arg,
        required = true,
        help = "Predictor channel, repeat in order"
    )]
    channels: Vec<Channel>,
    #[arg(long = "half-rows", default_value_t = 16)]
    half_rows: usize,
    #[arg(long = "half-columns", default_value_t = 16)]
    half_columns: usize,
    #[arg(long = "dilation-metres", default_value_t = 50_000.0)]
    dilation_distance_metres: f64,
    #[arg(
        long = "class-fractions",
        value_name = "F0,F1[,F2]",
        value_parser = parse_fractions_arg,
        help = "Class-balanced sampling fractions; uniform sampling when omitted"
    )]
    class_fractions: Option<FractionsArg>,
    #[arg(long = "max-examples", default_value_t = 1000, value_parser = parse_positive_usize)]
    max_examples: usize,
    #[arg(long, value_enum, default_value = "z-score")]
    normalization: NormalizationArg,
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Debug, Parser)]
#[command(
    name = "estimate_memory",
    disable_help_subcommand = true,
    about = "Estimate from-scratch generator memory",
    long_about = "Estimate buffered-grid and batch memory of the from-scratch generator, and optionally the examples-per-time that fits a byte budget."
)]
struct EstimateMemoryCli {
    #[arg(long = "grid-rows", default_value_t = 277)]
    grid_rows: usize,
    #[arg(long = "grid-columns", default_value_t = 349)]
    grid_columns: usize,
    #[arg(long = "num-channels", default_value_t = 4, value_parser = parse_positive_usize)]
    num_channels: usize,
    #[arg(long = "half-rows", default_value_t = 16)]
    half_rows: usize,
    #[arg(long = "half-columns", default_value_t = 16)]
    half_columns: usize,
    #[arg(long = "batch-size", default_value_t = 1024, value_parser = parse_positive_usize)]
    batch_size: usize,
    #[arg(long = "examples-per-time", default_value_t = 8, value_parser = parse_positive_usize)]
    examples_per_time: usize,
    #[arg(long = "budget-bytes", help = "Search examples-per-time for this budget")]
    budget_bytes: Option<u128>,
    #[arg(long = "from-store", help = "Estimate the generator reading shuffled store files")]
    from_store: bool,
    #[arg(long = "examples-per-file", default_value_t = 512, requires = "from_store")]
    examples_per_file: usize,
    #[arg(long = "num-classes", default_value_t = 3)]
    num_classes: usize,
}

impl EstimateMemoryCli {
    fn scratch_config(&self) -> ScratchGeneratorConfig {
        let class_fractions = if self.num_classes == 2 {
            vec![0.5, 0.5]
        } else {
            vec![0.5, 0.25, 0.25]
        };
        ScratchGeneratorConfig {
            channels: (0..self.num_channels)
                .map(|index| Channel::new(format!("channel_{index}"), 0))
                .collect(),
            half_rows: self.half_rows,
            half_columns: self.half_columns,
            batch_size: self.batch_size,
            examples_per_time: self.examples_per_time,
            class_fractions,
            ..ScratchGeneratorConfig::default()
        }
    }

    fn estimate(&self) -> MemoryEstimate {
        if self.from_store {
            let config = StoreGeneratorConfig {
                batch_size: self.batch_size,
                num_classes: self.num_classes,
                ..StoreGeneratorConfig::default()
            };
            estimate_store_memory(
                &config,
                self.half_rows,
                self.half_columns,
                self.num_channels,
                self.examples_per_file,
            )
        } else {
            estimate_scratch_memory(&self.scratch_config(), self.grid_rows, self.grid_columns)
        }
    }
}

/// Print the schema, example count, and per-class totals of one store file.
pub fn run_inspect_store<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<InspectStoreCli, _>(
        std::iter::once("inspect_store".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let store = ExampleStore::open(&cli.path)?;
    let schema = store.schema();
    println!("=== store: {} ===", cli.path.display());
    let channels: Vec<String> = schema.channels.iter().map(ToString::to_string).collect();
    println!("channels            : {}", channels.join(", "));
    println!(
        "window              : {}x{}",
        schema.window_rows(),
        schema.window_columns()
    );
    println!("dilation (m)        : {}", schema.dilation_distance_metres);
    println!("normalization       : {}", schema.normalization);
    let (mask_rows, mask_columns) = schema.mask.shape();
    println!(
        "mask                : {mask_rows}x{mask_columns}, {} valid cells",
        schema.mask.num_valid()
    );

    let total = store.len()?;
    println!(
        "examples            : {}",
        format_u128_with_commas(total as u128)
    );
    if let Some(metadata) = store.read_metadata(&ReadOptions::default())? {
        let first = metadata.valid_times.iter().min().copied();
        let last = metadata.valid_times.iter().max().copied();
        if let (Some(first), Some(last)) = (first, last) {
            println!(
                "valid times         : {} .. {}",
                format_time(first)?,
                format_time(last)?
            );
        }
    }

    let counts = store.class_counts()?;
    for (class_index, count) in counts.iter().enumerate() {
        println!(
            "class {class_index}             : {}",
            format_u128_with_commas(*count as u128)
        );
    }
    if let Some(skew) = class_skew(&counts) {
        println!(
            "class balance       : max share {:.3}, max/min {:.2}",
            skew.max_share, skew.ratio
        );
    }
    if cli.ids {
        for id in store.all_ids()? {
            println!("{id}");
        }
    }
    Ok(())
}

/// List the store files under a directory for a batch or valid-time range.
pub fn run_find_examples<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<FindExamplesCli, _>(
        std::iter::once("find_examples".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let range = match (cli.first_batch, cli.last_batch, cli.first_time, cli.last_time) {
        (Some(first), Some(last), _, _) => StoreRange::Batches { first, last },
        (_, _, Some(first), Some(last)) => StoreRange::Times { first, last },
        _ => return Err("give a batch range or a time range".into()),
    };
    let files = find_many_example_files(&cli.directory, &range)?;
    for path in &files {
        println!("{}", path.display());
    }
    println!("{} files", files.len());
    Ok(())
}

/// Run the example factory over a valid-time range, one store file per time.
pub fn run_create_examples<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<CreateExamplesCli, _>(
        std::iter::once("create_examples".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let config = FactoryConfig {
        seed: cli.seed,
        channels: cli.channels,
        half_rows: cli.half_rows,
        half_columns: cli.half_columns,
        dilation_distance_metres: cli.dilation_distance_metres,
        class_fractions: cli.class_fractions.map(|fractions| fractions.0),
        max_examples: cli.max_examples,
        normalization: cli.normalization.into(),
        mask: None,
    };
    let grids = Arc::new(JsonGridDirectory::new(cli.input_dir));
    let mut factory = ExampleFactory::new(config, grids.clone(), grids)?;
    std::fs::create_dir_all(&cli.output_dir)?;

    let mut written = 0usize;
    let mut skipped = 0usize;
    for valid_time in time_range(cli.first_time, cli.last_time, TIME_INTERVAL_SECONDS)? {
        let path = example_file_path(
            &cli.output_dir,
            &StoreSelector::Times {
                first: valid_time,
                last: valid_time,
            },
        )?;
        match factory.create_and_store(valid_time, &path)? {
            Some(count) => {
                written += count;
                println!("{}: {count} examples", path.display());
            }
            None => skipped += 1,
        }
    }
    println!(
        "wrote {} examples; skipped {skipped} valid times",
        format_u128_with_commas(written as u128)
    );
    Ok(())
}

/// Print the memory a generator would hold per batch.
pub fn run_estimate_memory<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let Some(cli) = parse_cli::<EstimateMemoryCli, _>(
        std::iter::once("estimate_memory".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let estimate = cli.estimate();
    if cli.from_store {
        println!("examples per file   : {}", cli.examples_per_file);
    } else {
        println!(
            "grids in flight     : {}",
            times_in_flight(cli.batch_size, cli.examples_per_time)
        );
    }
    println!(
        "buffer bytes        : {}",
        format_u128_with_commas(estimate.buffer_bytes)
    );
    println!(
        "batch bytes         : {}",
        format_u128_with_commas(estimate.batch_bytes)
    );
    println!(
        "total bytes         : {}",
        format_u128_with_commas(estimate.total())
    );
    if let Some(budget) = cli.budget_bytes
        && !cli.from_store
    {
        let config = cli.scratch_config();
        match examples_per_time_for_budget(&config, cli.grid_rows, cli.grid_columns, budget) {
            Some(examples_per_time) => println!(
                "examples per time within {} bytes: {examples_per_time}",
                format_u128_with_commas(budget)
            ),
            None => println!(
                "no examples-per-time fits {} bytes",
                format_u128_with_commas(budget)
            ),
        }
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("could not parse '{raw}' as a positive integer"))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_time_arg(raw: &str) -> Result<UnixSeconds, String> {
    parse_time(raw).map_err(|err| err.to_string())
}

fn parse_channel_arg(raw: &str) -> Result<Channel, String> {
    let (field, level) = raw
        .split_once(':')
        .ok_or_else(|| format!("channel '{raw}' must look like FIELD:MB"))?;
    let level = level
        .trim()
        .parse()
        .map_err(|_| format!("invalid pressure level in '{raw}'"))?;
    Ok(Channel::new(field.trim(), level))
}

fn parse_fractions_arg(raw: &str) -> Result<FractionsArg, String> {
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<f64>()
                .map_err(|_| format!("invalid class fraction '{}'", part.trim()))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(FractionsArg)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_and_fraction_args_parse() {
        assert_eq!(
            parse_channel_arg("temperature_kelvins:850").unwrap(),
            Channel::new("temperature_kelvins", 850)
        );
        assert!(parse_channel_arg("temperature_kelvins").is_err());
        assert_eq!(parse_fractions_arg("0.5, 0.5").unwrap().0, vec![0.5, 0.5]);
        assert!(parse_fractions_arg("0.5,x").is_err());
    }

    #[test]
    fn help_is_not_an_error() {
        let parsed = parse_cli::<FindExamplesCli, _>(["find_examples", "--help"]).unwrap();
        assert!(parsed.is_none());
    }

    #[test]
    fn find_examples_rejects_mixed_ranges() {
        let parsed = parse_cli::<FindExamplesCli, _>([
            "find_examples",
            "--directory",
            "/tmp",
            "--first-batch",
            "0",
            "--last-batch",
            "3",
            "--first-time",
            "2008010100",
            "--last-time",
            "2008010103",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn create_examples_reports_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let args = [
            "--input-dir",
            dir.path().to_str().unwrap(),
            "--output-dir",
            dir.path().join("out").to_str().unwrap(),
            "--first-time",
            "2008010100",
            "--last-time",
            "2008010103",
            "--channel",
            "t:850",
        ]
        .map(String::from);
        // No front files: every time is skipped, nothing is written.
        run_create_examples(args.into_iter()).unwrap();
        assert!(
            std::fs::read_dir(dir.path().join("out"))
                .unwrap()
                .next()
                .is_none()
        );
    }

    #[test]
    fn estimate_memory_runs_with_budget() {
        let args = ["--budget-bytes", "1000000000"].map(String::from);
        run_estimate_memory(args.into_iter()).unwrap();
    }

    #[test]
    fn memory_estimate_switches_to_store_files() {
        let scratch =
            parse_cli::<EstimateMemoryCli, _>(["estimate_memory", "--batch-size", "64"])
                .unwrap()
                .unwrap();
        let store = parse_cli::<EstimateMemoryCli, _>([
            "estimate_memory",
            "--batch-size",
            "64",
            "--from-store",
            "--examples-per-file",
            "100",
        ])
        .unwrap()
        .unwrap();
        // 33x33x4 float windows plus 3 class bytes, for 64 + 100 buffered examples.
        assert_eq!(store.estimate().buffer_bytes, (33 * 33 * 4 * 4 + 3) * 164);
        assert_eq!(store.estimate().batch_bytes, scratch.estimate().batch_bytes);
        assert!(scratch.estimate().buffer_bytes > store.estimate().buffer_bytes);
        assert!(
            parse_cli::<EstimateMemoryCli, _>(["estimate_memory", "--examples-per-file", "5"])
                .is_err()
        );
    }
}
