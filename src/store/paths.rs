use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::constants::store::{
    BATCH_NUMBER_WIDTH, FILE_PREFIX, NUM_BATCHES_PER_DIRECTORY, STORE_EXTENSION,
};
use crate::errors::ExampleError;
use crate::times::{format_time, parse_time};
use crate::types::{BatchNumber, UnixSeconds};

/// Addresses one example-store file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreSelector {
    /// Non-shuffled file covering a contiguous valid-time range.
    Times {
        /// First valid time in the file.
        first: UnixSeconds,
        /// Last valid time in the file.
        last: UnixSeconds,
    },
    /// Shuffled file holding one batch.
    Batch(BatchNumber),
}

/// Addresses every store file overlapping a range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreRange {
    /// Non-shuffled files overlapping `first..=last`.
    Times {
        /// Earliest valid time wanted.
        first: UnixSeconds,
        /// Latest valid time wanted.
        last: UnixSeconds,
    },
    /// Shuffled files numbered `first..=last`.
    Batches {
        /// Lowest batch number wanted.
        first: BatchNumber,
        /// Highest batch number wanted.
        last: BatchNumber,
    },
}

/// Expected path of a store file; does not touch the filesystem.
pub fn example_file_path(directory: &Path, selector: &StoreSelector) -> Result<PathBuf, ExampleError> {
    match *selector {
        StoreSelector::Times { first, last } => {
            if last < first {
                return Err(ExampleError::Configuration(format!(
                    "last time {last} precedes first time {first}"
                )));
            }
            Ok(directory.join(format!(
                "{FILE_PREFIX}_{}-{}.{STORE_EXTENSION}",
                format_time(first)?,
                format_time(last)?
            )))
        }
        StoreSelector::Batch(batch) => {
            let first_in_directory = batch - batch % NUM_BATCHES_PER_DIRECTORY;
            let last_in_directory = first_in_directory + NUM_BATCHES_PER_DIRECTORY - 1;
            Ok(directory
                .join(format!(
                    "batches{first_in_directory:0w$}-{last_in_directory:0w$}",
                    w = BATCH_NUMBER_WIDTH
                ))
                .join(format!(
                    "{FILE_PREFIX}_batch{batch:0w$}.{STORE_EXTENSION}",
                    w = BATCH_NUMBER_WIDTH
                )))
        }
    }
}

/// Path of an existing store file.
pub fn find_example_file(directory: &Path, selector: &StoreSelector) -> Result<PathBuf, ExampleError> {
    let path = example_file_path(directory, selector)?;
    if !path.is_file() {
        return Err(ExampleError::MissingResource {
            kind: "example store",
            path,
        });
    }
    Ok(path)
}

/// Every store file in `directory` overlapping `range`, sorted by batch number
/// or start time. Finding none is an error.
pub fn find_many_example_files(directory: &Path, range: &StoreRange) -> Result<Vec<PathBuf>, ExampleError> {
    let mut matches: Vec<(i64, PathBuf)> = Vec::new();
    for entry in WalkDir::new(directory)
        .max_depth(2)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.path();
        let Some(stem) = store_file_stem(path) else {
            continue;
        };
        match *range {
            StoreRange::Batches { first, last } => {
                if let Some(batch) = parse_batch_number(stem)
                    && (first..=last).contains(&batch)
                {
                    matches.push((batch as i64, path.to_path_buf()));
                }
            }
            StoreRange::Times { first, last } => {
                if let Some((start, end)) = parse_time_span(stem)
                    && start <= last
                    && end >= first
                {
                    matches.push((start, path.to_path_buf()));
                }
            }
        }
    }
    if matches.is_empty() {
        return Err(ExampleError::MissingResource {
            kind: "example store",
            path: directory.to_path_buf(),
        });
    }
    matches.sort();
    debug!(
        "[frontgen:store] found {} store files under {}",
        matches.len(),
        directory.display()
    );
    Ok(matches.into_iter().map(|(_, path)| path).collect())
}

fn store_file_stem(path: &Path) -> Option<&str> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(STORE_EXTENSION)?
        .strip_suffix('.')?
        .strip_prefix(FILE_PREFIX)?
        .strip_prefix('_')
}

fn parse_batch_number(stem: &str) -> Option<BatchNumber> {
    let digits = stem.strip_prefix("batch")?;
    if digits.len() != BATCH_NUMBER_WIDTH || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

fn parse_time_span(stem: &str) -> Option<(UnixSeconds, UnixSeconds)> {
    let (first, last) = stem.split_once('-')?;
    Some((parse_time(first).ok()?, parse_time(last).ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn batch_paths_are_bucketed_by_thousand() {
        let path = example_file_path(Path::new("/data"), &StoreSelector::Batch(1042)).unwrap();
        assert_eq!(
            path,
            PathBuf::from(
                "/data/batches0001000-0001999/downsized_3d_examples_batch0001042.sqlite"
            )
        );
    }

    #[test]
    fn time_paths_embed_formatted_range() {
        let path = example_file_path(
            Path::new("/data"),
            &StoreSelector::Times {
                first: 1_199_145_600,
                last: 1_199_145_600 + 10_800,
            },
        )
        .unwrap();
        assert_eq!(
            path,
            PathBuf::from("/data/downsized_3d_examples_2008010100-2008010103.sqlite")
        );
    }

    #[test]
    fn find_many_filters_and_sorts_batches() {
        let dir = tempdir().unwrap();
        for batch in [1500u64, 3, 999, 2] {
            let path = example_file_path(dir.path(), &StoreSelector::Batch(batch)).unwrap();
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"").unwrap();
        }
        fs::write(dir.path().join("notes.txt"), b"").unwrap();
        let found = find_many_example_files(
            dir.path(),
            &StoreRange::Batches {
                first: 0,
                last: 1000,
            },
        )
        .unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "downsized_3d_examples_batch0000002.sqlite",
                "downsized_3d_examples_batch0000003.sqlite",
                "downsized_3d_examples_batch0000999.sqlite",
            ]
        );
    }

    #[test]
    fn find_many_keeps_overlapping_time_files() {
        let dir = tempdir().unwrap();
        let t0 = 1_199_145_600;
        for (first, last) in [(t0, t0), (t0 + 10_800, t0 + 21_600), (t0 + 86_400, t0 + 86_400)] {
            let path = example_file_path(dir.path(), &StoreSelector::Times { first, last }).unwrap();
            fs::write(path, b"").unwrap();
        }
        let found = find_many_example_files(
            dir.path(),
            &StoreRange::Times {
                first: t0 + 21_600,
                last: t0 + 43_200,
            },
        )
        .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn zero_matches_is_an_error() {
        let dir = tempdir().unwrap();
        let err = find_many_example_files(dir.path(), &StoreRange::Batches { first: 0, last: 10 });
        assert!(matches!(err, Err(ExampleError::MissingResource { .. })));
        let err = find_example_file(dir.path(), &StoreSelector::Batch(4));
        assert!(matches!(err, Err(ExampleError::MissingResource { .. })));
    }
}
