//! Example identifiers: `time<10 digits>_row<3 digits>_column<3 digits>`.
//!
//! The fixed-width encoding sorts lexicographically in the same order as the
//! underlying (time, row, column) triple, which is what the batch lookup in
//! [`find_example_ids`] relies on.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::constants::ids::{MAX_ROW_COLUMN, MAX_TIME, ROW_COLUMN_WIDTH, TIME_WIDTH};
use crate::errors::ExampleError;
use crate::types::{ExampleIdString, UnixSeconds};

/// Address of one example: valid time and full-grid window center.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExampleId {
    /// Unix seconds, at most 10 digits.
    pub valid_time: UnixSeconds,
    /// Full-grid row of the window center.
    pub row: usize,
    /// Full-grid column of the window center.
    pub column: usize,
}

impl ExampleId {
    /// Fails when a value does not fit its field width.
    pub fn new(valid_time: UnixSeconds, row: usize, column: usize) -> Result<Self, ExampleError> {
        if !(0..=MAX_TIME).contains(&valid_time) {
            return Err(ExampleError::Configuration(format!(
                "valid time {valid_time} does not fit in {TIME_WIDTH} digits"
            )));
        }
        if row > MAX_ROW_COLUMN || column > MAX_ROW_COLUMN {
            return Err(ExampleError::Configuration(format!(
                "row/column ({row}, {column}) does not fit in {ROW_COLUMN_WIDTH} digits"
            )));
        }
        Ok(Self {
            valid_time,
            row,
            column,
        })
    }
}

impl fmt::Display for ExampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "time{:0tw$}_row{:0rw$}_column{:0rw$}",
            self.valid_time,
            self.row,
            self.column,
            tw = TIME_WIDTH,
            rw = ROW_COLUMN_WIDTH
        )
    }
}

impl FromStr for ExampleId {
    type Err = ExampleError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let malformed =
            || ExampleError::Configuration(format!("malformed example id '{text}'"));
        let mut parts = text.split('_');
        let (Some(time), Some(row), Some(column), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed());
        };
        let digits = |part: &str, prefix: &str, width: usize| -> Result<u64, ExampleError> {
            let value = part.strip_prefix(prefix).ok_or_else(malformed)?;
            if value.len() != width || !value.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            value.parse().map_err(|_| malformed())
        };
        let valid_time = digits(time, "time", TIME_WIDTH)? as UnixSeconds;
        let row = digits(row, "row", ROW_COLUMN_WIDTH)? as usize;
        let column = digits(column, "column", ROW_COLUMN_WIDTH)? as usize;
        Ok(Self {
            valid_time,
            row,
            column,
        })
    }
}

/// Identifiers for parallel metadata arrays.
pub fn create_ids(
    valid_times: &[UnixSeconds],
    rows: &[usize],
    columns: &[usize],
) -> Result<Vec<ExampleId>, ExampleError> {
    if valid_times.len() != rows.len() || rows.len() != columns.len() {
        return Err(ExampleError::Configuration(format!(
            "metadata arrays differ in length ({}, {}, {})",
            valid_times.len(),
            rows.len(),
            columns.len()
        )));
    }
    valid_times
        .iter()
        .zip(rows)
        .zip(columns)
        .map(|((time, row), column)| ExampleId::new(*time, *row, *column))
        .collect()
}

/// Decode identifier strings back into parallel (times, rows, columns).
pub fn ids_to_metadata(
    id_strings: &[ExampleIdString],
) -> Result<(Vec<UnixSeconds>, Vec<usize>, Vec<usize>), ExampleError> {
    let mut times = Vec::with_capacity(id_strings.len());
    let mut rows = Vec::with_capacity(id_strings.len());
    let mut columns = Vec::with_capacity(id_strings.len());
    for text in id_strings {
        let id: ExampleId = text.parse()?;
        times.push(id.valid_time);
        rows.push(id.row);
        columns.push(id.column);
    }
    Ok((times, rows, columns))
}

/// Locate each desired id in `all_ids`.
///
/// `all_ids` must be unique. With `allow_missing`, absent ids map to `None`;
/// otherwise any absent id fails with the full list of missing ids.
pub fn find_example_ids(
    all_ids: &[ExampleIdString],
    desired_ids: &[ExampleIdString],
    allow_missing: bool,
) -> Result<Vec<Option<usize>>, ExampleError> {
    let unique = all_ids.iter().collect::<HashSet<_>>().len();
    if unique != all_ids.len() {
        return Err(ExampleError::DuplicateIds {
            total: all_ids.len(),
            unique,
        });
    }

    let mut order: Vec<usize> = (0..all_ids.len()).collect();
    order.sort_unstable_by(|a, b| all_ids[*a].cmp(&all_ids[*b]));

    let found: Vec<Option<usize>> = desired_ids
        .iter()
        .map(|desired| {
            order
                .binary_search_by(|probe| all_ids[*probe].as_str().cmp(desired.as_str()))
                .ok()
                .map(|position| order[position])
        })
        .collect();

    if !allow_missing {
        let missing: Vec<ExampleIdString> = desired_ids
            .iter()
            .zip(&found)
            .filter(|(_, index)| index.is_none())
            .map(|(id, _)| id.clone())
            .collect();
        if !missing.is_empty() {
            return Err(ExampleError::MissingIds {
                missing,
                desired: desired_ids.len(),
            });
        }
    }
    Ok(found)
}

#[derive(Serialize, Deserialize)]
struct IdFile {
    example_ids: Vec<ExampleIdString>,
}

/// Write an identifier-only file (JSON, no tensors).
pub fn write_example_ids(path: &Path, ids: &[ExampleIdString]) -> Result<(), ExampleError> {
    for text in ids {
        text.parse::<ExampleId>()?;
    }
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let raw = serde_json::to_string(&IdFile {
        example_ids: ids.to_vec(),
    })
    .map_err(|err| ExampleError::Store(err.to_string()))?;
    fs::write(path, raw)?;
    Ok(())
}

/// Read an identifier-only file written by [`write_example_ids`].
pub fn read_example_ids(path: &Path) -> Result<Vec<ExampleIdString>, ExampleError> {
    if !path.is_file() {
        return Err(ExampleError::MissingResource {
            kind: "example id",
            path: path.to_path_buf(),
        });
    }
    let raw = fs::read_to_string(path)?;
    let file: IdFile = serde_json::from_str(&raw)
        .map_err(|err| ExampleError::Store(format!("corrupt id file {}: {err}", path.display())))?;
    Ok(file.example_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn strings(ids: &[(i64, usize, usize)]) -> Vec<String> {
        ids.iter()
            .map(|(t, r, c)| ExampleId::new(*t, *r, *c).unwrap().to_string())
            .collect()
    }

    #[test]
    fn encoding_is_fixed_width() {
        let id = ExampleId::new(1_199_145_600, 7, 215).unwrap();
        assert_eq!(id.to_string(), "time1199145600_row007_column215");
        assert_eq!("time1199145600_row007_column215".parse::<ExampleId>().unwrap(), id);
    }

    #[test]
    fn decode_inverts_encode_at_field_limits() {
        for (t, r, c) in [(0, 0, 0), (MAX_TIME, MAX_ROW_COLUMN, MAX_ROW_COLUMN), (10_800, 1, 998)] {
            let id = ExampleId::new(t, r, c).unwrap();
            assert_eq!(id.to_string().parse::<ExampleId>().unwrap(), id);
        }
        assert!(ExampleId::new(-1, 0, 0).is_err());
        assert!(ExampleId::new(0, 1000, 0).is_err());
    }

    #[test]
    fn malformed_strings_are_rejected() {
        for text in [
            "time1199145600_row7_column215",
            "time1199145600_row007",
            "row007_time1199145600_column215",
            "time1199145600_row007_column215_extra",
            "time11991456x0_row007_column215",
        ] {
            assert!(text.parse::<ExampleId>().is_err(), "{text}");
        }
    }

    #[test]
    fn string_order_matches_numeric_order() {
        let mut ids = vec![
            ExampleId::new(20_000, 5, 3).unwrap(),
            ExampleId::new(10_800, 100, 2).unwrap(),
            ExampleId::new(10_800, 20, 900).unwrap(),
        ];
        let mut encoded: Vec<String> = ids.iter().map(ToString::to_string).collect();
        ids.sort();
        encoded.sort();
        let decoded: Vec<ExampleId> = encoded.iter().map(|s| s.parse().unwrap()).collect();
        assert_eq!(decoded, ids);
    }

    #[test]
    fn lookup_returns_positions_in_desired_order() {
        let all = strings(&[(30, 1, 1), (10, 1, 1), (20, 1, 1)]);
        let desired = strings(&[(20, 1, 1), (30, 1, 1)]);
        assert_eq!(
            find_example_ids(&all, &desired, false).unwrap(),
            vec![Some(2), Some(0)]
        );
    }

    #[test]
    fn duplicates_fail_before_lookup() {
        let all = strings(&[(10, 1, 1), (10, 1, 1)]);
        let err = find_example_ids(&all, &[], true).unwrap_err();
        assert!(matches!(err, ExampleError::DuplicateIds { total: 2, unique: 1 }));
    }

    #[test]
    fn missing_ids_are_listed_or_marked() {
        let all = strings(&[(10, 1, 1), (20, 1, 1)]);
        let desired = strings(&[(20, 1, 1), (40, 2, 2)]);
        match find_example_ids(&all, &desired, false) {
            Err(ExampleError::MissingIds { missing, desired }) => {
                assert_eq!(missing, vec![desired_string(40, 2, 2)]);
                assert_eq!(desired, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(
            find_example_ids(&all, &desired, true).unwrap(),
            vec![Some(1), None]
        );
    }

    fn desired_string(t: i64, r: usize, c: usize) -> String {
        ExampleId::new(t, r, c).unwrap().to_string()
    }

    #[test]
    fn metadata_round_trips_through_strings() {
        let ids = create_ids(&[10_800, 21_600], &[3, 4], &[5, 6]).unwrap();
        let text: Vec<String> = ids.iter().map(ToString::to_string).collect();
        let (times, rows, columns) = ids_to_metadata(&text).unwrap();
        assert_eq!(times, vec![10_800, 21_600]);
        assert_eq!(rows, vec![3, 4]);
        assert_eq!(columns, vec![5, 6]);
        assert!(create_ids(&[1], &[1, 2], &[1]).is_err());
    }

    #[test]
    fn id_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("ids.json");
        let ids = strings(&[(10_800, 1, 2), (21_600, 3, 4)]);
        write_example_ids(&path, &ids).unwrap();
        assert_eq!(read_example_ids(&path).unwrap(), ids);
        assert!(write_example_ids(&path, &["bogus".to_string()]).is_err());
        assert!(matches!(
            read_example_ids(&dir.path().join("absent.json")),
            Err(ExampleError::MissingResource { .. })
        ));
    }
}
