use chrono::{DateTime, NaiveDateTime};

use crate::constants::store::TIME_FORMAT;
use crate::errors::ExampleError;
use crate::types::UnixSeconds;

/// Format a valid time as `yyyymmddHH` (UTC).
pub fn format_time(valid_time: UnixSeconds) -> Result<String, ExampleError> {
    DateTime::from_timestamp(valid_time, 0)
        .map(|time| time.format(TIME_FORMAT).to_string())
        .ok_or_else(|| ExampleError::Configuration(format!("invalid valid time {valid_time}")))
}

/// Parse a `yyyymmddHH` (UTC) string.
pub fn parse_time(text: &str) -> Result<UnixSeconds, ExampleError> {
    // chrono needs minutes to build a datetime.
    NaiveDateTime::parse_from_str(&format!("{text}00"), &format!("{TIME_FORMAT}%M"))
        .map(|time| time.and_utc().timestamp())
        .map_err(|err| ExampleError::Configuration(format!("invalid time string '{text}': {err}")))
}

/// Every time from `first` to `last` inclusive, `interval_seconds` apart.
pub fn time_range(
    first: UnixSeconds,
    last: UnixSeconds,
    interval_seconds: i64,
) -> Result<Vec<UnixSeconds>, ExampleError> {
    if interval_seconds <= 0 {
        return Err(ExampleError::Configuration(format!(
            "time interval must be positive, got {interval_seconds}"
        )));
    }
    if last < first {
        return Err(ExampleError::Configuration(format!(
            "last time {last} precedes first time {first}"
        )));
    }
    Ok((first..=last).step_by(interval_seconds as usize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_and_parse_agree() {
        assert_eq!(format_time(1_199_145_600).unwrap(), "2008010100");
        assert_eq!(parse_time("2008010103").unwrap(), 1_199_145_600 + 10_800);
        assert!(parse_time("2008-01-01").is_err());
    }

    #[test]
    fn range_is_inclusive() {
        let times = time_range(0, 21_600, 10_800).unwrap();
        assert_eq!(times, vec![0, 10_800, 21_600]);
        assert!(time_range(10, 0, 10_800).is_err());
    }
}
