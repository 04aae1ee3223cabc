//! Flat, time-partitioned JSON ledgers
//!
//! Each log family (fail, history, migration) persists as one JSON array per
//! ISO week in its own directory, named `<prefix>_<weekStart>_to_<weekEnd>.json`
//! with Monday..Sunday bounds. Filename sort order equals chronological
//! order, which the readers rely on.
//!
//! Partition files are read and written without cross-process locking;
//! concurrent mutations from different jobs can race. Acceptable at
//! personal-library scale.

pub mod fail;
pub mod history;
pub mod migration;

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, NaiveDate};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::WorkerResult;

/// Monday..Sunday bounds of the week containing `date`
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let start = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    (start, start + Duration::days(6))
}

/// Deterministic partition path for the week containing `date`
pub fn week_file(dir: &Path, prefix: &str, date: NaiveDate) -> PathBuf {
    let (start, end) = week_bounds(date);
    dir.join(format!(
        "{}_{}_to_{}.json",
        prefix,
        start.format("%Y-%m-%d"),
        end.format("%Y-%m-%d")
    ))
}

/// All partition files for a prefix, filename-sorted (= chronological)
pub fn partition_files(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let wanted_prefix = format!("{}_", prefix);
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(&wanted_prefix) && n.ends_with(".json"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

/// Load one partition's entries
///
/// A corrupt or partial partition contributes zero entries to any scan
/// rather than aborting it.
pub fn read_entries<T: DeserializeOwned>(path: &Path) -> Vec<T> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read ledger partition");
            return Vec::new();
        }
    };
    match serde_json::from_str(&data) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Skipping corrupt ledger partition");
            Vec::new()
        }
    }
}

/// Rewrite one partition as human-readable JSON
pub fn write_entries<T: Serialize>(path: &Path, entries: &[T]) -> WorkerResult<()> {
    let json = serde_json::to_string_pretty(entries)?;
    fs::write(path, json)?;
    Ok(())
}

/// Current local date, the anchor for "this week's" partition
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// Local timestamp in the ISO-ish format the ledgers store
pub fn timestamp_now() -> String {
    chrono::Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_week_bounds_monday_anchor() {
        // 2026-08-26 is a Wednesday; its week is Mon 24th .. Sun 30th.
        let date = NaiveDate::from_ymd_opt(2026, 8, 26).unwrap();
        let (start, end) = week_bounds(date);
        assert_eq!(start, NaiveDate::from_ymd_opt(2026, 8, 24).unwrap());
        assert_eq!(end, NaiveDate::from_ymd_opt(2026, 8, 30).unwrap());
    }

    #[test]
    fn test_week_bounds_on_monday_and_sunday() {
        let monday = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        assert_eq!(week_bounds(monday).0, monday);

        let sunday = NaiveDate::from_ymd_opt(2026, 8, 30).unwrap();
        assert_eq!(week_bounds(sunday).0, monday);
    }

    #[test]
    fn test_week_file_name_is_deterministic() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 26).unwrap();
        let path = week_file(Path::new("/data/fail"), "fail", date);
        assert_eq!(
            path,
            Path::new("/data/fail/fail_2026-08-24_to_2026-08-30.json")
        );
    }

    #[test]
    fn test_partition_files_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "fail_2026-02-02_to_2026-02-08.json",
            "fail_2026-01-05_to_2026-01-11.json",
            "history_2026-01-05_to_2026-01-11.json",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), "[]").unwrap();
        }

        let files = partition_files(dir.path(), "fail");
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "fail_2026-01-05_to_2026-01-11.json",
                "fail_2026-02-02_to_2026-02-08.json",
            ]
        );
    }

    #[test]
    fn test_corrupt_partition_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fail_2026-01-05_to_2026-01-11.json");
        fs::write(&path, "{ not json").unwrap();
        let entries: Vec<serde_json::Value> = read_entries(&path);
        assert!(entries.is_empty());
    }
}
