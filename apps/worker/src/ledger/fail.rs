//! Merge-on-write ledger of failed acquisition attempts
//!
//! A failure is identified by (type, url, playlist title). Logging the same
//! identity again merges into the existing entry wherever it lives, so an
//! entry is never duplicated across weeks. The write path scans every
//! partition; O(weeks x entries) per write is fine at this scale.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::WorkerResult;
use crate::ledger::{partition_files, read_entries, today, week_file, write_entries};

const PREFIX: &str = "fail";

/// One failure as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredFailEntry {
    #[serde(rename = "type")]
    kind: String,
    playlist_title: String,
    index: Option<u32>,
    url: String,
    quality: String,
    format: String,
    #[serde(default)]
    statuses: Vec<String>,
    timestamp: String,
}

/// One failure as exposed to readers
///
/// Identical to the stored shape except the legacy `playlist_title` field is
/// renamed `playlist` at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub playlist: String,
    pub index: Option<u32>,
    pub url: String,
    pub quality: String,
    pub format: String,
    pub statuses: Vec<String>,
    pub timestamp: String,
}

impl From<StoredFailEntry> for FailEntry {
    fn from(stored: StoredFailEntry) -> Self {
        Self {
            kind: stored.kind,
            playlist: stored.playlist_title,
            index: stored.index,
            url: stored.url,
            quality: stored.quality,
            format: stored.format,
            statuses: stored.statuses,
            timestamp: stored.timestamp,
        }
    }
}

/// A single new failure to record
#[derive(Debug, Clone)]
pub struct FailReport {
    pub kind: String,
    pub playlist_title: String,
    pub index: Option<u32>,
    pub url: String,
    pub quality: String,
    pub format: String,
    pub status: String,
    pub timestamp: String,
}

/// Identity key of a failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailKey {
    pub kind: String,
    pub url: String,
    pub playlist_title: String,
}

impl FailKey {
    fn matches(&self, entry: &StoredFailEntry) -> bool {
        entry.kind == self.kind && entry.url == self.url && entry.playlist_title == self.playlist_title
    }
}

impl From<&FailEntry> for FailKey {
    fn from(entry: &FailEntry) -> Self {
        Self {
            kind: entry.kind.clone(),
            url: entry.url.clone(),
            playlist_title: entry.playlist.clone(),
        }
    }
}

/// Which entries to select from the ledger
#[derive(Debug, Clone, PartialEq)]
pub enum FailSelection {
    /// Every entry, load order
    All,
    /// Entries belonging to the named playlist
    Playlist(String),
    /// First N entries in load order
    Count(usize),
}

/// Weekly-partitioned fail ledger rooted at one directory
#[derive(Debug, Clone)]
pub struct FailLedger {
    dir: PathBuf,
}

impl FailLedger {
    pub fn new(dir: impl Into<PathBuf>) -> WorkerResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Record a failure, merging into an existing entry with the same
    /// identity key wherever it lives
    ///
    /// On merge: statuses union (first-seen order, no duplicates), timestamp
    /// adopted from the newer report, `index` filled only if previously
    /// absent. Otherwise the report is appended to the current week's
    /// partition.
    pub fn log_fail(&self, report: &FailReport) -> WorkerResult<()> {
        let key = FailKey {
            kind: report.kind.clone(),
            url: report.url.clone(),
            playlist_title: report.playlist_title.clone(),
        };

        for path in partition_files(&self.dir, PREFIX) {
            let mut entries: Vec<StoredFailEntry> = read_entries(&path);
            if let Some(existing) = entries.iter_mut().find(|e| key.matches(e)) {
                if !existing.statuses.contains(&report.status) {
                    existing.statuses.push(report.status.clone());
                }
                if existing.index.is_none() {
                    existing.index = report.index;
                }
                existing.timestamp = report.timestamp.clone();
                write_entries(&path, &entries)?;
                debug!(url = %report.url, partition = %path.display(), "Merged fail entry");
                return Ok(());
            }
        }

        let path = week_file(&self.dir, PREFIX, today());
        let mut entries: Vec<StoredFailEntry> = read_entries(&path);
        entries.push(StoredFailEntry {
            kind: report.kind.clone(),
            playlist_title: report.playlist_title.clone(),
            index: report.index,
            url: report.url.clone(),
            quality: report.quality.clone(),
            format: report.format.clone(),
            statuses: vec![report.status.clone()],
            timestamp: report.timestamp.clone(),
        });
        write_entries(&path, &entries)?;
        debug!(url = %report.url, "Appended new fail entry");
        Ok(())
    }

    /// Remove the identity-key match from whichever partition holds it
    ///
    /// Deletes a partition file that becomes empty, rewrites it otherwise.
    /// Returns whether a removal occurred; an absent key leaves the ledger
    /// unchanged.
    pub fn remove_entry(&self, key: &FailKey) -> WorkerResult<bool> {
        for path in partition_files(&self.dir, PREFIX) {
            let entries: Vec<StoredFailEntry> = read_entries(&path);
            let remaining: Vec<StoredFailEntry> = entries
                .iter()
                .filter(|e| !key.matches(e))
                .cloned()
                .collect();
            if remaining.len() == entries.len() {
                continue;
            }
            if remaining.is_empty() {
                fs::remove_file(&path)?;
                info!(partition = %path.display(), "Removed empty fail partition");
            } else {
                write_entries(&path, &remaining)?;
            }
            return Ok(true);
        }
        Ok(false)
    }

    /// All entries across all partitions, filename-sorted order
    pub fn load_all(&self) -> Vec<FailEntry> {
        partition_files(&self.dir, PREFIX)
            .iter()
            .flat_map(|path| read_entries::<StoredFailEntry>(path))
            .map(FailEntry::from)
            .collect()
    }

    /// Select entries by mode
    pub fn select_entries(&self, selection: &FailSelection) -> Vec<FailEntry> {
        let all = self.load_all();
        match selection {
            FailSelection::All => all,
            FailSelection::Playlist(title) => all
                .into_iter()
                .filter(|e| &e.playlist == title)
                .collect(),
            FailSelection::Count(n) => all.into_iter().take(*n).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::timestamp_now;

    fn report(url: &str, playlist: &str, status: &str, index: Option<u32>) -> FailReport {
        FailReport {
            kind: "playlist".to_string(),
            playlist_title: playlist.to_string(),
            index,
            url: url.to_string(),
            quality: "best".to_string(),
            format: "mp3".to_string(),
            status: status.to_string(),
            timestamp: timestamp_now(),
        }
    }

    fn key(url: &str, playlist: &str) -> FailKey {
        FailKey {
            kind: "playlist".to_string(),
            url: url.to_string(),
            playlist_title: playlist.to_string(),
        }
    }

    #[test]
    fn test_repeated_failures_merge_statuses_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailLedger::new(dir.path()).unwrap();

        ledger.log_fail(&report("url-1", "Mix", "a", None)).unwrap();
        ledger.log_fail(&report("url-1", "Mix", "b", None)).unwrap();
        ledger.log_fail(&report("url-1", "Mix", "a", None)).unwrap();

        let all = ledger.load_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].statuses, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(all[0].playlist, "Mix");
    }

    #[test]
    fn test_index_filled_only_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailLedger::new(dir.path()).unwrap();

        ledger.log_fail(&report("url-1", "Mix", "a", None)).unwrap();
        ledger.log_fail(&report("url-1", "Mix", "b", Some(4))).unwrap();
        ledger.log_fail(&report("url-1", "Mix", "c", Some(9))).unwrap();

        let all = ledger.load_all();
        assert_eq!(all[0].index, Some(4));
    }

    #[test]
    fn test_merge_finds_entry_in_older_partition() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailLedger::new(dir.path()).unwrap();

        // Seed an entry in a long-past week by hand.
        let old = dir.path().join("fail_2020-01-06_to_2020-01-12.json");
        std::fs::write(
            &old,
            serde_json::json!([{
                "type": "playlist",
                "playlist_title": "Mix",
                "index": null,
                "url": "url-1",
                "quality": "best",
                "format": "mp3",
                "statuses": ["stale"],
                "timestamp": "2020-01-07T00:00:00"
            }])
            .to_string(),
        )
        .unwrap();

        ledger.log_fail(&report("url-1", "Mix", "fresh", None)).unwrap();

        // Merged into the old partition, no new entry in the current week.
        let all = ledger.load_all();
        assert_eq!(all.len(), 1);
        assert_eq!(
            all[0].statuses,
            vec!["stale".to_string(), "fresh".to_string()]
        );
        assert_eq!(partition_files(dir.path(), "fail").len(), 1);
    }

    #[test]
    fn test_remove_entry_then_load_never_returns_key() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailLedger::new(dir.path()).unwrap();

        ledger.log_fail(&report("url-1", "Mix", "a", None)).unwrap();
        ledger.log_fail(&report("url-2", "Mix", "a", None)).unwrap();

        assert!(ledger.remove_entry(&key("url-1", "Mix")).unwrap());
        let all = ledger.load_all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].url, "url-2");
    }

    #[test]
    fn test_remove_absent_key_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailLedger::new(dir.path()).unwrap();
        ledger.log_fail(&report("url-1", "Mix", "a", None)).unwrap();

        assert!(!ledger.remove_entry(&key("url-404", "Mix")).unwrap());
        assert_eq!(ledger.load_all().len(), 1);
    }

    #[test]
    fn test_partition_deleted_when_emptied() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailLedger::new(dir.path()).unwrap();
        ledger.log_fail(&report("url-1", "Mix", "a", None)).unwrap();

        assert!(ledger.remove_entry(&key("url-1", "Mix")).unwrap());
        assert!(partition_files(dir.path(), "fail").is_empty());
    }

    #[test]
    fn test_corrupt_partition_contributes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailLedger::new(dir.path()).unwrap();

        std::fs::write(
            dir.path().join("fail_2020-01-06_to_2020-01-12.json"),
            "{ truncated",
        )
        .unwrap();
        ledger.log_fail(&report("url-1", "Mix", "a", None)).unwrap();

        assert_eq!(ledger.load_all().len(), 1);
    }

    #[test]
    fn test_select_entries_modes() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailLedger::new(dir.path()).unwrap();

        ledger.log_fail(&report("url-1", "Mix", "a", None)).unwrap();
        ledger.log_fail(&report("url-2", "Chill", "a", None)).unwrap();
        ledger.log_fail(&report("url-3", "Mix", "a", None)).unwrap();

        assert_eq!(ledger.select_entries(&FailSelection::All).len(), 3);
        assert_eq!(
            ledger
                .select_entries(&FailSelection::Playlist("Mix".to_string()))
                .len(),
            2
        );
        let first_two = ledger.select_entries(&FailSelection::Count(2));
        assert_eq!(first_two.len(), 2);
        assert_eq!(first_two[0].url, "url-1");
    }

    #[test]
    fn test_newer_timestamp_adopted_on_merge() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FailLedger::new(dir.path()).unwrap();

        let mut first = report("url-1", "Mix", "a", None);
        first.timestamp = "2026-01-01T00:00:00".to_string();
        ledger.log_fail(&first).unwrap();

        let mut second = report("url-1", "Mix", "b", None);
        second.timestamp = "2026-06-01T00:00:00".to_string();
        ledger.log_fail(&second).unwrap();

        assert_eq!(ledger.load_all()[0].timestamp, "2026-06-01T00:00:00");
    }
}
