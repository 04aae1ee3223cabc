//! Append-only weekly history of completed acquisitions

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::WorkerResult;
use crate::ledger::{partition_files, read_entries, today, week_file, write_entries};

const PREFIX: &str = "history";

/// One acquisition, as recorded after it finished (or was skipped)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub playlist_title: String,
    pub url: String,
    pub title: String,
    pub artist: String,
    pub file_path: String,
    /// Path to the saved lyrics file, or the literal `No Lyrics`
    pub lyrics_path: String,
    pub timestamp: String,
    pub quality: String,
    pub format: String,
    pub status: String,
}

/// Weekly-partitioned history log rooted at one directory
#[derive(Debug, Clone)]
pub struct HistoryLog {
    dir: PathBuf,
}

impl HistoryLog {
    pub fn new(dir: impl Into<PathBuf>) -> WorkerResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Append one entry to the current week's partition
    pub fn log_download(&self, entry: &HistoryEntry) -> WorkerResult<()> {
        let path = week_file(&self.dir, PREFIX, today());
        let mut entries: Vec<HistoryEntry> = read_entries(&path);
        entries.push(entry.clone());
        write_entries(&path, &entries)?;
        debug!(title = %entry.title, status = %entry.status, "Logged history entry");
        Ok(())
    }

    /// All entries across all partitions, chronological partition order
    pub fn load_all(&self) -> Vec<HistoryEntry> {
        partition_files(&self.dir, PREFIX)
            .iter()
            .flat_map(|path| read_entries::<HistoryEntry>(path))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::timestamp_now;

    fn entry(title: &str, status: &str) -> HistoryEntry {
        HistoryEntry {
            kind: "single".to_string(),
            playlist_title: "No Playlist".to_string(),
            url: "url-1".to_string(),
            title: title.to_string(),
            artist: "Artist".to_string(),
            file_path: format!("/music/{title}.mp3"),
            lyrics_path: "No Lyrics".to_string(),
            timestamp: timestamp_now(),
            quality: "best".to_string(),
            format: "mp3".to_string(),
            status: status.to_string(),
        }
    }

    #[test]
    fn test_appends_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let log = HistoryLog::new(dir.path()).unwrap();

        log.log_download(&entry("One", "downloaded")).unwrap();
        log.log_download(&entry("Two", "skipped")).unwrap();

        let all = log.load_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].title, "One");
        assert_eq!(all[1].title, "Two");
    }
}
