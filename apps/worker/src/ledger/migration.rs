//! Weekly migration log, merge-on-write keyed by file path
//!
//! Repeated outcomes for the same file within the ledger merge: statuses and
//! reasons union in first-seen order, the newest new-file/external-id/
//! candidates/timestamp win.

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::WorkerResult;
use crate::ledger::{partition_files, read_entries, today, week_file, write_entries};
use crate::matcher::MatchCandidate;

const PREFIX: &str = "migration";

/// One migration outcome as stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationEntry {
    pub file: String,
    pub new_file: Option<String>,
    pub video_id: Option<String>,
    pub statuses: Vec<String>,
    pub reasons: Vec<String>,
    /// Only present when the outcome was ambiguous
    pub candidates: Option<Vec<MatchCandidate>>,
    pub timestamp: String,
}

/// A single new outcome to record
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub file: String,
    pub new_file: Option<String>,
    pub video_id: Option<String>,
    pub status: String,
    pub reason: String,
    pub candidates: Option<Vec<MatchCandidate>>,
    pub timestamp: String,
}

/// Weekly-partitioned migration log rooted at one directory
#[derive(Debug, Clone)]
pub struct MigrationLog {
    dir: PathBuf,
}

impl MigrationLog {
    pub fn new(dir: impl Into<PathBuf>) -> WorkerResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Record an outcome, merging with an existing entry for the same file
    pub fn log_migration(&self, report: &MigrationReport) -> WorkerResult<()> {
        let path = week_file(&self.dir, PREFIX, today());
        let mut entries: Vec<MigrationEntry> = read_entries(&path);

        if let Some(existing) = entries.iter_mut().find(|e| e.file == report.file) {
            if !existing.statuses.contains(&report.status) {
                existing.statuses.push(report.status.clone());
            }
            if !existing.reasons.contains(&report.reason) {
                existing.reasons.push(report.reason.clone());
            }
            if report.new_file.is_some() {
                existing.new_file = report.new_file.clone();
            }
            if report.video_id.is_some() {
                existing.video_id = report.video_id.clone();
            }
            if report.candidates.is_some() {
                existing.candidates = report.candidates.clone();
            }
            existing.timestamp = report.timestamp.clone();
        } else {
            entries.push(MigrationEntry {
                file: report.file.clone(),
                new_file: report.new_file.clone(),
                video_id: report.video_id.clone(),
                statuses: vec![report.status.clone()],
                reasons: vec![report.reason.clone()],
                candidates: report.candidates.clone(),
                timestamp: report.timestamp.clone(),
            });
        }

        write_entries(&path, &entries)?;
        debug!(file = %report.file, status = %report.status, "Logged migration entry");
        Ok(())
    }

    /// All entries across all partitions
    pub fn load_all(&self) -> Vec<MigrationEntry> {
        partition_files(&self.dir, PREFIX)
            .iter()
            .flat_map(|path| read_entries::<MigrationEntry>(path))
            .collect()
    }
}
