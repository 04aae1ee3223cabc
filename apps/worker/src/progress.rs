//! Resume positions for playlist downloads
//!
//! One JSON object in `progress.json`, keyed by playlist URL. Read/write
//! failures are logged and swallowed; losing a resume point only costs a
//! re-download.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Where a playlist download left off
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistProgress {
    pub playlist_title: String,
    /// 0-based index of the last completed track
    pub last_index: usize,
    pub total: usize,
}

#[derive(Debug, Clone)]
pub struct ProgressTracker {
    file: PathBuf,
}

impl ProgressTracker {
    pub fn new(config_dir: &Path) -> Self {
        Self {
            file: config_dir.join("progress.json"),
        }
    }

    fn read(&self) -> HashMap<String, PlaylistProgress> {
        match fs::read_to_string(&self.file) {
            Ok(data) => serde_json::from_str(&data).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    fn write(&self, data: &HashMap<String, PlaylistProgress>) {
        let result = serde_json::to_string_pretty(data)
            .map_err(std::io::Error::other)
            .and_then(|json| fs::write(&self.file, json));
        if let Err(e) = result {
            warn!(path = %self.file.display(), error = %e, "Failed to save progress");
        }
    }

    pub fn get(&self, playlist_url: &str) -> Option<PlaylistProgress> {
        self.read().get(playlist_url).cloned()
    }

    pub fn save(&self, playlist_url: &str, playlist_title: &str, last_index: usize, total: usize) {
        let mut data = self.read();
        data.insert(
            playlist_url.to_string(),
            PlaylistProgress {
                playlist_title: playlist_title.to_string(),
                last_index,
                total,
            },
        );
        self.write(&data);
    }

    pub fn clear(&self, playlist_url: &str) {
        let mut data = self.read();
        if data.remove(playlist_url).is_some() {
            self.write(&data);
        }
    }
}
