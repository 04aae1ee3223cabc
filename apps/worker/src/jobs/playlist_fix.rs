//! Playlist-fix job: reconcile a playlist file with its remote source
//!
//! Downloads whatever is missing, rewrites the playlist to the remote order,
//! and leaves a plain-text fix log behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tracing::info;

use crate::error::WorkerResult;
use crate::jobs::download::{download_one, DownloadParams, TrackContext, TrackResult};
use crate::playlist::write_m3u_playlist;
use crate::registry::JobLog;
use crate::AppState;

/// Outcome of a fix run, as written to the fix log
#[derive(Debug, Default)]
struct FixSummary {
    playlist_title: String,
    total_tracks: usize,
    existing_tracks: usize,
    downloaded_tracks: usize,
    missing_tracks: usize,
    log_entries: Vec<String>,
}

/// Run a playlist-fix job
pub async fn run(state: Arc<AppState>, params: DownloadParams, log: JobLog) -> WorkerResult<()> {
    let (playlist_title, entries) = match state.fetcher.list_playlist(&params.url, &log).await {
        Ok(listing) => listing,
        Err(e) => {
            log.put(format!("[ERROR] {e}"));
            return Ok(());
        }
    };
    log.put(format!("[FIX] Checking playlist: {playlist_title}"));

    let mut summary = FixSummary {
        playlist_title: playlist_title.clone(),
        total_tracks: entries.len(),
        ..Default::default()
    };
    let mut playlist_files: Vec<PathBuf> = Vec::new();

    for (i, entry) in entries.iter().enumerate() {
        let title = entry.title.as_deref().unwrap_or("Untitled");
        let context = TrackContext::playlist(&playlist_title, (i + 1) as u32);
        match download_one(&state, &entry.watch_url(), &params, &context, &log).await {
            TrackResult::Skipped(path) => {
                summary.existing_tracks += 1;
                summary.log_entries.push(format!("EXISTS   {title}"));
                playlist_files.push(path);
            }
            TrackResult::Downloaded(path) => {
                summary.downloaded_tracks += 1;
                summary.log_entries.push(format!("FETCHED  {title}"));
                playlist_files.push(path);
            }
            TrackResult::Failed => {
                summary.missing_tracks += 1;
                summary.log_entries.push(format!("MISSING  {title}"));
                log.put(format!("[WARNING] Track still missing: {title}"));
            }
        }
    }

    if playlist_files.is_empty() {
        log.put("[WARNING] No tracks resolved, playlist left untouched");
    } else {
        write_m3u_playlist(
            &playlist_title,
            &playlist_files,
            &state.config.playlist_dir,
            state.config.playlist_options,
            &log,
        )?;
    }

    match save_fix_log(&state.config.fix_log_dir(), &summary) {
        Ok(path) => log.put(format!("[FIX] Log written: {}", path.display())),
        Err(e) => log.put(format!("[WARNING] Failed to write fix log: {e}")),
    }

    log.put(format!(
        "[FIX] Done: {} existing, {} downloaded, {} missing",
        summary.existing_tracks, summary.downloaded_tracks, summary.missing_tracks
    ));
    info!(
        playlist = %playlist_title,
        downloaded = summary.downloaded_tracks,
        missing = summary.missing_tracks,
        "Playlist fix finished"
    );
    Ok(())
}

/// Write the plain-text fix log, one file per run
fn save_fix_log(log_dir: &Path, summary: &FixSummary) -> WorkerResult<PathBuf> {
    fs::create_dir_all(log_dir)?;
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let log_file = log_dir.join(format!("fix_playlist_{timestamp}.log"));

    let mut out = String::new();
    out.push_str(&format!("Playlist Fix Log - {timestamp}\n"));
    out.push_str(&"=".repeat(50));
    out.push_str("\n\n");
    out.push_str(&format!("Playlist: {}\n", summary.playlist_title));
    out.push_str(&format!(
        "Operation completed: {}\n\n",
        Local::now().to_rfc3339()
    ));
    out.push_str("Summary:\n");
    out.push_str(&format!(
        "  Total tracks in playlist: {}\n",
        summary.total_tracks
    ));
    out.push_str(&format!(
        "  Existing tracks found: {}\n",
        summary.existing_tracks
    ));
    out.push_str(&format!(
        "  New tracks downloaded: {}\n",
        summary.downloaded_tracks
    ));
    out.push_str(&format!(
        "  Tracks still missing: {}\n\n",
        summary.missing_tracks
    ));
    out.push_str("Detailed Log:\n");
    out.push_str(&"-".repeat(30));
    out.push('\n');
    for entry in &summary.log_entries {
        out.push_str(entry);
        out.push('\n');
    }

    fs::write(&log_file, out)?;
    Ok(log_file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_log_contents() {
        let dir = tempfile::tempdir().unwrap();
        let summary = FixSummary {
            playlist_title: "Road Trip".to_string(),
            total_tracks: 3,
            existing_tracks: 1,
            downloaded_tracks: 1,
            missing_tracks: 1,
            log_entries: vec![
                "EXISTS   Song A".to_string(),
                "FETCHED  Song B".to_string(),
                "MISSING  Song C".to_string(),
            ],
        };

        let path = save_fix_log(dir.path(), &summary).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(path
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("fix_playlist_"));
        assert!(content.contains("Playlist: Road Trip"));
        assert!(content.contains("Total tracks in playlist: 3"));
        assert!(content.contains("MISSING  Song C"));
    }
}
