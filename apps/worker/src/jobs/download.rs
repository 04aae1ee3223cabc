//! Download job: one URL, either a whole playlist or a single track

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::error::WorkerResult;
use crate::fetcher::{extension_for, Fetcher};
use crate::ledger::fail::FailReport;
use crate::ledger::history::HistoryEntry;
use crate::ledger::timestamp_now;
use crate::playlist::write_m3u_playlist;
use crate::registry::JobLog;
use crate::AppState;

/// Parameters of a download job
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadParams {
    pub url: String,
    pub quality: String,
    pub codec: String,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default)]
    pub resume: bool,
}

/// What happened to one track
pub(crate) enum TrackResult {
    Downloaded(PathBuf),
    Skipped(PathBuf),
    Failed,
}

impl TrackResult {
    pub(crate) fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Downloaded(p) | Self::Skipped(p) => Some(p),
            Self::Failed => None,
        }
    }
}

/// Where a track sits relative to a playlist, for ledger entries
#[derive(Debug, Clone)]
pub(crate) struct TrackContext {
    pub kind: &'static str,
    pub playlist_title: String,
    pub index: Option<u32>,
}

impl TrackContext {
    pub(crate) fn single() -> Self {
        Self {
            kind: "single",
            playlist_title: "No Playlist".to_string(),
            index: None,
        }
    }

    pub(crate) fn playlist(title: &str, index: u32) -> Self {
        Self {
            kind: "playlist",
            playlist_title: title.to_string(),
            index: Some(index),
        }
    }
}

/// Run a download job
pub async fn run(state: Arc<AppState>, params: DownloadParams, log: JobLog) -> WorkerResult<()> {
    if Fetcher::is_playlist_url(&params.url) {
        run_playlist(&state, &params, &log).await
    } else {
        download_one(&state, &params.url, &params, &TrackContext::single(), &log).await;
        Ok(())
    }
}

async fn run_playlist(
    state: &AppState,
    params: &DownloadParams,
    log: &JobLog,
) -> WorkerResult<()> {
    let (playlist_title, entries) = match state.fetcher.list_playlist(&params.url, log).await {
        Ok(listing) => listing,
        Err(e) => {
            log.put(format!("[ERROR] {e}"));
            return Ok(());
        }
    };
    log.put(format!(
        "[PLAYLIST] Starting download of playlist: {playlist_title}"
    ));

    let playlist_file = state
        .config
        .playlist_dir
        .join(format!("{playlist_title}.m3u"));
    let mut playlist_files: Vec<PathBuf> = Vec::new();
    if params.resume && playlist_file.exists() {
        match std::fs::read_to_string(&playlist_file) {
            Ok(content) => {
                playlist_files = content
                    .lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty() && !l.starts_with('#'))
                    .map(PathBuf::from)
                    .collect();
                log.put(format!(
                    "[PROGRESS] Loaded {} existing tracks from playlist",
                    playlist_files.len()
                ));
            }
            Err(e) => log.put(format!("[WARNING] Failed to load existing playlist: {e}")),
        }
    }

    let mut start_index = 0;
    if params.resume {
        if let Some(progress) = state.progress.get(&params.url) {
            start_index = progress.last_index + 1;
            log.put(format!(
                "[PROGRESS] Resuming from track {}/{}",
                start_index + 1,
                entries.len()
            ));
        } else {
            log.put("[PROGRESS] No progress found, starting from beginning");
        }
    }

    for (i, entry) in entries.iter().enumerate() {
        if i < start_index {
            continue;
        }
        log.put(format!(
            "[PLAYLIST] Downloading video {}/{}: {}",
            i + 1,
            entries.len(),
            entry.title.as_deref().unwrap_or("Untitled")
        ));

        let context = TrackContext::playlist(&playlist_title, (i + 1) as u32);
        let result = download_one(state, &entry.watch_url(), params, &context, log).await;
        match result.path() {
            Some(path) => {
                playlist_files.push(path.clone());
                state
                    .progress
                    .save(&params.url, &playlist_title, i, entries.len());
                log.put(format!(
                    "[PLAYLIST] Completed video {}/{}",
                    i + 1,
                    entries.len()
                ));
            }
            None => log.put(format!("[WARNING] Failed to download video {}", i + 1)),
        }
    }

    if playlist_files.is_empty() {
        log.put("[WARNING] No files downloaded for playlist");
    } else {
        write_m3u_playlist(
            &playlist_title,
            &playlist_files,
            &state.config.playlist_dir,
            state.config.playlist_options,
            log,
        )?;
        log.put(format!(
            "[PLAYLIST] Created M3U playlist in {}",
            state.config.playlist_dir.display()
        ));
    }
    info!(playlist = %playlist_title, tracks = playlist_files.len(), "Playlist download finished");
    Ok(())
}

/// Acquire one track, with every failure swallowed into the log and the
/// fail ledger
pub(crate) async fn download_one(
    state: &AppState,
    url: &str,
    params: &DownloadParams,
    context: &TrackContext,
    log: &JobLog,
) -> TrackResult {
    let meta = match state.fetcher.track_metadata(url, log).await {
        Ok(meta) => meta,
        Err(e) => {
            log.put(format!("[ERROR] Download failed: {e}"));
            log_fail(state, url, params, context, &format!("[ERROR] {e}"));
            return TrackResult::Failed;
        }
    };

    let extension = extension_for(&params.codec);
    let output_path = state
        .config
        .audio_dir
        .join(format!("{}.{}", meta.sanitized_title, extension));
    if output_path.exists() && !params.overwrite {
        let name = output_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        log.put(format!("[SKIPPED] File exists: {name}"));
        log_history(state, url, params, context, &output_path, &meta.uploader, None, "skipped");
        return TrackResult::Skipped(output_path);
    }

    let output_file = match state
        .fetcher
        .download(
            url,
            &params.quality,
            &params.codec,
            &state.config.audio_dir,
            &meta,
            log,
        )
        .await
    {
        Ok(path) => path,
        Err(e) => {
            log.put(format!("[ERROR] Download failed: {e}"));
            log_fail(
                state,
                url,
                params,
                context,
                "Failed (didn't download for some reason)",
            );
            return TrackResult::Failed;
        }
    };

    let lyrics_path = save_lyrics(state, &meta.video_id, &meta.title, &meta.uploader, &output_file, log).await;

    log_history(
        state,
        url,
        params,
        context,
        &output_file,
        &meta.uploader,
        lyrics_path.as_deref(),
        "downloaded",
    );
    TrackResult::Downloaded(output_file)
}

/// Look up lyrics and write a sidecar `.lrc`; lyrics are best-effort
async fn save_lyrics(
    state: &AppState,
    track_id: &str,
    title: &str,
    artist: &str,
    output_file: &std::path::Path,
    log: &JobLog,
) -> Option<String> {
    if track_id.is_empty() {
        return None;
    }
    log.put("[LYRICS] Searching for lyrics...");
    let lyrics = match state.catalog.lyrics(track_id).await {
        Ok(Some(lyrics)) => lyrics,
        Ok(None) => {
            log.put("[LYRICS] Lyrics not available for this track");
            return None;
        }
        Err(e) => {
            log.put(format!("[WARNING] Lyrics search failed: {e}"));
            return None;
        }
    };

    let stem = output_file.file_stem()?.to_string_lossy();
    let lrc_file = state.config.lyrics_dir.join(format!("{stem}.lrc"));
    let source = lyrics.source.as_deref().unwrap_or("catalog");
    let body = format!(
        "[ar:{artist}]\n[ti:{title}]\n[by:{source}]\n{}\n",
        lyrics.lyrics
    );
    if let Err(e) = std::fs::write(&lrc_file, body) {
        log.put(format!("[WARNING] Failed to save lyrics: {e}"));
        return None;
    }
    log.put(format!(
        "[LYRICS] Saved lyrics to {}",
        lrc_file.file_name().map(|n| n.to_string_lossy()).unwrap_or_default()
    ));
    Some(lrc_file.to_string_lossy().into_owned())
}

fn log_fail(
    state: &AppState,
    url: &str,
    params: &DownloadParams,
    context: &TrackContext,
    status: &str,
) {
    let report = FailReport {
        kind: context.kind.to_string(),
        playlist_title: context.playlist_title.clone(),
        index: context.index,
        url: url.to_string(),
        quality: params.quality.clone(),
        format: params.codec.clone(),
        status: status.to_string(),
        timestamp: timestamp_now(),
    };
    if let Err(e) = state.fail_ledger.log_fail(&report) {
        tracing::warn!(url = %url, error = %e, "Failed to write fail ledger");
    }
}

#[allow(clippy::too_many_arguments)]
fn log_history(
    state: &AppState,
    url: &str,
    params: &DownloadParams,
    context: &TrackContext,
    output_file: &std::path::Path,
    artist: &str,
    lyrics_path: Option<&str>,
    status: &str,
) {
    let entry = HistoryEntry {
        kind: context.kind.to_string(),
        playlist_title: context.playlist_title.clone(),
        url: url.to_string(),
        title: output_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        artist: artist.to_string(),
        file_path: output_file.to_string_lossy().into_owned(),
        lyrics_path: lyrics_path.unwrap_or("No Lyrics").to_string(),
        timestamp: timestamp_now(),
        quality: params.quality.clone(),
        format: params.codec.clone(),
        status: status.to_string(),
    };
    if let Err(e) = state.history.log_download(&entry) {
        tracing::warn!(url = %url, error = %e, "Failed to write history log");
    }
}
