//! Retry job: re-acquire one failed entry and put it back where it belongs

use std::sync::Arc;

use tracing::info;

use crate::error::WorkerResult;
use crate::jobs::download::{download_one, DownloadParams, TrackContext};
use crate::ledger::fail::{FailEntry, FailKey};
use crate::playlist::insert_track_at;
use crate::registry::JobLog;
use crate::AppState;

/// Run a retry job for one fail-ledger entry
///
/// On success the ledger entry is removed, and a track that originally
/// belonged to a playlist is re-inserted at its original position.
pub async fn run(state: Arc<AppState>, entry: FailEntry, log: JobLog) -> WorkerResult<()> {
    log.put(format!("[RETRY] Retrying download: {}", entry.url));

    let params = DownloadParams {
        url: entry.url.clone(),
        quality: entry.quality.clone(),
        codec: entry.format.clone(),
        overwrite: false,
        resume: false,
    };
    let context = if entry.kind == "playlist" {
        TrackContext {
            kind: "playlist",
            playlist_title: entry.playlist.clone(),
            index: entry.index,
        }
    } else {
        TrackContext::single()
    };

    let result = download_one(&state, &entry.url, &params, &context, &log).await;
    let Some(path) = result.path() else {
        log.put("[RETRY] Retry failed, entry kept in the fail ledger");
        return Ok(());
    };

    match state.fail_ledger.remove_entry(&FailKey::from(&entry)) {
        Ok(true) => log.put("[RETRY] Removed entry from the fail ledger"),
        Ok(false) => log.put("[WARNING] Fail ledger entry was already gone"),
        Err(e) => log.put(format!("[WARNING] Failed to update fail ledger: {e}")),
    }

    if entry.kind == "playlist" {
        if let Some(index) = entry.index {
            let playlist_file = state
                .config
                .playlist_dir
                .join(format!("{}.m3u", entry.playlist));
            match insert_track_at(&playlist_file, path, index as usize) {
                Ok(()) => log.put(format!(
                    "[PLAYLIST] Restored track at position {} of '{}'",
                    index, entry.playlist
                )),
                Err(e) => log.put(format!("[WARNING] Failed to update playlist: {e}")),
            }
        }
    }

    info!(url = %entry.url, "Retry finished");
    Ok(())
}
