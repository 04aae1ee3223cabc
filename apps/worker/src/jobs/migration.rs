//! Migration job: match local files against the catalog and embed ids
//!
//! Walks the audio library, fuzzily matches each file against the catalog,
//! and renames confident matches to carry their external id. Ambiguous
//! matches are resolved by the configured fallback policy, which under
//! `manual` parks the worker on the choice broker until a human answers.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use lofty::{Accessor, Probe, TaggedFileExt};
use tracing::{debug, info};
use tunedock_catalog_client::SearchScope;
use walkdir::WalkDir;

use crate::choice::{ChoiceAction, ChoiceEvent};
use crate::error::WorkerResult;
use crate::ledger::migration::MigrationReport;
use crate::ledger::timestamp_now;
use crate::matcher::{classify, find_matches, search_scope, FallbackPolicy, MatchCandidate, MatchOutcome};
use crate::registry::JobLog;
use crate::AppState;

/// Extensions the migration walk considers
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a"];

/// Parameters of a migration job
#[derive(Debug, Clone)]
pub struct MigrationParams {
    pub threshold: f64,
    pub fallback: FallbackPolicy,
}

/// Run a migration job over the whole audio library
pub async fn run(state: Arc<AppState>, params: MigrationParams, log: JobLog) -> WorkerResult<()> {
    let files = collect_audio_files(&state.config.audio_dir);
    log.put(format!("[MIGRATE] Scanning {} audio files", files.len()));

    let mut migrated = 0;
    for file in &files {
        if has_embedded_id(file) {
            debug!(file = %file.display(), "Already carries an id, skipping");
            continue;
        }
        if migrate_file(&state, &params, file, &log).await {
            migrated += 1;
        }
    }

    log.put(format!(
        "[MIGRATE] Finished: {migrated}/{} files migrated",
        files.len()
    ));
    info!(total = files.len(), migrated, "Migration finished");
    Ok(())
}

fn collect_audio_files(audio_dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(audio_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_audio_file(p))
        .collect();
    files.sort();
    files
}

fn is_audio_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Whether the file name already ends in a bracketed external id
fn has_embedded_id(path: &Path) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|stem| stem.ends_with(']') && stem.contains(" ["))
        .unwrap_or(false)
}

/// Title and artist for a file: tags first, `Artist - Title` filename second
fn track_identity(path: &Path) -> (String, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();

    if let Ok(tagged) = Probe::open(path).and_then(|p| p.read()) {
        let tag = tagged.primary_tag().or_else(|| tagged.first_tag());
        if let Some(tag) = tag {
            if let (Some(title), Some(artist)) = (tag.title(), tag.artist()) {
                return (title.into_owned(), artist.into_owned());
            }
        }
    }

    match stem.split_once(" - ") {
        Some((artist, title)) => (title.trim().to_string(), artist.trim().to_string()),
        None => (stem, "Unknown Artist".to_string()),
    }
}

/// Process one file; returns whether it ended up migrated
async fn migrate_file(
    state: &AppState,
    params: &MigrationParams,
    file: &Path,
    log: &JobLog,
) -> bool {
    let (title, artist) = track_identity(file);
    debug!(file = %file.display(), title = %title, artist = %artist, "Matching file");

    let candidates = match find_matches(&state.catalog, &title, &artist, params.threshold).await {
        Ok(candidates) => candidates,
        Err(e) => {
            log.put(format!("[WARNING] Catalog search failed for '{title}': {e}"));
            record(state, file, None, None, "skipped", "search_failed", None);
            return false;
        }
    };

    match classify(candidates) {
        MatchOutcome::NoMatch => {
            log.put(format!("[MIGRATE] No confident match: {title}"));
            record(state, file, None, None, "skipped", "low_confidence", None);
            false
        }
        MatchOutcome::Single(candidate) => {
            apply(state, file, &candidate.external_id, "matched", log)
        }
        MatchOutcome::Ambiguous(candidates) => match params.fallback {
            FallbackPolicy::Best => {
                // Top-scored survivor wins outright; no runner-up margin check.
                apply(state, file, &candidates[0].external_id, "best_match", log)
            }
            FallbackPolicy::Manual => {
                resolve_manually(state, params, file, &title, &artist, candidates, log).await
            }
            FallbackPolicy::Skip => {
                log.put(format!(
                    "[MIGRATE] Ambiguous match ({} candidates): {title}",
                    candidates.len()
                ));
                record(
                    state,
                    file,
                    None,
                    None,
                    "ambiguous",
                    "multiple_matches",
                    Some(candidates),
                );
                false
            }
        },
    }
}

/// Park on the choice broker until a human answers
///
/// A `research_<scope>` answer re-runs the matcher once with that scope and,
/// if it finds anything, repeats the protocol with research disallowed.
async fn resolve_manually(
    state: &AppState,
    params: &MigrationParams,
    file: &Path,
    title: &str,
    artist: &str,
    mut candidates: Vec<MatchCandidate>,
    log: &JobLog,
) -> bool {
    let job_id = log.job_id().to_string();
    let mut allow_research = true;

    loop {
        let rx = state.choices.register(&job_id);
        log.choice(ChoiceEvent {
            file_path: file.to_string_lossy().into_owned(),
            title: title.to_string(),
            artist: artist.to_string(),
            candidates: candidates.clone(),
            allow_research,
            allow_manual: true,
        });
        log.put(format!("[MIGRATE] Waiting for a decision on: {title}"));

        // No timeout; an unanswered request parks this worker indefinitely.
        let decision = match rx.await {
            Ok(decision) => decision,
            Err(_) => {
                state.choices.discard(&job_id);
                record(state, file, None, None, "skipped", "choice_abandoned", None);
                return false;
            }
        };

        match decision.action {
            ChoiceAction::Select | ChoiceAction::Manual => {
                return match decision.external_id {
                    Some(id) => apply(state, file, &id, "user_selected", log),
                    None => {
                        log.put("[WARNING] Decision carried no external id, skipping");
                        record(state, file, None, None, "skipped", "user_skipped", None);
                        false
                    }
                };
            }
            ChoiceAction::Skip => {
                log.put(format!("[MIGRATE] Skipped by user: {title}"));
                record(state, file, None, None, "skipped", "user_skipped", None);
                return false;
            }
            ChoiceAction::Research(scope_name) => {
                if !allow_research {
                    record(state, file, None, None, "skipped", "user_skipped", None);
                    return false;
                }
                let scope = SearchScope::parse(&scope_name).unwrap_or(SearchScope::Videos);
                log.put(format!("[MIGRATE] Re-searching '{title}' in scope {scope}"));
                let rerun =
                    search_scope(&state.catalog, title, artist, scope, params.threshold).await;
                match rerun {
                    Ok(new_candidates) if !new_candidates.is_empty() => {
                        candidates = new_candidates;
                        allow_research = false;
                    }
                    Ok(_) => {
                        log.put(format!("[MIGRATE] Re-search found nothing for: {title}"));
                        record(state, file, None, None, "skipped", "no_results", None);
                        return false;
                    }
                    Err(e) => {
                        log.put(format!("[WARNING] Re-search failed: {e}"));
                        record(state, file, None, None, "skipped", "search_failed", None);
                        return false;
                    }
                }
            }
        }
    }
}

/// Rename the file to embed the external id and record the outcome
fn apply(state: &AppState, file: &Path, external_id: &str, reason: &str, log: &JobLog) -> bool {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = file
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    let new_file = file.with_file_name(format!("{stem} [{external_id}].{extension}"));

    if let Err(e) = std::fs::rename(file, &new_file) {
        log.put(format!("[ERROR] Failed to rename '{stem}': {e}"));
        record(state, file, None, None, "failed", "rename_failed", None);
        return false;
    }

    log.put(format!(
        "[MIGRATE] {} -> {}",
        file.display(),
        new_file.display()
    ));
    record(
        state,
        file,
        Some(new_file.to_string_lossy().into_owned()),
        Some(external_id.to_string()),
        "migrated",
        reason,
        None,
    );
    true
}

fn record(
    state: &AppState,
    file: &Path,
    new_file: Option<String>,
    video_id: Option<String>,
    status: &str,
    reason: &str,
    candidates: Option<Vec<MatchCandidate>>,
) {
    let report = MigrationReport {
        file: file.to_string_lossy().into_owned(),
        new_file,
        video_id,
        status: status.to_string(),
        reason: reason.to_string(),
        candidates,
        timestamp: timestamp_now(),
    };
    if let Err(e) = state.migration_log.log_migration(&report) {
        tracing::warn!(file = %file.display(), error = %e, "Failed to write migration log");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_embedded_id() {
        assert!(has_embedded_id(Path::new("/m/Artist - Song [abc123].mp3")));
        assert!(!has_embedded_id(Path::new("/m/Artist - Song.mp3")));
        assert!(!has_embedded_id(Path::new("/m/[intro] Song.mp3")));
    }

    #[test]
    fn test_track_identity_filename_fallback() {
        // Not a real audio file, so tag reading fails and the name wins.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Artist - Midnight Drive.mp3");
        std::fs::write(&path, b"").unwrap();

        let (title, artist) = track_identity(&path);
        assert_eq!(title, "Midnight Drive");
        assert_eq!(artist, "Artist");
    }

    #[test]
    fn test_track_identity_without_separator() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mystery.mp3");
        std::fs::write(&path, b"").unwrap();

        let (title, artist) = track_identity(&path);
        assert_eq!(title, "mystery");
        assert_eq!(artist, "Unknown Artist");
    }

    #[test]
    fn test_collect_audio_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.mp3"), b"").unwrap();
        std::fs::write(dir.path().join("a.flac"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let files = collect_audio_files(dir.path());
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, vec!["a.flac", "b.mp3"]);
    }
}
