//! M3U playlist maintenance
//!
//! Two operations: a full diff-rewrite used after playlist jobs, and a
//! position-preserving single-track insertion used when a retried download
//! has to land back at its original ordinal.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Deserialize;
use tracing::info;

use crate::error::WorkerResult;
use crate::registry::JobLog;

/// How playlist entries are written relative to the playlist directory
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PlaylistOptions {
    #[serde(default)]
    pub relative_paths: bool,
    #[serde(default)]
    pub filenames_only: bool,
}

/// Path style of an existing playlist, detected from its first track line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PathStyle {
    Absolute,
    Relative,
    Filename,
}

fn detect_style(lines: &[String]) -> PathStyle {
    for line in lines {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if Path::new(trimmed).is_absolute() {
            return PathStyle::Absolute;
        }
        if trimmed.contains(std::path::MAIN_SEPARATOR) || trimmed.contains('/') {
            return PathStyle::Relative;
        }
        return PathStyle::Filename;
    }
    PathStyle::Absolute
}

/// Absolute, case-folded form of an entry for change detection
fn normalize_entry(entry: &str, base_dir: &Path) -> String {
    let path = Path::new(entry);
    let absolute = if path.is_absolute() {
        PathBuf::from(path)
    } else {
        base_dir.join(path)
    };
    absolute.to_string_lossy().to_lowercase()
}

fn entry_for(file_path: &Path, playlist_dir: &Path, options: PlaylistOptions) -> String {
    if options.filenames_only {
        file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    } else if options.relative_paths {
        pathdiff_relative(file_path, playlist_dir)
    } else {
        file_path.to_string_lossy().into_owned()
    }
}

/// Relative path from `base` to `target`, walking up with `..` where needed
fn pathdiff_relative(target: &Path, base: &Path) -> String {
    let target_parts: Vec<_> = target.components().collect();
    let base_parts: Vec<_> = base.components().collect();

    let common = target_parts
        .iter()
        .zip(base_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..base_parts.len() {
        rel.push("..");
    }
    for part in &target_parts[common..] {
        rel.push(part);
    }
    rel.to_string_lossy().into_owned()
}

/// Create or rewrite `<playlist_title>.m3u` from the full file set.
///
/// Keys are compared as absolute lowercased paths. The rewritten file lists
/// the new set in its own order under a header carrying the original creation
/// time plus added/removed counts.
pub fn write_m3u_playlist(
    playlist_title: &str,
    file_paths: &[PathBuf],
    playlist_dir: &Path,
    options: PlaylistOptions,
    log: &JobLog,
) -> WorkerResult<()> {
    let playlist_file = playlist_dir.join(format!("{playlist_title}.m3u"));
    let existed = playlist_file.exists();

    let mut created_time = Local::now().to_rfc3339();
    let mut existing_keys: Vec<String> = Vec::new();
    if existed {
        let content = fs::read_to_string(&playlist_file)?;
        for line in content.lines() {
            if let Some(rest) = line.strip_prefix("#CREATED:") {
                created_time = rest.trim().to_string();
            } else if !line.starts_with('#') && !line.trim().is_empty() {
                existing_keys.push(normalize_entry(line.trim(), playlist_dir));
            }
        }
    }

    let mut new_keys: Vec<String> = Vec::new();
    let mut new_entries: Vec<String> = Vec::new();
    for file_path in file_paths {
        let entry = entry_for(file_path, playlist_dir, options);
        let key = normalize_entry(&entry, playlist_dir);
        if !new_keys.contains(&key) {
            new_keys.push(key);
            new_entries.push(entry);
        }
    }

    let added = new_keys
        .iter()
        .filter(|k| !existing_keys.contains(k))
        .count();
    let removed = existing_keys
        .iter()
        .filter(|k| !new_keys.contains(k))
        .count();
    let unchanged = new_keys.len() - added;

    let mut out = String::new();
    out.push_str("#EXTM3U\n");
    out.push_str(&format!("#PLAYLIST:{playlist_title}\n"));
    out.push_str(&format!("#CREATED:{created_time}\n"));
    out.push_str(&format!("#UPDATED: {}\n", Local::now().to_rfc3339()));
    if added > 0 {
        out.push_str(&format!("#ADDED: {added} files\n"));
    }
    if removed > 0 {
        out.push_str(&format!("#REMOVED: {removed} files\n"));
    }
    for entry in &new_entries {
        out.push_str(entry);
        out.push('\n');
    }
    fs::write(&playlist_file, out)?;

    let action = if existed { "Updated" } else { "Created" };
    let name = playlist_file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!(playlist = %name, added, removed, "Playlist rewritten");
    log.put(format!(
        "[PLAYLIST] {action} playlist: {name} ({unchanged} unchanged, {added} added, {removed} removed)"
    ));

    Ok(())
}

/// Insert one track at its original 1-based playlist position.
///
/// The incoming path is rewritten to match the path style already used by
/// the playlist. If the target position is past the last track the entry is
/// appended; if the playlist file is missing it is created with a header.
pub fn insert_track_at(
    playlist_file: &Path,
    track_path: &Path,
    target_index: usize,
) -> WorkerResult<()> {
    if !playlist_file.exists() {
        let title = playlist_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut out = String::new();
        out.push_str("#EXTM3U\n");
        out.push_str(&format!("#PLAYLIST:{title}\n"));
        out.push_str(&track_path.to_string_lossy());
        out.push('\n');
        fs::write(playlist_file, out)?;
        return Ok(());
    }

    let content = fs::read_to_string(playlist_file)?;
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let style = detect_style(&lines);

    let base_dir = playlist_file.parent().unwrap_or_else(|| Path::new("."));
    let entry = match style {
        PathStyle::Absolute => track_path.to_string_lossy().into_owned(),
        PathStyle::Relative => pathdiff_relative(track_path, base_dir),
        PathStyle::Filename => track_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
    };

    // 0-based line indices of every track line
    let track_lines: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| {
            let t = line.trim();
            !t.is_empty() && !t.starts_with('#')
        })
        .map(|(i, _)| i)
        .collect();

    let position = target_index.saturating_sub(1);
    match track_lines.get(position) {
        Some(&line_idx) => lines.insert(line_idx, entry),
        None => lines.push(entry),
    }

    let mut out = lines.join("\n");
    out.push('\n');
    fs::write(playlist_file, out)?;
    Ok(())
}
