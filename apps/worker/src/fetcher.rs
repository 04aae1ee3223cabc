//! Wrapper around the external acquisition tool
//!
//! The tool is invoked per URL. Playlist listings come back as one JSON
//! object per line, single-item metadata as one JSON object, and downloads
//! stream their progress on stdout. A non-zero exit is a failure.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::debug;
use url::Url;

use crate::error::{WorkerError, WorkerResult};
use crate::registry::JobLog;

/// Characters allowed in a sanitized filename besides alphanumerics
const SAFE_FILENAME_CHARS: &str = "-_.,'!@$%^&+=~` ";

/// Maximum length of a sanitized filename stem
const MAX_FILENAME_LEN: usize = 200;

/// One entry of a flat playlist listing
#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistItem {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub playlist_title: Option<String>,
}

impl PlaylistItem {
    /// Watch URL for this entry
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.id)
    }
}

/// Metadata for a single track, as reported by the tool
#[derive(Debug, Clone)]
pub struct TrackMetadata {
    pub title: String,
    pub sanitized_title: String,
    pub uploader: String,
    pub year: String,
    pub video_id: String,
    pub thumbnail_url: String,
}

#[derive(Debug, Deserialize)]
struct RawTrackMetadata {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    uploader: Option<String>,
    #[serde(default)]
    upload_date: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    thumbnail: Option<String>,
}

/// Audio bitrate setting passed to the tool for a quality label
pub fn quality_setting(quality: &str) -> &'static str {
    match quality {
        "best" => "0",
        "320" => "320K",
        "256" => "256K",
        "192" => "192K",
        "128" => "128K",
        "96" => "96K",
        "64" => "64K",
        "32" => "32K",
        _ => "0",
    }
}

/// On-disk extension the tool produces for a codec
pub fn extension_for(codec: &str) -> &'static str {
    match codec {
        "mp3" => "mp3",
        "aac" => "m4a",
        "flac" => "flac",
        "opus" => "opus",
        "wav" => "wav",
        _ => "mp3",
    }
}

/// Strip a playlist title down to word characters, dashes, dots and spaces
pub fn sanitize_playlist_title(title: &str) -> String {
    title
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ' '))
        .collect()
}

/// Sanitize a filename stem, preserving non-English characters
///
/// Removes unsafe and control characters, trims leading/trailing spaces and
/// dots, collapses whitespace runs, and replaces spaces with underscores.
pub fn sanitize_filename(name: &str) -> String {
    let filtered: String = name
        .chars()
        .filter(|c| {
            !c.is_control()
                && (c.is_alphanumeric() || c.is_whitespace() || SAFE_FILENAME_CHARS.contains(*c))
        })
        .collect();

    let trimmed = filtered.trim_matches(|c| c == ' ' || c == '.');

    let mut collapsed = String::with_capacity(trimmed.len());
    let mut last_was_space = false;
    for c in trimmed.chars() {
        if c.is_whitespace() {
            if !last_was_space {
                collapsed.push('_');
            }
            last_was_space = true;
        } else {
            collapsed.push(c);
            last_was_space = false;
        }
    }

    if collapsed.is_empty() {
        return "untitled_track".to_string();
    }
    collapsed.chars().take(MAX_FILENAME_LEN).collect()
}

/// Handle on the external acquisition tool
#[derive(Debug, Clone)]
pub struct Fetcher {
    tool: String,
}

impl Fetcher {
    pub fn new(tool: impl Into<String>) -> Self {
        Self { tool: tool.into() }
    }

    /// Whether the tool resolves and runs at all
    pub async fn check_tool(&self) -> bool {
        Command::new(&self.tool)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Whether a URL refers to a playlist rather than a single item
    pub fn is_playlist_url(url: &str) -> bool {
        url.contains("list=") && url.contains("playlist")
    }

    /// List a playlist without downloading anything
    ///
    /// Returns the sanitized playlist title and its entries in order.
    pub async fn list_playlist(
        &self,
        url: &str,
        log: &JobLog,
    ) -> WorkerResult<(String, Vec<PlaylistItem>)> {
        let playlist_id = Url::parse(url)
            .ok()
            .and_then(|u| {
                u.query_pairs()
                    .find(|(k, _)| k == "list")
                    .map(|(_, v)| v.into_owned())
            })
            .ok_or_else(|| WorkerError::InvalidParams(format!("no playlist id in '{url}'")))?;

        log.put("[PLAYLIST] Retrieving playlist metadata...");
        let output = Command::new(&self.tool)
            .arg(format!(
                "https://www.youtube.com/playlist?list={playlist_id}"
            ))
            .arg("--dump-json")
            .arg("--flat-playlist")
            .output()
            .await?;
        if !output.status.success() {
            return Err(WorkerError::Tool {
                status: output.status.code().unwrap_or(-1),
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut entries = Vec::new();
        for line in stdout.lines().filter(|l| !l.trim().is_empty()) {
            entries.push(serde_json::from_str::<PlaylistItem>(line)?);
        }

        let title = entries
            .first()
            .and_then(|e| e.playlist_title.as_deref())
            .map(sanitize_playlist_title)
            .unwrap_or_else(|| "Playlist".to_string());
        if entries.is_empty() {
            log.put("[WARNING] Failed to get playlist metadata, using default");
        } else {
            log.put(format!(
                "[PLAYLIST] Found {} videos in '{}'",
                entries.len(),
                title
            ));
        }
        Ok((title, entries))
    }

    /// Fetch metadata for one track without downloading it
    pub async fn track_metadata(&self, url: &str, log: &JobLog) -> WorkerResult<TrackMetadata> {
        log.put("[METADATA] Retrieving video metadata...");
        let output = Command::new(&self.tool)
            .arg(url)
            .arg("--dump-json")
            .arg("--skip-download")
            .output()
            .await?;
        if !output.status.success() {
            return Err(WorkerError::Tool {
                status: output.status.code().unwrap_or(-1),
                message: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let raw: RawTrackMetadata = serde_json::from_slice(&output.stdout)?;
        let title = raw.title.unwrap_or_else(|| "Unknown Title".to_string());
        let uploader = raw.uploader.unwrap_or_else(|| "Unknown Artist".to_string());
        let year = raw
            .upload_date
            .as_deref()
            .filter(|d| d.len() >= 4)
            .map(|d| d[..4].to_string())
            .unwrap_or_default();

        log.put(format!("[METADATA] Title: {title}"));
        log.put(format!("[METADATA] Artist: {uploader}"));
        log.put(format!(
            "[METADATA] Year: {}",
            if year.is_empty() { "Unknown" } else { &year }
        ));

        Ok(TrackMetadata {
            sanitized_title: sanitize_filename(&title),
            title,
            uploader,
            year,
            video_id: raw.id.unwrap_or_default(),
            thumbnail_url: raw.thumbnail.unwrap_or_default(),
        })
    }

    fn build_download_command(
        &self,
        url: &str,
        quality: &str,
        codec: &str,
        audio_dir: &Path,
        meta: &TrackMetadata,
    ) -> Command {
        let mut cmd = Command::new(&self.tool);
        cmd.arg(url)
            .arg("--extract-audio")
            .arg("--audio-format")
            .arg(codec)
            .arg("--audio-quality")
            .arg(quality_setting(quality))
            .arg("--embed-metadata")
            .arg("--add-metadata")
            .arg("--parse-metadata")
            .arg(format!("title:{}", meta.title))
            .arg("--parse-metadata")
            .arg(format!("uploader:{}", meta.uploader))
            .arg("-o")
            .arg(format!(
                "{}/{}.%(ext)s",
                audio_dir.display(),
                meta.sanitized_title
            ))
            .arg("--verbose")
            .arg("--no-simulate")
            .arg("--newline");

        if !meta.year.is_empty() {
            cmd.arg("--parse-metadata")
                .arg(format!("{}:%(meta_year)s", meta.year));
        }

        match codec {
            // Lossless; maximum compression instead of a bitrate
            "flac" => {
                cmd.arg("--audio-quality").arg("0");
                cmd.arg("--postprocessor-args")
                    .arg("-c:a flac -compression_level 12");
            }
            "wav" => {
                cmd.arg("--postprocessor-args").arg("-c:a pcm_s16le");
            }
            "opus" => {
                cmd.arg("--postprocessor-args")
                    .arg(format!("-b:a {}", quality_setting(quality)));
            }
            _ => {}
        }

        cmd
    }

    /// Download one track into `audio_dir`, streaming tool output to the log
    ///
    /// Returns the path of the produced audio file.
    pub async fn download(
        &self,
        url: &str,
        quality: &str,
        codec: &str,
        audio_dir: &Path,
        meta: &TrackMetadata,
        log: &JobLog,
    ) -> WorkerResult<PathBuf> {
        log.put(format!(
            "[QUALITY] Selected: {} ({})",
            quality,
            quality_setting(quality)
        ));
        log.put(format!("[SETTINGS] Selected codec: {}", codec.to_uppercase()));

        let mut cmd = self.build_download_command(url, quality, codec, audio_dir, meta);
        debug!(url = %url, codec = %codec, "Spawning acquisition tool");

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null());
        let mut child = cmd.spawn()?;

        // Tool diagnostics arrive on stderr; forward them like stdout.
        let stderr_task = child.stderr.take().map(|stderr| {
            let log = log.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let trimmed = line.trim();
                    if !trimmed.is_empty() {
                        log.put(simplify_tool_line(trimmed));
                    }
                }
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let trimmed = line.trim();
                if !trimmed.is_empty() {
                    log.put(simplify_tool_line(trimmed));
                }
            }
        }

        let status = child.wait().await?;
        if let Some(task) = stderr_task {
            let _ = task.await;
        }
        if !status.success() {
            let code = status.code().unwrap_or(-1);
            log.put(format!("[ERROR] Download failed with code {code}"));
            return Err(WorkerError::Tool {
                status: code,
                message: "download command failed".to_string(),
            });
        }

        let output_file = locate_output(audio_dir, &meta.sanitized_title, extension_for(codec))
            .ok_or_else(|| {
                log.put("[ERROR] Downloaded file not found");
                WorkerError::OutputMissing(meta.sanitized_title.clone())
            })?;

        let name = output_file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        log.put(format!("[SUCCESS] Audio downloaded: {name}"));
        Ok(output_file)
    }
}

/// Collapse the tool's most verbose lines into short status messages
fn simplify_tool_line(line: &str) -> String {
    if line.contains("Deleting original file") {
        "[CLEANUP] Deleting temporary files".to_string()
    } else if line.contains("Embedding metadata") {
        "[METADATA] Embedding metadata".to_string()
    } else if line.contains("Embedding thumbnail") {
        "[METADATA] Embedding thumbnail".to_string()
    } else {
        line.to_string()
    }
}

/// Find the produced file: right extension, stem containing the title
fn locate_output(audio_dir: &Path, sanitized_title: &str, extension: &str) -> Option<PathBuf> {
    let suffix = format!(".{extension}");
    std::fs::read_dir(audio_dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(&suffix) && n.contains(sanitized_title))
                .unwrap_or(false)
        })
}
