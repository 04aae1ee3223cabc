//! Worker configuration loaded from environment variables
//!
//! Every setting has a development-friendly default; only the directories
//! the worker writes into are created eagerly.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::matcher::{FallbackPolicy, DEFAULT_MATCH_THRESHOLD};
use crate::playlist::PlaylistOptions;

/// Worker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Where downloaded audio lands
    pub audio_dir: PathBuf,

    /// Where `.lrc` lyrics files land
    pub lyrics_dir: PathBuf,

    /// Where `.m3u` playlists land
    pub playlist_dir: PathBuf,

    /// Root for the ledgers (fail/, history/, migration/) and progress file
    pub data_dir: PathBuf,

    /// Base URL of the catalog service
    pub catalog_url: String,

    /// Acquisition tool binary
    pub tool: String,

    /// Default audio quality label
    pub quality: String,

    /// Default audio codec
    pub codec: String,

    /// Minimum score for a migration candidate
    pub match_threshold: f64,

    /// What to do with ambiguous migration matches
    pub fallback: FallbackPolicy,

    /// How playlist entries are written
    pub playlist_options: PlaylistOptions,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let data_dir = PathBuf::from(
            env::var("TUNEDOCK_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
        );

        Ok(Self {
            audio_dir: PathBuf::from(
                env::var("TUNEDOCK_AUDIO_DIR").unwrap_or_else(|_| "./music".to_string()),
            ),
            lyrics_dir: PathBuf::from(
                env::var("TUNEDOCK_LYRICS_DIR").unwrap_or_else(|_| "./music/lyrics".to_string()),
            ),
            playlist_dir: PathBuf::from(
                env::var("TUNEDOCK_PLAYLIST_DIR")
                    .unwrap_or_else(|_| "./music/playlists".to_string()),
            ),
            data_dir,
            catalog_url: env::var("CATALOG_API_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            tool: env::var("TUNEDOCK_TOOL").unwrap_or_else(|_| "yt-dlp".to_string()),
            quality: env::var("TUNEDOCK_QUALITY").unwrap_or_else(|_| "best".to_string()),
            codec: env::var("TUNEDOCK_CODEC").unwrap_or_else(|_| "mp3".to_string()),
            match_threshold: env::var("TUNEDOCK_MATCH_THRESHOLD")
                .unwrap_or_else(|_| DEFAULT_MATCH_THRESHOLD.to_string())
                .parse()
                .context("Invalid TUNEDOCK_MATCH_THRESHOLD value")?,
            fallback: env::var("TUNEDOCK_FALLBACK")
                .unwrap_or_else(|_| "manual".to_string())
                .parse()
                .unwrap_or_default(),
            playlist_options: PlaylistOptions {
                relative_paths: env_flag("TUNEDOCK_PLAYLIST_RELATIVE", true)?,
                filenames_only: env_flag("TUNEDOCK_PLAYLIST_FILENAMES_ONLY", false)?,
            },
        })
    }

    /// Fail ledger directory
    pub fn fail_dir(&self) -> PathBuf {
        self.data_dir.join("fail")
    }

    /// History log directory
    pub fn history_dir(&self) -> PathBuf {
        self.data_dir.join("history")
    }

    /// Migration log directory
    pub fn migration_dir(&self) -> PathBuf {
        self.data_dir.join("migration")
    }

    /// Playlist-fix log directory
    pub fn fix_log_dir(&self) -> PathBuf {
        self.data_dir.join("logs")
    }
}

fn env_flag(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("Invalid {name} value")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to ensure tests that modify environment variables don't run in parallel
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to temporarily set environment variables for a test
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(vars: &[(&str, &str)]) -> Self {
            let saved: Vec<_> = vars
                .iter()
                .map(|(k, v)| {
                    let old = env::var(*k).ok();
                    env::set_var(*k, *v);
                    (k.to_string(), old)
                })
                .collect();
            Self { vars: saved }
        }

        fn remove_vars(vars: &[&str]) -> Self {
            let saved: Vec<_> = vars
                .iter()
                .map(|k| {
                    let old = env::var(*k).ok();
                    env::remove_var(*k);
                    (k.to_string(), old)
                })
                .collect();
            Self { vars: saved }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (k, v) in &self.vars {
                match v {
                    Some(val) => env::set_var(k, val),
                    None => env::remove_var(k),
                }
            }
        }
    }

    #[test]
    fn test_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::remove_vars(&[
            "TUNEDOCK_AUDIO_DIR",
            "TUNEDOCK_TOOL",
            "TUNEDOCK_MATCH_THRESHOLD",
            "TUNEDOCK_FALLBACK",
            "TUNEDOCK_PLAYLIST_RELATIVE",
            "TUNEDOCK_PLAYLIST_FILENAMES_ONLY",
        ]);

        let config = Config::from_env().unwrap();
        assert_eq!(config.tool, "yt-dlp");
        assert_eq!(config.match_threshold, DEFAULT_MATCH_THRESHOLD);
        assert_eq!(config.fallback, FallbackPolicy::Manual);
        assert!(config.playlist_options.relative_paths);
        assert!(!config.playlist_options.filenames_only);
    }

    #[test]
    fn test_custom_threshold_and_fallback() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::new(&[
            ("TUNEDOCK_MATCH_THRESHOLD", "0.9"),
            ("TUNEDOCK_FALLBACK", "best"),
        ]);

        let config = Config::from_env().unwrap();
        assert_eq!(config.match_threshold, 0.9);
        assert_eq!(config.fallback, FallbackPolicy::Best);
    }

    #[test]
    fn test_invalid_threshold_fails() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::new(&[("TUNEDOCK_MATCH_THRESHOLD", "not_a_number")]);

        assert!(Config::from_env().is_err());
    }

    #[test]
    fn test_ledger_dirs_hang_off_data_dir() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let _guard = EnvGuard::new(&[("TUNEDOCK_DATA_DIR", "/var/lib/tunedock")]);

        let config = Config::from_env().unwrap();
        assert_eq!(config.fail_dir(), PathBuf::from("/var/lib/tunedock/fail"));
        assert_eq!(
            config.history_dir(),
            PathBuf::from("/var/lib/tunedock/history")
        );
        assert_eq!(
            config.migration_dir(),
            PathBuf::from("/var/lib/tunedock/migration")
        );
    }
}
