//! Tunedock worker: background jobs for a personal media library
//!
//! Long-running operations (downloads, retries, playlist repair, catalog
//! migration) run as jobs in the [`registry::JobRegistry`]; everything a job
//! has to say streams over its log channel, ending with the `[END]`
//! sentinel. The [`Manager`] is the facade an HTTP layer or CLI talks to.

pub mod choice;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod jobs;
pub mod ledger;
pub mod manager;
pub mod matcher;
pub mod playlist;
pub mod progress;
pub mod registry;

pub use config::Config;
pub use manager::Manager;

use std::fs;

use tunedock_catalog_client::CatalogClient;

use crate::choice::ChoiceBroker;
use crate::error::{WorkerError, WorkerResult};
use crate::fetcher::Fetcher;
use crate::ledger::fail::FailLedger;
use crate::ledger::history::HistoryLog;
use crate::ledger::migration::MigrationLog;
use crate::progress::ProgressTracker;

/// Shared state injected into every job
pub struct AppState {
    pub config: Config,
    pub fetcher: Fetcher,
    pub catalog: CatalogClient,
    pub fail_ledger: FailLedger,
    pub history: HistoryLog,
    pub migration_log: MigrationLog,
    pub progress: ProgressTracker,
    pub choices: ChoiceBroker,
}

impl AppState {
    /// Build the shared state, creating the directories the worker owns
    pub fn new(config: Config) -> WorkerResult<Self> {
        for dir in [
            &config.audio_dir,
            &config.lyrics_dir,
            &config.playlist_dir,
            &config.data_dir,
        ] {
            fs::create_dir_all(dir)?;
        }

        let catalog = CatalogClient::new(&config.catalog_url)
            .map_err(|e| WorkerError::Configuration(e.to_string()))?;

        Ok(Self {
            fetcher: Fetcher::new(&config.tool),
            catalog,
            fail_ledger: FailLedger::new(config.fail_dir())?,
            history: HistoryLog::new(config.history_dir())?,
            migration_log: MigrationLog::new(config.migration_dir())?,
            progress: ProgressTracker::new(&config.data_dir),
            choices: ChoiceBroker::new(),
            config,
        })
    }
}
