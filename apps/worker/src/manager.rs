//! Facade an HTTP layer or CLI talks to
//!
//! Owns the shared state and the job registry; every operation either starts
//! a job (returning its id), drains a log stream, or answers synchronously
//! from the ledgers.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::choice::{ChoiceAction, ChoiceDecision, ChoiceError};
use crate::config::Config;
use crate::error::WorkerResult;
use crate::jobs;
use crate::jobs::download::DownloadParams;
use crate::jobs::migration::MigrationParams;
use crate::ledger::fail::{FailEntry, FailSelection};
use crate::registry::{JobRegistry, LogStream};
use crate::AppState;

pub struct Manager {
    state: Arc<AppState>,
    registry: Arc<JobRegistry>,
}

impl Manager {
    pub fn new(config: Config) -> WorkerResult<Self> {
        Ok(Self {
            state: Arc::new(AppState::new(config)?),
            registry: JobRegistry::new(),
        })
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Start a download job; returns the job id to stream logs from
    pub fn start_download(&self, params: DownloadParams) -> String {
        let job_id = Uuid::new_v4().to_string();
        let state = Arc::clone(&self.state);
        info!(job_id = %job_id, url = %params.url, "Starting download job");
        self.registry.submit(&job_id, move |log| {
            jobs::download::run(state, params, log)
        });
        job_id
    }

    /// Start a retry job for one fail-ledger entry
    pub fn retry_failed(&self, entry: FailEntry) -> String {
        let job_id = format!("retry-{}", chrono::Utc::now().timestamp_millis());
        let state = Arc::clone(&self.state);
        info!(job_id = %job_id, url = %entry.url, "Starting retry job");
        self.registry
            .submit(&job_id, move |log| jobs::retry::run(state, entry, log));
        job_id
    }

    /// Start a playlist-fix job
    pub fn start_playlist_fix(&self, params: DownloadParams) -> String {
        let job_id = Uuid::new_v4().to_string();
        let state = Arc::clone(&self.state);
        info!(job_id = %job_id, url = %params.url, "Starting playlist fix job");
        self.registry.submit(&job_id, move |log| {
            jobs::playlist_fix::run(state, params, log)
        });
        job_id
    }

    /// Start a migration job over the audio library
    ///
    /// Threshold and fallback default from the configuration when not given.
    pub fn start_migration(&self, params: Option<MigrationParams>) -> String {
        let params = params.unwrap_or(MigrationParams {
            threshold: self.state.config.match_threshold,
            fallback: self.state.config.fallback,
        });
        let job_id = Uuid::new_v4().to_string();
        let state = Arc::clone(&self.state);
        info!(job_id = %job_id, fallback = ?params.fallback, "Starting migration job");
        self.registry.submit(&job_id, move |log| {
            jobs::migration::run(state, params, log)
        });
        job_id
    }

    /// Consume a job's log stream; `None` for unknown or already-consumed ids
    pub fn stream_logs(&self, job_id: &str) -> Option<LogStream> {
        self.registry.consume(job_id)
    }

    /// Whether a job id is still active
    pub fn is_active(&self, job_id: &str) -> bool {
        self.registry.is_active(job_id)
    }

    /// Resolve a pending migration choice
    pub fn submit_choice(
        &self,
        job_id: &str,
        action: &str,
        external_id: Option<String>,
    ) -> Result<(), ChoiceError> {
        self.state.choices.submit(
            job_id,
            ChoiceDecision {
                action: ChoiceAction::parse(action),
                external_id,
            },
        )
    }

    /// Select fail-ledger entries for display or retry
    pub fn select_failed(&self, selection: &FailSelection) -> Vec<FailEntry> {
        self.state.fail_ledger.select_entries(selection)
    }
}
