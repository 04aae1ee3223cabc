//! Human-in-the-loop choice rendezvous
//!
//! When a migration match is ambiguous under the `manual` fallback policy,
//! the worker parks on a single-fire channel registered here, and an external
//! actor (normally the HTTP layer) resolves it via [`ChoiceBroker::submit`].
//! One exchange may be outstanding per job id at a time; sequential per-job
//! processing upholds that invariant.
//!
//! The wait is deliberately unbounded: an unanswered request parks its worker
//! task forever and keeps the job id active. That is inherited behavior, kept
//! because adding an expiry would change the observable protocol.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;

use crate::matcher::MatchCandidate;

/// Choice protocol errors, surfaced synchronously to the submitting caller
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChoiceError {
    /// The job id has no registered (or an already-resolved) choice
    #[error("no pending choice for job '{0}'")]
    NoPendingChoice(String),
}

/// A `choice` event emitted on the job's log channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceEvent {
    /// Local file the decision is about
    pub file_path: String,
    /// Title parsed from the file
    pub title: String,
    /// Artist parsed from the file
    pub artist: String,
    /// Ranked candidates, best first, at most ten
    pub candidates: Vec<MatchCandidate>,
    /// Whether a `research_<scope>` follow-up is still allowed
    pub allow_research: bool,
    /// Whether a `manual` follow-up is allowed
    pub allow_manual: bool,
}

/// What the external actor decided
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceDecision {
    pub action: ChoiceAction,
    pub external_id: Option<String>,
}

/// Follow-up action for an ambiguous match
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoiceAction {
    /// Apply the candidate whose external id accompanies the decision
    Select,
    /// Apply a manually-entered external id
    Manual,
    /// Leave the file untouched
    Skip,
    /// Re-run the matcher against the named catalog scope
    Research(String),
}

impl ChoiceAction {
    /// Parse a wire action string; unknown actions degrade to `Skip`
    pub fn parse(action: &str) -> Self {
        match action {
            "select" => Self::Select,
            "manual" => Self::Manual,
            "skip" => Self::Skip,
            other => match other.strip_prefix("research_") {
                Some(scope) if !scope.is_empty() => Self::Research(scope.to_string()),
                _ => Self::Skip,
            },
        }
    }
}

/// Rendezvous registry keyed by job id
///
/// The pending map is shared mutable state; every read-modify-write happens
/// under the one mutex.
#[derive(Debug, Default)]
pub struct ChoiceBroker {
    pending: Mutex<HashMap<String, oneshot::Sender<ChoiceDecision>>>,
}

impl ChoiceBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pending choice for a job and get the channel the worker
    /// will park on
    ///
    /// Re-registering the same job id replaces the previous registration,
    /// which only happens if a worker abandoned one (the per-job invariant
    /// means a live worker never holds two).
    pub fn register(&self, job_id: &str) -> oneshot::Receiver<ChoiceDecision> {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.pending.lock().expect("choice map poisoned");
        if pending.insert(job_id.to_string(), tx).is_some() {
            debug!(job_id = %job_id, "Replaced an abandoned pending choice");
        }
        rx
    }

    /// Resolve a pending choice
    ///
    /// Removes the registration before firing, so a second submission for
    /// the same id fails with `NoPendingChoice`.
    pub fn submit(&self, job_id: &str, decision: ChoiceDecision) -> Result<(), ChoiceError> {
        let sender = {
            let mut pending = self.pending.lock().expect("choice map poisoned");
            pending
                .remove(job_id)
                .ok_or_else(|| ChoiceError::NoPendingChoice(job_id.to_string()))?
        };

        // The worker may have died between registering and now; a dropped
        // receiver is not the submitter's problem.
        let _ = sender.send(decision);
        Ok(())
    }

    /// Whether a choice is currently outstanding for this job id
    pub fn has_pending(&self, job_id: &str) -> bool {
        self.pending
            .lock()
            .expect("choice map poisoned")
            .contains_key(job_id)
    }

    /// Drop a registration without resolving it (worker-side cleanup)
    pub fn discard(&self, job_id: &str) {
        self.pending
            .lock()
            .expect("choice map poisoned")
            .remove(job_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_parsing() {
        assert_eq!(ChoiceAction::parse("select"), ChoiceAction::Select);
        assert_eq!(ChoiceAction::parse("manual"), ChoiceAction::Manual);
        assert_eq!(ChoiceAction::parse("skip"), ChoiceAction::Skip);
        assert_eq!(
            ChoiceAction::parse("research_videos"),
            ChoiceAction::Research("videos".to_string())
        );
        assert_eq!(ChoiceAction::parse("research_"), ChoiceAction::Skip);
        assert_eq!(ChoiceAction::parse("bogus"), ChoiceAction::Skip);
    }

    #[tokio::test]
    async fn test_submit_resolves_registered_choice() {
        let broker = ChoiceBroker::new();
        let rx = broker.register("job-1");

        broker
            .submit(
                "job-1",
                ChoiceDecision {
                    action: ChoiceAction::Select,
                    external_id: Some("abc123".to_string()),
                },
            )
            .unwrap();

        let decision = rx.await.unwrap();
        assert_eq!(decision.action, ChoiceAction::Select);
        assert_eq!(decision.external_id.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_submit_unknown_job_fails() {
        let broker = ChoiceBroker::new();
        let err = broker
            .submit(
                "nope",
                ChoiceDecision {
                    action: ChoiceAction::Skip,
                    external_id: None,
                },
            )
            .unwrap_err();
        assert_eq!(err, ChoiceError::NoPendingChoice("nope".to_string()));
    }

    #[tokio::test]
    async fn test_second_submission_fails() {
        let broker = ChoiceBroker::new();
        let _rx = broker.register("job-1");

        let decision = ChoiceDecision {
            action: ChoiceAction::Skip,
            external_id: None,
        };
        broker.submit("job-1", decision.clone()).unwrap();
        assert!(broker.submit("job-1", decision).is_err());
        assert!(!broker.has_pending("job-1"));
    }
}
