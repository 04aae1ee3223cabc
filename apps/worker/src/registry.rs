//! Job registry, per-job log channels, and log fan-out
//!
//! One tokio task runs per submitted job. Each job owns a single
//! order-preserving log channel; everything a job has to say to the outside
//! world travels as [`LogMessage`]s on that channel, ending with the `[END]`
//! sentinel. The registry is an explicit object owning its maps behind one
//! mutex, injected wherever it is needed.
//!
//! There is no cancellation primitive. Removing an id from the active set
//! does not stop its task; it only changes consumer-side termination.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::choice::ChoiceEvent;
use crate::error::WorkerResult;

/// The terminal sentinel rendered on the wire
pub const END_SENTINEL: &str = "[END]";

/// End marker substituted on the persistence sink so a file writer can close
pub const PERSIST_END_MARKER: &str = "__LOG_EOF__";

/// How long a consumer blocks on the channel before re-checking liveness
const CONSUME_POLL_TIMEOUT: Duration = Duration::from_millis(500);

/// One message on a job's log channel
#[derive(Debug, Clone, PartialEq)]
pub enum LogMessage {
    /// Plain progress text, e.g. `[PLAYLIST] Downloading video 3/12`
    Line(String),
    /// Structured request for a human decision on an ambiguous match
    Choice(ChoiceEvent),
    /// Terminal sentinel; nothing follows on this channel
    End,
}

impl LogMessage {
    /// Render the message as a single log line
    ///
    /// Choice events serialize as a JSON object tagged `choice` so stream
    /// consumers can distinguish them from plain text.
    pub fn render(&self) -> String {
        match self {
            Self::Line(text) => text.clone(),
            Self::Choice(event) => serde_json::json!({ "choice": event }).to_string(),
            Self::End => END_SENTINEL.to_string(),
        }
    }
}

/// Sending half of a job's log channel, handed to the job body
///
/// Sends never fail from the job's perspective; a consumer that went away
/// just means nobody is listening.
#[derive(Debug, Clone)]
pub struct JobLog {
    job_id: String,
    tx: mpsc::UnboundedSender<LogMessage>,
}

impl JobLog {
    /// The id of the job this channel belongs to
    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Emit a plain text line
    pub fn put(&self, line: impl Into<String>) {
        let _ = self.tx.send(LogMessage::Line(line.into()));
    }

    /// Emit a structured choice event
    pub fn choice(&self, event: ChoiceEvent) {
        let _ = self.tx.send(LogMessage::Choice(event));
    }

    fn end(&self) {
        let _ = self.tx.send(LogMessage::End);
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    active: HashSet<String>,
    receivers: HashMap<String, mpsc::UnboundedReceiver<LogMessage>>,
}

/// Registry of active jobs and their log channels
#[derive(Debug, Default)]
pub struct JobRegistry {
    inner: Mutex<RegistryInner>,
}

impl JobRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start one worker task for `job_id`
    ///
    /// If the id is already active the call is a silent no-op. Any error or
    /// panic inside the job body is converted to an `[ERROR]` line; the
    /// cleanup path always runs, so `[END]` is eventually emitted and the id
    /// removed from the active set. The submitter never blocks on completion.
    pub fn submit<F, Fut>(self: &Arc<Self>, job_id: &str, work: F)
    where
        F: FnOnce(JobLog) -> Fut + Send + 'static,
        Fut: Future<Output = WorkerResult<()>> + Send + 'static,
    {
        let log = {
            let mut inner = self.inner.lock().expect("registry poisoned");
            if inner.active.contains(job_id) {
                debug!(job_id = %job_id, "Job already active, ignoring submit");
                return;
            }
            let (tx, rx) = mpsc::unbounded_channel();
            inner.active.insert(job_id.to_string());
            inner.receivers.insert(job_id.to_string(), rx);
            JobLog {
                job_id: job_id.to_string(),
                tx,
            }
        };

        let registry = Arc::clone(self);
        let job_id = job_id.to_string();
        tokio::spawn(async move {
            match AssertUnwindSafe(work(log.clone())).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(job_id = %job_id, error = %e, "Job failed");
                    log.put(format!("[ERROR] {}", e));
                }
                Err(_) => {
                    warn!(job_id = %job_id, "Job panicked");
                    log.put("[ERROR] Job panicked".to_string());
                }
            }

            registry
                .inner
                .lock()
                .expect("registry poisoned")
                .active
                .remove(&job_id);
            log.end();
        });
    }

    /// Whether the job id is in the active set
    pub fn is_active(&self, job_id: &str) -> bool {
        self.inner
            .lock()
            .expect("registry poisoned")
            .active
            .contains(job_id)
    }

    /// Take the raw receiving half of a job's log channel
    ///
    /// Each job's channel can be taken exactly once; used by [`fan_out`]
    /// wiring when a caller wants to tee the stream itself.
    pub fn detach(&self, job_id: &str) -> Option<mpsc::UnboundedReceiver<LogMessage>> {
        self.inner
            .lock()
            .expect("registry poisoned")
            .receivers
            .remove(job_id)
    }

    /// Consume a job's log stream
    ///
    /// Returns a lazy, non-restartable sequence of messages; a second call
    /// for the same id returns `None`.
    pub fn consume(self: &Arc<Self>, job_id: &str) -> Option<LogStream> {
        let rx = self.detach(job_id)?;
        Some(LogStream {
            job_id: job_id.to_string(),
            rx,
            registry: Arc::clone(self),
            finished: false,
        })
    }
}

/// Lazy consumer over one job's log channel
///
/// Terminates after yielding the `End` sentinel, or as a liveness fallback
/// when the job id is no longer active and the channel is empty.
pub struct LogStream {
    job_id: String,
    rx: mpsc::UnboundedReceiver<LogMessage>,
    registry: Arc<JobRegistry>,
    finished: bool,
}

impl LogStream {
    /// Pop the next message, in emission order
    pub async fn next(&mut self) -> Option<LogMessage> {
        if self.finished {
            return None;
        }
        loop {
            match timeout(CONSUME_POLL_TIMEOUT, self.rx.recv()).await {
                Ok(Some(msg)) => {
                    if matches!(msg, LogMessage::End) {
                        self.finished = true;
                    }
                    return Some(msg);
                }
                // All senders dropped; the sentinel is not coming.
                Ok(None) => {
                    self.finished = true;
                    return None;
                }
                Err(_) => {
                    if !self.registry.is_active(&self.job_id) {
                        // The job may have raced its final messages in
                        // between the timeout and the liveness check.
                        match self.rx.try_recv() {
                            Ok(msg) => {
                                if matches!(msg, LogMessage::End) {
                                    self.finished = true;
                                }
                                return Some(msg);
                            }
                            Err(_) => {
                                self.finished = true;
                                return None;
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Forward one source channel into up to two sinks
///
/// Every message is copied to the live sink (if present) as-is, and to the
/// persistence sink (if present) as a rendered line, with the `End` sentinel
/// translated into [`PERSIST_END_MARKER`]. This decouples "stream to caller"
/// from "persist to disk"; either sink may be absent.
pub fn fan_out(
    mut source: mpsc::UnboundedReceiver<LogMessage>,
    live: Option<mpsc::UnboundedSender<LogMessage>>,
    persist: Option<mpsc::UnboundedSender<String>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = source.recv().await {
            let is_end = matches!(msg, LogMessage::End);
            if let Some(persist) = &persist {
                let line = if is_end {
                    PERSIST_END_MARKER.to_string()
                } else {
                    msg.render()
                };
                let _ = persist.send(line);
            }
            if let Some(live) = &live {
                let _ = live.send(msg);
            }
            if is_end {
                break;
            }
        }
    })
}
