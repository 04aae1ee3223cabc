//! Error handling for the Tunedock worker
//!
//! This module provides a unified error type using thiserror for background
//! job processing. Most job-internal failures are swallowed into log lines
//! and ledger entries rather than propagated; the variants here cover the
//! points where an operation genuinely cannot continue.

use thiserror::Error;
use tunedock_catalog_client::CatalogError;

/// Main worker error type
#[derive(Error, Debug)]
pub enum WorkerError {
    /// Invalid job parameters (missing or malformed fields)
    #[error("invalid job parameters: {0}")]
    InvalidParams(String),

    /// Bad configuration value or missing directory
    #[error("configuration error: {0}")]
    Configuration(String),

    // ========== External Tool Errors ==========
    /// The acquisition tool exited non-zero
    #[error("external tool exited with code {status}: {message}")]
    Tool { status: i32, message: String },

    /// The tool reported success but the expected output file is missing
    #[error("downloaded file not found for '{0}'")]
    OutputMissing(String),

    /// Tool output could not be parsed as JSON
    #[error("tool output parse failed: {0}")]
    ToolOutput(#[from] serde_json::Error),

    // ========== Catalog Errors ==========
    /// Remote catalog search failed
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    // ========== Local Library Errors ==========
    /// File system access error
    #[error("filesystem error: {0}")]
    Filesystem(#[from] std::io::Error),
}

/// Result type alias for worker operations
pub type WorkerResult<T> = Result<T, WorkerError>;
