//! Background job bodies
//!
//! Each submodule is the body of one job kind. Jobs never return errors to
//! the submitter; failures become `[ERROR]`/`[WARNING]` log lines and ledger
//! entries, and the registry guarantees `[END]` either way.

pub mod download;
pub mod migration;
pub mod playlist_fix;
pub mod retry;
