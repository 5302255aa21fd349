//! Error types for workq.

use thiserror::Error;

use crate::model::{WorkId, WorkStatus};

#[derive(Debug, Error)]
pub enum Error {
    #[error("work item not found: {0}")]
    NotFound(WorkId),

    #[error("no new work items available")]
    NoItemAvailable,

    /// Contention on the store outlasted the retry budget. Safe to retry.
    #[error("{operation}: store contention persisted after {attempts} attempts")]
    TransientConflict {
        operation: &'static str,
        attempts: u32,
    },

    #[error("invalid state transition for work item {id}: {from} -> {to}")]
    InvalidTransition {
        id: WorkId,
        from: WorkStatus,
        to: WorkStatus,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

// SQLite primary result codes.
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

impl Error {
    /// Is this failure caused by momentary contention rather than by the request?
    ///
    /// Busy/locked database errors and pool acquire timeouts are transient;
    /// the queue retries them internally before surfacing `TransientConflict`.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Storage(sqlx::Error::PoolTimedOut) => true,
            Error::Storage(sqlx::Error::Database(db)) => db
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                // extended codes carry the primary code in the low byte
                .is_some_and(|code| matches!(code & 0xff, SQLITE_BUSY | SQLITE_LOCKED)),
            _ => false,
        }
    }

    /// Can the caller reasonably retry the same request later?
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::TransientConflict { .. }) || self.is_transient()
    }
}
