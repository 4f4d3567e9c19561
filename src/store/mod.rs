//! Persistence of finalized sessions.

pub mod sqlite;

pub use sqlite::{SqliteStore, StoredSessionInfo};

use crate::core::session::Session;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("session {0} already stored")]
    Duplicate(i64),
    #[error("cannot serialize key summary: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("invalid database value: {0}")]
    InvalidDbValue(String),
    #[error("database schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: i32, supported: i32 },
}

/// What to do when a session's start timestamp is already stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the existing row and report [`InsertOutcome::Ignored`]
    #[default]
    Ignore,
    /// Fail with [`StoreError::Duplicate`]
    Reject,
}

/// Result of a successful insert call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written
    Inserted,
    /// A row with the same start timestamp already existed
    Ignored,
}

/// Owner of finalized sessions. One atomic write per session.
pub trait SessionStore: Send {
    /// Write `session`, keyed by its start timestamp.
    fn insert_session(&mut self, session: &Session) -> Result<InsertOutcome, StoreError>;
}
