//! Error taxonomy for acquisition, persistence and session control.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionStatus;

/// Classification of a failed acquisition, recorded on ERROR samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConnectionError,
    PermissionError,
    Timeout,
    QueryError,
}

impl ErrorKind {
    /// Short tag printed next to each tick.
    pub fn tag(self) -> &'static str {
        match self {
            ErrorKind::ConnectionError => "CONN",
            ErrorKind::PermissionError => "PERM",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::QueryError => "QUERY",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::ConnectionError => "connection error",
            ErrorKind::PermissionError => "permission error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::QueryError => "query error",
        };
        f.write_str(s)
    }
}

/// Failure reported by a metric source. Timeouts are not represented here:
/// the collector imposes them from outside.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("permission denied: {0}")]
    Permission(String),
    #[error("query failed: {0}")]
    Query(String),
}

impl SourceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SourceError::Connection(_) => ErrorKind::ConnectionError,
            SourceError::Permission(_) => ErrorKind::PermissionError,
            SourceError::Query(_) => ErrorKind::QueryError,
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("checkpoint i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not serialize checkpoint: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The persisted state fails structural validation. Never repaired automatically.
    #[error("corrupt checkpoint {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
    #[error("checkpoint belongs to a different session (expected {expected}, found {found})")]
    IdentityMismatch { expected: String, found: String },
    #[error("checkpoint session already {0}; discard it to start a new session")]
    AlreadyFinished(SessionStatus),
    #[error("invalid session transition {from} -> {to}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_errors_map_to_kinds() {
        assert_eq!(
            SourceError::Connection("refused".into()).kind(),
            ErrorKind::ConnectionError
        );
        assert_eq!(
            SourceError::Permission("401".into()).kind(),
            ErrorKind::PermissionError
        );
        assert_eq!(
            SourceError::Query("bad".into()).kind(),
            ErrorKind::QueryError
        );
    }

    #[test]
    fn kinds_serialize_snake_case() {
        let js = serde_json::to_string(&ErrorKind::PermissionError).unwrap();
        assert_eq!(js, "\"permission_error\"");
        assert_eq!(ErrorKind::Timeout.tag(), "TIMEOUT");
    }
}
