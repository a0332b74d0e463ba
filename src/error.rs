//! Error types for dialog-sync
//!
//! Domain-specific error enums using thiserror. Protocol violations are
//! separate from fetch failures: the former stop the engine, the latter
//! surface as notifications.

use crate::model::{DialogId, DialogRef, QuestionId};

/// Local state and backend have diverged. Never patched over.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("question {id} asked twice")]
    DuplicateQuestion { id: QuestionId },
    #[error("q4h snapshot lists question {id} more than once")]
    DuplicateInSnapshot { id: QuestionId },
    #[error("question {id} survived q4h merge twice")]
    DuplicateAfterMerge { id: QuestionId },
    #[error("subdialog_created addressed {expected} but carries node {actual}")]
    SubdialogAddressMismatch { expected: DialogRef, actual: DialogRef },
    #[error("dialog {dialog} has no task doc path")]
    MissingTaskDoc { dialog: DialogRef },
    #[error("node {dialog} does not belong under root {root_id}")]
    ForeignSubdialog { root_id: DialogId, dialog: DialogRef },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("JSON parse: {0}")]
    Json(String),
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

/// Data-fetch failure. `Unauthorized` is escalated, never shown as a plain error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("transport: {0}")]
    Transport(String),
    #[error("decode: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            FetchError::Decode(e.to_string())
        } else {
            FetchError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("notify: {0}")]
    Notify(String),
    #[error("I/O {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl From<notify::Error> for SourceError {
    fn from(e: notify::Error) -> Self {
        SourceError::Notify(e.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_question_display() {
        let error = SyncError::DuplicateQuestion {
            id: QuestionId::new("q-1"),
        };
        assert_eq!(error.to_string(), "question q-1 asked twice");
    }

    #[test]
    fn address_mismatch_display_names_both_dialogs() {
        let error = SyncError::SubdialogAddressMismatch {
            expected: DialogRef::new("r1", "s1"),
            actual: DialogRef::new("r1", "s2"),
        };
        let display = error.to_string();
        assert!(display.contains("r1/s1"));
        assert!(display.contains("r1/s2"));
    }

    #[test]
    fn source_io_error_preserves_kind() {
        let error = SourceError::Io {
            path: "/tmp/stream.jsonl".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
        };
        assert!(error.to_string().contains("/tmp/stream.jsonl"));

        let source_err = std::error::Error::source(&error).unwrap();
        let io_err = source_err.downcast_ref::<std::io::Error>().unwrap();
        assert_eq!(io_err.kind(), std::io::ErrorKind::NotFound);
    }
}
