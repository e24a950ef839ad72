use std::path::PathBuf;

use thiserror::Error;

/// Failures that abort a processing run.
///
/// Missing faces, tracks without votes and duplicate records are not errors:
/// they degrade to empty votes, neutral emotions and skipped writes.
#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("video source unavailable: {}: {reason}", path.display())]
    SourceUnavailable { path: PathBuf, reason: String },

    #[error("frame interval must be a positive integer, got {0}")]
    InvalidInterval(usize),

    #[error("{stage} failed: {message}")]
    Collaborator {
        stage: &'static str,
        message: String,
    },

    #[error("record store error: {0}")]
    Store(String),

    #[error("run cancelled before resolution; nothing was persisted")]
    Cancelled,
}

impl AttendanceError {
    pub fn collaborator(stage: &'static str, err: impl std::fmt::Display) -> Self {
        AttendanceError::Collaborator {
            stage,
            message: err.to_string(),
        }
    }
}
