//! Error types
//!
//! Startup and shutdown errors are fatal to the process, check errors are
//! recorded against the check that produced them and the loop carries on.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The three resources released when the monitor shuts down, in close order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CloseStage {
    Bucket,
    Project,
    Session,
}

impl CloseStage {
    pub const ALL: [CloseStage; 3] = [CloseStage::Bucket, CloseStage::Project, CloseStage::Session];
}

impl fmt::Display for CloseStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseStage::Bucket => write!(f, "bucket"),
            CloseStage::Project => write!(f, "project"),
            CloseStage::Session => write!(f, "session"),
        }
    }
}

/// Errors raised by an object backend
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("could not open session to {addr}: {reason}")]
    Session { addr: String, reason: String },

    #[error("could not open project: {0}")]
    Project(String),

    #[error("could not open bucket {bucket:?}: {reason}")]
    Bucket { bucket: String, reason: String },

    #[error("could not upload {path:?}: {reason}")]
    Upload { path: String, reason: String },

    #[error("object {path:?} not found")]
    NotFound { path: String },

    #[error("{operation} on {path:?} failed: {reason}")]
    Object { operation: &'static str, path: String, reason: String },

    #[error("{0} is closed")]
    Closed(CloseStage),

    #[error("could not close {stage}: {reason}")]
    Close { stage: CloseStage, reason: String },
}

/// Why a single durability check failed
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("could not open object at {path:?}: {source}")]
    OpenObject { path: String, source: BackendError },

    #[error("could not initiate download of {path:?}: {source}")]
    StartDownload { path: String, source: BackendError },

    #[error("could not read object {path:?}: {source}")]
    ReadStream { path: String, source: BackendError },

    #[error("could not read reference {origin}: {source}")]
    ReadReference { origin: String, source: std::io::Error },

    #[error(
        "got different object back: expected {expected_len} bytes (md5 {expected_md5}), \
         received {actual_len} bytes (md5 {actual_md5})"
    )]
    Mismatch {
        expected_len: usize,
        expected_md5: String,
        actual_len: usize,
        actual_md5: String,
    },
}

/// Invalid or missing runtime configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required flag missing: --{0}")]
    MissingFlag(&'static str),

    #[error("check interval must be at least one second")]
    ZeroInterval,

    #[error("check interval of {secs}s exceeds the maximum of {max}s")]
    IntervalTooLong { secs: u64, max: u64 },

    #[error("could not read config file {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },

    #[error("could not parse config file {path}: {source}")]
    Parse { path: PathBuf, source: serde_yaml::Error },

    #[error("{0}")]
    Invalid(String),
}

/// Failures before the status server starts
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to connect backend: {0}")]
    Connect(#[source] BackendError),

    #[error("could not locate file {path}: {source}")]
    Reference { path: PathBuf, source: std::io::Error },

    #[error("failed to upload data: {0}")]
    Upload(#[source] BackendError),
}

/// Close steps that failed during shutdown
#[derive(Debug)]
pub struct ShutdownError {
    pub failures: Vec<BackendError>,
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} close step(s) failed", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}", failure)?;
        }
        Ok(())
    }
}

impl std::error::Error for ShutdownError {}

/// Abnormal end of the check engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),

    #[error("check engine task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_error_messages_are_distinct() {
        let open = CheckError::OpenObject {
            path: "a".into(),
            source: BackendError::NotFound { path: "a".into() },
        };
        let start = CheckError::StartDownload {
            path: "a".into(),
            source: BackendError::Closed(CloseStage::Bucket),
        };
        let mismatch = CheckError::Mismatch {
            expected_len: 3,
            expected_md5: "x".into(),
            actual_len: 3,
            actual_md5: "y".into(),
        };

        assert!(open.to_string().starts_with("could not open object"));
        assert!(start.to_string().starts_with("could not initiate download"));
        assert!(mismatch.to_string().starts_with("got different object back"));
    }

    #[test]
    fn test_close_stages_are_distinct_keys() {
        let stages: std::collections::HashSet<CloseStage> = CloseStage::ALL.into_iter().collect();
        assert_eq!(stages.len(), 3);
        assert_eq!(CloseStage::ALL.map(|stage| stage.to_string()), ["bucket", "project", "session"]);
    }

    #[test]
    fn test_shutdown_error_lists_every_failure() {
        let err = ShutdownError {
            failures: vec![
                BackendError::Close { stage: CloseStage::Bucket, reason: "busy".into() },
                BackendError::Close { stage: CloseStage::Session, reason: "gone".into() },
            ],
        };
        let text = err.to_string();
        assert!(text.starts_with("2 close step(s) failed"));
        assert!(text.contains("could not close bucket: busy"));
        assert!(text.contains("could not close session: gone"));
    }
}
