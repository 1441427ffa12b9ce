use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("corrupt store file {path}: {reason}")]
    Corruption { path: PathBuf, reason: String },
    #[error("cannot read store file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write store file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot serialize value for {path}: {reason}")]
    Serialize { path: PathBuf, reason: String },
    #[error("update function failed: {0:#}")]
    UpdateFunction(anyhow::Error),
    #[error("store {0} is already open with a different value type")]
    Conflict(PathBuf),
    #[error("no value delivered within {0:?}")]
    Timeout(Duration),
    #[error("commit task aborted: {0}")]
    Aborted(String),
    #[error("store closed")]
    Closed,
}

impl StoreError {
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. })
    }

    /// True for failures that happened while persisting a new value.
    pub fn is_write_failure(&self) -> bool {
        matches!(self, Self::Write { .. } | Self::Serialize { .. } | Self::Aborted(_))
    }
}
