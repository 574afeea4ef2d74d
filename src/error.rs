//! Failure taxonomy shared by every stage of loading and extraction.
//!
//! Load-time variants (`TruncatedIndex`, `MalformedIndex`,
//! `MalformedMetadata`) abort the whole open.  Everything else is scoped to
//! a single entry and is caught by the batch orchestrator.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GrafError {
    /// The index ended before its declared counts were satisfied.
    #[error("Index truncated while reading {0}")]
    TruncatedIndex(String),
    #[error("Malformed index: {0}")]
    MalformedIndex(String),
    /// The sidecar was recognised but its content is unusable.
    #[error("Malformed packager index: {0}")]
    MalformedMetadata(String),
    #[error("Entry references unknown data archive {0}")]
    UnknownArchive(u8),
    #[error("File does not have an associated data archive")]
    NoPayload,
    #[error("File entry is not in this archive")]
    ForeignEntry,
    #[error("Unexpected end of data: needed {expected} bytes, only {available} available")]
    UnexpectedEndOfData { expected: u64, available: u64 },
    #[error("Cannot create {}: {source}", path.display())]
    PathError {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl GrafError {
    /// True for failures that invalidate the whole archive load.
    pub fn is_load_fatal(&self) -> bool {
        matches!(
            self,
            GrafError::TruncatedIndex(_)
                | GrafError::MalformedIndex(_)
                | GrafError::MalformedMetadata(_)
        )
    }

    pub(crate) fn path(path: impl Into<PathBuf>, source: io::Error) -> Self {
        GrafError::PathError { path: path.into(), source }
    }
}

pub type Result<T, E = GrafError> = std::result::Result<T, E>;
