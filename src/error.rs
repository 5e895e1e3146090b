//! Error kinds raised by the filesystem backends and the resolver.

use std::io;
use thiserror::Error;

use crate::types::EntryKind;

/// Backend and resolution errors.
///
/// `Config` and `Connection` are fatal for the run. `Access` and `Resolve` are local to
/// one document or subtree: the engine logs them and marks the node KO.
#[derive(Error, Debug)]
pub enum FsError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("access error on {path}: {detail}")]
    Access { path: String, detail: String },

    #[error("path resolution error: {0}")]
    Resolve(String),
}

impl FsError {
    pub fn access(path: impl Into<String>, detail: impl ToString) -> Self {
        FsError::Access {
            path: path.into(),
            detail: detail.to_string(),
        }
    }

    /// Wrap an I/O error on `path` as an access error.
    pub fn from_io(path: &str, err: io::Error) -> Self {
        FsError::access(path, err)
    }

    /// True for errors that must abort the run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FsError::Config(_) | FsError::Connection(_))
    }
}

pub type FsResult<T> = std::result::Result<T, FsError>;

/// Existence probe result: keeps "not there" apart from "cannot tell".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Found(EntryKind),
    NotFound,
    AccessDenied(String),
}

impl Probe {
    /// Classify an I/O error from a stat-like call.
    pub fn from_io_error(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::NotADirectory => Probe::NotFound,
            _ => Probe::AccessDenied(err.to_string()),
        }
    }

    /// `Ok(true)` if found with `kind`, `Ok(false)` if absent or of another kind.
    pub fn is_kind(&self, path: &str, kind: EntryKind) -> FsResult<bool> {
        match self {
            Probe::Found(k) => Ok(*k == kind),
            Probe::NotFound => Ok(false),
            Probe::AccessDenied(detail) => Err(FsError::access(path, detail)),
        }
    }

    pub fn exists(&self) -> Option<bool> {
        match self {
            Probe::Found(_) => Some(true),
            Probe::NotFound => Some(false),
            Probe::AccessDenied(_) => None,
        }
    }
}
