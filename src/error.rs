use std::path::PathBuf;

use crate::hash::ObjectId;

/// error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not a git repository (or any parent): {0}")]
    NotARepository(PathBuf),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("malformed object: {0}")]
    MalformedObject(String),

    #[error("malformed pack: {0}")]
    MalformedPack(String),

    #[error("malformed index: {0}")]
    MalformedIndex(String),

    #[error("index checksum mismatch")]
    IndexChecksumMismatch,

    #[error("malformed ref: {0}")]
    MalformedRef(String),

    #[error("short object id {0} is ambiguous")]
    AmbiguousPrefix(String),

    #[error("ref update rejected for {refname}: {reason}")]
    RefUpdateRejected { refname: String, reason: String },

    #[error("lock held: {0}")]
    LockHeld(PathBuf),

    #[error("merge conflict in {} path(s)", .0.len())]
    MergeConflict(Vec<String>),

    #[error("working tree has local changes")]
    DirtyWorkingTree,

    #[error("no commits yet on {0}")]
    NoCommitsYet(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("invalid revision: {0}")]
    InvalidRevision(String),

    #[error("invalid object id hex: {0}")]
    InvalidHex(String),

    #[error("corrupt object: hash mismatch for {0}")]
    CorruptObject(ObjectId),

    #[error("config error: {0}")]
    Config(String),

    #[error("no {0} in progress")]
    NothingInProgress(&'static str),

    #[error("{0} already in progress")]
    AlreadyInProgress(&'static str),

    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// exit code for the CLI surface; stable per error kind
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::NotARepository(_) => 2,
            Error::ObjectNotFound(_) => 3,
            Error::MalformedObject(_) | Error::CorruptObject(_) => 4,
            Error::MalformedPack(_) => 5,
            Error::MalformedIndex(_) | Error::IndexChecksumMismatch => 6,
            Error::MalformedRef(_) => 7,
            Error::AmbiguousPrefix(_) => 8,
            Error::RefUpdateRejected { .. } => 9,
            Error::LockHeld(_) => 10,
            Error::MergeConflict(_) => 11,
            Error::DirtyWorkingTree => 12,
            Error::NoCommitsYet(_) => 13,
            Error::TransportError(_) => 14,
            Error::InvalidRevision(_) | Error::InvalidHex(_) => 15,
            Error::NothingInProgress(_) | Error::AlreadyInProgress(_) => 16,
            Error::Config(_) => 17,
            Error::Io { .. } => 1,
        }
    }
}

/// helper to wrap io errors with path context
pub trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::Io {
            path: path.into(),
            source,
        })
    }
}
