use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("unknown strategy `{0}`")]
    UnknownStrategy(String),

    #[error("catalog not loaded: {0}")]
    CatalogNotLoaded(String),

    #[error("no zipped DAT/XML file found in {}", .0.display())]
    NoCatalogInArchive(PathBuf),

    #[error("no scan results; scan a directory first")]
    NoScan,

    #[error("no plan to execute; generate a plan first")]
    NoPlan,

    #[error("nothing to undo")]
    NothingToUndo,

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("invalid setting {key}: {message}")]
    InvalidSetting { key: String, message: String },

    #[error("store schema version {found} is newer than supported version {supported}")]
    UnsupportedSchema { found: i64, supported: i64 },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fatal catalog parse failures. Per-entry problems are warnings instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed catalog: {0}")]
    Malformed(String),

    #[error("catalog contains no entries")]
    Empty,
}

/// Fatal scan failures. Per-file problems are reported as skipped items.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("scan root does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("scan root is not accessible: {}: {source}", .path.display())]
    RootInaccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// Per-action failure during plan execution. Never aborts the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionError {
    #[error(
        "destination claimed by several actions and no resolution given: {}",
        .destination.display()
    )]
    UnresolvedConflicts { destination: PathBuf },

    #[error("destination already exists: {}", .destination.display())]
    DestinationExists { destination: PathBuf },

    #[error("destination is not writable: {}: {message}", .destination.display())]
    DestinationUnwritable { destination: PathBuf, message: String },

    #[error("source vanished before it could be processed: {}", .source_path.display())]
    SourceVanished { source_path: PathBuf },

    #[error("failed to read container entry {entry} in {}: {message}", .archive.display())]
    ContainerRead {
        archive: PathBuf,
        entry: String,
        message: String,
    },
}

/// Per-step failure during undo. Never aborts the remaining steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UndoError {
    #[error("file was modified after it was organized: {}", .path.display())]
    ContentModified { path: PathBuf },

    #[error("original location is occupied by another file: {}", .path.display())]
    SourceOccupied { path: PathBuf },

    #[error("organized file is gone: {}", .path.display())]
    DestinationMissing { path: PathBuf },

    #[error("failed to revert {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },
}
