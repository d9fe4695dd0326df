use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::execute::ActionRecord;
use crate::domain::Operation;
use crate::error::UndoError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UndoStatus {
    Reverted,
    /// The destination replaced a pre-existing file; it is left in place.
    Kept,
    Failed { error: UndoError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoStep {
    /// Index into the records passed to `undo`.
    pub record: usize,
    pub operation: Operation,
    pub source: PathBuf,
    pub destination: PathBuf,
    #[serde(flatten)]
    pub status: UndoStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoReport {
    /// In reverse execution order.
    pub steps: Vec<UndoStep>,
    pub removed_dirs: Vec<PathBuf>,
}

impl UndoReport {
    pub fn reverted(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == UndoStatus::Reverted)
            .count()
    }

    pub fn kept(&self) -> usize {
        self.steps.iter().filter(|s| s.status == UndoStatus::Kept).count()
    }

    pub fn failed(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, UndoStatus::Failed { .. }))
            .count()
    }

    /// Records that no longer need reverting (reverted or deliberately kept).
    pub fn settled(&self) -> impl Iterator<Item = usize> + '_ {
        self.steps
            .iter()
            .filter(|s| !matches!(s.status, UndoStatus::Failed { .. }))
            .map(|s| s.record)
    }
}

fn io_failure(path: &Path, err: std::io::Error) -> UndoError {
    UndoError::Io {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

fn restore_move(record: &ActionRecord) -> Result<(), UndoError> {
    if !record.destination.exists() {
        return Err(UndoError::DestinationMissing {
            path: record.destination.clone(),
        });
    }
    if record.source.exists() {
        return Err(UndoError::SourceOccupied {
            path: record.source.clone(),
        });
    }
    if let Some(parent) = record.source.parent() {
        fs::create_dir_all(parent).map_err(|e| io_failure(parent, e))?;
    }
    if fs::rename(&record.destination, &record.source).is_ok() {
        return Ok(());
    }
    fs::copy(&record.destination, &record.source).map_err(|e| io_failure(&record.source, e))?;
    fs::remove_file(&record.destination).map_err(|e| io_failure(&record.destination, e))
}

fn remove_copy(record: &ActionRecord) -> Result<UndoStatus, UndoError> {
    if record.pre_existing_destination {
        return Ok(UndoStatus::Kept);
    }
    if !record.destination.exists() {
        return Err(UndoError::DestinationMissing {
            path: record.destination.clone(),
        });
    }
    if !super::content_matches(&record.destination, record.size, &record.hashes) {
        return Err(UndoError::ContentModified {
            path: record.destination.clone(),
        });
    }
    fs::remove_file(&record.destination).map_err(|e| io_failure(&record.destination, e))?;
    Ok(UndoStatus::Reverted)
}

/// Reverse executed actions, newest first. A copy or extract whose
/// destination changed since it was written is left alone and reported.
/// Directories emptied along the way are removed up to `output_root`.
pub fn undo(records: &[ActionRecord], output_root: Option<&Path>) -> UndoReport {
    let mut report = UndoReport::default();

    for (index, record) in records.iter().enumerate().rev() {
        let result = match record.operation {
            Operation::Move => restore_move(record).map(|()| UndoStatus::Reverted),
            Operation::Copy | Operation::Extract => remove_copy(record),
        };
        let status = result.unwrap_or_else(|error| {
            tracing::debug!(path = %record.destination.display(), %error, "could not undo action");
            UndoStatus::Failed { error }
        });

        if status == UndoStatus::Reverted {
            if let (Some(root), Some(parent)) = (output_root, record.destination.parent()) {
                report.removed_dirs.extend(super::remove_empty_dirs(parent, root));
            }
        }
        report.steps.push(UndoStep {
            record: index,
            operation: record.operation,
            source: record.source.clone(),
            destination: record.destination.clone(),
            status,
        });
    }

    tracing::debug!(
        reverted = report.reverted(),
        kept = report.kept(),
        failed = report.failed(),
        "undo finished"
    );
    report
}
