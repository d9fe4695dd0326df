//! Organizer: strategy-driven planning, best-effort execution and undo.
//!
//! `plan` is pure. `execute` is the only place that writes to the
//! filesystem, and `undo` replays its records in reverse.

pub mod execute;
pub mod paths;
pub mod plan;
pub mod strategy;
pub mod undo;

use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::Hashes;
use crate::hasher;

pub use execute::{
    execute, ActionOutcome, ActionRecord, ActionStatus, ExecuteOptions, ExecutionReport,
    ExistingPolicy, Resolution,
};
pub use plan::{plan, plan_at, OrganizePlan, PlanConflict, PlannedAction};
pub use strategy::{Strategy, StrategyKind, DEFAULT_REGION_PRIORITY};
pub use undo::{undo, UndoReport, UndoStatus, UndoStep};

/// True when the file at `path` has the given size and its strongest
/// recorded digest. Files without a recorded digest compare by size only.
pub(crate) fn content_matches(path: &Path, size: u64, hashes: &Hashes) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    if meta.len() != size {
        return false;
    }
    let Some((kind, expected)) = hashes.strongest() else {
        return true;
    };
    match hasher::hash_file(path, &[kind]) {
        Ok((_, actual)) => actual.get(kind) == Some(expected),
        Err(_) => false,
    }
}

/// Remove empty directories from `dir` upwards, stopping at (and keeping) `root`.
pub(crate) fn remove_empty_dirs(dir: &Path, root: &Path) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    let mut current = dir.to_path_buf();
    while current.starts_with(root) && current != root {
        let empty = fs::read_dir(&current)
            .map(|mut entries| entries.next().is_none())
            .unwrap_or(false);
        if !empty || fs::remove_dir(&current).is_err() {
            break;
        }
        removed.push(current.clone());
        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }
    removed
}
