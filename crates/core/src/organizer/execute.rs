use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::paths;
use super::plan::{OrganizePlan, PlannedAction};
use crate::cancel::CancelToken;
use crate::domain::{Hashes, Operation};
use crate::error::ExecutionError;

/// Caller's decision for one plan conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    /// The last claimant wins and may replace an existing file.
    Overwrite,
    /// The first claimant wins; the others are skipped.
    Skip,
    /// The first claimant keeps the name; the others get `_1`, `_2`, ...
    Rename,
}

/// What to do when a destination already exists on disk with different content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingPolicy {
    #[default]
    Fail,
    Skip,
    Overwrite,
    Rename,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecuteOptions {
    /// Keyed by `PlanConflict::destination`.
    pub resolutions: BTreeMap<PathBuf, Resolution>,
    pub on_existing: ExistingPolicy,
}

impl ExecuteOptions {
    /// Apply one resolution to every conflict of the plan.
    pub fn resolve_all(plan: &OrganizePlan, resolution: Resolution) -> Self {
        Self {
            resolutions: plan
                .conflicts
                .iter()
                .map(|c| (c.destination.clone(), resolution))
                .collect(),
            on_existing: ExistingPolicy::default(),
        }
    }
}

/// One completed file operation, enough to reverse it later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub operation: Operation,
    pub source: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_path: Option<String>,
    pub destination: PathBuf,
    /// Something already occupied the destination before this action ran.
    pub pre_existing_destination: bool,
    pub size: u64,
    pub hashes: Hashes,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionStatus {
    Done,
    /// The destination already held identical content; nothing was written.
    AlreadyPresent,
    Skipped { reason: String },
    Failed { error: ExecutionError },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    /// Index into the plan's actions.
    pub index: usize,
    pub source: String,
    pub destination: PathBuf,
    #[serde(flatten)]
    pub status: ActionStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Completed operations, in execution order.
    pub records: Vec<ActionRecord>,
    pub outcomes: Vec<ActionOutcome>,
    /// Execution stopped early; actions without an outcome never started.
    pub cancelled: bool,
}

impl ExecutionReport {
    fn count(&self, pred: impl Fn(&ActionStatus) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.status)).count()
    }

    pub fn done(&self) -> usize {
        self.count(|s| matches!(s, ActionStatus::Done))
    }

    pub fn skipped(&self) -> usize {
        self.count(|s| matches!(s, ActionStatus::Skipped { .. } | ActionStatus::AlreadyPresent))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, ActionStatus::Failed { .. }))
    }
}

enum Step {
    Run { destination: PathBuf, overwrite: bool, rename: bool },
    Skip(String),
    Fail(ExecutionError),
}

/// Decide per action what conflict resolution allows.
fn schedule(plan: &OrganizePlan, options: &ExecuteOptions) -> Vec<Step> {
    let mut steps: Vec<Step> = plan
        .actions
        .iter()
        .map(|a| Step::Run {
            destination: a.destination.clone(),
            overwrite: false,
            rename: false,
        })
        .collect();

    for conflict in &plan.conflicts {
        let claimants = &conflict.actions;
        match options.resolutions.get(&conflict.destination) {
            None => {
                for &i in claimants {
                    steps[i] = Step::Fail(ExecutionError::UnresolvedConflicts {
                        destination: conflict.destination.clone(),
                    });
                }
            }
            Some(Resolution::Skip) => {
                for &i in &claimants[1..] {
                    steps[i] = Step::Skip("destination claimed by an earlier action".to_string());
                }
            }
            Some(Resolution::Overwrite) => {
                let last = claimants.len() - 1;
                for &i in &claimants[..last] {
                    steps[i] = Step::Skip("superseded by a later action".to_string());
                }
                if let Step::Run { overwrite, .. } = &mut steps[claimants[last]] {
                    *overwrite = true;
                }
            }
            Some(Resolution::Rename) => {
                for &i in &claimants[1..] {
                    if let Step::Run { rename, .. } = &mut steps[i] {
                        *rename = true;
                    }
                }
            }
        }
    }
    steps
}

fn free_suffixed(destination: &Path) -> PathBuf {
    let mut n = 1u32;
    loop {
        let candidate = paths::with_suffix(destination, n);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

fn unwritable(destination: &Path, err: impl ToString) -> ExecutionError {
    ExecutionError::DestinationUnwritable {
        destination: destination.to_path_buf(),
        message: err.to_string(),
    }
}

/// Stream `reader` into a hidden sibling, then rename it into place.
fn write_atomically(reader: &mut dyn Read, destination: &Path) -> io::Result<()> {
    let partial = paths::partial_path(destination);
    let result = (|| {
        let mut out = File::create(&partial)?;
        io::copy(reader, &mut out)?;
        out.flush()?;
        out.sync_all()?;
        drop(out);
        fs::rename(&partial, destination)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&partial);
    }
    result
}

fn copy_file(source: &Path, destination: &Path) -> Result<(), ExecutionError> {
    let file = File::open(source).map_err(|_| ExecutionError::SourceVanished {
        source_path: source.to_path_buf(),
    })?;
    write_atomically(&mut BufReader::new(file), destination).map_err(|e| unwritable(destination, e))
}

fn extract_entry(archive: &Path, entry: &str, destination: &Path) -> Result<(), ExecutionError> {
    let container_err = |message: String| ExecutionError::ContainerRead {
        archive: archive.to_path_buf(),
        entry: entry.to_string(),
        message,
    };
    let file = File::open(archive).map_err(|_| ExecutionError::SourceVanished {
        source_path: archive.to_path_buf(),
    })?;
    let mut reader =
        zip::ZipArchive::new(BufReader::new(file)).map_err(|e| container_err(e.to_string()))?;
    let mut inner = reader
        .by_name(entry)
        .map_err(|e| container_err(e.to_string()))?;
    write_atomically(&mut inner, destination).map_err(|e| unwritable(destination, e))
}

fn move_file(source: &Path, destination: &Path) -> Result<(), ExecutionError> {
    if fs::rename(source, destination).is_ok() {
        return Ok(());
    }
    // Cross-device: copy then remove the original.
    copy_file(source, destination)?;
    if let Err(err) = fs::remove_file(source) {
        let _ = fs::remove_file(destination);
        return Err(unwritable(
            destination,
            format!("copied but could not remove the original: {err}"),
        ));
    }
    Ok(())
}

fn run_action(
    action: &PlannedAction,
    destination: PathBuf,
    overwrite: bool,
    rename: bool,
    on_existing: ExistingPolicy,
) -> (PathBuf, Result<Option<ActionRecord>, ActionStatus>) {
    if !action.source.exists() {
        let error = ExecutionError::SourceVanished {
            source_path: action.source.clone(),
        };
        return (destination, Err(ActionStatus::Failed { error }));
    }

    let mut destination = destination;
    let mut pre_existing = false;
    if rename && destination.exists() {
        destination = free_suffixed(&destination);
    } else if destination.exists() {
        if super::content_matches(&destination, action.size, &action.hashes) {
            return (destination, Ok(None));
        }
        let policy = if overwrite { ExistingPolicy::Overwrite } else { on_existing };
        match policy {
            ExistingPolicy::Fail => {
                let error = ExecutionError::DestinationExists {
                    destination: destination.clone(),
                };
                return (destination, Err(ActionStatus::Failed { error }));
            }
            ExistingPolicy::Skip => {
                let reason = "destination already exists".to_string();
                return (destination, Err(ActionStatus::Skipped { reason }));
            }
            ExistingPolicy::Overwrite => pre_existing = true,
            ExistingPolicy::Rename => destination = free_suffixed(&destination),
        }
    }

    if let Some(parent) = destination.parent() {
        if let Err(err) = fs::create_dir_all(parent) {
            let error = unwritable(&destination, err);
            return (destination, Err(ActionStatus::Failed { error }));
        }
    }

    let result = match (action.operation, &action.container_path) {
        (_, Some(inner)) => extract_entry(&action.source, inner, &destination),
        (Operation::Move, None) => move_file(&action.source, &destination),
        (_, None) => copy_file(&action.source, &destination),
    };
    if let Err(error) = result {
        return (destination, Err(ActionStatus::Failed { error }));
    }

    let record = ActionRecord {
        operation: action.operation,
        source: action.source.clone(),
        container_path: action.container_path.clone(),
        destination: destination.clone(),
        pre_existing_destination: pre_existing,
        size: action.size,
        hashes: action.hashes.clone(),
        timestamp: Utc::now(),
    };
    (destination, Ok(Some(record)))
}

/// Execute a plan, best effort. Every action gets an itemized outcome;
/// failures never stop the remaining actions. Cancellation is checked
/// between actions, so no destination is left half-written.
pub fn execute(
    plan: &OrganizePlan,
    options: &ExecuteOptions,
    cancel: &CancelToken,
    mut progress: Option<&mut dyn FnMut(&ActionOutcome)>,
) -> ExecutionReport {
    let mut report = ExecutionReport::default();

    for (index, (action, step)) in plan.actions.iter().zip(schedule(plan, options)).enumerate() {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let (destination, status) = match step {
            Step::Skip(reason) => (action.destination.clone(), ActionStatus::Skipped { reason }),
            Step::Fail(error) => (action.destination.clone(), ActionStatus::Failed { error }),
            Step::Run {
                destination,
                overwrite,
                rename,
            } => match run_action(action, destination, overwrite, rename, options.on_existing) {
                (dest, Ok(Some(record))) => {
                    report.records.push(record);
                    (dest, ActionStatus::Done)
                }
                (dest, Ok(None)) => (dest, ActionStatus::AlreadyPresent),
                (dest, Err(status)) => (dest, status),
            },
        };

        let outcome = ActionOutcome {
            index,
            source: action.source_display(),
            destination,
            status,
        };
        if let ActionStatus::Failed { error } = &outcome.status {
            tracing::debug!(source = %outcome.source, %error, "action failed");
        }
        if let Some(cb) = progress.as_mut() {
            cb(&outcome);
        }
        report.outcomes.push(outcome);
    }

    tracing::debug!(
        done = report.done(),
        skipped = report.skipped(),
        failed = report.failed(),
        cancelled = report.cancelled,
        "executed plan"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HashKind;
    use crate::organizer::plan::PlanConflict;

    fn make_action(source: &Path, destination: &Path, operation: Operation) -> PlannedAction {
        let (size, hashes) =
            crate::hasher::hash_file(source, &[]).unwrap_or((0, Hashes::default()));
        PlannedAction {
            source: source.to_path_buf(),
            container_path: None,
            destination: destination.to_path_buf(),
            operation,
            size,
            hashes,
            game_name: "Game".to_string(),
            catalog_id: "Test".to_string(),
        }
    }

    fn make_plan(
        root: &Path,
        actions: Vec<PlannedAction>,
        conflicts: Vec<PlanConflict>,
    ) -> OrganizePlan {
        OrganizePlan {
            strategy_id: "flat".to_string(),
            output_root: root.to_path_buf(),
            actions,
            conflicts,
            generated_at: Utc::now(),
        }
    }

    fn run(plan: &OrganizePlan, options: &ExecuteOptions) -> ExecutionReport {
        execute(plan, options, &CancelToken::new(), None)
    }

    // ── Basic operations ─────────────────────────────────────────

    #[test]
    fn test_copy_creates_directories_and_logs() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in.bin");
        fs::write(&src, b"rom data").unwrap();
        let dest = tmp.path().join("out/System/Game.bin");

        let plan = make_plan(
            &tmp.path().join("out"),
            vec![make_action(&src, &dest, Operation::Copy)],
            vec![],
        );
        let report = run(&plan, &ExecuteOptions::default());

        assert_eq!(report.done(), 1);
        assert_eq!(fs::read(&dest).unwrap(), b"rom data");
        assert!(src.exists());
        assert_eq!(report.records.len(), 1);
        assert!(!report.records[0].pre_existing_destination);
        assert!(!paths::partial_path(&dest).exists());
    }

    #[test]
    fn test_move_removes_source() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in.bin");
        fs::write(&src, b"rom data").unwrap();
        let dest = tmp.path().join("out/Game.bin");

        let plan = make_plan(
            &tmp.path().join("out"),
            vec![make_action(&src, &dest, Operation::Move)],
            vec![],
        );
        let report = run(&plan, &ExecuteOptions::default());

        assert_eq!(report.done(), 1);
        assert!(!src.exists());
        assert!(dest.exists());
        assert_eq!(report.records[0].operation, Operation::Move);
    }

    #[test]
    fn test_extract_from_zip() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("pack.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
            zip.start_file("inner.nes", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"hello world").unwrap();
            zip.finish().unwrap();
        }
        let dest = tmp.path().join("out/Game (USA).nes");
        let action = PlannedAction {
            source: archive.clone(),
            container_path: Some("inner.nes".to_string()),
            destination: dest.clone(),
            operation: Operation::Extract,
            size: 11,
            hashes: Hashes::default().with(HashKind::Crc32, "0d4a1185"),
            game_name: "Game (USA)".to_string(),
            catalog_id: "Test".to_string(),
        };
        let plan = make_plan(&tmp.path().join("out"), vec![action], vec![]);
        let report = run(&plan, &ExecuteOptions::default());

        assert_eq!(report.done(), 1);
        assert_eq!(fs::read(&dest).unwrap(), b"hello world");
        assert!(archive.exists());
    }

    #[test]
    fn test_missing_entry_in_zip_is_container_error() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("pack.zip");
        {
            let mut zip = zip::ZipWriter::new(File::create(&archive).unwrap());
            zip.start_file("other.nes", zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(b"x").unwrap();
            zip.finish().unwrap();
        }
        let mut action = make_action(&archive, &tmp.path().join("out/x.nes"), Operation::Extract);
        action.container_path = Some("inner.nes".to_string());
        let plan = make_plan(&tmp.path().join("out"), vec![action], vec![]);
        let report = run(&plan, &ExecuteOptions::default());
        assert!(matches!(
            report.outcomes[0].status,
            ActionStatus::Failed { error: ExecutionError::ContainerRead { .. } }
        ));
    }

    // ── Itemized failures ────────────────────────────────────────

    #[test]
    fn test_vanished_source_does_not_abort_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let good = tmp.path().join("good.bin");
        fs::write(&good, b"ok").unwrap();
        let gone = tmp.path().join("gone.bin");

        let plan = make_plan(
            &tmp.path().join("out"),
            vec![
                make_action(&gone, &tmp.path().join("out/a.bin"), Operation::Copy),
                make_action(&good, &tmp.path().join("out/b.bin"), Operation::Copy),
            ],
            vec![],
        );
        let report = run(&plan, &ExecuteOptions::default());

        assert!(matches!(
            report.outcomes[0].status,
            ActionStatus::Failed { error: ExecutionError::SourceVanished { .. } }
        ));
        assert_eq!(report.outcomes[1].status, ActionStatus::Done);
        assert_eq!(report.records.len(), 1);
    }

    #[test]
    fn test_existing_destination_policies() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in.bin");
        fs::write(&src, b"new").unwrap();
        let dest = tmp.path().join("out/Game.bin");
        fs::create_dir_all(dest.parent().unwrap()).unwrap();
        fs::write(&dest, b"old content").unwrap();
        let plan = make_plan(
            &tmp.path().join("out"),
            vec![make_action(&src, &dest, Operation::Copy)],
            vec![],
        );

        let report = run(&plan, &ExecuteOptions::default());
        assert!(matches!(
            report.outcomes[0].status,
            ActionStatus::Failed { error: ExecutionError::DestinationExists { .. } }
        ));

        let rename = ExecuteOptions {
            on_existing: ExistingPolicy::Rename,
            ..Default::default()
        };
        let report = run(&plan, &rename);
        assert_eq!(report.outcomes[0].destination, tmp.path().join("out/Game_1.bin"));
        assert_eq!(fs::read(&dest).unwrap(), b"old content");

        let overwrite = ExecuteOptions {
            on_existing: ExistingPolicy::Overwrite,
            ..Default::default()
        };
        let report = run(&plan, &overwrite);
        assert!(report.records[0].pre_existing_destination);
        assert_eq!(fs::read(&dest).unwrap(), b"new");
    }

    #[test]
    fn test_identical_destination_is_already_present() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("in.bin");
        fs::write(&src, b"same").unwrap();
        let dest = tmp.path().join("Game.bin");
        fs::write(&dest, b"same").unwrap();

        let plan = make_plan(tmp.path(), vec![make_action(&src, &dest, Operation::Copy)], vec![]);
        let report = run(&plan, &ExecuteOptions::default());
        assert_eq!(report.outcomes[0].status, ActionStatus::AlreadyPresent);
        assert!(report.records.is_empty());
    }

    // ── Conflicts ────────────────────────────────────────────────

    fn conflicted_plan(tmp: &Path) -> OrganizePlan {
        let a = tmp.join("a.bin");
        let b = tmp.join("b.bin");
        fs::write(&a, b"first").unwrap();
        fs::write(&b, b"second").unwrap();
        let dest = tmp.join("out/Game.bin");
        make_plan(
            &tmp.join("out"),
            vec![
                make_action(&a, &dest, Operation::Copy),
                make_action(&b, &dest, Operation::Copy),
            ],
            vec![PlanConflict {
                destination: dest.clone(),
                actions: vec![0, 1],
            }],
        )
    }

    #[test]
    fn test_unresolved_conflict_blocks_only_affected_actions() {
        let tmp = tempfile::tempdir().unwrap();
        let mut plan = conflicted_plan(tmp.path());
        let other = tmp.path().join("c.bin");
        fs::write(&other, b"free").unwrap();
        plan.actions
            .push(make_action(&other, &tmp.path().join("out/Other.bin"), Operation::Copy));

        let report = run(&plan, &ExecuteOptions::default());
        assert_eq!(report.failed(), 2);
        assert_eq!(report.done(), 1);
        assert!(matches!(
            report.outcomes[0].status,
            ActionStatus::Failed { error: ExecutionError::UnresolvedConflicts { .. } }
        ));
        assert!(!tmp.path().join("out/Game.bin").exists());
    }

    #[test]
    fn test_conflict_resolutions() {
        let tmp = tempfile::tempdir().unwrap();
        let plan = conflicted_plan(tmp.path());
        let dest = tmp.path().join("out/Game.bin");

        let report = run(&plan, &ExecuteOptions::resolve_all(&plan, Resolution::Skip));
        assert_eq!(report.done(), 1);
        assert_eq!(fs::read(&dest).unwrap(), b"first");
        fs::remove_file(&dest).unwrap();

        let report = run(&plan, &ExecuteOptions::resolve_all(&plan, Resolution::Overwrite));
        assert_eq!(report.done(), 1);
        assert_eq!(fs::read(&dest).unwrap(), b"second");
        fs::remove_file(&dest).unwrap();

        let report = run(&plan, &ExecuteOptions::resolve_all(&plan, Resolution::Rename));
        assert_eq!(report.done(), 2);
        assert_eq!(fs::read(&dest).unwrap(), b"first");
        assert_eq!(fs::read(tmp.path().join("out/Game_1.bin")).unwrap(), b"second");
    }

    // ── Cancellation ─────────────────────────────────────────────

    #[test]
    fn test_cancel_between_actions() {
        let tmp = tempfile::tempdir().unwrap();
        let mut actions = Vec::new();
        for i in 0..3 {
            let src = tmp.path().join(format!("{i}.bin"));
            fs::write(&src, [i as u8]).unwrap();
            let dest = tmp.path().join(format!("out/{i}.bin"));
            actions.push(make_action(&src, &dest, Operation::Copy));
        }
        let plan = make_plan(&tmp.path().join("out"), actions, vec![]);

        let cancel = CancelToken::new();
        let mut seen = 0;
        let mut cb = |_: &ActionOutcome| {
            seen += 1;
            if seen == 1 {
                cancel.cancel();
            }
        };
        let report = execute(&plan, &ExecuteOptions::default(), &cancel, Some(&mut cb));
        assert!(report.cancelled);
        assert_eq!(report.records.len(), 1);
        assert!(!tmp.path().join("out/1.bin").exists());
    }
}
