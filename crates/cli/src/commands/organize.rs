use std::path::Path;

use anyhow::Result;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use romsmith_core::domain::Operation;
use romsmith_core::error::Error;
use romsmith_core::organizer::{
    ActionOutcome, ActionStatus, ExecuteOptions, ExistingPolicy, Resolution, StrategyKind,
    UndoStatus,
};
use romsmith_core::{CancelToken, Session};

use super::status::format_size;

/// Rows shown in a plan preview before it is abbreviated.
const PREVIEW_ROWS: usize = 40;

pub fn strategies() {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("Strategy"), Cell::new("Layout")]);
    for kind in StrategyKind::ALL {
        table.add_row(vec![Cell::new(kind.id()), Cell::new(kind.describe())]);
    }
    println!("{table}");
    println!("Combine strategies with '+', e.g. system+1g1r.");
}

pub fn plan(session: &mut Session, strategy: &str, output: &Path, move_files: bool) -> Result<()> {
    let operation = if move_files { Operation::Move } else { Operation::Copy };
    let plan = session.plan(strategy, output, operation)?;

    if plan.actions.is_empty() {
        println!("Nothing to organize. Scan a directory with identified files first.");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Op"),
        Cell::new("Source"),
        Cell::new("Destination"),
        Cell::new("Size"),
    ]);
    for (i, action) in plan.actions.iter().enumerate().take(PREVIEW_ROWS) {
        let destination = action
            .destination
            .strip_prefix(&plan.output_root)
            .unwrap_or(&action.destination)
            .display()
            .to_string();
        let mut dest_cell = Cell::new(destination);
        if plan.conflict_for(i).is_some() {
            dest_cell = dest_cell.fg(Color::Red);
        }
        table.add_row(vec![
            Cell::new(action.operation),
            Cell::new(action.source_display()),
            dest_cell,
            Cell::new(format_size(action.size)),
        ]);
    }
    println!("{table}");
    if plan.actions.len() > PREVIEW_ROWS {
        println!("  ... and {} more", plan.actions.len() - PREVIEW_ROWS);
    }

    println!();
    println!(
        "  {} files, {} into {} ({})",
        plan.file_count(),
        format_size(plan.total_bytes()),
        plan.output_root.display(),
        plan.strategy_id
    );

    if plan.has_conflicts() {
        println!();
        println!("  {} destinations are claimed by several files:", plan.conflicts.len());
        for conflict in &plan.conflicts {
            println!("    {}", conflict.destination.display());
            for &i in &conflict.actions {
                println!("      <- {}", plan.actions[i].source_display());
            }
        }
        println!();
        println!("  Pass --resolve overwrite|skip|rename to 'romsmith organize'.");
    } else {
        println!("  Run 'romsmith organize' to apply.");
    }
    Ok(())
}

pub fn execute(
    session: &mut Session,
    resolve: Option<Resolution>,
    on_existing: ExistingPolicy,
) -> Result<()> {
    let plan = session.last_plan().ok_or(Error::NoPlan)?;
    let mut options = match resolve {
        Some(resolution) => ExecuteOptions::resolve_all(plan, resolution),
        None => ExecuteOptions::default(),
    };
    options.on_existing = on_existing;

    let pb = ProgressBar::new(plan.actions.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=>-"),
    );

    let cancel = CancelToken::new();
    let report = session.execute(
        &options,
        &cancel,
        Some(&mut |outcome: &ActionOutcome| {
            pb.inc(1);
            pb.set_message(outcome.destination.display().to_string());
        }),
    )?;
    pb.finish_with_message(format!(
        "{} done, {} skipped, {} failed",
        report.done(),
        report.skipped(),
        report.failed()
    ));

    let failures: Vec<_> = report
        .outcomes
        .iter()
        .filter_map(|o| match &o.status {
            ActionStatus::Failed { error } => Some((o, error)),
            _ => None,
        })
        .collect();
    if !failures.is_empty() {
        println!();
        println!("  Failed:");
        for (outcome, error) in failures {
            println!("    {}: {error}", outcome.source);
        }
    }
    if !report.records.is_empty() {
        println!();
        println!("  Run 'romsmith undo' to revert, or 'romsmith commit' to keep.");
    }
    Ok(())
}

pub fn undo(session: &mut Session) -> Result<()> {
    let report = session.undo()?;
    println!(
        "Reverted {}, kept {}, failed {}.",
        report.reverted(),
        report.kept(),
        report.failed()
    );
    for step in &report.steps {
        if let UndoStatus::Failed { error } = &step.status {
            println!("  {error}");
        }
    }
    if report.failed() > 0 {
        println!("Failed steps stay in the log; fix them and run 'romsmith undo' again.");
    }
    Ok(())
}

pub fn commit(session: &mut Session) {
    let dropped = session.commit();
    println!("Committed; dropped {dropped} undo records.");
}
