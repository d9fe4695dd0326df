use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use romsmith_core::{CancelToken, ScanProgress, Session};

pub fn run(session: &mut Session, path: &Path, parallel: bool, recursive: bool) -> Result<()> {
    let mut options = session.scan_options();
    options.recursive = recursive;

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template(
        "  {spinner:.green} {pos:>6} files {prefix:.dim} {msg}",
    )?);
    pb.enable_steady_tick(Duration::from_millis(80));
    let mut skipped: Vec<String> = Vec::new();

    let mut on_progress = |progress: ScanProgress| match progress {
        ScanProgress::Started { root, hash_kinds } => {
            let kinds: Vec<String> = hash_kinds.iter().map(|k| k.to_string()).collect();
            pb.set_prefix(if kinds.is_empty() {
                "crc32".to_string()
            } else {
                format!("crc32+{}", kinds.join("+"))
            });
            pb.set_message(format!("scanning {}", root.display()));
        }
        ScanProgress::Identified { game, .. } => {
            pb.inc(1);
            pb.set_message(game);
        }
        ScanProgress::Unidentified { path } => {
            pb.inc(1);
            pb.set_message(path);
        }
        ScanProgress::Skipped { path, reason } => skipped.push(format!("{path}: {reason}")),
        ScanProgress::Finished {
            identified,
            unidentified,
            missing,
            cancelled,
        } => {
            let suffix = if cancelled { " (cancelled)" } else { "" };
            pb.finish_with_message(format!(
                "{identified} identified, {unidentified} unidentified, {missing} missing{suffix}"
            ));
        }
    };

    let cancel = CancelToken::new();
    if parallel {
        session.scan_parallel(path, options, &cancel, Some(&mut on_progress))?;
    } else {
        session.scan(path, options, &cancel, Some(&mut on_progress))?;
    }

    if !skipped.is_empty() {
        println!();
        println!("  Skipped {} unreadable files:", skipped.len());
        for line in &skipped {
            println!("    {line}");
        }
    }
    println!();
    println!("  Run 'romsmith status' for completeness per catalog.");
    Ok(())
}
