//! Console rendering for run progress and listings.

use chrono::{DateTime, Local};
use colored::Colorize;
use kvault_lib::{EntrySummary, FileOutcome, FileStatus, RunObserver, RunReport};

/// Prints one line per finished file.
pub struct ConsoleObserver;

impl RunObserver for ConsoleObserver {
    fn on_outcome(&self, outcome: &FileOutcome) {
        match &outcome.result {
            Ok(FileStatus::Updated) => {
                println!("{} {}", "updated".green(), outcome.path.display())
            }
            Ok(FileStatus::UpToDate) => {
                println!("{} {}", "up to date".yellow(), outcome.path.display())
            }
            Ok(FileStatus::Restored { to }) => println!(
                "{}",
                format!("{} -> {}", outcome.path.display(), to.display()).green()
            ),
            Err(e) => eprintln!("{} {}", "error:".red().bold(), e),
        }
    }
}

pub fn print_backup_summary(report: &RunReport) {
    println!(
        "{}",
        format!(
            "✓ Backup finished: {} updated, {} up to date, {} failed",
            report.updated,
            report.up_to_date,
            report.failed.len()
        )
        .cyan()
    );
}

pub fn print_restore_summary(report: &RunReport) {
    println!(
        "{}",
        format!(
            "✓ Restore finished: {} restored, {} failed",
            report.restored,
            report.failed.len()
        )
        .cyan()
    );
}

pub fn print_failures(report: &RunReport) {
    if report.is_success() {
        return;
    }
    eprintln!("{}", format!("{} file(s) failed:", report.failed.len()).red());
    for path in &report.failed {
        eprintln!("  {}", path.display());
    }
}

/// One listing line: the key, or size, stored size, modification time and key.
pub fn format_entry(entry: &EntrySummary, long: bool) -> String {
    if !long {
        return entry.key.clone();
    }
    match &entry.header {
        Some(header) => {
            let modified = header
                .modified_at()
                .map(|time| {
                    DateTime::<Local>::from(time)
                        .format("%Y-%m-%d %H:%M:%S")
                        .to_string()
                })
                .unwrap_or_else(|| "-".to_string());
            format!(
                "{:>12} {:>12}  {}  {}",
                header.size, entry.stored_size, modified, entry.key
            )
        }
        None => format!(
            "{:>12} {:>12}  {:<19}  {}",
            "?",
            entry.stored_size,
            "unreadable".red(),
            entry.key
        ),
    }
}
