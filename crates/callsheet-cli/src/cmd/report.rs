//! `callsheet report` — rows completed within a date range, as JSONL.

use anyhow::{Context as _, Result};
use callsheet_core::report::outcome_report;
use chrono::NaiveDate;
use clap::Args;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::project::Project;

#[derive(Args, Debug)]
pub struct ReportArgs {
    /// First completion date to include (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    pub since: NaiveDate,

    /// Last completion date to include (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    pub until: NaiveDate,

    /// Output JSONL path (defaults to stdout).
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// Execute `callsheet report`. Always JSONL, one completed row per line.
///
/// # Errors
///
/// Returns an error for an inverted date range, a missing ledger, or a
/// failed write.
pub fn run_report(args: &ReportArgs, project_root: &Path) -> Result<()> {
    let project = Project::discover(project_root)?;
    let (_lock, ledger) = project.open_for_read()?;
    let rows = outcome_report(&ledger, args.since, args.until)?;

    let mut out: Box<dyn Write> = match args.output.as_ref() {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create output file {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout())),
    };

    for row in &rows {
        writeln!(out, "{}", serde_json::to_string(row)?)?;
    }
    out.flush()?;

    info!(
        rows = rows.len(),
        since = %args.since,
        until = %args.until,
        "wrote outcome report"
    );
    Ok(())
}
