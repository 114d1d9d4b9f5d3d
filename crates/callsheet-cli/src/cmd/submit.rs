use std::io::Write;
use std::path::Path;

use anyhow::Result;
use callsheet_core::engine::{Submission, submit};
use callsheet_core::model::{Outcome, Priority};
use chrono::{Local, NaiveDate};
use clap::Args;

use crate::output::{OutputMode, pretty_kv, render_mode};
use crate::project::Project;

#[derive(Args, Debug)]
pub struct SubmitArgs {
    /// Caller who worked the row.
    #[arg(long, value_name = "EMAIL")]
    pub email: String,

    /// Serial of the row within the caller's list.
    #[arg(long)]
    pub serial: u32,

    /// spoke, tried or followup_required (s, t, sf also accepted).
    #[arg(long)]
    pub outcome: Outcome,

    /// high, medium, low or none.
    #[arg(long, default_value = "none")]
    pub priority: Priority,

    /// Updated location reported by the contact.
    #[arg(long, value_name = "TEXT")]
    pub new_location: Option<String>,

    /// Completion date (YYYY-MM-DD); defaults to today.
    #[arg(long, value_name = "DATE")]
    pub date: Option<NaiveDate>,
}

/// Execute `callsheet submit`.
pub fn run_submit(args: &SubmitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::discover(project_root)?;
    let (_lock, ledger) = project.open_for_write()?;

    let submission = Submission {
        email: args.email.clone(),
        serial_no: args.serial,
        outcome: args.outcome,
        priority: args.priority,
        new_location: args
            .new_location
            .as_deref()
            .map(str::trim)
            .filter(|location| !location.is_empty())
            .map(str::to_string),
        completed_on: args.date.unwrap_or_else(|| Local::now().date_naive()),
    };
    let item = submit(&ledger, &submission)?;

    render_mode(
        output,
        &item,
        |item, w| {
            writeln!(
                w,
                "{}\t{}\t{}\t{}",
                submission.email,
                item.serial_no,
                item.status,
                item.completed_at
                    .map_or_else(String::new, |date| date.to_string())
            )
        },
        |item, w| {
            writeln!(
                w,
                "✓ Recorded #{} for {}: {}",
                item.serial_no, submission.email, item.status
            )?;
            pretty_kv(w, "Contact", &item.payload.name)?;
            pretty_kv(w, "Priority", item.priority.as_str())?;
            if let Some(location) = &item.new_location {
                pretty_kv(w, "Location", location)?;
            }
            Ok(())
        },
    )
}
