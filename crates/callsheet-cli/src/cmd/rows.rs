//! `callsheet rows` — a caller's current call list.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use callsheet_core::error::LedgerError;
use callsheet_core::model::{Status, WorkItem};
use callsheet_core::store::Ledger as _;
use clap::Args;

use crate::output::{OutputMode, pretty_section, render_mode};
use crate::project::Project;

#[derive(Args, Debug)]
pub struct RowsArgs {
    /// Caller whose rows to list.
    #[arg(long, value_name = "EMAIL")]
    pub owner: String,

    /// Only rows with this status (unset, spoke, tried, followup_required).
    #[arg(long)]
    pub status: Option<Status>,
}

pub fn run_rows(args: &RowsArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::discover(project_root)?;
    let (_lock, ledger) = project.open_for_read()?;

    let mut items = ledger.view(|tx| {
        if tx.get(&args.owner)?.is_none() {
            return Err(LedgerError::UnknownUser {
                email: args.owner.clone(),
            });
        }
        tx.list_by_owner(&args.owner)
    })?;
    if let Some(status) = args.status {
        items.retain(|item| item.status == status);
    }

    render_mode(
        output,
        &items,
        |items, w| {
            for item in items {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}\t{}",
                    item.serial_no,
                    item.payload.name,
                    item.payload.phone.as_deref().unwrap_or(""),
                    item.status,
                    item.priority
                )?;
            }
            Ok(())
        },
        |items, w| render_pretty(&args.owner, items, w),
    )
}

fn render_pretty(owner: &str, items: &[WorkItem], w: &mut dyn Write) -> std::io::Result<()> {
    if items.is_empty() {
        return writeln!(w, "No rows for {owner}.");
    }
    pretty_section(w, &format!("Rows for {owner} ({})", items.len()))?;
    for item in items {
        let done = item
            .completed_at
            .map_or_else(String::new, |date| date.to_string());
        writeln!(
            w,
            "{:>5}  {:<24} {:<16} {:<18} {:<7} {}",
            item.serial_no,
            item.payload.name,
            item.payload.phone.as_deref().unwrap_or("-"),
            item.status.as_str(),
            item.priority.as_str(),
            done
        )?;
    }
    Ok(())
}
