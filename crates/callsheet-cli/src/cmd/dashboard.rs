//! `callsheet dashboard` — per-caller progress and overall completion.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use callsheet_core::report::{Dashboard, SerialRange, dashboard};

use crate::output::{OutputMode, pretty_kv, pretty_rule, pretty_section, render_mode};
use crate::project::Project;

fn range_label(range: Option<SerialRange>) -> String {
    range.map_or_else(|| "-".to_string(), |range| range.to_string())
}

pub fn run_dashboard(output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::discover(project_root)?;
    let (_lock, ledger) = project.open_for_read()?;
    let board = dashboard(&ledger)?;

    render_mode(output, &board, render_text, render_pretty)
}

fn render_text(board: &Dashboard, w: &mut dyn Write) -> std::io::Result<()> {
    for user in &board.users {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}\t{}\t{:.2}\t{}\t{}",
            user.handle,
            user.email,
            user.counters.assigned,
            user.counters.spoke,
            user.counters.tried,
            user.counters.followup_required,
            user.completion_pct,
            range_label(user.completed_range),
            range_label(user.pending_range),
        )?;
    }
    writeln!(
        w,
        "total\t-\t{}\t{}\t{}\t{}\t{:.2}\t-\t-",
        board.totals.assigned,
        board.totals.spoke,
        board.totals.tried,
        board.totals.followup_required,
        board.completion_pct,
    )
}

fn render_pretty(board: &Dashboard, w: &mut dyn Write) -> std::io::Result<()> {
    if board.users.is_empty() {
        return writeln!(w, "No callers registered yet.");
    }

    pretty_section(w, "Dashboard")?;
    writeln!(
        w,
        "{:<8} {:<20} {:>8} {:>6} {:>6} {:>6} {:>8}  {:<11} {}",
        "CALLER", "NAME", "ASSIGNED", "SPOKE", "TRIED", "FOLLOW", "DONE %", "COMPLETED", "PENDING"
    )?;
    for user in &board.users {
        writeln!(
            w,
            "{:<8} {:<20} {:>8} {:>6} {:>6} {:>6} {:>7.2}%  {:<11} {}",
            user.handle,
            user.display_name,
            user.counters.assigned,
            user.counters.spoke,
            user.counters.tried,
            user.counters.followup_required,
            user.completion_pct,
            range_label(user.completed_range),
            range_label(user.pending_range),
        )?;
    }
    pretty_rule(w)?;
    pretty_kv(w, "Assigned", board.totals.assigned.to_string())?;
    pretty_kv(w, "Worked", board.totals.worked().to_string())?;
    pretty_kv(w, "Not worked", board.unset.to_string())?;
    pretty_kv(w, "Completion", format!("{:.2}%", board.completion_pct))
}
