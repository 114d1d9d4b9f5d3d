use std::io::Write;
use std::path::Path;

use anyhow::Result;
use callsheet_core::engine::{ReallocateRequest, reallocate};
use clap::Args;

use crate::output::{OutputMode, pretty_kv, render_mode};
use crate::project::Project;

#[derive(Args, Debug)]
pub struct ReallocateArgs {
    /// Caller giving up the rows.
    #[arg(long, value_name = "EMAIL")]
    pub from: String,

    /// Caller receiving the rows.
    #[arg(long, value_name = "EMAIL")]
    pub to: String,

    /// First serial of the range, inclusive.
    #[arg(long)]
    pub start: u32,

    /// Last serial of the range, inclusive.
    #[arg(long)]
    pub end: u32,
}

/// Execute `callsheet reallocate`.
pub fn run_reallocate(args: &ReallocateArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::discover(project_root)?;
    let (_lock, ledger) = project.open_for_write()?;

    let moved = reallocate(
        &ledger,
        &ReallocateRequest {
            from: args.from.clone(),
            to: args.to.clone(),
            start: args.start,
            end: args.end,
        },
    )?;

    render_mode(
        output,
        &moved,
        |moved, w| {
            for serial in &moved.serials {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}",
                    moved.from, serial.old_serial, moved.to, serial.new_serial
                )?;
            }
            Ok(())
        },
        |moved, w| {
            if moved.serials.is_empty() {
                return writeln!(w, "Nothing moved: {} already holds these rows.", moved.to);
            }
            writeln!(
                w,
                "✓ Moved {} rows from {} to {}",
                moved.moved, moved.from, moved.to
            )?;
            for serial in &moved.serials {
                pretty_kv(
                    w,
                    &format!("#{}", serial.old_serial),
                    format!("now #{}", serial.new_serial),
                )?;
            }
            Ok(())
        },
    )
}
