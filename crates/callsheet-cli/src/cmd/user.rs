//! `callsheet user` — register and list callers.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use callsheet_core::engine::{NewUser, register};
use callsheet_core::model::User;
use callsheet_core::store::Ledger as _;
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::output::{OutputMode, pretty_kv, pretty_section, render_mode};
use crate::project::Project;

#[derive(Subcommand, Debug)]
pub enum UserCommand {
    #[command(
        about = "Register a caller",
        after_help = "EXAMPLES:\n    # Register a caller\n    callsheet user add --name \"Ana Lima\" --username ana --email ana@example.org --password s3cret"
    )]
    Add(AddArgs),

    #[command(
        about = "List registered callers",
        after_help = "EXAMPLES:\n    # List callers in registration order\n    callsheet user list\n\n    # Emit machine-readable output\n    callsheet user list --json"
    )]
    List,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Display name shown on dashboards and reports.
    #[arg(long)]
    pub name: String,

    /// Unique login name.
    #[arg(long)]
    pub username: String,

    /// Unique email; identifies the caller everywhere else.
    #[arg(long)]
    pub email: String,

    /// Password. Only a salted hash is stored.
    #[arg(long)]
    pub password: String,
}

pub fn run_user(command: UserCommand, output: OutputMode, project_root: &Path) -> Result<()> {
    match command {
        UserCommand::Add(args) => run_add(args, output, project_root),
        UserCommand::List => run_list(output, project_root),
    }
}

fn run_add(args: AddArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::discover(project_root)?;
    let (_lock, ledger) = project.open_for_write()?;

    let user = register(
        &ledger,
        NewUser {
            display_name: args.name,
            username: args.username,
            email: args.email,
            password: args.password,
        },
        &project.config.auth.password_policy(),
    )?;

    render_mode(
        output,
        &user,
        |user, w| writeln!(w, "{}\t{}\t{}", user.handle(), user.email, user.username),
        |user, w| {
            writeln!(w, "✓ Registered {}", user.handle())?;
            pretty_kv(w, "Name", &user.display_name)?;
            pretty_kv(w, "Username", &user.username)?;
            pretty_kv(w, "Email", &user.email)
        },
    )
}

#[derive(Debug, Serialize)]
struct UserRow {
    handle: String,
    #[serde(flatten)]
    user: User,
}

fn run_list(output: OutputMode, project_root: &Path) -> Result<()> {
    let project = Project::discover(project_root)?;
    let (_lock, ledger) = project.open_for_read()?;

    let rows: Vec<UserRow> = ledger
        .view(|tx| tx.list_users())?
        .into_iter()
        .map(|user| UserRow {
            handle: user.handle(),
            user,
        })
        .collect();

    render_mode(
        output,
        &rows,
        |rows, w| {
            for row in rows {
                writeln!(
                    w,
                    "{}\t{}\t{}\t{}",
                    row.handle, row.user.email, row.user.username, row.user.display_name
                )?;
            }
            Ok(())
        },
        |rows, w| {
            if rows.is_empty() {
                return writeln!(w, "No callers registered yet.");
            }
            pretty_section(w, &format!("Callers ({})", rows.len()))?;
            for row in rows {
                writeln!(
                    w,
                    "{:<8} {:<28} {:<16} {}",
                    row.handle, row.user.email, row.user.username, row.user.display_name
                )?;
            }
            Ok(())
        },
    )
}
