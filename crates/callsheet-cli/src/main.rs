#![forbid(unsafe_code)]

mod cmd;
mod output;
mod project;

use callsheet_core::config::load_user_config;
use clap::{Parser, Subcommand};
use output::{CliError, OutputMode, render_error, resolve_output_mode};
use std::env;
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "callsheet: outreach call-list allocation and progress tracking",
    long_about = None
)]
struct Cli {
    /// Enable debug logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only log warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Output format: pretty, text or json.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Shorthand for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Setup",
        about = "Initialize a callsheet project",
        long_about = "Create .callsheet/ with an empty ledger and a default config in the current directory.",
        after_help = "EXAMPLES:\n    # Initialize a project in the current directory\n    callsheet init\n\n    # Emit machine-readable output\n    callsheet init --json"
    )]
    Init(cmd::init::InitArgs),

    #[command(next_help_heading = "Setup", about = "Register and list callers")]
    User {
        #[command(subcommand)]
        command: cmd::user::UserCommand,
    },

    #[command(
        next_help_heading = "Admin",
        about = "Append uploaded rows to a caller",
        long_about = "Append JSONL or CSV contact rows to a caller's list, numbered after their highest serial.",
        after_help = "EXAMPLES:\n    # Allocate an upload\n    callsheet allocate --to ana@example.org contacts.jsonl\n\n    # Allocate a CSV sheet with a header row\n    callsheet allocate --to ana@example.org sheet.csv\n\n    # Read the upload from stdin, dropping malformed lines\n    cat contacts.jsonl | callsheet allocate --to ana@example.org --skip-invalid"
    )]
    Allocate(cmd::allocate::AllocateArgs),

    #[command(
        next_help_heading = "Admin",
        about = "Move a serial range to another caller",
        long_about = "Move the rows in a serial range from one caller to another. The receiver's list is renumbered from 1; the giver keeps its remaining serials.",
        after_help = "EXAMPLES:\n    # Hand over rows 10 to 20\n    callsheet reallocate --from ana@example.org --to bo@example.org --start 10 --end 20\n\n    # Emit machine-readable output\n    callsheet reallocate --from ana@example.org --to bo@example.org --start 10 --end 20 --json"
    )]
    Reallocate(cmd::reallocate::ReallocateArgs),

    #[command(
        next_help_heading = "Calls",
        about = "Record the outcome of a call",
        long_about = "Record an outcome against one of a caller's rows and credit it to that caller.",
        after_help = "EXAMPLES:\n    # Record a conversation\n    callsheet submit --email ana@example.org --serial 3 --outcome spoke\n\n    # Record a callback with a priority and a dated completion\n    callsheet submit --email ana@example.org --serial 4 --outcome sf --priority high --date 2026-03-01"
    )]
    Submit(cmd::submit::SubmitArgs),

    #[command(
        next_help_heading = "Calls",
        about = "List a caller's rows",
        after_help = "EXAMPLES:\n    # Every row\n    callsheet rows --owner ana@example.org\n\n    # Rows not yet worked\n    callsheet rows --owner ana@example.org --status unset"
    )]
    Rows(cmd::rows::RowsArgs),

    #[command(
        next_help_heading = "Reporting",
        about = "Show progress per caller",
        after_help = "EXAMPLES:\n    # Show the dashboard\n    callsheet dashboard\n\n    # Emit machine-readable output\n    callsheet dashboard --json"
    )]
    Dashboard,

    #[command(
        next_help_heading = "Reporting",
        about = "Export completed rows as JSONL",
        long_about = "Export every row completed within an inclusive date range, one JSON object per line.",
        after_help = "EXAMPLES:\n    # Export March to stdout\n    callsheet report --since 2026-03-01 --until 2026-03-31\n\n    # Write to a file\n    callsheet report --since 2026-03-01 --until 2026-03-31 --output march.jsonl"
    )]
    Report(cmd::report::ReportArgs),
}

fn init_tracing(verbose: bool, quiet: bool) {
    let filter = EnvFilter::try_from_env("CALLSHEET_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "callsheet=debug,callsheet_core=debug,info"
        } else if quiet {
            "warn"
        } else {
            "callsheet=info,callsheet_core=info,warn"
        })
    });

    let format = env::var("CALLSHEET_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    // Logs go to stderr so stdout stays parseable.
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    let user_config = load_user_config().unwrap_or_else(|err| {
        warn!(error = %format!("{err:#}"), "ignoring unreadable user config");
        callsheet_core::config::UserConfig::default()
    });
    let output = resolve_output_mode(cli.format, cli.json, user_config.output.as_deref());

    let result = std::env::current_dir()
        .map_err(anyhow::Error::from)
        .and_then(|project_root| run(cli.command, output, &project_root));

    if let Err(err) = result {
        debug!(error = ?err, "command failed");
        if let Err(render_err) = render_error(output, &CliError::from(&err)) {
            eprintln!("error: {err:#} ({render_err})");
        }
        std::process::exit(1);
    }
}

fn run(command: Commands, output: OutputMode, project_root: &std::path::Path) -> anyhow::Result<()> {
    match command {
        Commands::Init(args) => cmd::init::run_init(&args, output, project_root),
        Commands::User { command } => cmd::user::run_user(command, output, project_root),
        Commands::Allocate(args) => cmd::allocate::run_allocate(&args, output, project_root),
        Commands::Reallocate(args) => {
            cmd::reallocate::run_reallocate(&args, output, project_root)
        }
        Commands::Submit(args) => cmd::submit::run_submit(&args, output, project_root),
        Commands::Rows(args) => cmd::rows::run_rows(&args, output, project_root),
        Commands::Dashboard => cmd::dashboard::run_dashboard(output, project_root),
        Commands::Report(args) => cmd::report::run_report(&args, project_root),
    }
}
