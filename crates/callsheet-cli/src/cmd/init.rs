use crate::output::{OutputMode, pretty_kv, render_mode};
use crate::project::{LEDGER_FILE, LOCK_FILE};
use anyhow::{Context as _, Result};
use callsheet_core::config::PROJECT_DIR;
use callsheet_core::db::SqliteLedger;
use clap::Args;
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use tracing::info;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite the config template even if `.callsheet/` already exists.
    /// The ledger itself is never deleted.
    #[arg(long)]
    pub force: bool,
}

const CONFIG_TOML: &str = "[ledger]\n\
    lock_timeout_ms = 5000\n\
    busy_timeout_ms = 5000\n\
    \n\
    [import]\n\
    skip_invalid = false\n\
    \n\
    [auth]\n\
    pbkdf2_rounds = 210000\n";

const GITIGNORE: &str = "ledger.db\nledger.db-wal\nledger.db-shm\nledger.lock\n";

#[derive(Debug, Serialize)]
struct InitOutput {
    project_dir: String,
    ledger: String,
    config: String,
}

/// Execute `callsheet init`. Creates:
///
/// ```text
/// .callsheet/
///   ledger.db      (empty ledger with current schema)
///   config.toml    (default project config)
///   .gitignore     (ledger.db*, ledger.lock)
/// ```
///
/// # Errors
///
/// Returns an error if `.callsheet/` already exists and `--force` is not
/// set, or if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let project_dir = project_root.join(PROJECT_DIR);

    if project_dir.exists() && !args.force {
        anyhow::bail!(
            "{PROJECT_DIR}/ already exists. Use `callsheet init --force` to rewrite its config."
        );
    }

    std::fs::create_dir_all(&project_dir).with_context(|| {
        format!(
            "Failed to create project directory: {}",
            project_dir.display()
        )
    })?;

    let config_path = project_dir.join("config.toml");
    std::fs::write(&config_path, CONFIG_TOML)
        .with_context(|| format!("Failed to write config: {}", config_path.display()))?;

    let gitignore_path = project_dir.join(".gitignore");
    std::fs::write(&gitignore_path, GITIGNORE)
        .with_context(|| format!("Failed to write .gitignore: {}", gitignore_path.display()))?;

    let ledger_path = project_dir.join(LEDGER_FILE);
    SqliteLedger::open(&ledger_path)
        .with_context(|| format!("Failed to create ledger: {}", ledger_path.display()))?;
    // Touch the lock file so readers never race to create it.
    std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(project_dir.join(LOCK_FILE))
        .context("Failed to create lock file")?;

    info!(path = %project_dir.display(), "initialized project");

    let out = InitOutput {
        project_dir: format!("{PROJECT_DIR}/"),
        ledger: format!("{PROJECT_DIR}/{LEDGER_FILE}"),
        config: format!("{PROJECT_DIR}/config.toml"),
    };
    render_mode(
        output,
        &out,
        |out, w| writeln!(w, "initialized\t{}", out.project_dir),
        |out, w| {
            writeln!(w, "✓ Initialized {} project structure.", out.project_dir)?;
            writeln!(w)?;
            pretty_kv(w, "Ledger", &out.ledger)?;
            pretty_kv(w, "Config", &out.config)?;
            writeln!(w)?;
            writeln!(w, "Next steps:")?;
            writeln!(w, "  Register a caller:")?;
            writeln!(
                w,
                "    callsheet user add --name \"Ana\" --username ana --email ana@example.org --password secret"
            )?;
            writeln!(w)?;
            writeln!(w, "  Give them rows from a JSONL upload:")?;
            writeln!(w, "    callsheet allocate --to ana@example.org contacts.jsonl")
        },
    )
}
