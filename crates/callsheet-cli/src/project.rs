//! Locating a `.callsheet/` project and opening its ledger under the
//! process-level lock.

use anyhow::{Context as _, Result};
use callsheet_core::config::{PROJECT_DIR, ProjectConfig, load_project_config};
use callsheet_core::db::SqliteLedger;
use callsheet_core::error::{ErrorCode, LedgerError};
use callsheet_core::lock::{LedgerReadLock, LedgerWriteLock};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const LEDGER_FILE: &str = "ledger.db";
pub const LOCK_FILE: &str = "ledger.lock";

/// Failures locating or configuring a project, before any ledger work.
#[derive(Debug)]
pub enum ProjectError {
    NotInitialized { searched_from: PathBuf },
    BadConfig { detail: String },
}

impl ProjectError {
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::BadConfig { .. } => ErrorCode::ConfigParseError,
        }
    }
}

impl std::fmt::Display for ProjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotInitialized { searched_from } => write!(
                f,
                "no {PROJECT_DIR}/ ledger found in {} or any parent",
                searched_from.display()
            ),
            Self::BadConfig { detail } => write!(f, "{detail}"),
        }
    }
}

impl std::error::Error for ProjectError {}

#[derive(Debug)]
pub struct Project {
    root: PathBuf,
    pub config: ProjectConfig,
}

fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();
    loop {
        if current.join(PROJECT_DIR).is_dir() {
            return Some(current);
        }
        if !current.pop() {
            return None;
        }
    }
}

impl Project {
    /// Find the nearest project at or above `start` and load its config.
    ///
    /// # Errors
    ///
    /// [`ProjectError`] when there is no project or its config is malformed.
    pub fn discover(start: &Path) -> Result<Self> {
        let root = find_project_root(start).ok_or_else(|| ProjectError::NotInitialized {
            searched_from: start.to_path_buf(),
        })?;
        let config = load_project_config(&root).map_err(|err| ProjectError::BadConfig {
            detail: format!("{err:#}"),
        })?;
        debug!(root = %root.display(), "found project");
        Ok(Self { root, config })
    }

    pub fn dir(&self) -> PathBuf {
        self.root.join(PROJECT_DIR)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir().join(LEDGER_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.dir().join(LOCK_FILE)
    }

    /// Take the exclusive project lock and open the ledger for writing.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock times out or the ledger cannot be opened.
    pub fn open_for_write(&self) -> Result<(LedgerWriteLock, SqliteLedger)> {
        let lock = LedgerWriteLock::acquire(&self.lock_path(), self.config.ledger.lock_timeout())
            .map_err(LedgerError::from)?;
        let ledger = SqliteLedger::open_with(&self.ledger_path(), self.config.ledger.busy_timeout())
            .with_context(|| format!("open ledger {}", self.ledger_path().display()))?;
        Ok((lock, ledger))
    }

    /// Take a shared project lock and open the ledger for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock times out, or
    /// [`ProjectError::NotInitialized`] when nothing has been written yet.
    pub fn open_for_read(&self) -> Result<(LedgerReadLock, SqliteLedger)> {
        let lock = LedgerReadLock::acquire(&self.lock_path(), self.config.ledger.lock_timeout())
            .map_err(LedgerError::from)?;
        let ledger = SqliteLedger::try_open(&self.ledger_path(), self.config.ledger.busy_timeout())
            .with_context(|| format!("open ledger {}", self.ledger_path().display()))?
            .ok_or_else(|| ProjectError::NotInitialized {
                searched_from: self.root.clone(),
            })?;
        Ok((lock, ledger))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discover_walks_up_to_project_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(PROJECT_DIR)).unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let project = Project::discover(&nested).unwrap();
        assert_eq!(project.dir(), dir.path().join(PROJECT_DIR));
        assert_eq!(
            project.ledger_path(),
            dir.path().join(PROJECT_DIR).join(LEDGER_FILE)
        );
    }

    #[test]
    fn discover_without_project_is_not_initialized() {
        let dir = tempfile::tempdir().unwrap();
        let err = Project::discover(dir.path()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProjectError>(),
            Some(ProjectError::NotInitialized { .. })
        ));
    }

    #[test]
    fn malformed_config_is_reported_as_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let project_dir = dir.path().join(PROJECT_DIR);
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(project_dir.join("config.toml"), "[ledger\n").unwrap();

        let err = Project::discover(dir.path()).unwrap_err();
        let project_err = err.downcast_ref::<ProjectError>().unwrap();
        assert_eq!(project_err.code(), ErrorCode::ConfigParseError);
    }

    #[test]
    fn read_before_first_write_is_not_initialized() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(PROJECT_DIR)).unwrap();
        let project = Project::discover(dir.path()).unwrap();

        let err = project.open_for_read().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProjectError>(),
            Some(ProjectError::NotInitialized { .. })
        ));
        assert!(!project.ledger_path().exists());
    }
}
