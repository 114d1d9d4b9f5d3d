use std::fmt;

/// Machine-readable error codes for scripted callers and the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    UnknownUser,
    DuplicateUser,
    NoSuchSerial,
    EmptyRange,
    InvalidRange,
    InvalidDateRange,
    InvalidInput,
    StoreUnavailable,
    LockContention,
    IntegrityViolation,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::UnknownUser => "E2001",
            Self::DuplicateUser => "E2002",
            Self::NoSuchSerial => "E2003",
            Self::EmptyRange => "E2004",
            Self::InvalidRange => "E2005",
            Self::InvalidDateRange => "E2006",
            Self::InvalidInput => "E2007",
            Self::StoreUnavailable => "E5001",
            Self::LockContention => "E5002",
            Self::IntegrityViolation => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::UnknownUser => "Unknown user",
            Self::DuplicateUser => "User already registered",
            Self::NoSuchSerial => "No row with that serial number",
            Self::EmptyRange => "Serial range selects no rows",
            Self::InvalidRange => "Invalid serial range",
            Self::InvalidDateRange => "Invalid date range",
            Self::InvalidInput => "Invalid input",
            Self::StoreUnavailable => "Ledger store unavailable",
            Self::LockContention => "Lock contention",
            Self::IntegrityViolation => "Ledger integrity violation",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `callsheet init` to create a ledger here."),
            Self::ConfigParseError => Some("Fix syntax in .callsheet/config.toml and retry."),
            Self::UnknownUser => Some("List registered users with `callsheet user list`."),
            Self::DuplicateUser => Some("Pick a different email or username."),
            Self::NoSuchSerial => Some("List the user's rows with `callsheet rows --owner <email>`."),
            Self::EmptyRange => Some("Check the source user's serial numbers before reallocating."),
            Self::InvalidRange => Some("The start serial must not exceed the end serial."),
            Self::InvalidDateRange => Some("The start date must not be after the end date."),
            Self::InvalidInput => None,
            Self::StoreUnavailable => Some("Check disk space and permissions, then retry."),
            Self::LockContention => {
                Some("Retry after the other `callsheet` process releases its lock.")
            }
            Self::IntegrityViolation => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Every failure an engine or ledger operation can report.
///
/// Messages name the precondition that was violated so an administrator can
/// act on them directly.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("unknown user '{email}'")]
    UnknownUser { email: String },

    #[error("user '{key}' is already registered")]
    DuplicateUser { key: String },

    #[error("no row with serial {serial} for {owner}")]
    NoSuchSerial { owner: String, serial: u32 },

    #[error("no rows in serial range {start}-{end} for {owner}")]
    EmptyRange { owner: String, start: u32, end: u32 },

    #[error("invalid serial range {start}-{end}: start is after end")]
    InvalidRange { start: u32, end: u32 },

    #[error("invalid date range {since} to {until}: start is after end")]
    InvalidDateRange {
        since: chrono::NaiveDate,
        until: chrono::NaiveDate,
    },

    #[error("invalid {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("ledger store unavailable: {context}: {source}")]
    StoreUnavailable {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("timed out after {waited_ms}ms waiting for {resource}")]
    LockContention { resource: String, waited_ms: u128 },

    #[error("ledger integrity violation: {0}")]
    Integrity(String),
}

impl LedgerError {
    /// Wrap a collaborator failure with a short description of what was
    /// being attempted.
    pub fn store(
        context: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::StoreUnavailable {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownUser { .. } => ErrorCode::UnknownUser,
            Self::DuplicateUser { .. } => ErrorCode::DuplicateUser,
            Self::NoSuchSerial { .. } => ErrorCode::NoSuchSerial,
            Self::EmptyRange { .. } => ErrorCode::EmptyRange,
            Self::InvalidRange { .. } => ErrorCode::InvalidRange,
            Self::InvalidDateRange { .. } => ErrorCode::InvalidDateRange,
            Self::InvalidInput { .. } => ErrorCode::InvalidInput,
            Self::StoreUnavailable { .. } => ErrorCode::StoreUnavailable,
            Self::LockContention { .. } => ErrorCode::LockContention,
            Self::Integrity(_) => ErrorCode::IntegrityViolation,
        }
    }

    /// Remediation hint for operators, falling back to the code summary.
    #[must_use]
    pub fn suggestion(&self) -> String {
        self.code()
            .hint()
            .unwrap_or_else(|| self.code().message())
            .to_string()
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        Self::store("sqlite", err)
    }
}

/// Result alias used by the engines and ledger traits.
pub type LedgerResult<T> = Result<T, LedgerError>;
