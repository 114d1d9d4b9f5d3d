//! Canonical SQLite schema for the callsheet ledger.
//!
//! - `users` is the registry: identity plus the four cumulative counters
//! - `work_items` holds every row keyed by `(owner_email, serial_no)`
//! - `ledger_meta` records the applied schema version

/// Migration v1: registry, rows and metadata.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS users (
    email TEXT PRIMARY KEY CHECK (length(trim(email)) > 0),
    user_number INTEGER NOT NULL UNIQUE CHECK (user_number > 0),
    username TEXT NOT NULL UNIQUE CHECK (length(trim(username)) > 0),
    display_name TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    assigned INTEGER NOT NULL DEFAULT 0 CHECK (assigned >= 0),
    spoke INTEGER NOT NULL DEFAULT 0 CHECK (spoke >= 0),
    tried INTEGER NOT NULL DEFAULT 0 CHECK (tried >= 0),
    followup_required INTEGER NOT NULL DEFAULT 0 CHECK (followup_required >= 0)
);

CREATE TABLE IF NOT EXISTS work_items (
    owner_email TEXT NOT NULL REFERENCES users(email),
    serial_no INTEGER NOT NULL CHECK (serial_no > 0),
    name TEXT NOT NULL,
    phone TEXT,
    membership_number TEXT,
    sex TEXT,
    designation TEXT,
    organization TEXT,
    location TEXT,
    status TEXT NOT NULL DEFAULT 'unset'
        CHECK (status IN ('unset', 'spoke', 'tried', 'followup_required')),
    priority TEXT NOT NULL DEFAULT 'none'
        CHECK (priority IN ('none', 'high', 'medium', 'low')),
    new_location TEXT,
    completed_at TEXT,
    PRIMARY KEY (owner_email, serial_no),
    CHECK ((status = 'unset') = (completed_at IS NULL))
);

CREATE TABLE IF NOT EXISTS ledger_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL
);

INSERT OR IGNORE INTO ledger_meta (id, schema_version) VALUES (1, 1);
";

/// Migration v2: read-path indexes for dashboards and date-filtered reports.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_work_items_owner_status
    ON work_items(owner_email, status);

CREATE INDEX IF NOT EXISTS idx_work_items_completed
    ON work_items(completed_at)
    WHERE completed_at IS NOT NULL;
";

/// Indexes the latest schema is expected to carry.
pub const REQUIRED_INDEXES: &[&str] = &["idx_work_items_owner_status", "idx_work_items_completed"];

/// Column list shared by every `work_items` read.
pub const WORK_ITEM_COLUMNS: &str = "serial_no, name, phone, membership_number, sex, \
     designation, organization, location, status, priority, new_location, completed_at";

/// Column list shared by every `users` read.
pub const USER_COLUMNS: &str = "email, user_number, username, display_name, password_hash, \
     assigned, spoke, tried, followup_required";
