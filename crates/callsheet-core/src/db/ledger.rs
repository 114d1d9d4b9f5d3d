//! Durable [`Ledger`] backed by SQLite.
//!
//! Each unit of work is one `BEGIN IMMEDIATE` transaction: the write lock is
//! taken up front, every statement runs against it, and any error rolls the
//! whole unit back when the transaction is dropped.

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{Connection, ErrorCode as SqliteCode, OptionalExtension, TransactionBehavior, params};

use crate::db::schema::{USER_COLUMNS, WORK_ITEM_COLUMNS};
use crate::db::{migrations, open_ledger_db, open_ledger_db_with, try_open_ledger_db};
use crate::error::{LedgerError, LedgerResult};
use crate::model::{CounterDelta, Counters, Payload, Priority, Status, User, WorkItem};
use crate::store::{Ledger, LedgerTx, RowStore, UserRegistry, check_outcome};

/// SQLite-backed ledger. The connection is serialized behind a mutex.
#[derive(Debug)]
pub struct SqliteLedger {
    conn: Mutex<Connection>,
}

impl SqliteLedger {
    /// Open (or create) the ledger file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(open_ledger_db(path)?))
    }

    /// Like [`SqliteLedger::open`] with an explicit SQLite busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_with(path: &Path, busy_timeout: Duration) -> Result<Self> {
        Ok(Self::from_connection(open_ledger_db_with(path, busy_timeout)?))
    }

    /// Open an existing ledger file, or `None` when there is none yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be opened.
    pub fn try_open(path: &Path, busy_timeout: Duration) -> Result<Option<Self>> {
        Ok(try_open_ledger_db(path, busy_timeout)?.map(Self::from_connection))
    }

    /// A migrated, private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::migrate(&mut conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Wrap an already configured and migrated connection.
    #[must_use]
    pub const fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn run<T, F>(&self, behavior: TransactionBehavior, writable: bool, work: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> LedgerResult<T>,
    {
        let mut conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let tx = conn.transaction_with_behavior(behavior)?;
        let value = {
            let mut unit = SqliteTx {
                conn: &tx,
                writable,
            };
            work(&mut unit)?
        };
        tx.commit()?;
        Ok(value)
    }
}

impl Ledger for SqliteLedger {
    fn transact<T, F>(&self, _owners: &[&str], work: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> LedgerResult<T>,
    {
        self.run(TransactionBehavior::Immediate, true, work)
    }

    fn view<T, F>(&self, read: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> LedgerResult<T>,
    {
        self.run(TransactionBehavior::Deferred, false, read)
    }
}

struct SqliteTx<'a> {
    conn: &'a Connection,
    writable: bool,
}

impl SqliteTx<'_> {
    fn ensure_writable(&self) -> LedgerResult<()> {
        if self.writable {
            Ok(())
        } else {
            Err(LedgerError::Integrity(
                "write attempted inside a read-only view".to_string(),
            ))
        }
    }

    fn insert_items(&self, owner: &str, items: &[WorkItem]) -> LedgerResult<()> {
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO work_items (
                owner_email, serial_no, name, phone, membership_number, sex,
                designation, organization, location, status, priority,
                new_location, completed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        )?;
        for item in items {
            check_outcome(owner, item)?;
            stmt.execute(params![
                owner,
                item.serial_no,
                item.payload.name,
                item.payload.phone,
                item.payload.membership_number,
                item.payload.sex,
                item.payload.designation,
                item.payload.organization,
                item.payload.location,
                item.status,
                item.priority,
                item.new_location,
                item.completed_at,
            ])
            .map_err(|err| {
                if is_constraint(&err) {
                    LedgerError::Integrity(format!(
                        "serial {} already exists for {owner}",
                        item.serial_no
                    ))
                } else {
                    err.into()
                }
            })?;
        }
        Ok(())
    }
}

impl RowStore for SqliteTx<'_> {
    fn list_by_owner(&self, owner: &str) -> LedgerResult<Vec<WorkItem>> {
        let sql = format!(
            "SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE owner_email = ?1 ORDER BY serial_no"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([owner], |row| item_from_row(row, 0))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn find_by_serial(&self, owner: &str, serial_no: u32) -> LedgerResult<Option<WorkItem>> {
        let sql = format!(
            "SELECT {WORK_ITEM_COLUMNS} FROM work_items WHERE owner_email = ?1 AND serial_no = ?2"
        );
        Ok(self
            .conn
            .query_row(&sql, params![owner, serial_no], |row| item_from_row(row, 0))
            .optional()?)
    }

    fn append_to_owner(&mut self, owner: &str, items: &[WorkItem]) -> LedgerResult<()> {
        self.ensure_writable()?;
        self.insert_items(owner, items)
    }

    fn replace_owner_set(&mut self, owner: &str, items: &[WorkItem]) -> LedgerResult<()> {
        self.ensure_writable()?;
        self.conn
            .execute("DELETE FROM work_items WHERE owner_email = ?1", [owner])?;
        self.insert_items(owner, items)
    }

    fn update_item(&mut self, owner: &str, item: &WorkItem) -> LedgerResult<()> {
        self.ensure_writable()?;
        check_outcome(owner, item)?;
        let changed = self.conn.execute(
            "UPDATE work_items SET
                name = ?3, phone = ?4, membership_number = ?5, sex = ?6,
                designation = ?7, organization = ?8, location = ?9,
                status = ?10, priority = ?11, new_location = ?12, completed_at = ?13
             WHERE owner_email = ?1 AND serial_no = ?2",
            params![
                owner,
                item.serial_no,
                item.payload.name,
                item.payload.phone,
                item.payload.membership_number,
                item.payload.sex,
                item.payload.designation,
                item.payload.organization,
                item.payload.location,
                item.status,
                item.priority,
                item.new_location,
                item.completed_at,
            ],
        )?;
        if changed == 0 {
            return Err(LedgerError::NoSuchSerial {
                owner: owner.to_string(),
                serial: item.serial_no,
            });
        }
        Ok(())
    }

    fn list_completed_between(
        &self,
        since: NaiveDate,
        until: NaiveDate,
    ) -> LedgerResult<Vec<(String, WorkItem)>> {
        let sql = format!(
            "SELECT owner_email, {WORK_ITEM_COLUMNS} FROM work_items
             WHERE completed_at IS NOT NULL AND completed_at BETWEEN ?1 AND ?2
             ORDER BY owner_email, serial_no"
        );
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params![since, until], |row| {
            Ok((row.get::<_, String>(0)?, item_from_row(row, 1)?))
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl UserRegistry for SqliteTx<'_> {
    fn get(&self, email: &str) -> LedgerResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
        Ok(self.conn.query_row(&sql, [email], user_from_row).optional()?)
    }

    fn find_by_username(&self, username: &str) -> LedgerResult<Option<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE username = ?1");
        Ok(self
            .conn
            .query_row(&sql, [username], user_from_row)
            .optional()?)
    }

    fn list_users(&self) -> LedgerResult<Vec<User>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY user_number");
        let mut stmt = self.conn.prepare_cached(&sql)?;
        let rows = stmt.query_map([], user_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn insert_user(&mut self, user: &User) -> LedgerResult<()> {
        self.ensure_writable()?;
        self.conn
            .execute(
                "INSERT INTO users (
                    email, user_number, username, display_name, password_hash,
                    assigned, spoke, tried, followup_required
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    user.email,
                    user.user_number,
                    user.username,
                    user.display_name,
                    user.password_hash,
                    counter_to_sql(user.counters.assigned)?,
                    counter_to_sql(user.counters.spoke)?,
                    counter_to_sql(user.counters.tried)?,
                    counter_to_sql(user.counters.followup_required)?,
                ],
            )
            .map_err(|err| {
                if is_constraint(&err) {
                    LedgerError::DuplicateUser {
                        key: user.email.clone(),
                    }
                } else {
                    err.into()
                }
            })?;
        Ok(())
    }

    fn adjust_counters(&mut self, email: &str, delta: CounterDelta) -> LedgerResult<()> {
        self.ensure_writable()?;
        let user = self.get(email)?.ok_or_else(|| LedgerError::UnknownUser {
            email: email.to_string(),
        })?;
        let next = user.counters.apply(delta)?;
        self.conn.execute(
            "UPDATE users SET assigned = ?2, spoke = ?3, tried = ?4, followup_required = ?5
             WHERE email = ?1",
            params![
                email,
                counter_to_sql(next.assigned)?,
                counter_to_sql(next.spoke)?,
                counter_to_sql(next.tried)?,
                counter_to_sql(next.followup_required)?,
            ],
        )?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn item_from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<WorkItem> {
    Ok(WorkItem {
        serial_no: row.get(offset)?,
        payload: Payload {
            name: row.get(offset + 1)?,
            phone: row.get(offset + 2)?,
            membership_number: row.get(offset + 3)?,
            sex: row.get(offset + 4)?,
            designation: row.get(offset + 5)?,
            organization: row.get(offset + 6)?,
            location: row.get(offset + 7)?,
        },
        status: row.get(offset + 8)?,
        priority: row.get(offset + 9)?,
        new_location: row.get(offset + 10)?,
        completed_at: row.get(offset + 11)?,
    })
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        email: row.get(0)?,
        user_number: row.get(1)?,
        username: row.get(2)?,
        display_name: row.get(3)?,
        password_hash: row.get(4)?,
        counters: Counters {
            assigned: counter_from_sql(row, 5)?,
            spoke: counter_from_sql(row, 6)?,
            tried: counter_from_sql(row, 7)?,
            followup_required: counter_from_sql(row, 8)?,
        },
    })
}

fn counter_from_sql(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<u64> {
    let raw: i64 = row.get(idx)?;
    u64::try_from(raw).map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Integer, Box::new(err))
    })
}

fn counter_to_sql(value: u64) -> LedgerResult<i64> {
    i64::try_from(value)
        .map_err(|_| LedgerError::Integrity(format!("counter {value} exceeds storage range")))
}

fn is_constraint(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(inner, _) if inner.code == SqliteCode::ConstraintViolation
    )
}

impl ToSql for Status {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Status {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}

impl ToSql for Priority {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Priority {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value
            .as_str()?
            .parse()
            .map_err(|err| FromSqlError::Other(Box::new(err)))
    }
}
