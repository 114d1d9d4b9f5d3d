//! Collaborator contracts for the engines.
//!
//! The engines never talk to a concrete backend. They run inside
//! [`Ledger::transact`], which hands them a [`LedgerTx`]: the row store and
//! the user registry viewed through one all-or-nothing unit of work.
//!
//! Backends:
//! - [`memory::MemoryLedger`] — in-process, per-owner locking
//! - [`crate::db::SqliteLedger`] — durable, one `BEGIN IMMEDIATE` per unit

pub mod memory;

use chrono::NaiveDate;

use crate::error::{LedgerError, LedgerResult};
use crate::model::{CounterDelta, User, WorkItem};

/// Reject a row whose `completed_at` disagrees with its status before a
/// backend stores it.
pub(crate) fn check_outcome(owner: &str, item: &WorkItem) -> LedgerResult<()> {
    if item.outcome_is_consistent() {
        return Ok(());
    }
    Err(LedgerError::Integrity(format!(
        "serial {} for {owner} has status {} but completed_at {:?}",
        item.serial_no, item.status, item.completed_at
    )))
}

/// Rows grouped by owner, keyed by `(owner, serial_no)`.
pub trait RowStore {
    /// The owner's rows in ascending serial order.
    fn list_by_owner(&self, owner: &str) -> LedgerResult<Vec<WorkItem>>;

    fn find_by_serial(&self, owner: &str, serial_no: u32) -> LedgerResult<Option<WorkItem>>;

    /// Add rows to an owner's set. Serial numbers must not collide.
    fn append_to_owner(&mut self, owner: &str, items: &[WorkItem]) -> LedgerResult<()>;

    /// Overwrite an owner's whole set.
    fn replace_owner_set(&mut self, owner: &str, items: &[WorkItem]) -> LedgerResult<()>;

    /// Overwrite one row in place, matched by serial number.
    fn update_item(&mut self, owner: &str, item: &WorkItem) -> LedgerResult<()>;

    /// Rows of every owner whose `completed_at` falls in `[since, until]`,
    /// as `(owner, item)` pairs.
    fn list_completed_between(
        &self,
        since: NaiveDate,
        until: NaiveDate,
    ) -> LedgerResult<Vec<(String, WorkItem)>>;
}

/// Registered users and their cumulative counters.
pub trait UserRegistry {
    fn get(&self, email: &str) -> LedgerResult<Option<User>>;

    fn find_by_username(&self, username: &str) -> LedgerResult<Option<User>>;

    /// All users in registration order.
    fn list_users(&self) -> LedgerResult<Vec<User>>;

    fn insert_user(&mut self, user: &User) -> LedgerResult<()>;

    fn adjust_counters(&mut self, email: &str, delta: CounterDelta) -> LedgerResult<()>;
}

/// The view an engine gets inside one unit of work.
pub trait LedgerTx: RowStore + UserRegistry {}

impl<T: RowStore + UserRegistry> LedgerTx for T {}

/// A backend able to run units of work atomically.
pub trait Ledger {
    /// Run `work` with exclusive access to the rows and counters of
    /// `owners`. Every write `work` makes becomes visible at once when it
    /// returns `Ok`, and none does when it returns `Err`.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `work`, or a store/lock failure.
    fn transact<T, F>(&self, owners: &[&str], work: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> LedgerResult<T>;

    /// Read-only access. Writes attempted inside `read` are rejected by
    /// backends that track owner locks.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `read`.
    fn view<T, F>(&self, read: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> LedgerResult<T>,
    {
        self.transact(&[], read)
    }
}
