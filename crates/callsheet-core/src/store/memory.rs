//! In-process ledger with per-owner locking.
//!
//! Writes inside a unit of work are staged on the transaction and applied
//! under a single state write lock at commit. A [`Ledger::view`] works on a
//! snapshot taken under one read lock, so a reader sees either all of a
//! reallocation or none of it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::NaiveDate;

use crate::error::{LedgerError, LedgerResult};
use crate::lock::OwnerLocks;
use crate::model::{CounterDelta, User, WorkItem};
use crate::store::{Ledger, LedgerTx, RowStore, UserRegistry, check_outcome};

/// Default time a unit of work waits for its owners.
pub const DEFAULT_OWNER_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Default, Clone)]
struct MemoryState {
    users: BTreeMap<String, User>,
    sets: HashMap<String, Vec<WorkItem>>,
}

/// A ledger held entirely in memory. Safe to share across threads.
#[derive(Debug)]
pub struct MemoryLedger {
    state: RwLock<MemoryState>,
    locks: OwnerLocks,
    lock_timeout: Duration,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::with_lock_timeout(DEFAULT_OWNER_LOCK_TIMEOUT)
    }

    #[must_use]
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(MemoryState::default()),
            locks: OwnerLocks::new(),
            lock_timeout,
        }
    }
}

impl Ledger for MemoryLedger {
    fn transact<T, F>(&self, owners: &[&str], work: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> LedgerResult<T>,
    {
        let guard = self.locks.acquire(owners, self.lock_timeout)?;
        let mut tx = MemoryTx {
            state: &self.state,
            snapshot: None,
            owners: guard.owners(),
            sets: HashMap::new(),
            deltas: HashMap::new(),
            new_users: Vec::new(),
        };
        let value = work(&mut tx)?;
        tx.commit()?;
        drop(guard);
        Ok(value)
    }

    fn view<T, F>(&self, read: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut dyn LedgerTx) -> LedgerResult<T>,
    {
        let snapshot = self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let no_owners = BTreeSet::new();
        let mut tx = MemoryTx {
            state: &self.state,
            snapshot: Some(snapshot),
            owners: &no_owners,
            sets: HashMap::new(),
            deltas: HashMap::new(),
            new_users: Vec::new(),
        };
        read(&mut tx)
    }
}

struct MemoryTx<'a> {
    state: &'a RwLock<MemoryState>,
    /// Set for read-only views.
    snapshot: Option<MemoryState>,
    owners: &'a BTreeSet<String>,
    sets: HashMap<String, Vec<WorkItem>>,
    deltas: HashMap<String, CounterDelta>,
    new_users: Vec<User>,
}

impl MemoryTx<'_> {
    fn with_state<R>(&self, read: impl FnOnce(&MemoryState) -> R) -> R {
        match &self.snapshot {
            Some(snapshot) => read(snapshot),
            None => read(&self.state.read().unwrap_or_else(PoisonError::into_inner)),
        }
    }

    fn ensure_locked(&self, owner: &str) -> LedgerResult<()> {
        if self.owners.contains(owner) {
            Ok(())
        } else {
            Err(LedgerError::Integrity(format!(
                "write to '{owner}' outside of its owner lock"
            )))
        }
    }

    fn stage_set(&mut self, owner: &str, mut items: Vec<WorkItem>) -> LedgerResult<()> {
        for item in &items {
            check_outcome(owner, item)?;
        }
        items.sort_by_key(|item| item.serial_no);
        if let Some(pair) = items.windows(2).find(|pair| pair[0].serial_no == pair[1].serial_no) {
            return Err(LedgerError::Integrity(format!(
                "duplicate serial {} for {owner}",
                pair[0].serial_no
            )));
        }
        self.sets.insert(owner.to_string(), items);
        Ok(())
    }

    /// The user as last committed, without this transaction's deltas.
    fn base_user(&self, email: &str) -> Option<User> {
        self.new_users
            .iter()
            .find(|user| user.email == email)
            .cloned()
            .or_else(|| self.with_state(|state| state.users.get(email).cloned()))
    }

    fn with_pending(&self, mut user: User) -> LedgerResult<User> {
        if let Some(delta) = self.deltas.get(&user.email) {
            user.counters = user.counters.apply(*delta)?;
        }
        Ok(user)
    }

    fn commit(self) -> LedgerResult<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);

        // Registrations for different emails do not share an owner lock.
        for user in &self.new_users {
            if state.users.contains_key(&user.email) {
                return Err(LedgerError::DuplicateUser {
                    key: user.email.clone(),
                });
            }
            if let Some(existing) = state.users.values().find(|existing| {
                existing.username == user.username || existing.user_number == user.user_number
            }) {
                return Err(if existing.username == user.username {
                    LedgerError::DuplicateUser {
                        key: user.username.clone(),
                    }
                } else {
                    LedgerError::Integrity(format!(
                        "user number {} is already taken",
                        user.user_number
                    ))
                });
            }
        }

        // Validate every counter before touching state.
        let mut counters = Vec::with_capacity(self.deltas.len());
        for (email, delta) in &self.deltas {
            let base = self
                .new_users
                .iter()
                .find(|user| &user.email == email)
                .or_else(|| state.users.get(email))
                .ok_or_else(|| LedgerError::UnknownUser {
                    email: email.clone(),
                })?;
            counters.push((email.clone(), base.counters.apply(*delta)?));
        }

        for user in self.new_users {
            state.users.insert(user.email.clone(), user);
        }
        for (email, value) in counters {
            if let Some(user) = state.users.get_mut(&email) {
                user.counters = value;
            }
        }
        for (owner, items) in self.sets {
            state.sets.insert(owner, items);
        }
        Ok(())
    }
}

impl RowStore for MemoryTx<'_> {
    fn list_by_owner(&self, owner: &str) -> LedgerResult<Vec<WorkItem>> {
        if let Some(staged) = self.sets.get(owner) {
            return Ok(staged.clone());
        }
        Ok(self.with_state(|state| state.sets.get(owner).cloned().unwrap_or_default()))
    }

    fn find_by_serial(&self, owner: &str, serial_no: u32) -> LedgerResult<Option<WorkItem>> {
        Ok(self
            .list_by_owner(owner)?
            .into_iter()
            .find(|item| item.serial_no == serial_no))
    }

    fn append_to_owner(&mut self, owner: &str, items: &[WorkItem]) -> LedgerResult<()> {
        self.ensure_locked(owner)?;
        let mut set = self.list_by_owner(owner)?;
        set.extend_from_slice(items);
        self.stage_set(owner, set)
    }

    fn replace_owner_set(&mut self, owner: &str, items: &[WorkItem]) -> LedgerResult<()> {
        self.ensure_locked(owner)?;
        self.stage_set(owner, items.to_vec())
    }

    fn update_item(&mut self, owner: &str, item: &WorkItem) -> LedgerResult<()> {
        self.ensure_locked(owner)?;
        let mut set = self.list_by_owner(owner)?;
        let slot = set
            .iter_mut()
            .find(|existing| existing.serial_no == item.serial_no)
            .ok_or_else(|| LedgerError::NoSuchSerial {
                owner: owner.to_string(),
                serial: item.serial_no,
            })?;
        *slot = item.clone();
        self.stage_set(owner, set)
    }

    fn list_completed_between(
        &self,
        since: NaiveDate,
        until: NaiveDate,
    ) -> LedgerResult<Vec<(String, WorkItem)>> {
        let mut owners: BTreeSet<String> =
            self.with_state(|state| state.sets.keys().cloned().collect());
        owners.extend(self.sets.keys().cloned());

        let mut rows = Vec::new();
        for owner in owners {
            for item in self.list_by_owner(&owner)? {
                if item
                    .completed_at
                    .is_some_and(|date| date >= since && date <= until)
                {
                    rows.push((owner.clone(), item));
                }
            }
        }
        Ok(rows)
    }
}

impl UserRegistry for MemoryTx<'_> {
    fn get(&self, email: &str) -> LedgerResult<Option<User>> {
        self.base_user(email)
            .map(|user| self.with_pending(user))
            .transpose()
    }

    fn find_by_username(&self, username: &str) -> LedgerResult<Option<User>> {
        Ok(self
            .list_users()?
            .into_iter()
            .find(|user| user.username == username))
    }

    fn list_users(&self) -> LedgerResult<Vec<User>> {
        let mut users: Vec<User> =
            self.with_state(|state| state.users.values().cloned().collect());
        users.extend(self.new_users.iter().cloned());
        let mut users = users
            .into_iter()
            .map(|user| self.with_pending(user))
            .collect::<LedgerResult<Vec<_>>>()?;
        users.sort_by_key(|user| user.user_number);
        Ok(users)
    }

    fn insert_user(&mut self, user: &User) -> LedgerResult<()> {
        self.ensure_locked(&user.email)?;
        if self.base_user(&user.email).is_some() {
            return Err(LedgerError::DuplicateUser {
                key: user.email.clone(),
            });
        }
        self.new_users.push(user.clone());
        Ok(())
    }

    fn adjust_counters(&mut self, email: &str, delta: CounterDelta) -> LedgerResult<()> {
        self.ensure_locked(email)?;
        let user = self
            .base_user(email)
            .ok_or_else(|| LedgerError::UnknownUser {
                email: email.to_string(),
            })?;
        let combined = self
            .deltas
            .get(email)
            .copied()
            .unwrap_or_default()
            .combine(delta);
        user.counters.apply(combined)?;
        self.deltas.insert(email.to_string(), combined);
        Ok(())
    }
}
