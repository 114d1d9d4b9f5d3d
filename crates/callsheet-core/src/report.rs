//! Read-only views over the ledger: the progress dashboard and the
//! date-bounded outcome report.

use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::model::{Counters, User, WorkItem};
use crate::store::Ledger;

/// An inclusive span of serial numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SerialRange {
    pub first: u32,
    pub last: u32,
}

impl fmt::Display for SerialRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.last)
    }
}

/// One dashboard row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProgress {
    pub handle: String,
    pub email: String,
    pub display_name: String,
    #[serde(flatten)]
    pub counters: Counters,
    pub completion_pct: f64,
    pub completed_range: Option<SerialRange>,
    pub pending_range: Option<SerialRange>,
    /// Rows currently held with no outcome.
    pub unset: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub users: Vec<UserProgress>,
    pub totals: Counters,
    pub unset: usize,
    pub completion_pct: f64,
}

/// A worked row tagged with its current owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutcomeRow {
    pub owner_email: String,
    pub owner_name: String,
    #[serde(flatten)]
    pub item: WorkItem,
}

/// `worked / assigned * 100` rounded to two places; `0.0` when nothing is
/// assigned. Not clamped: reallocating worked rows away can push it past 100.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn completion_pct(worked: u64, assigned: u64) -> f64 {
    if assigned == 0 {
        return 0.0;
    }
    let pct = worked as f64 / assigned as f64 * 100.0;
    (pct * 100.0).round() / 100.0
}

/// Progress for one user given the rows they currently hold.
#[must_use]
pub fn user_progress(user: &User, items: &[WorkItem]) -> UserProgress {
    let worked = items.iter().filter(|item| item.status.is_worked());
    let completed_range = worked
        .clone()
        .map(|item| item.serial_no)
        .min()
        .zip(worked.map(|item| item.serial_no).max())
        .map(|(first, last)| SerialRange { first, last });

    let max_serial = items.iter().map(|item| item.serial_no).max();
    let pending_first = completed_range.map_or(1, |range| range.last + 1);
    let pending_range = max_serial
        .filter(|last| pending_first <= *last)
        .map(|last| SerialRange {
            first: pending_first,
            last,
        });

    UserProgress {
        handle: user.handle(),
        email: user.email.clone(),
        display_name: user.display_name.clone(),
        counters: user.counters,
        completion_pct: completion_pct(user.counters.worked(), user.counters.assigned),
        completed_range,
        pending_range,
        unset: items.iter().filter(|item| !item.status.is_worked()).count(),
    }
}

/// Dashboard over every registered user, in registration order.
///
/// # Errors
///
/// Returns a store failure.
pub fn dashboard<L: Ledger>(ledger: &L) -> LedgerResult<Dashboard> {
    ledger.view(|tx| {
        let mut users = Vec::new();
        let mut totals = Counters::default();
        let mut unset = 0;
        for user in tx.list_users()? {
            let items = tx.list_by_owner(&user.email)?;
            let progress = user_progress(&user, &items);
            totals.assigned += progress.counters.assigned;
            totals.spoke += progress.counters.spoke;
            totals.tried += progress.counters.tried;
            totals.followup_required += progress.counters.followup_required;
            unset += progress.unset;
            users.push(progress);
        }

        Ok(Dashboard {
            completion_pct: completion_pct(totals.worked(), totals.assigned),
            users,
            totals,
            unset,
        })
    })
}

/// Every row completed within `[since, until]`, ordered by owner
/// registration then serial.
///
/// # Errors
///
/// [`LedgerError::InvalidDateRange`] when `since > until`, or a store
/// failure.
pub fn outcome_report<L: Ledger>(
    ledger: &L,
    since: NaiveDate,
    until: NaiveDate,
) -> LedgerResult<Vec<OutcomeRow>> {
    if since > until {
        return Err(LedgerError::InvalidDateRange { since, until });
    }

    ledger.view(|tx| {
        let users = tx.list_users()?;
        let rank: HashMap<&str, (usize, &str)> = users
            .iter()
            .enumerate()
            .map(|(idx, user)| (user.email.as_str(), (idx, user.display_name.as_str())))
            .collect();

        let mut rows: Vec<OutcomeRow> = tx
            .list_completed_between(since, until)?
            .into_iter()
            .map(|(owner_email, item)| {
                let owner_name = rank
                    .get(owner_email.as_str())
                    .map_or_else(String::new, |(_, name)| (*name).to_string());
                OutcomeRow {
                    owner_email,
                    owner_name,
                    item,
                }
            })
            .collect();
        rows.sort_by_key(|row| {
            (
                rank.get(row.owner_email.as_str())
                    .map_or(usize::MAX, |(idx, _)| *idx),
                row.item.serial_no,
            )
        });

        debug!(%since, %until, rows = rows.len(), "built outcome report");
        Ok(rows)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{NewUser, PasswordPolicy, Submission, allocate, register, submit};
    use crate::model::{Outcome, Payload, Priority, Status};
    use crate::store::memory::MemoryLedger;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    fn join(ledger: &MemoryLedger, name: &str, rows: usize) -> String {
        let email = format!("{name}@x.org");
        register(
            ledger,
            NewUser {
                display_name: name.to_uppercase(),
                username: name.to_string(),
                email: email.clone(),
                password: "pw".into(),
            },
            &PasswordPolicy::with_rounds(1),
        )
        .unwrap();
        let payloads = (1..=rows).map(|i| Payload::named(format!("{name}{i}"))).collect();
        allocate(ledger, &email, payloads).unwrap();
        email
    }

    fn work(ledger: &MemoryLedger, email: &str, serial_no: u32, outcome: Outcome, on: u32) {
        submit(
            ledger,
            &Submission {
                email: email.to_string(),
                serial_no,
                outcome,
                priority: Priority::None,
                new_location: None,
                completed_on: day(on),
            },
        )
        .unwrap();
    }

    #[test]
    fn completion_is_rounded_to_two_places() {
        assert!((completion_pct(1, 3) - 33.33).abs() < f64::EPSILON);
        assert!((completion_pct(2, 3) - 66.67).abs() < f64::EPSILON);
        assert!(completion_pct(0, 0).abs() < f64::EPSILON);
    }

    #[test]
    fn ranges_follow_worked_rows() {
        let ledger = MemoryLedger::new();
        let ana = join(&ledger, "ana", 6);
        work(&ledger, &ana, 2, Outcome::Spoke, 1);
        work(&ledger, &ana, 3, Outcome::Tried, 1);

        let board = dashboard(&ledger).unwrap();
        let row = &board.users[0];
        assert_eq!(row.handle, "user1");
        assert_eq!(row.completed_range, Some(SerialRange { first: 2, last: 3 }));
        assert_eq!(row.pending_range, Some(SerialRange { first: 4, last: 6 }));
        assert_eq!(row.unset, 4);
        assert!((row.completion_pct - 33.33).abs() < f64::EPSILON);
    }

    #[test]
    fn untouched_and_finished_lists() {
        let ledger = MemoryLedger::new();
        join(&ledger, "ana", 3);
        let ben = join(&ledger, "ben", 1);
        join(&ledger, "cai", 0);
        work(&ledger, &ben, 1, Outcome::Spoke, 1);

        let board = dashboard(&ledger).unwrap();
        assert_eq!(board.users[0].completed_range, None);
        assert_eq!(
            board.users[0].pending_range,
            Some(SerialRange { first: 1, last: 3 })
        );
        assert_eq!(board.users[1].pending_range, None);
        assert_eq!(board.users[2].pending_range, None);
        assert!(board.users[2].completion_pct.abs() < f64::EPSILON);

        assert_eq!(board.totals.assigned, 4);
        assert_eq!(board.totals.spoke, 1);
        assert_eq!(board.unset, 3);
        assert!((board.completion_pct - 25.0).abs() < f64::EPSILON);
    }

    #[test]
    fn report_is_bounded_and_ordered_by_registration() {
        let ledger = MemoryLedger::new();
        let zed = join(&ledger, "zed", 3);
        let amy = join(&ledger, "amy", 3);
        work(&ledger, &amy, 1, Outcome::Tried, 5);
        work(&ledger, &zed, 3, Outcome::Spoke, 5);
        work(&ledger, &zed, 1, Outcome::FollowupRequired, 6);
        work(&ledger, &zed, 2, Outcome::Spoke, 9);

        let rows = outcome_report(&ledger, day(5), day(6)).unwrap();
        let keys: Vec<(&str, u32)> = rows
            .iter()
            .map(|row| (row.owner_email.as_str(), row.item.serial_no))
            .collect();
        assert_eq!(keys, [("zed@x.org", 1), ("zed@x.org", 3), ("amy@x.org", 1)]);
        assert_eq!(rows[0].owner_name, "ZED");
        assert_eq!(rows[0].item.status, Status::FollowupRequired);
    }

    #[test]
    fn report_rejects_inverted_dates() {
        let ledger = MemoryLedger::new();
        let err = outcome_report(&ledger, day(9), day(1)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidDateRange { .. }));
    }

    #[test]
    fn outcome_rows_serialize_flat() {
        let row = OutcomeRow {
            owner_email: "ana@x.org".into(),
            owner_name: "Ana".into(),
            item: WorkItem::unworked(4, Payload::named("Ravi")),
        };
        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["serial_no"], 4);
        assert_eq!(json["name"], "Ravi");
        assert_eq!(json["owner_email"], "ana@x.org");
    }
}
