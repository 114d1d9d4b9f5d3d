//! Record a contact outcome against one row.

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::error::{LedgerError, LedgerResult};
use crate::model::{CounterDelta, Outcome, Priority, WorkItem};
use crate::store::Ledger;

/// A caller's report for one row of their list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub email: String,
    pub serial_no: u32,
    pub outcome: Outcome,
    pub priority: Priority,
    pub new_location: Option<String>,
    pub completed_on: NaiveDate,
}

/// Apply `submission` and credit its outcome to the submitting user.
///
/// The row's status, priority and new location are overwritten and
/// `completed_at` becomes `completed_on`. Exactly one outcome counter goes up.
/// Re-submitting a worked row credits the new outcome again without taking
/// back the old one; a `warn` event records each such re-submission.
///
/// # Errors
///
/// [`LedgerError::UnknownUser`] or [`LedgerError::NoSuchSerial`]; nothing is
/// written in either case.
pub fn submit<L: Ledger>(ledger: &L, submission: &Submission) -> LedgerResult<WorkItem> {
    let email = submission.email.as_str();
    let serial_no = submission.serial_no;

    ledger.transact(&[email], |tx| {
        if tx.get(email)?.is_none() {
            return Err(LedgerError::UnknownUser {
                email: email.to_string(),
            });
        }
        let mut item =
            tx.find_by_serial(email, serial_no)?
                .ok_or_else(|| LedgerError::NoSuchSerial {
                    owner: email.to_string(),
                    serial: serial_no,
                })?;

        if item.status.is_worked() {
            warn!(
                email,
                serial_no,
                previous = %item.status,
                next = %submission.outcome,
                "row re-submitted; the earlier outcome stays credited"
            );
        }

        item.status = submission.outcome.status();
        item.priority = submission.priority;
        item.new_location.clone_from(&submission.new_location);
        item.completed_at = Some(submission.completed_on);

        tx.update_item(email, &item)?;
        tx.adjust_counters(email, CounterDelta::credit(submission.outcome))?;

        info!(
            email,
            serial_no,
            outcome = %submission.outcome,
            priority = %submission.priority,
            "recorded outcome"
        );
        Ok(item)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::allocate::allocate;
    use crate::engine::register::{NewUser, PasswordPolicy, register};
    use crate::model::{Payload, Status};
    use crate::store::memory::MemoryLedger;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
    }

    fn ledger_with_rows(email: &str, count: usize) -> MemoryLedger {
        let ledger = MemoryLedger::new();
        register(
            &ledger,
            NewUser {
                display_name: "Ana".into(),
                username: "ana".into(),
                email: email.into(),
                password: "pw".into(),
            },
            &PasswordPolicy::with_rounds(1),
        )
        .unwrap();
        let rows = (0..count).map(|i| Payload::named(format!("c{i}"))).collect();
        allocate(&ledger, email, rows).unwrap();
        ledger
    }

    fn submission(serial_no: u32, outcome: Outcome, on: u32) -> Submission {
        Submission {
            email: "ana@x.org".into(),
            serial_no,
            outcome,
            priority: Priority::Medium,
            new_location: Some("Pune".into()),
            completed_on: day(on),
        }
    }

    #[test]
    fn submit_overwrites_row_and_credits_counter() {
        let ledger = ledger_with_rows("ana@x.org", 3);
        let item = submit(&ledger, &submission(2, Outcome::FollowupRequired, 4)).unwrap();

        assert_eq!(item.status, Status::FollowupRequired);
        assert_eq!(item.priority, Priority::Medium);
        assert_eq!(item.new_location.as_deref(), Some("Pune"));
        assert_eq!(item.completed_at, Some(day(4)));

        let stored = ledger
            .view(|tx| tx.find_by_serial("ana@x.org", 2))
            .unwrap()
            .unwrap();
        assert_eq!(stored, item);

        let ana = ledger.view(|tx| tx.get("ana@x.org")).unwrap().unwrap();
        assert_eq!(ana.counters.followup_required, 1);
        assert_eq!(ana.counters.worked(), 1);
    }

    #[test]
    fn resubmission_counts_both_outcomes() {
        let ledger = ledger_with_rows("ana@x.org", 5);
        submit(&ledger, &submission(5, Outcome::Spoke, 1)).unwrap();
        let item = submit(&ledger, &submission(5, Outcome::Tried, 2)).unwrap();

        assert_eq!(item.status, Status::Tried);
        assert_eq!(item.completed_at, Some(day(2)));
        let ana = ledger.view(|tx| tx.get("ana@x.org")).unwrap().unwrap();
        assert_eq!(ana.counters.spoke, 1);
        assert_eq!(ana.counters.tried, 1);
    }

    #[test]
    fn missing_serial_is_rejected() {
        let ledger = ledger_with_rows("ana@x.org", 2);
        let err = submit(&ledger, &submission(9, Outcome::Spoke, 1)).unwrap_err();
        assert!(matches!(err, LedgerError::NoSuchSerial { serial: 9, .. }));

        let ana = ledger.view(|tx| tx.get("ana@x.org")).unwrap().unwrap();
        assert_eq!(ana.counters.worked(), 0);
    }

    #[test]
    fn unknown_user_is_rejected() {
        let ledger = ledger_with_rows("ana@x.org", 2);
        let mut request = submission(1, Outcome::Spoke, 1);
        request.email = "ghost@x.org".into();
        let err = submit(&ledger, &request).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownUser { .. }));
    }
}
