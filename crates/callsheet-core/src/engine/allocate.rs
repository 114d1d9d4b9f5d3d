//! Append uploaded rows to a user's call list.

use tracing::{debug, info};

use crate::error::{LedgerError, LedgerResult};
use crate::model::{CounterDelta, Payload, WorkItem};
use crate::store::Ledger;

/// Give `rows` to `email`, numbered after the user's current highest serial.
///
/// Existing rows are never renumbered and gaps are never filled. The user's
/// `assigned` counter grows by `rows.len()`. An empty batch is a no-op once
/// the user is known to exist.
///
/// # Errors
///
/// [`LedgerError::UnknownUser`] if `email` is not registered, or a store
/// failure. Nothing is written on error.
pub fn allocate<L: Ledger>(
    ledger: &L,
    email: &str,
    rows: Vec<Payload>,
) -> LedgerResult<Vec<WorkItem>> {
    ledger.transact(&[email], |tx| {
        if tx.get(email)?.is_none() {
            return Err(LedgerError::UnknownUser {
                email: email.to_string(),
            });
        }
        if rows.is_empty() {
            debug!(email, "empty allocation batch");
            return Ok(Vec::new());
        }

        let next_serial = tx
            .list_by_owner(email)?
            .iter()
            .map(|item| item.serial_no)
            .max()
            .unwrap_or(0)
            + 1;

        let count = u32::try_from(rows.len()).map_err(|_| LedgerError::InvalidInput {
            field: "rows",
            reason: format!("batch of {} rows is too large", rows.len()),
        })?;
        let appended: Vec<WorkItem> = (next_serial..)
            .zip(rows)
            .map(|(serial_no, payload)| WorkItem::unworked(serial_no, payload))
            .collect();

        tx.append_to_owner(email, &appended)?;
        tx.adjust_counters(email, CounterDelta::assigned(i64::from(count)))?;

        info!(
            email,
            count,
            first_serial = next_serial,
            last_serial = next_serial + count - 1,
            "allocated rows"
        );
        Ok(appended)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::register::{NewUser, PasswordPolicy, register};
    use crate::store::memory::MemoryLedger;

    fn ledger_with(emails: &[&str]) -> MemoryLedger {
        let ledger = MemoryLedger::new();
        for email in emails {
            let name = email.split('@').next().unwrap_or(email);
            register(
                &ledger,
                NewUser {
                    display_name: name.to_string(),
                    username: name.to_string(),
                    email: (*email).to_string(),
                    password: "pw".to_string(),
                },
                &PasswordPolicy::with_rounds(1),
            )
            .unwrap();
        }
        ledger
    }

    fn names(n: usize) -> Vec<Payload> {
        (0..n).map(|i| Payload::named(format!("contact {i}"))).collect()
    }

    #[test]
    fn first_batch_starts_at_one() {
        let ledger = ledger_with(&["ana@x.org"]);
        let rows = allocate(&ledger, "ana@x.org", names(3)).unwrap();
        let serials: Vec<u32> = rows.iter().map(|r| r.serial_no).collect();
        assert_eq!(serials, [1, 2, 3]);
    }

    #[test]
    fn input_order_is_preserved() {
        let ledger = ledger_with(&["ana@x.org"]);
        let rows = allocate(&ledger, "ana@x.org", names(2)).unwrap();
        assert_eq!(rows[0].payload.name, "contact 0");
        assert_eq!(rows[1].payload.name, "contact 1");
    }

    #[test]
    fn unknown_user_writes_nothing() {
        let ledger = ledger_with(&["ana@x.org"]);
        let err = allocate(&ledger, "nobody@x.org", names(2)).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownUser { email } if email == "nobody@x.org"));
        let users = ledger.view(|tx| tx.list_users()).unwrap();
        assert_eq!(users[0].counters.assigned, 0);
    }

    #[test]
    fn empty_batch_is_a_noop() {
        let ledger = ledger_with(&["ana@x.org"]);
        assert!(allocate(&ledger, "ana@x.org", Vec::new()).unwrap().is_empty());
        let ana = ledger.view(|tx| tx.get("ana@x.org")).unwrap().unwrap();
        assert_eq!(ana.counters.assigned, 0);
    }

    #[test]
    fn gaps_are_not_filled() {
        let ledger = ledger_with(&["ana@x.org"]);
        allocate(&ledger, "ana@x.org", names(5)).unwrap();
        ledger
            .transact(&["ana@x.org"], |tx| {
                let keep: Vec<WorkItem> = tx
                    .list_by_owner("ana@x.org")?
                    .into_iter()
                    .filter(|item| item.serial_no != 2 && item.serial_no != 3)
                    .collect();
                tx.replace_owner_set("ana@x.org", &keep)
            })
            .unwrap();

        let rows = allocate(&ledger, "ana@x.org", names(1)).unwrap();
        assert_eq!(rows[0].serial_no, 6);
    }
}
