//! Move a serial range of rows from one user to another.

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{LedgerError, LedgerResult};
use crate::model::{CounterDelta, WorkItem};
use crate::store::Ledger;

/// An admin request to hand over `start..=end` of `from`'s rows to `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReallocateRequest {
    pub from: String,
    pub to: String,
    pub start: u32,
    pub end: u32,
}

/// Where one moved row ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SerialMove {
    pub old_serial: u32,
    pub new_serial: u32,
}

/// What a reallocation did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reallocation {
    pub from: String,
    pub to: String,
    pub moved: usize,
    /// Empty when source and destination are the same user.
    pub serials: Vec<SerialMove>,
}

/// Move the rows of `request.from` whose serials fall in
/// `start..=end` to `request.to`.
///
/// The source keeps its remaining serials untouched. The destination's whole
/// set is stable-sorted by serial and renumbered `1..=N`, so on equal serials
/// the destination's own rows come before the moved ones. `assigned` moves
/// with the rows; outcome counters stay with whoever earned them.
///
/// When `from == to` the range is still validated but nothing is written.
///
/// # Errors
///
/// - [`LedgerError::InvalidRange`] when `start > end`
/// - [`LedgerError::UnknownUser`] when either user is missing
/// - [`LedgerError::EmptyRange`] when no source row falls in the range
///
/// No state changes on any error.
pub fn reallocate<L: Ledger>(ledger: &L, request: &ReallocateRequest) -> LedgerResult<Reallocation> {
    let ReallocateRequest {
        from,
        to,
        start,
        end,
    } = request;
    let (start, end) = (*start, *end);
    if start > end {
        return Err(LedgerError::InvalidRange { start, end });
    }

    ledger.transact(&[from.as_str(), to.as_str()], |tx| {
        for email in [from, to] {
            if tx.get(email)?.is_none() {
                return Err(LedgerError::UnknownUser {
                    email: email.clone(),
                });
            }
        }

        let (moving, remaining): (Vec<WorkItem>, Vec<WorkItem>) = tx
            .list_by_owner(from)?
            .into_iter()
            .partition(|item| (start..=end).contains(&item.serial_no));

        if moving.is_empty() {
            return Err(LedgerError::EmptyRange {
                owner: from.clone(),
                start,
                end,
            });
        }

        if from == to {
            debug!(email = %from, start, end, "reallocation onto the same user; nothing to do");
            return Ok(Reallocation {
                from: from.clone(),
                to: to.clone(),
                moved: moving.len(),
                serials: Vec::new(),
            });
        }

        let moved = moving.len();
        let moved_count = i64::try_from(moved).map_err(|_| LedgerError::InvalidInput {
            field: "range",
            reason: format!("{moved} rows is too many to move at once"),
        })?;

        // Tag each row with whether it is arriving, then renumber.
        let mut destination: Vec<(bool, WorkItem)> = tx
            .list_by_owner(to)?
            .into_iter()
            .map(|item| (false, item))
            .chain(moving.into_iter().map(|item| (true, item)))
            .collect();
        destination.sort_by_key(|(_, item)| item.serial_no);

        let mut serials = Vec::with_capacity(moved);
        let mut renumbered = Vec::with_capacity(destination.len());
        for ((arriving, mut item), new_serial) in destination.into_iter().zip(1..) {
            if arriving {
                serials.push(SerialMove {
                    old_serial: item.serial_no,
                    new_serial,
                });
            }
            item.serial_no = new_serial;
            renumbered.push(item);
        }

        tx.replace_owner_set(from, &remaining)?;
        tx.replace_owner_set(to, &renumbered)?;
        tx.adjust_counters(from, CounterDelta::assigned(-moved_count))?;
        tx.adjust_counters(to, CounterDelta::assigned(moved_count))?;

        info!(
            from = %from,
            to = %to,
            start,
            end,
            moved,
            destination_size = renumbered.len(),
            "reallocated rows"
        );
        Ok(Reallocation {
            from: from.clone(),
            to: to.clone(),
            moved,
            serials,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::allocate::allocate;
    use crate::engine::register::{NewUser, PasswordPolicy, register};
    use crate::engine::submit::{Submission, submit};
    use crate::model::{Outcome, Payload, Priority};
    use crate::store::memory::MemoryLedger;
    use chrono::NaiveDate;

    fn setup(rows: &[(&str, usize)]) -> MemoryLedger {
        let ledger = MemoryLedger::new();
        for (email, count) in rows {
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
            let payloads = (1..=*count)
                .map(|i| Payload::named(format!("{name}-{i}")))
                .collect();
            allocate(&ledger, email, payloads).unwrap();
        }
        ledger
    }

    fn request(from: &str, to: &str, start: u32, end: u32) -> ReallocateRequest {
        ReallocateRequest {
            from: from.to_string(),
            to: to.to_string(),
            start,
            end,
        }
    }

    fn serials_and_names(ledger: &MemoryLedger, email: &str) -> Vec<(u32, String)> {
        ledger
            .view(|tx| tx.list_by_owner(email))
            .unwrap()
            .into_iter()
            .map(|item| (item.serial_no, item.payload.name))
            .collect()
    }

    #[test]
    fn source_keeps_remaining_serials() {
        let ledger = setup(&[("u@x.org", 8), ("v@x.org", 0)]);
        reallocate(&ledger, &request("u@x.org", "v@x.org", 2, 4)).unwrap();

        let left: Vec<u32> = serials_and_names(&ledger, "u@x.org")
            .into_iter()
            .map(|(serial, _)| serial)
            .collect();
        assert_eq!(left, [1, 5, 6, 7, 8]);
    }

    #[test]
    fn empty_destination_receives_dense_serials() {
        let ledger = setup(&[("u@x.org", 8), ("v@x.org", 0)]);
        let outcome = reallocate(&ledger, &request("u@x.org", "v@x.org", 2, 4)).unwrap();

        assert_eq!(outcome.moved, 3);
        assert_eq!(
            serials_and_names(&ledger, "v@x.org"),
            [
                (1, "u-2".to_string()),
                (2, "u-3".to_string()),
                (3, "u-4".to_string())
            ]
        );
        assert_eq!(
            outcome.serials[0],
            SerialMove {
                old_serial: 2,
                new_serial: 1
            }
        );
    }

    #[test]
    fn destination_is_sorted_by_original_serial_with_own_rows_first_on_ties() {
        let ledger = setup(&[("u@x.org", 4), ("v@x.org", 2)]);
        reallocate(&ledger, &request("u@x.org", "v@x.org", 2, 3)).unwrap();

        assert_eq!(
            serials_and_names(&ledger, "v@x.org"),
            [
                (1, "v-1".to_string()),
                (2, "v-2".to_string()),
                (3, "u-2".to_string()),
                (4, "u-3".to_string()),
            ]
        );
    }

    #[test]
    fn counters_follow_inventory_not_credit() {
        let ledger = setup(&[("u@x.org", 5), ("v@x.org", 1)]);
        submit(
            &ledger,
            &Submission {
                email: "u@x.org".into(),
                serial_no: 3,
                outcome: Outcome::Spoke,
                priority: Priority::High,
                new_location: None,
                completed_on: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            },
        )
        .unwrap();

        reallocate(&ledger, &request("u@x.org", "v@x.org", 3, 5)).unwrap();

        let (u, v) = ledger
            .view(|tx| Ok((tx.get("u@x.org")?.unwrap(), tx.get("v@x.org")?.unwrap())))
            .unwrap();
        assert_eq!(u.counters.assigned, 2);
        assert_eq!(u.counters.spoke, 1);
        assert_eq!(v.counters.assigned, 4);
        assert_eq!(v.counters.spoke, 0);

        // The worked row keeps its outcome under its new owner.
        let moved = ledger
            .view(|tx| tx.list_by_owner("v@x.org"))
            .unwrap()
            .into_iter()
            .find(|item| item.payload.name == "u-3")
            .unwrap();
        assert_eq!(moved.status, Outcome::Spoke.status());
        assert_eq!(moved.priority, Priority::High);
    }

    #[test]
    fn inverted_range_is_rejected_before_any_lookup() {
        let ledger = setup(&[("u@x.org", 3)]);
        let err = reallocate(&ledger, &request("u@x.org", "ghost@x.org", 4, 2)).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRange { start: 4, end: 2 }));
    }

    #[test]
    fn unknown_destination_is_rejected() {
        let ledger = setup(&[("u@x.org", 3)]);
        let err = reallocate(&ledger, &request("u@x.org", "ghost@x.org", 1, 2)).unwrap_err();
        assert!(matches!(err, LedgerError::UnknownUser { email } if email == "ghost@x.org"));
        assert_eq!(serials_and_names(&ledger, "u@x.org").len(), 3);
    }

    #[test]
    fn same_user_is_left_untouched() {
        let ledger = setup(&[("u@x.org", 5)]);
        ledger
            .transact(&["u@x.org"], |tx| {
                let keep: Vec<WorkItem> = tx
                    .list_by_owner("u@x.org")?
                    .into_iter()
                    .filter(|item| item.serial_no != 2)
                    .collect();
                tx.replace_owner_set("u@x.org", &keep)
            })
            .unwrap();

        let outcome = reallocate(&ledger, &request("u@x.org", "u@x.org", 1, 5)).unwrap();
        assert_eq!(outcome.moved, 4);
        assert!(outcome.serials.is_empty());

        let serials: Vec<u32> = serials_and_names(&ledger, "u@x.org")
            .into_iter()
            .map(|(serial, _)| serial)
            .collect();
        assert_eq!(serials, [1, 3, 4, 5]);
    }

    #[test]
    fn same_user_with_empty_range_still_fails() {
        let ledger = setup(&[("u@x.org", 2)]);
        let err = reallocate(&ledger, &request("u@x.org", "u@x.org", 10, 20)).unwrap_err();
        assert!(matches!(err, LedgerError::EmptyRange { .. }));
    }
}
