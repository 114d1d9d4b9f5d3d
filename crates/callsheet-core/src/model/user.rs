use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, LedgerResult};
use crate::model::work_item::Outcome;

/// Cumulative per-user counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counters {
    pub assigned: u64,
    pub spoke: u64,
    pub tried: u64,
    pub followup_required: u64,
}

impl Counters {
    /// Rows with a recorded outcome, as credited to this user.
    #[must_use]
    pub const fn worked(&self) -> u64 {
        self.spoke + self.tried + self.followup_required
    }

    /// Apply a signed delta, refusing to drive any counter below zero.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Integrity`] on underflow or overflow.
    pub fn apply(self, delta: CounterDelta) -> LedgerResult<Self> {
        Ok(Self {
            assigned: shift(self.assigned, delta.assigned, "assigned")?,
            spoke: shift(self.spoke, delta.spoke, "spoke")?,
            tried: shift(self.tried, delta.tried, "tried")?,
            followup_required: shift(
                self.followup_required,
                delta.followup_required,
                "followup_required",
            )?,
        })
    }
}

fn shift(value: u64, by: i64, name: &str) -> LedgerResult<u64> {
    value.checked_add_signed(by).ok_or_else(|| {
        LedgerError::Integrity(format!("counter {name} would leave range ({value} {by:+})"))
    })
}

/// Signed adjustment to any subset of a user's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CounterDelta {
    pub assigned: i64,
    pub spoke: i64,
    pub tried: i64,
    pub followup_required: i64,
}

impl CounterDelta {
    #[must_use]
    pub const fn assigned(by: i64) -> Self {
        Self {
            assigned: by,
            spoke: 0,
            tried: 0,
            followup_required: 0,
        }
    }

    /// `+1` on the counter matching `outcome`.
    #[must_use]
    pub const fn credit(outcome: Outcome) -> Self {
        let mut delta = Self::assigned(0);
        match outcome {
            Outcome::Spoke => delta.spoke = 1,
            Outcome::Tried => delta.tried = 1,
            Outcome::FollowupRequired => delta.followup_required = 1,
        }
        delta
    }

    #[must_use]
    pub const fn combine(self, other: Self) -> Self {
        Self {
            assigned: self.assigned + other.assigned,
            spoke: self.spoke + other.spoke,
            tried: self.tried + other.tried,
            followup_required: self.followup_required + other.followup_required,
        }
    }
}

/// A registered caller. `email` is the stable key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub user_number: u32,
    pub username: String,
    pub display_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[serde(flatten)]
    pub counters: Counters,
}

impl User {
    /// Label shown on dashboards (`user<N>`).
    #[must_use]
    pub fn handle(&self) -> String {
        format!("user{}", self.user_number)
    }
}
