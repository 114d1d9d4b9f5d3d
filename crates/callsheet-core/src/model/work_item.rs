use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Contact outcome recorded against a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Unset,
    Spoke,
    Tried,
    FollowupRequired,
}

impl Status {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::Spoke => "spoke",
            Self::Tried => "tried",
            Self::FollowupRequired => "followup_required",
        }
    }

    /// `true` once an outcome has been recorded.
    #[must_use]
    pub const fn is_worked(self) -> bool {
        !matches!(self, Self::Unset)
    }
}

/// A submittable outcome. `Unset` is not representable, so a submission can
/// never clear a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Spoke,
    Tried,
    FollowupRequired,
}

impl Outcome {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        self.status().as_str()
    }

    #[must_use]
    pub const fn status(self) -> Status {
        match self {
            Self::Spoke => Status::Spoke,
            Self::Tried => Status::Tried,
            Self::FollowupRequired => Status::FollowupRequired,
        }
    }
}

impl From<Outcome> for Status {
    fn from(outcome: Outcome) -> Self {
        outcome.status()
    }
}

/// Follow-up priority ("regards") noted with an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    #[default]
    None,
    High,
    Medium,
    Low,
}

impl Priority {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Contact details uploaded for a row. Opaque to the engines.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Payload {
    pub name: String,
    pub phone: Option<String>,
    pub membership_number: Option<String>,
    pub sex: Option<String>,
    pub designation: Option<String>,
    pub organization: Option<String>,
    pub location: Option<String>,
}

impl Payload {
    /// Payload carrying only a contact name.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// One row of a user's call list.
///
/// `serial_no` is only meaningful relative to the current owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub serial_no: u32,
    #[serde(flatten)]
    pub payload: Payload,
    pub status: Status,
    pub priority: Priority,
    pub new_location: Option<String>,
    pub completed_at: Option<NaiveDate>,
}

impl WorkItem {
    /// A freshly allocated row with no outcome.
    #[must_use]
    pub const fn unworked(serial_no: u32, payload: Payload) -> Self {
        Self {
            serial_no,
            payload,
            status: Status::Unset,
            priority: Priority::None,
            new_location: None,
            completed_at: None,
        }
    }

    /// Whether `completed_at` agrees with `status`.
    #[must_use]
    pub const fn outcome_is_consistent(&self) -> bool {
        self.status.is_worked() == self.completed_at.is_some()
    }
}

// ---------------------------------------------------------------------------
// Text conversions
// ---------------------------------------------------------------------------

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

fn normalize_token(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace(['-', ' ', '&'], "_")
}

impl FromStr for Status {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "unset" | "" => Ok(Self::Unset),
            other => other.parse::<Outcome>().map(Self::from).map_err(|_| ParseEnumError {
                expected: "status",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Outcome {
    type Err = ParseEnumError;

    /// Accepts the canonical names and the short codes used on paper call
    /// sheets (`s`, `t`, `sf`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "spoke" | "s" => Ok(Self::Spoke),
            "tried" | "t" => Ok(Self::Tried),
            "followup_required" | "followup" | "follow_up" | "sf" | "s_f" => {
                Ok(Self::FollowupRequired)
            }
            _ => Err(ParseEnumError {
                expected: "outcome",
                got: s.to_string(),
            }),
        }
    }
}

impl FromStr for Priority {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "none" | "" => Ok(Self::None),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(ParseEnumError {
                expected: "priority",
                got: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text_roundtrip() {
        for status in [
            Status::Unset,
            Status::Spoke,
            Status::Tried,
            Status::FollowupRequired,
        ] {
            assert_eq!(status.as_str().parse::<Status>(), Ok(status));
        }
    }

    #[test]
    fn outcome_accepts_call_sheet_codes() {
        assert_eq!("S".parse::<Outcome>(), Ok(Outcome::Spoke));
        assert_eq!("t".parse::<Outcome>(), Ok(Outcome::Tried));
        assert_eq!("SF".parse::<Outcome>(), Ok(Outcome::FollowupRequired));
        assert_eq!(
            "follow-up".parse::<Outcome>(),
            Ok(Outcome::FollowupRequired)
        );
    }

    #[test]
    fn outcome_rejects_unset() {
        let err = "unset".parse::<Outcome>().unwrap_err();
        assert_eq!(err.expected, "outcome");
        assert_eq!(err.to_string(), "invalid outcome: 'unset'");
    }

    #[test]
    fn priority_parse_is_case_insensitive() {
        assert_eq!("High".parse::<Priority>(), Ok(Priority::High));
        assert_eq!(" low ".parse::<Priority>(), Ok(Priority::Low));
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn unworked_rows_are_consistent() {
        let item = WorkItem::unworked(3, Payload::named("Ravi"));
        assert_eq!(item.status, Status::Unset);
        assert!(item.outcome_is_consistent());
    }

    #[test]
    fn worked_row_without_date_is_inconsistent() {
        let mut item = WorkItem::unworked(1, Payload::named("Ravi"));
        item.status = Status::Tried;
        assert!(!item.outcome_is_consistent());
    }

    #[test]
    fn payload_deserializes_with_missing_optionals() {
        let payload: Payload =
            serde_json::from_str(r#"{"name":"Meera","phone":"98450 11223"}"#).unwrap();
        assert_eq!(payload.name, "Meera");
        assert_eq!(payload.phone.as_deref(), Some("98450 11223"));
        assert!(payload.location.is_none());
    }
}
