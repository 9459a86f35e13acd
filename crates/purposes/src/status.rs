use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use calculaud_core::DomainError;

/// Workflow status of a purpose.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurposeStatus {
    #[default]
    InProgress,
    Completed,
    Signed,
    PartiallySupplied,
}

impl PurposeStatus {
    pub const ALL: [PurposeStatus; 4] = [
        PurposeStatus::InProgress,
        PurposeStatus::Completed,
        PurposeStatus::Signed,
        PurposeStatus::PartiallySupplied,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PurposeStatus::InProgress => "IN_PROGRESS",
            PurposeStatus::Completed => "COMPLETED",
            PurposeStatus::Signed => "SIGNED",
            PurposeStatus::PartiallySupplied => "PARTIALLY_SUPPLIED",
        }
    }

    /// Completed purposes drop out of live dashboards and the stuck scan.
    pub fn is_live(self) -> bool {
        self != PurposeStatus::Completed
    }
}

impl core::fmt::Display for PurposeStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PurposeStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PurposeStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DomainError::validation(format!("invalid status '{s}'")))
    }
}

/// One row of a purpose's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    /// `None` for the row written when the purpose is created.
    pub previous_status: Option<PurposeStatus>,
    pub new_status: PurposeStatus,
    pub changed_at: DateTime<Utc>,
    /// Subject of the token that made the change.
    pub changed_by: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_wire_names() {
        for status in PurposeStatus::ALL {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
            assert_eq!(status.as_str().parse::<PurposeStatus>().unwrap(), status);
        }
    }

    #[test]
    fn default_is_in_progress() {
        assert_eq!(PurposeStatus::default(), PurposeStatus::InProgress);
        assert!(!PurposeStatus::Completed.is_live());
    }
}
