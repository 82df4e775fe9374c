//! Session records: one row per finalized focus interval.

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    FixedCycle,
    Freeform,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::FixedCycle => "fixed-cycle",
            SessionMode::Freeform => "freeform",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Work,
    Break,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Work => "work",
            Phase::Break => "break",
        }
    }
}

/// Immutable once written. `duration_sec` is always positive; zero-length
/// intervals are never turned into a `Session`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_sec: u64,
    pub mode: SessionMode,
    pub tag: Option<String>,
    pub cycles: u32,
    pub day: String,
    pub phase: Option<Phase>,
    pub stopped_manually: bool,
}

/// Calendar-day key (`YYYY-MM-DD`) in the local time zone.
pub fn day_key(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_day_key_uses_local_calendar_date() {
        let local = Local.with_ymd_and_hms(2024, 3, 9, 23, 30, 0).unwrap();
        assert_eq!(day_key(local.with_timezone(&Utc)), "2024-03-09");
    }

    #[test]
    fn test_mode_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&SessionMode::FixedCycle).unwrap(),
            "\"fixed-cycle\""
        );
        assert_eq!(SessionMode::Freeform.as_str(), "freeform");
    }
}
