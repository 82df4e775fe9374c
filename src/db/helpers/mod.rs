use std::convert::TryFrom;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};

use crate::db::models::{Phase, SessionMode};

pub fn to_i64(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("value {value} exceeds SQLite INTEGER range"))
}

pub fn to_u64(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("{field} contains negative value {value}"))
}

pub fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("{field} value {value} is out of range"))
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_mode(value: &str) -> Result<SessionMode> {
    match value {
        "fixed-cycle" => Ok(SessionMode::FixedCycle),
        "freeform" => Ok(SessionMode::Freeform),
        other => Err(anyhow!("unknown session mode {other}")),
    }
}

pub fn parse_optional_phase(value: Option<String>) -> Result<Option<Phase>> {
    match value.as_deref() {
        None => Ok(None),
        Some("work") => Ok(Some(Phase::Work)),
        Some("break") => Ok(Some(Phase::Break)),
        Some(other) => Err(anyhow!("unknown session phase {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("fixed-cycle").unwrap(), SessionMode::FixedCycle);
        assert_eq!(parse_mode("freeform").unwrap(), SessionMode::Freeform);
        assert!(parse_mode("pomodoro").is_err());
    }

    #[test]
    fn test_integer_conversions() {
        assert_eq!(to_i64(42).unwrap(), 42);
        assert!(to_i64(u64::MAX).is_err());
        assert!(to_u64(-1, "duration_sec").is_err());
        assert!(to_u32(i64::from(u32::MAX) + 1, "cycles").is_err());
    }
}
