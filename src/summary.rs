use anyhow::Result;
use chrono::Local;
use serde::Serialize;

use crate::{
    db::{Database, Session},
    utils::format::round_minutes,
};

/// Totals for one calendar day, recomputed from storage after each run.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub day: String,
    pub total_minutes: u64,
    pub session_count: usize,
    pub longest_minutes: u64,
    /// Oldest first.
    pub sessions: Vec<Session>,
}

pub fn summarize_day(day: &str, mut sessions: Vec<Session>) -> DaySummary {
    sessions.sort_by_key(|session| session.started_at);

    let total_sec: u64 = sessions.iter().map(|session| session.duration_sec).sum();
    let longest_sec = sessions
        .iter()
        .map(|session| session.duration_sec)
        .max()
        .unwrap_or(0);

    DaySummary {
        day: day.to_string(),
        total_minutes: round_minutes(total_sec),
        session_count: sessions.len(),
        longest_minutes: round_minutes(longest_sec),
        sessions,
    }
}

pub async fn load_day_summary(db: &Database, day: &str) -> Result<DaySummary> {
    let sessions = db.get_sessions_for_day(day).await?;
    Ok(summarize_day(day, sessions))
}

/// One display line per session: local start time, rounded minutes, mode
/// and tag.
pub fn session_line(session: &Session) -> String {
    let started = session.started_at.with_timezone(&Local).format("%H:%M");
    let mut line = format!(
        "{started} — {}m {}",
        round_minutes(session.duration_sec),
        session.mode.as_str()
    );
    if let Some(tag) = &session.tag {
        line.push_str(" • ");
        line.push_str(tag);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{day_key, Phase, SessionMode};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use tempfile::tempdir;

    fn session(id: &str, started_at: DateTime<Utc>, duration_sec: u64) -> Session {
        Session {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            started_at,
            ended_at: started_at + Duration::seconds(duration_sec as i64),
            duration_sec,
            mode: SessionMode::FixedCycle,
            tag: None,
            cycles: 1,
            day: day_key(started_at),
            phase: Some(Phase::Work),
            stopped_manually: false,
        }
    }

    #[test]
    fn test_summary_of_empty_day() {
        let summary = summarize_day("2024-01-01", Vec::new());
        assert_eq!(summary.total_minutes, 0);
        assert_eq!(summary.session_count, 0);
        assert_eq!(summary.longest_minutes, 0);
    }

    #[test]
    fn test_summary_totals_and_order() {
        let base = Local
            .with_ymd_and_hms(2024, 2, 12, 9, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        let sessions = vec![
            session("late", base + Duration::hours(3), 300),
            session("early", base, 1500),
            session("mid", base + Duration::hours(1), 900),
        ];

        let summary = summarize_day("2024-02-12", sessions);
        assert_eq!(summary.total_minutes, 45);
        assert_eq!(summary.session_count, 3);
        assert_eq!(summary.longest_minutes, 25);
        let order: Vec<&str> = summary.sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(order, vec!["early", "mid", "late"]);
    }

    #[tokio::test]
    async fn test_load_day_summary_reads_only_that_day() -> Result<()> {
        let dir = tempdir()?;
        let db = Database::new(dir.path().join("focus.sqlite3"))?;
        let today = Local
            .with_ymd_and_hms(2024, 2, 12, 10, 0, 0)
            .unwrap()
            .with_timezone(&Utc);

        for (id, offset, duration) in [("a", 0, 1500), ("b", 1, 900), ("c", 2, 300)] {
            db.append_session(&session(id, today + Duration::hours(offset), duration))
                .await?;
        }
        db.append_session(&session("yesterday", today - Duration::days(1), 3000))
            .await?;

        let summary = load_day_summary(&db, &day_key(today)).await?;
        assert_eq!(summary.session_count, 3);
        assert_eq!(summary.total_minutes, 45);
        assert_eq!(summary.longest_minutes, 25);
        Ok(())
    }

    #[test]
    fn test_session_line_includes_tag() {
        let start = Local
            .with_ymd_and_hms(2024, 2, 12, 9, 5, 0)
            .unwrap()
            .with_timezone(&Utc);
        let mut record = session("t", start, 1490);
        record.mode = SessionMode::Freeform;
        record.tag = Some("reading".into());

        assert_eq!(session_line(&record), "09:05 — 25m freeform • reading");
    }
}
