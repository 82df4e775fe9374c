use anyhow::{Context, Result};
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_mode, parse_optional_phase, to_i64, to_u32, to_u64},
    models::Session,
};

fn row_to_session(row: &Row) -> Result<Session> {
    let started_at: String = row.get("started_at")?;
    let ended_at: String = row.get("ended_at")?;
    let duration_sec: i64 = row.get("duration_sec")?;
    let mode: String = row.get("mode")?;
    let cycles: i64 = row.get("cycles")?;
    let phase: Option<String> = row.get("phase")?;

    Ok(Session {
        id: row.get("id")?,
        user_id: row.get("user_id")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        ended_at: parse_datetime(&ended_at, "ended_at")?,
        duration_sec: to_u64(duration_sec, "duration_sec")?,
        mode: parse_mode(&mode)?,
        tag: row.get("tag")?,
        cycles: to_u32(cycles, "cycles")?,
        day: row.get("day")?,
        phase: parse_optional_phase(phase)?,
        stopped_manually: row.get("stopped_manually")?,
    })
}

impl Database {
    pub async fn append_session(&self, session: &Session) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, user_id, started_at, ended_at, duration_sec, mode, tag, cycles, day, phase, stopped_manually)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.id,
                    record.user_id,
                    record.started_at.to_rfc3339(),
                    record.ended_at.to_rfc3339(),
                    to_i64(record.duration_sec)?,
                    record.mode.as_str(),
                    record.tag,
                    record.cycles,
                    record.day,
                    record.phase.map(|phase| phase.as_str()),
                    record.stopped_manually,
                ],
            )
            .with_context(|| "failed to insert session")?;
            Ok(())
        })
        .await
    }

    /// All sessions whose day key matches, oldest first.
    pub async fn get_sessions_for_day(&self, day: &str) -> Result<Vec<Session>> {
        let day = day.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, started_at, ended_at, duration_sec, mode, tag, cycles, day, phase, stopped_manually
                 FROM sessions
                 WHERE day = ?1
                 ORDER BY started_at ASC",
            )?;

            let mut rows = stmt.query(params![day])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }

            Ok(sessions)
        })
        .await
    }
}
