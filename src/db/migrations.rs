use anyhow::{bail, Context, Result};
use rusqlite::Connection;

/// Schema steps in order; entry `n` upgrades `user_version` from `n` to `n + 1`.
const MIGRATIONS: &[&str] = &[
    include_str!("schemas/schema_v1.sql"),
    include_str!("schemas/schema_v2.sql"),
];

const CURRENT_SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

/// Brings the schema up to date in one transaction. A database written by a
/// newer build is refused rather than downgraded.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let found: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read schema version")?;

    if found > CURRENT_SCHEMA_VERSION {
        bail!("session store uses schema v{found}, this build supports up to v{CURRENT_SCHEMA_VERSION}");
    }

    let pending = &MIGRATIONS[found.max(0) as usize..];
    if pending.is_empty() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (offset, sql) in pending.iter().enumerate() {
        let target = found + offset as i32 + 1;
        tx.execute_batch(sql)
            .with_context(|| format!("failed to upgrade schema to v{target}"))?;
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit().context("failed to commit schema upgrade")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        run_migrations(&mut conn)?;
        run_migrations(&mut conn)?;

        let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        assert_eq!(version, CURRENT_SCHEMA_VERSION);

        // v2 column is present
        conn.execute(
            "INSERT INTO sessions (id, user_id, started_at, ended_at, duration_sec, mode, tag, cycles, day, stopped_manually, phase)
             VALUES ('a', 'u', 's', 'e', 1, 'freeform', NULL, 1, '2024-01-01', 0, NULL)",
            [],
        )?;
        Ok(())
    }

    #[test]
    fn test_rejects_newer_schema() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION + 1)?;

        assert!(run_migrations(&mut conn).is_err());
        Ok(())
    }

    #[test]
    fn test_upgrades_v1_store_in_place() -> Result<()> {
        let mut conn = Connection::open_in_memory()?;
        conn.execute_batch(MIGRATIONS[0])?;
        conn.pragma_update(None, "user_version", 1)?;
        conn.execute(
            "INSERT INTO sessions (id, user_id, started_at, ended_at, duration_sec, mode, tag, cycles, day, stopped_manually)
             VALUES ('old', 'u', 's', 'e', 60, 'freeform', NULL, 1, '2024-01-01', 0)",
            [],
        )?;

        run_migrations(&mut conn)?;

        let phase: Option<String> =
            conn.query_row("SELECT phase FROM sessions WHERE id = 'old'", [], |row| row.get(0))?;
        assert_eq!(phase, None);
        Ok(())
    }
}
