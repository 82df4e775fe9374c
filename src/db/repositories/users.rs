use anyhow::{Context, Result};
use rusqlite::{params, OptionalExtension};

use crate::db::{connection::Database, models::User};

const USER_KEY: &str = "user";

impl Database {
    pub async fn get_user(&self) -> Result<Option<User>> {
        self.execute(|conn| {
            let raw: Option<String> = conn
                .query_row(
                    "SELECT value FROM kv WHERE key = ?1",
                    params![USER_KEY],
                    |row| row.get(0),
                )
                .optional()?;

            raw.map(|value| {
                serde_json::from_str::<User>(&value).context("failed to decode stored user")
            })
            .transpose()
        })
        .await
    }

    pub async fn put_user(&self, user: &User) -> Result<()> {
        let encoded = serde_json::to_string(user)?;
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![USER_KEY, encoded],
            )
            .with_context(|| "failed to store user")?;
            Ok(())
        })
        .await
    }

    /// Returns the stored user, creating and persisting a fresh identity on
    /// first run.
    pub async fn ensure_user(&self) -> Result<User> {
        if let Some(existing) = self.get_user().await? {
            return Ok(existing);
        }
        let user = User::generate();
        self.put_user(&user).await?;
        log::info!("Created local identity {} ({})", user.name, user.id);
        Ok(user)
    }
}
