use crate::error::AppError;
use crate::market::types::now_unix_ms;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

/// Storage for the single process-wide access credential.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Returns `None` when no credential has been saved.
    async fn load(&self) -> Result<Option<String>, AppError>;

    /// Saves the trimmed value. An empty value clears the stored credential.
    async fn save(&self, value: &str) -> Result<(), AppError>;

    async fn clear(&self) -> Result<(), AppError>;
}

#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    pool: SqlitePool,
}

impl SqliteCredentialStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn load(&self) -> Result<Option<String>, AppError> {
        let row = sqlx::query("SELECT value FROM credentials WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let value: String = row.try_get("value")?;
        Ok(Some(value).filter(|value| !value.is_empty()))
    }

    async fn save(&self, value: &str) -> Result<(), AppError> {
        let value = value.trim();
        if value.is_empty() {
            return self.clear().await;
        }

        sqlx::query(
            "INSERT INTO credentials (id, value, updated_at_ms) VALUES (1, ?, ?) \
             ON CONFLICT(id) DO UPDATE SET value=excluded.value, updated_at_ms=excluded.updated_at_ms",
        )
        .bind(value)
        .bind(now_unix_ms())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        sqlx::query("DELETE FROM credentials WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
