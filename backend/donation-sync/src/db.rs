//! Database layer: migrations and the key/value slot queries.

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::errors::Result;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    // Make sure the file is created if it doesn't exist yet.
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    let url = if url.contains('?') || url.contains(":memory:") {
        url
    } else {
        format!("{url}?mode=rwc")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Slot helpers
// ─────────────────────────────────────────────────────────

/// Read the raw value stored under `key`, if any.
pub async fn get_slot(pool: &SqlitePool, key: &str) -> sqlx::Result<Option<Vec<u8>>> {
    let row: Option<(Vec<u8>,)> = sqlx::query_as("SELECT value FROM durable_slots WHERE key = ?1")
        .bind(key)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(v,)| v))
}

/// Insert or overwrite the value stored under `key`.
pub async fn set_slot(pool: &SqlitePool, key: &str, value: &[u8]) -> sqlx::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO durable_slots (key, value, updated_at)
        VALUES (?1, ?2, strftime('%s', 'now'))
        ON CONFLICT(key) DO UPDATE SET
            value      = excluded.value,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(key)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}

/// Remove `key` entirely.
pub async fn clear_slot(pool: &SqlitePool, key: &str) -> sqlx::Result<()> {
    sqlx::query("DELETE FROM durable_slots WHERE key = ?1")
        .bind(key)
        .execute(pool)
        .await?;
    Ok(())
}

/// Read and remove `key` in a single statement.
pub async fn take_slot(pool: &SqlitePool, key: &str) -> sqlx::Result<Option<Vec<u8>>> {
    let row: Option<(Vec<u8>,)> =
        sqlx::query_as("DELETE FROM durable_slots WHERE key = ?1 RETURNING value")
            .bind(key)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(v,)| v))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn temp_pool() -> (tempfile::TempDir, SqlitePool) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("slots.db");
        let pool = init_pool(path.to_str().unwrap()).await.unwrap();
        (dir, pool)
    }

    #[tokio::test]
    async fn slot_set_get_overwrite() {
        let (_dir, pool) = temp_pool().await;
        assert_eq!(get_slot(&pool, "k").await.unwrap(), None);

        set_slot(&pool, "k", b"one").await.unwrap();
        set_slot(&pool, "k", b"two").await.unwrap();
        assert_eq!(get_slot(&pool, "k").await.unwrap(), Some(b"two".to_vec()));
    }

    #[tokio::test]
    async fn take_returns_value_and_removes_it() {
        let (_dir, pool) = temp_pool().await;
        set_slot(&pool, "k", b"payload").await.unwrap();
        set_slot(&pool, "other", b"stay").await.unwrap();

        assert_eq!(take_slot(&pool, "k").await.unwrap(), Some(b"payload".to_vec()));
        assert_eq!(take_slot(&pool, "k").await.unwrap(), None);
        assert_eq!(get_slot(&pool, "other").await.unwrap(), Some(b"stay".to_vec()));

        clear_slot(&pool, "other").await.unwrap();
        assert_eq!(get_slot(&pool, "other").await.unwrap(), None);
    }
}
