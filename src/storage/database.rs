use async_trait::async_trait;
use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePool, sqlite::SqlitePoolOptions, Sqlite};

use super::KeyValueStore;
use crate::errors::Result;

pub const DEFAULT_DATABASE_URL: &str = "sqlite:poe2_trends.db";

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn initialize(database_url: &str) -> Result<Self> {
        if !Sqlite::database_exists(database_url).await? {
            tracing::info!("Creating new database at {}", database_url);
            Sqlite::create_database(database_url).await?;
        }

        let pool = SqlitePool::connect(database_url).await?;
        Self::with_pool(pool).await
    }

    /// Private database that lives as long as the store.
    pub async fn in_memory() -> Result<Self> {
        // Every connection to :memory: gets its own database, so keep one
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self> {
        tracing::debug!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value = sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO kv_store (key, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM kv_store")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_store_upsert_and_remove() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert_eq!(store.get("poe_session_id").await.unwrap(), None);

        store.set("poe_session_id", "abc").await.unwrap();
        store.set("poe_session_id", "def").await.unwrap();
        assert_eq!(
            store.get("poe_session_id").await.unwrap().as_deref(),
            Some("def")
        );

        store.remove("poe_session_id").await.unwrap();
        assert_eq!(store.get("poe_session_id").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_store_clear() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.set("a", "1").await.unwrap();
        store.set("b", "2").await.unwrap();
        store.clear().await.unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap(), None);
    }
}
