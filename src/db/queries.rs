use crate::db::models::StoredOptions;
use crate::error::OptionsResult;
use crate::settings::ConfigMap;
use crate::store::OptionsBackend;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Sqlite};
use tracing::{debug, info};

pub type DbPool = Pool<Sqlite>;

/// Database operations for options blobs
pub struct OptionsRepo;

impl OptionsRepo {
    /// Get the stored row for an options key
    pub async fn get_by_key(pool: &DbPool, key: &str) -> OptionsResult<Option<StoredOptions>> {
        let row = sqlx::query_as::<_, StoredOptions>(
            "SELECT option_key, option_value, updated_at FROM plugin_options WHERE option_key = ?",
        )
        .bind(key)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Create or replace the blob for an options key.
    ///
    /// Returns false when the stored value was already identical.
    pub async fn upsert(pool: &DbPool, key: &str, options: &ConfigMap) -> OptionsResult<bool> {
        let value = serde_json::to_string(options)?;

        let result = sqlx::query(
            r#"
            INSERT INTO plugin_options (option_key, option_value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(option_key) DO UPDATE SET
                option_value = excluded.option_value,
                updated_at = excluded.updated_at
            WHERE plugin_options.option_value != excluded.option_value
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// Options backend persisting JSON blobs in SQLite
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: DbPool,
}

impl SqliteBackend {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OptionsBackend for SqliteBackend {
    async fn read(&self, key: &str) -> OptionsResult<Option<ConfigMap>> {
        debug!(key, "Reading options blob");
        OptionsRepo::get_by_key(&self.pool, key)
            .await?
            .map(|row| row.decode())
            .transpose()
    }

    async fn write(&self, key: &str, options: &ConfigMap) -> OptionsResult<bool> {
        OptionsRepo::upsert(&self.pool, key, options).await
    }
}

#[cfg(test)]
pub async fn setup_test_db() -> DbPool {
    use sqlx::sqlite::SqlitePoolOptions;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to create in-memory database");
    init_db(&pool).await.expect("Failed to init database");
    pool
}

/// Initialize database with migrations
pub async fn init_db(pool: &DbPool) -> OptionsResult<()> {
    info!("Running database migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS plugin_options (
            option_key TEXT PRIMARY KEY NOT NULL,
            option_value TEXT NOT NULL,
            updated_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: serde_json::Value) -> ConfigMap {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let pool = setup_test_db().await;
        let result = OptionsRepo::get_by_key(&pool, "nonexistent").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_upsert_creates_then_replaces() {
        let pool = setup_test_db().await;

        let first = map(json!({"auth_method": "standard"}));
        assert!(OptionsRepo::upsert(&pool, "plugin", &first).await.unwrap());

        let second = map(json!({"auth_method": "sso", "extra": true}));
        assert!(OptionsRepo::upsert(&pool, "plugin", &second).await.unwrap());

        let row = OptionsRepo::get_by_key(&pool, "plugin").await.unwrap().unwrap();
        assert_eq!(row.decode().unwrap(), second);
    }

    #[tokio::test]
    async fn test_upsert_same_value_reports_no_change() {
        let pool = setup_test_db().await;
        let options = map(json!({"auth_method": "standard"}));

        assert!(OptionsRepo::upsert(&pool, "plugin", &options).await.unwrap());
        assert!(!OptionsRepo::upsert(&pool, "plugin", &options).await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_backend_keys_are_isolated() {
        let pool = setup_test_db().await;
        let backend = SqliteBackend::new(pool);

        backend.write("one", &map(json!({"a": 1}))).await.unwrap();
        backend.write("two", &map(json!({"b": 2}))).await.unwrap();

        assert_eq!(backend.read("one").await.unwrap(), Some(map(json!({"a": 1}))));
        assert_eq!(backend.read("two").await.unwrap(), Some(map(json!({"b": 2}))));
        assert_eq!(backend.read("three").await.unwrap(), None);
    }
}
