//! Flat key/value record store.
//!
//! Subscriber records are stored one per key. The trait keeps the
//! orchestrator independent of the backend; [`SqliteRecordStore`] is the
//! durable implementation.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;

use crate::Result;

use super::db::Database;

/// Boxed future returned by [`RecordStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Durable key/value storage.
pub trait RecordStore: Send + Sync {
    /// Every `(key, value)` pair, in key order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store cannot be read.
    fn list_all(&self) -> StoreFuture<'_, Vec<(String, String)>>;

    /// Value stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the store cannot be read.
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Insert or overwrite `key`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()>;

    /// Remove `key`; removing an absent key succeeds.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the write fails.
    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// Repository wrapper around `SQLite` for key/value records.
#[derive(Clone)]
pub struct SqliteRecordStore {
    db: Arc<Database>,
}

impl SqliteRecordStore {
    /// Create a new store instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl RecordStore for SqliteRecordStore {
    fn list_all(&self) -> StoreFuture<'_, Vec<(String, String)>> {
        Box::pin(async move {
            let rows: Vec<(String, String)> =
                sqlx::query_as("SELECT key, value FROM kv_record ORDER BY key")
                    .fetch_all(self.db.as_ref())
                    .await?;
            Ok(rows)
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let row: Option<(String,)> = sqlx::query_as("SELECT value FROM kv_record WHERE key = ?1")
                .bind(key)
                .fetch_optional(self.db.as_ref())
                .await?;
            Ok(row.map(|(value,)| value))
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let updated_at = Utc::now().to_rfc3339();
            sqlx::query(
                "INSERT INTO kv_record (key, value, updated_at) VALUES (?1, ?2, ?3) \
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, \
                 updated_at = excluded.updated_at",
            )
            .bind(key)
            .bind(value)
            .bind(&updated_at)
            .execute(self.db.as_ref())
            .await?;
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            sqlx::query("DELETE FROM kv_record WHERE key = ?1")
                .bind(key)
                .execute(self.db.as_ref())
                .await?;
            Ok(())
        })
    }
}

/// Key prefix for subscriber records.
pub const SUBSCRIBER_PREFIX: &str = "subscriber_";

/// Key of the schema version marker.
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Key under which subscriber `id` is stored.
#[must_use]
pub fn subscriber_key(id: &str) -> String {
    format!("{SUBSCRIBER_PREFIX}{id}")
}
