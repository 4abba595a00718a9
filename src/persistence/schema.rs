//! `SQLite` schema bootstrap logic.
//!
//! All definitions use `CREATE TABLE IF NOT EXISTS` and are re-run on
//! every startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply the key/value table definition to the connected database.
///
/// # Errors
///
/// Returns `AppError::Db` if the DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS kv_record (
    key         TEXT PRIMARY KEY NOT NULL,
    value       TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
