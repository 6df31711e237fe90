//! Ledger database initialization and schema versioning.

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Version stamped into `PRAGMA user_version` once `schema.sql` is applied.
pub const SCHEMA_VERSION: i64 = 1;

const MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (creating if needed) the ledger at `db_path` and bring its schema up
/// to [`SCHEMA_VERSION`].
///
/// # Errors
/// Fails if the parent directory cannot be created, the database cannot be
/// opened, or it was written by a newer schema version.
pub async fn init_db(db_path: &str) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .after_connect(|conn, _meta| Box::pin(async move { log_journal_mode(conn).await }))
        .connect_with(options)
        .await?;

    let version = migrate(&pool).await?;
    info!(db_path = %db_path, schema_version = version, "Ledger database ready");
    Ok(pool)
}

/// Apply `schema.sql` if the stored version is behind. Returns the version the
/// database ends up at.
async fn migrate(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let current = schema_version(pool).await?;
    if current > SCHEMA_VERSION {
        return Err(sqlx::Error::Configuration(
            format!(
                "ledger schema version {} is newer than supported version {}",
                current, SCHEMA_VERSION
            )
            .into(),
        ));
    }
    if current == SCHEMA_VERSION {
        debug!(schema_version = current, "Ledger schema up to date");
        return Ok(current);
    }

    info!(from = current, to = SCHEMA_VERSION, "Migrating ledger schema");
    let mut tx = pool.begin().await?;
    for statement in include_str!("schema.sql").split(';') {
        let statement = statement.trim();
        if !statement.is_empty() {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
    }
    // PRAGMA does not accept bound parameters.
    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(SCHEMA_VERSION)
}

pub async fn schema_version(pool: &SqlitePool) -> Result<i64, sqlx::Error> {
    let row = sqlx::query("PRAGMA user_version").fetch_one(pool).await?;
    row.try_get(0)
}

async fn log_journal_mode(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let row = sqlx::query("PRAGMA journal_mode").fetch_one(&mut *conn).await?;
    let mode: String = row.try_get(0)?;
    if mode != "wal" {
        // In-memory and some network filesystems cannot use WAL.
        warn!(journal_mode = %mode, "SQLite WAL journal unavailable");
    }
    Ok(())
}
