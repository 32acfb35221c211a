use crate::config::DatabaseConfig;
use crate::error::EmotionError;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Open the database for serving: create the parent directory of a file
/// database, connect, and make sure the schema exists.
pub async fn open_database(config: &DatabaseConfig) -> Result<SqlitePool, EmotionError> {
    if let Some(parent) = sqlite_file_path(&config.url).and_then(|p| p.parent()) {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let pool = create_pool(config).await?;
    ensure_schema(&pool).await?;
    Ok(pool)
}

/// Filesystem path of a `sqlite://` URL, or `None` for in-memory databases.
fn sqlite_file_path(url: &str) -> Option<&Path> {
    let rest = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = rest.split('?').next().unwrap_or(rest);
    if path.is_empty() || path.starts_with(":memory:") {
        None
    } else {
        Some(Path::new(path))
    }
}

/// Whether `url` names an in-memory SQLite database.
fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Open the SQLite pool described by `config`, creating the file if needed.
///
/// In-memory databases are private to a connection, so their pool is held
/// to a single connection whatever `max_connections` says.
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let max_connections = if is_in_memory(&config.url) {
        1
    } else {
        config.max_connections.max(1)
    };

    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
}

/// Create the `session` and `emotion_event` tables if they are missing.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS session (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_uuid TEXT NOT NULL UNIQUE,
            device_info TEXT NOT NULL DEFAULT '{}',
            consent TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    // session_uuid is not a foreign key: events may outlive or
    // predate their session row.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS emotion_event (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_uuid TEXT NOT NULL,
            ts_ms INTEGER NOT NULL,
            dominant TEXT NOT NULL,
            intensity REAL NOT NULL,
            scores TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_emotion_event_session ON emotion_event(session_uuid)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_emotion_event_ts ON emotion_event(ts_ms)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn health_check(pool: &SqlitePool) -> Result<String, sqlx::Error> {
    let row: (String,) = sqlx::query_as("SELECT sqlite_version()")
        .fetch_one(pool)
        .await?;
    Ok(row.0)
}
