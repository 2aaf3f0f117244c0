use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    domain::{DocumentId, SessionId},
    protocol::{LogRecord, LogType},
};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::debug;
use uuid::Uuid;

/// Insert-only collection of survey log records. Every call to `insert`
/// produces a new document; nothing is ever updated in place.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, record: &LogRecord) -> Result<DocumentId>;
    async fn fetch(&self, id: &DocumentId) -> Result<Option<LogRecord>>;
    async fn list_for_session(&self, session_id: SessionId) -> Result<Vec<StoredLog>>;
}

#[derive(Debug, Clone)]
pub struct StoredLog {
    pub id: DocumentId,
    pub record: LogRecord,
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// Number of stored records of each log type for one session.
    pub async fn count_by_log_type(&self, session_id: SessionId) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            "SELECT log_type, COUNT(*) FROM survey_logs
             WHERE session_id = ?
             GROUP BY log_type
             ORDER BY log_type ASC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|r| (r.get::<String, _>(0), r.get::<i64, _>(1)))
            .collect())
    }

    pub async fn list_sessions(&self, limit: u32) -> Result<Vec<(SessionId, i64)>> {
        let rows = sqlx::query(
            "SELECT session_id, COUNT(*) FROM survey_logs
             GROUP BY session_id
             ORDER BY MAX(seq) DESC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| -> Result<(SessionId, i64)> {
                let raw = r.get::<String, _>(0);
                let session_id = Uuid::parse_str(&raw)
                    .with_context(|| format!("stored session id '{raw}' is not a uuid"))?;
                Ok((SessionId(session_id), r.get::<i64, _>(1)))
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for Storage {
    async fn insert(&self, record: &LogRecord) -> Result<DocumentId> {
        let id = DocumentId(Uuid::new_v4().simple().to_string());
        let mut document = record.clone();
        document.timestamp = None;
        let body = serde_json::to_string(&document).context("failed to encode log record")?;

        sqlx::query(
            "INSERT INTO survey_logs (id, session_id, user_id, log_type, current_step, document, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id.0)
        .bind(record.session_id.to_string())
        .bind(record.user_id.to_string())
        .bind(record.log_type.as_str())
        .bind(record.current_step.0)
        .bind(body)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("failed to insert log record")?;

        debug!(document_id = %id, log_type = record.log_type.as_str(), "stored log record");
        Ok(id)
    }

    async fn fetch(&self, id: &DocumentId) -> Result<Option<LogRecord>> {
        let row = sqlx::query("SELECT document, created_at FROM survey_logs WHERE id = ?")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| decode_record(r.get::<String, _>(0), r.get::<DateTime<Utc>, _>(1)))
            .transpose()
            .with_context(|| format!("stored document '{id}' is not a valid log record"))
    }

    async fn list_for_session(&self, session_id: SessionId) -> Result<Vec<StoredLog>> {
        let rows = sqlx::query(
            "SELECT id, document, created_at FROM survey_logs
             WHERE session_id = ?
             ORDER BY seq ASC",
        )
        .bind(session_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| -> Result<StoredLog> {
                let id = DocumentId(r.get::<String, _>(0));
                let record = decode_record(r.get::<String, _>(1), r.get::<DateTime<Utc>, _>(2))
                    .with_context(|| format!("stored document '{id}' is not a valid log record"))?;
                Ok(StoredLog { id, record })
            })
            .collect()
    }
}

fn decode_record(body: String, created_at: DateTime<Utc>) -> Result<LogRecord> {
    let mut record: LogRecord = serde_json::from_str(&body)?;
    record.timestamp = Some(created_at);
    Ok(record)
}

/// Short label shown by operator tooling.
pub fn log_type_label(log_type: LogType) -> &'static str {
    match log_type {
        LogType::Temp => "progress",
        LogType::CompletedOneMobilityAid => "aid complete",
        LogType::Continue => "continue later",
        LogType::Final => "final",
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
