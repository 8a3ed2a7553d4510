//! Hot-tier relational store (PostgreSQL + pgvector)
//!
//! `MemoryDb` is an explicitly constructed context object owning the
//! connection pool: created at startup, closed at shutdown, passed where
//! needed. Each unit of work runs in a single transaction; commit on
//! success, rollback (on drop) on any failure.

mod archive;

use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgExecutor, PgPool};
use tracing::info;
use uuid::Uuid;

use crate::config::DatabaseConfig;
use crate::error::{MemoriaError, Result};
use crate::lifecycle::ArchivalPolicy;
use crate::model::{Message, MessageArchive, Session, SessionStatus, SessionSummary};

/// Schema for the five relational surfaces. `vector(1536)` requires the
/// pgvector extension, created first.
const SCHEMA: &[&str] = &[
    "CREATE EXTENSION IF NOT EXISTS vector",
    "CREATE TABLE IF NOT EXISTS sessions (
        id UUID PRIMARY KEY,
        updated_at TIMESTAMPTZ NOT NULL,
        status SMALLINT NOT NULL,
        title VARCHAR(512),
        metadata JSONB
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        id UUID PRIMARY KEY,
        session_id UUID NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        role VARCHAR(32) NOT NULL,
        content TEXT NOT NULL,
        embedding vector(1536),
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS ix_messages_session_id ON messages (session_id)",
    "CREATE TABLE IF NOT EXISTS messages_archive (
        id UUID PRIMARY KEY,
        session_id UUID NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS ix_messages_archive_session_id
        ON messages_archive (session_id)",
    "CREATE TABLE IF NOT EXISTS session_summaries (
        id UUID PRIMARY KEY,
        session_id UUID NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
        strategy VARCHAR(64) NOT NULL,
        strategy_version VARCHAR(32),
        summary_text TEXT,
        summary_json JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS ix_session_summaries_session_id
        ON session_summaries (session_id)",
    "CREATE TABLE IF NOT EXISTS audit_logs (
        id UUID PRIMARY KEY,
        created_at TIMESTAMPTZ NOT NULL,
        action VARCHAR(64) NOT NULL,
        resource_type VARCHAR(64) NOT NULL,
        resource_id TEXT,
        details JSONB
    )",
];

/// Connection-pooled relational context for the hot and cold tiers.
pub struct MemoryDb {
    pool: PgPool,
}

impl MemoryDb {
    /// Connect to PostgreSQL.
    ///
    /// A missing database URL is a fatal setup error; unlike the object
    /// store there is no safe relational fallback.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.url.as_deref().ok_or_else(|| {
            MemoriaError::Config("database url not set: configure [database] url".to_string())
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(url)
            .await?;

        info!(max_connections = config.max_connections, "connected to database");
        Ok(Self { pool })
    }

    /// Wrap an existing pool (tests, shared application pools).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the pool. Part of the explicit lifecycle; call at shutdown.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Create the pgvector extension and all tables (init / tests).
    pub async fn init_schema(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Create a new active session.
    pub async fn create_session(
        &self,
        title: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Result<Session> {
        let session = Session::new(title, metadata);
        sqlx::query(
            "INSERT INTO sessions (id, updated_at, status, title, metadata)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(session.id)
        .bind(session.updated_at)
        .bind(session.status)
        .bind(&session.title)
        .bind(&session.metadata)
        .execute(&self.pool)
        .await?;
        Ok(session)
    }

    pub async fn get_session(&self, id: Uuid) -> Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(
            "SELECT id, updated_at, status, title, metadata FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    /// Refresh the session's archival clock.
    pub async fn touch_session(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("UPDATE sessions SET updated_at = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(MemoriaError::Database(sqlx::Error::RowNotFound));
        }
        Ok(())
    }

    /// Append a message, creating the session on its first message and
    /// refreshing the session's archival clock, as one transaction.
    pub async fn append_message(
        &self,
        session_id: Uuid,
        role: &str,
        content: &str,
        embedding: Option<Vec<f32>>,
    ) -> Result<Message> {
        let message = Message::new(session_id, role, content, embedding)?;

        let mut tx = self.pool.begin().await?;

        // Sessions come into being with their first message; an existing row
        // only has its clock advanced
        sqlx::query(
            "INSERT INTO sessions (id, updated_at, status) VALUES ($1, $2, $3)
             ON CONFLICT (id) DO UPDATE SET updated_at = EXCLUDED.updated_at",
        )
        .bind(session_id)
        .bind(Utc::now())
        .bind(SessionStatus::Active)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO messages (id, session_id, role, content, embedding, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(message.id)
        .bind(message.session_id)
        .bind(&message.role)
        .bind(&message.content)
        .bind(&message.embedding)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(message)
    }

    /// Hot-tier messages of a session, oldest first.
    pub async fn session_messages(&self, session_id: Uuid) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT id, session_id, role, content, embedding, created_at
             FROM messages WHERE session_id = $1 ORDER BY created_at",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    /// Record a compression summary. Summaries are append-only; a session
    /// accumulates one per compression pass.
    pub async fn add_summary(
        &self,
        session_id: Uuid,
        strategy: &str,
        strategy_version: Option<String>,
        summary_text: Option<String>,
        summary_json: serde_json::Value,
    ) -> Result<SessionSummary> {
        let summary = SessionSummary::new(
            session_id,
            strategy,
            strategy_version,
            summary_text,
            summary_json,
        );

        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO session_summaries
                 (id, session_id, strategy, strategy_version, summary_text, summary_json, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(summary.id)
        .bind(summary.session_id)
        .bind(&summary.strategy)
        .bind(&summary.strategy_version)
        .bind(&summary.summary_text)
        .bind(&summary.summary_json)
        .bind(summary.created_at)
        .execute(&mut *tx)
        .await?;

        let touched = sqlx::query("UPDATE sessions SET updated_at = $2 WHERE id = $1")
            .bind(session_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(MemoriaError::Database(sqlx::Error::RowNotFound));
        }

        tx.commit().await?;
        Ok(summary)
    }

    /// Summaries of a session, oldest first.
    pub async fn session_summaries(&self, session_id: Uuid) -> Result<Vec<SessionSummary>> {
        let summaries = sqlx::query_as::<_, SessionSummary>(
            "SELECT id, session_id, strategy, strategy_version, summary_text, summary_json, created_at
             FROM session_summaries WHERE session_id = $1 ORDER BY created_at",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(summaries)
    }

    /// Cold-tier messages of a session (weak-ref lookup), oldest first.
    pub async fn archived_messages(&self, session_id: Uuid) -> Result<Vec<MessageArchive>> {
        let messages = sqlx::query_as::<_, MessageArchive>(
            "SELECT id, session_id, role, content, created_at
             FROM messages_archive WHERE session_id = $1 ORDER BY created_at",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(messages)
    }

    /// Sessions whose age makes them due for the next archival tier.
    pub async fn sessions_due_for_archival(&self, policy: &ArchivalPolicy) -> Result<Vec<Session>> {
        let now = Utc::now();
        let sessions = sqlx::query_as::<_, Session>(
            "SELECT id, updated_at, status, title, metadata FROM sessions
             WHERE (status = $1 AND updated_at < $2)
                OR (status = $3 AND updated_at < $4)
             ORDER BY updated_at",
        )
        .bind(SessionStatus::Active)
        .bind(now - policy.hot_window)
        .bind(SessionStatus::ColdArchived)
        .bind(now - policy.cold_window)
        .fetch_all(&self.pool)
        .await?;
        Ok(sessions)
    }
}

/// Write an audit log entry on the caller's executor.
///
/// Pass the open transaction so the audit write and its business operation
/// commit atomically together.
pub async fn log_audit<'e, E>(
    executor: E,
    action: &str,
    resource_type: &str,
    resource_id: Option<&str>,
    details: Option<serde_json::Value>,
) -> Result<()>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO audit_logs (id, created_at, action, resource_type, resource_id, details)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(Uuid::new_v4())
    .bind(Utc::now())
    .bind(action)
    .bind(resource_type)
    .bind(resource_id)
    .bind(details)
    .execute(executor)
    .await?;
    Ok(())
}
