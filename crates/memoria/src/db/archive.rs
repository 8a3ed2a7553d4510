//! Tier transitions for the session lifecycle
//!
//! The external scheduler decides *when* (via `ArchivalPolicy` and
//! `sessions_due_for_archival`); these operations perform the moves. Each
//! transition is guarded against the expected predecessor status, refreshes
//! the session clock, and records an audit entry inside the same
//! transaction.

use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use sqlx::postgres::PgConnection;
use tracing::info;
use uuid::Uuid;

use crate::db::{MemoryDb, log_audit};
use crate::error::{MemoriaError, Result};
use crate::model::{MessageArchive, Session, SessionStatus};
use crate::object_store::{ObjectStore, archive_key};
use crate::semantics::{ArchivedMessageRecord, serialize_archive};

impl MemoryDb {
    /// Move an active session to the cold tier.
    ///
    /// Message rows move into `messages_archive`, losing their embeddings;
    /// the hot rows are deleted and the session becomes `ColdArchived`. The
    /// whole move is one transaction. Returns the number of messages moved.
    pub async fn archive_session(&self, session_id: Uuid) -> Result<u64> {
        let mut tx = self.pool().begin().await?;

        let session = lock_session(&mut tx, session_id).await?;
        if session.status != SessionStatus::Active {
            return Err(MemoriaError::InvalidTransition {
                from: session.status,
                to: SessionStatus::ColdArchived,
            });
        }

        let moved = sqlx::query(
            "INSERT INTO messages_archive (id, session_id, role, content, created_at)
             SELECT id, session_id, role, content, created_at
             FROM messages WHERE session_id = $1",
        )
        .bind(session_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM messages WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE sessions SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(session_id)
            .bind(SessionStatus::ColdArchived)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;

        log_audit(
            &mut *tx,
            "session.cold_archive",
            "session",
            Some(session_id.to_string().as_str()),
            Some(json!({ "messages_moved": moved })),
        )
        .await?;

        tx.commit().await?;
        info!(%session_id, moved, "session cold-archived");
        Ok(moved)
    }

    /// Move a cold session to the deep tier.
    ///
    /// The session's archived messages are serialized as JSONL and stored
    /// under `archives/{session_id}.jsonl`; the archive rows are then purged
    /// and the session becomes `DeepArchived`. The object `put` happens
    /// before the relational transaction commits; there is no cross-tier
    /// coordination, and an orphaned object after a relational failure is
    /// acceptable. Returns the number of messages serialized.
    pub async fn deep_archive_session(
        &self,
        session_id: Uuid,
        store: &dyn ObjectStore,
    ) -> Result<u64> {
        let session = self
            .get_session(session_id)
            .await?
            .ok_or(MemoriaError::Database(sqlx::Error::RowNotFound))?;
        if session.status != SessionStatus::ColdArchived {
            return Err(MemoriaError::InvalidTransition {
                from: session.status,
                to: SessionStatus::DeepArchived,
            });
        }

        let rows: Vec<MessageArchive> = self.archived_messages(session_id).await?;
        let records: Vec<ArchivedMessageRecord> =
            rows.iter().map(ArchivedMessageRecord::from).collect();
        store
            .put(
                &archive_key(session_id),
                Bytes::from(serialize_archive(&records)),
                Some("application/x-ndjson"),
            )
            .await?;

        let mut tx = self.pool().begin().await?;

        // Conditional update re-checks the status under the transaction; a
        // concurrent transition makes the guard miss
        let updated = sqlx::query(
            "UPDATE sessions SET status = $2, updated_at = $3 WHERE id = $1 AND status = $4",
        )
        .bind(session_id)
        .bind(SessionStatus::DeepArchived)
        .bind(Utc::now())
        .bind(SessionStatus::ColdArchived)
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            let current = lock_session(&mut tx, session_id).await?;
            return Err(MemoriaError::InvalidTransition {
                from: current.status,
                to: SessionStatus::DeepArchived,
            });
        }

        sqlx::query("DELETE FROM messages_archive WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        log_audit(
            &mut *tx,
            "session.deep_archive",
            "session",
            Some(session_id.to_string().as_str()),
            Some(json!({
                "messages_serialized": records.len(),
                "object_key": archive_key(session_id),
            })),
        )
        .await?;

        tx.commit().await?;
        info!(%session_id, count = records.len(), "session deep-archived");
        Ok(records.len() as u64)
    }

    /// Soft-delete: mark the session `Deleted` (any state may transition).
    pub async fn mark_session_deleted(&self, session_id: Uuid) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        let updated = sqlx::query(
            "UPDATE sessions SET status = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(session_id)
        .bind(SessionStatus::Deleted)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;
        if updated.rows_affected() == 0 {
            return Err(MemoriaError::Database(sqlx::Error::RowNotFound));
        }

        log_audit(
            &mut *tx,
            "session.soft_delete",
            "session",
            Some(session_id.to_string().as_str()),
            None,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Hard-delete: remove the session row, cascading its messages and
    /// summaries. Archive rows carry no foreign key, so they are purged
    /// explicitly in the same transaction.
    pub async fn delete_session(&self, session_id: Uuid) -> Result<()> {
        let mut tx = self.pool().begin().await?;

        let deleted = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Err(MemoriaError::Database(sqlx::Error::RowNotFound));
        }

        sqlx::query("DELETE FROM messages_archive WHERE session_id = $1")
            .bind(session_id)
            .execute(&mut *tx)
            .await?;

        log_audit(
            &mut *tx,
            "session.hard_delete",
            "session",
            Some(session_id.to_string().as_str()),
            None,
        )
        .await?;

        tx.commit().await?;
        info!(%session_id, "session hard-deleted");
        Ok(())
    }
}

/// Fetch a session row with a row lock for the rest of the transaction.
async fn lock_session(tx: &mut PgConnection, session_id: Uuid) -> Result<Session> {
    sqlx::query_as::<_, Session>(
        "SELECT id, updated_at, status, title, metadata
         FROM sessions WHERE id = $1 FOR UPDATE",
    )
    .bind(session_id)
    .fetch_optional(tx)
    .await?
    .ok_or(MemoriaError::Database(sqlx::Error::RowNotFound))
}
