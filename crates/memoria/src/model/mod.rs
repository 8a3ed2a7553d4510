//! Row types for the tiered relational store
//!
//! Defines the session/message/summary rows of the hot tier, the archive row
//! of the cold tier, and the session status state machine that drives
//! movement between tiers.

use chrono::{DateTime, Utc};
use pgvector::Vector;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{MemoriaError, Result};

/// Fixed embedding dimension for hot-tier messages.
pub const EMBEDDING_DIMENSIONS: usize = 1536;

/// Session archival status.
///
/// Stored as a smallint (1..4). Transitions are monotonic forward only:
/// Active -> ColdArchived -> DeepArchived; any state may move to Deleted.
/// No tier skip-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[repr(i16)]
pub enum SessionStatus {
    /// Hot tier: full querying and embedding support
    Active = 1,
    /// Cold tier: message bodies moved to the archive table, no embeddings
    ColdArchived = 2,
    /// Deep tier: serialized to object storage, relational rows purged
    DeepArchived = 3,
    /// Retention-driven tombstone
    Deleted = 4,
}

impl SessionStatus {
    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        match (self, next) {
            (SessionStatus::Active, SessionStatus::ColdArchived) => true,
            (SessionStatus::ColdArchived, SessionStatus::DeepArchived) => true,
            (_, SessionStatus::Deleted) => true,
            _ => false,
        }
    }

    /// The next archival tier, if one exists.
    pub fn next_tier(self) -> Option<SessionStatus> {
        match self {
            SessionStatus::Active => Some(SessionStatus::ColdArchived),
            SessionStatus::ColdArchived => Some(SessionStatus::DeepArchived),
            SessionStatus::DeepArchived | SessionStatus::Deleted => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionStatus::Active => "active",
            SessionStatus::ColdArchived => "cold_archived",
            SessionStatus::DeepArchived => "deep_archived",
            SessionStatus::Deleted => "deleted",
        };
        write!(f, "{name}")
    }
}

/// A chat session.
///
/// `updated_at` advances on every mutation and is the sole archival clock.
#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub updated_at: DateTime<Utc>,
    pub status: SessionStatus,
    pub title: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl Session {
    /// Create a new active session.
    pub fn new(title: Option<String>, metadata: Option<serde_json::Value>) -> Self {
        Self {
            id: Uuid::new_v4(),
            updated_at: Utc::now(),
            status: SessionStatus::Active,
            title,
            metadata,
        }
    }

    /// Age of the session relative to `now`, measured from `updated_at`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.updated_at
    }
}

/// A single message in a session.
#[derive(Debug, Clone, FromRow)]
pub struct Message {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Open string enum: "user", "assistant", "system", or anything else
    pub role: String,
    pub content: String,
    /// Absent means "not yet embedded"
    pub embedding: Option<Vector>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message, validating the embedding dimension.
    ///
    /// A vector of any length other than [`EMBEDDING_DIMENSIONS`] is a
    /// data-integrity violation.
    pub fn new(
        session_id: Uuid,
        role: impl Into<String>,
        content: impl Into<String>,
        embedding: Option<Vec<f32>>,
    ) -> Result<Self> {
        let embedding = match embedding {
            Some(values) => {
                if values.len() != EMBEDDING_DIMENSIONS {
                    return Err(MemoriaError::InvalidEmbeddingDimension {
                        expected: EMBEDDING_DIMENSIONS,
                        actual: values.len(),
                    });
                }
                Some(Vector::from(values))
            }
            None => None,
        };

        Ok(Self {
            id: Uuid::new_v4(),
            session_id,
            role: role.into(),
            content: content.into(),
            embedding,
            created_at: Utc::now(),
        })
    }
}

/// A message row in the cold-tier archive table.
///
/// `session_id` is a plain value reference (used for lookup, not relational
/// integrity), and archive rows never carry embeddings.
#[derive(Debug, Clone, FromRow)]
pub struct MessageArchive {
    pub id: Uuid,
    pub session_id: Uuid,
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl MessageArchive {
    /// Build the archive copy of a hot-tier message, dropping its embedding.
    pub fn from_message(message: &Message) -> Self {
        Self {
            id: message.id,
            session_id: message.session_id,
            role: message.role.clone(),
            content: message.content.clone(),
            created_at: message.created_at,
        }
    }
}

/// A structured summary of a session produced by a compression strategy.
///
/// Append-only: summaries are never mutated after creation; a session may
/// accumulate several, ordered by `created_at`.
#[derive(Debug, Clone, FromRow)]
pub struct SessionSummary {
    pub id: Uuid,
    pub session_id: Uuid,
    /// Compression algorithm identifier (e.g. "context_compression_v2")
    pub strategy: String,
    pub strategy_version: Option<String>,
    /// Optional human-readable rendering
    pub summary_text: Option<String>,
    /// Structured document: decision points, todos, code snippets
    pub summary_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl SessionSummary {
    pub fn new(
        session_id: Uuid,
        strategy: impl Into<String>,
        strategy_version: Option<String>,
        summary_text: Option<String>,
        summary_json: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            strategy: strategy.into(),
            strategy_version,
            summary_text,
            summary_json,
            created_at: Utc::now(),
        }
    }
}

/// An audit log row.
#[derive(Debug, Clone, FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub action: String,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: Option<serde_json::Value>,
}
