//! Integration tests for the relational tier
//!
//! These run against a live PostgreSQL server with the pgvector extension:
//!
//! ```sh
//! DATABASE_URL=postgres://localhost/memoria_test cargo test -- --ignored
//! ```

use chrono::{Duration, Utc};
use memoria::config::DatabaseConfig;
use memoria::db::MemoryDb;
use memoria::lifecycle::ArchivalPolicy;
use memoria::model::{EMBEDDING_DIMENSIONS, SessionStatus};
use memoria::object_store::{MemoryStore, ObjectStore, archive_key};
use memoria::semantics::parse_archive;
use memoria::MemoriaError;
use serde_json::json;
use uuid::Uuid;

async fn test_db() -> MemoryDb {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let url = std::env::var("DATABASE_URL")
        .expect("set DATABASE_URL to run the database integration tests");
    let db = MemoryDb::connect(&DatabaseConfig {
        url: Some(url),
        ..Default::default()
    })
    .await
    .expect("database must be reachable");
    db.init_schema().await.expect("schema init must succeed");
    db
}

/// Backdate a session's archival clock.
async fn backdate(db: &MemoryDb, session_id: Uuid, days: i64) {
    sqlx::query("UPDATE sessions SET updated_at = $2 WHERE id = $1")
        .bind(session_id)
        .bind(Utc::now() - Duration::days(days))
        .execute(db.pool())
        .await
        .unwrap();
}

async fn audit_count(db: &MemoryDb, action: &str, resource_id: Uuid) -> i64 {
    sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM audit_logs WHERE action = $1 AND resource_id = $2",
    )
    .bind(action)
    .bind(resource_id.to_string())
    .fetch_one(db.pool())
    .await
    .unwrap()
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server with pgvector"]
async fn test_connect_without_url_is_fatal() {
    let result = MemoryDb::connect(&DatabaseConfig::default()).await;
    assert!(matches!(result, Err(MemoriaError::Config(_))));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server with pgvector"]
async fn test_session_roundtrip() {
    let db = test_db().await;

    let session = db
        .create_session(Some("调试会话".to_string()), Some(json!({"lang": "zh"})))
        .await
        .unwrap();

    let loaded = db.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(loaded.id, session.id);
    assert_eq!(loaded.status, SessionStatus::Active);
    assert_eq!(loaded.title.as_deref(), Some("调试会话"));
    assert_eq!(loaded.metadata, Some(json!({"lang": "zh"})));

    assert!(db.get_session(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server with pgvector"]
async fn test_append_message_advances_session_clock() {
    let db = test_db().await;
    let session = db.create_session(None, None).await.unwrap();
    backdate(&db, session.id, 30).await;

    let message = db
        .append_message(session.id, "user", "你好", None)
        .await
        .unwrap();
    assert_eq!(message.role, "user");

    let refreshed = db.get_session(session.id).await.unwrap().unwrap();
    assert!(refreshed.updated_at > Utc::now() - Duration::minutes(1));

    let messages = db.session_messages(session.id).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "你好");
    assert!(messages[0].embedding.is_none());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server with pgvector"]
async fn test_message_embedding_roundtrip_and_dimension_check() {
    let db = test_db().await;
    let session = db.create_session(None, None).await.unwrap();

    let message = db
        .append_message(
            session.id,
            "assistant",
            "embedded",
            Some(vec![0.25; EMBEDDING_DIMENSIONS]),
        )
        .await
        .unwrap();
    let stored = db.session_messages(session.id).await.unwrap();
    assert_eq!(stored[0].id, message.id);
    let embedding = stored[0].embedding.as_ref().unwrap();
    assert_eq!(embedding.as_slice().len(), EMBEDDING_DIMENSIONS);

    let result = db
        .append_message(session.id, "assistant", "bad", Some(vec![0.25; 3]))
        .await;
    assert!(matches!(
        result,
        Err(MemoriaError::InvalidEmbeddingDimension { .. })
    ));
    // The failed append must not have left a row behind
    assert_eq!(db.session_messages(session.id).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server with pgvector"]
async fn test_first_message_creates_the_session() {
    let db = test_db().await;
    let session_id = Uuid::new_v4();

    db.append_message(session_id, "user", "first contact", None)
        .await
        .unwrap();

    let session = db.get_session(session_id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::Active);
    assert!(session.title.is_none());
    assert_eq!(db.session_messages(session_id).await.unwrap().len(), 1);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server with pgvector"]
async fn test_summaries_are_append_only() {
    let db = test_db().await;
    let session = db.create_session(None, None).await.unwrap();

    db.add_summary(
        session.id,
        "context_compression_v2",
        Some("2".to_string()),
        Some("first pass".to_string()),
        json!({"todos": ["ship"], "decision_points": []}),
    )
    .await
    .unwrap();
    db.add_summary(
        session.id,
        "context_compression_v2",
        Some("2".to_string()),
        None,
        json!({"todos": []}),
    )
    .await
    .unwrap();

    let summaries = db.session_summaries(session.id).await.unwrap();
    assert_eq!(summaries.len(), 2);
    assert!(summaries[0].created_at <= summaries[1].created_at);
    assert_eq!(summaries[0].summary_text.as_deref(), Some("first pass"));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server with pgvector"]
async fn test_cold_archive_moves_messages_and_drops_embeddings() {
    let db = test_db().await;
    let session = db.create_session(None, None).await.unwrap();
    db.append_message(session.id, "user", "第一条", Some(vec![0.1; EMBEDDING_DIMENSIONS]))
        .await
        .unwrap();
    db.append_message(session.id, "assistant", "第二条", None)
        .await
        .unwrap();

    let moved = db.archive_session(session.id).await.unwrap();
    assert_eq!(moved, 2);

    // Hot rows are gone, archive rows remain as plain value references
    assert!(db.session_messages(session.id).await.unwrap().is_empty());
    let archived = db.archived_messages(session.id).await.unwrap();
    assert_eq!(archived.len(), 2);
    assert_eq!(archived[0].content, "第一条");

    let session = db.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(session.status, SessionStatus::ColdArchived);

    assert_eq!(audit_count(&db, "session.cold_archive", session.id).await, 1);

    // Archival is not repeatable
    let again = db.archive_session(session.id).await;
    assert!(matches!(
        again,
        Err(MemoriaError::InvalidTransition {
            from: SessionStatus::ColdArchived,
            to: SessionStatus::ColdArchived,
        })
    ));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server with pgvector"]
async fn test_deep_archive_serializes_then_purges() {
    let db = test_db().await;
    let store = MemoryStore::new();

    let session = db.create_session(None, None).await.unwrap();
    db.append_message(session.id, "user", "归档我", None)
        .await
        .unwrap();
    db.archive_session(session.id).await.unwrap();

    let count = db.deep_archive_session(session.id, &store).await.unwrap();
    assert_eq!(count, 1);

    let payload = store.get(&archive_key(session.id)).await.unwrap().unwrap();
    let records = parse_archive(&payload).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].content, "归档我");

    assert!(db.archived_messages(session.id).await.unwrap().is_empty());
    let session_row = db.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(session_row.status, SessionStatus::DeepArchived);
    assert_eq!(audit_count(&db, "session.deep_archive", session.id).await, 1);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server with pgvector"]
async fn test_deep_archive_requires_cold_status() {
    let db = test_db().await;
    let store = MemoryStore::new();
    let session = db.create_session(None, None).await.unwrap();

    let result = db.deep_archive_session(session.id, &store).await;
    assert!(matches!(
        result,
        Err(MemoriaError::InvalidTransition {
            from: SessionStatus::Active,
            to: SessionStatus::DeepArchived,
        })
    ));
    // Nothing was written to the deep tier
    assert!(store.is_empty().await);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server with pgvector"]
async fn test_soft_and_hard_delete() {
    let db = test_db().await;

    let soft = db.create_session(None, None).await.unwrap();
    db.mark_session_deleted(soft.id).await.unwrap();
    let row = db.get_session(soft.id).await.unwrap().unwrap();
    assert_eq!(row.status, SessionStatus::Deleted);

    let hard = db.create_session(None, None).await.unwrap();
    db.append_message(hard.id, "user", "bye", None).await.unwrap();
    db.add_summary(hard.id, "s", None, None, json!({})).await.unwrap();
    db.delete_session(hard.id).await.unwrap();

    assert!(db.get_session(hard.id).await.unwrap().is_none());
    assert!(db.session_messages(hard.id).await.unwrap().is_empty());
    assert!(db.session_summaries(hard.id).await.unwrap().is_empty());
    assert_eq!(audit_count(&db, "session.hard_delete", hard.id).await, 1);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL server with pgvector"]
async fn test_sessions_due_for_archival() {
    let db = test_db().await;
    let policy = ArchivalPolicy::default();

    let fresh = db.create_session(Some("fresh".to_string()), None).await.unwrap();
    let aged = db.create_session(Some("aged".to_string()), None).await.unwrap();
    backdate(&db, aged.id, 30).await;

    let due = db.sessions_due_for_archival(&policy).await.unwrap();
    let due_ids: Vec<Uuid> = due.iter().map(|s| s.id).collect();
    assert!(due_ids.contains(&aged.id));
    assert!(!due_ids.contains(&fresh.id));
}
