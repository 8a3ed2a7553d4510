//! Canonical serialization for deep-tier documents
//!
//! Three document kinds live in object storage: the per-user profile (one
//! JSON object), the per-user knowledge triples (newline-delimited JSON
//! 3-arrays), and the per-session archived message log (newline-delimited
//! JSON objects). Encoding is UTF-8 with non-ASCII characters preserved
//! literally; user-facing text is frequently non-Latin script.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{MemoriaError, Result};
use crate::model::MessageArchive;
use crate::object_store::{ObjectStore, archive_key, knowledge_key, profile_key};

/// A user profile: a free-form JSON object.
pub type Profile = Map<String, Value>;

/// Recognized keys of the profile `traits` sub-object.
pub const PROFILE_TRAIT_KEYS: [&str; 4] = [
    "communication_style",
    "emotional_tone",
    "preferred_topics",
    "decision_making",
];

/// A (subject, predicate, object) fact record extracted from conversations.
///
/// No uniqueness constraint; duplicates are permitted and insertion order is
/// preserved within a user's collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeTriple {
    pub subject: String,
    pub predicate: String,
    pub object: String,
}

impl KnowledgeTriple {
    pub fn new(
        subject: impl Into<String>,
        predicate: impl Into<String>,
        object: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            predicate: predicate.into(),
            object: object.into(),
        }
    }

    /// Space-joined concatenation of the three fields, used for keyword
    /// matching.
    pub fn text(&self) -> String {
        format!("{} {} {}", self.subject, self.predicate, self.object)
    }
}

impl From<(&str, &str, &str)> for KnowledgeTriple {
    fn from((subject, predicate, object): (&str, &str, &str)) -> Self {
        Self::new(subject, predicate, object)
    }
}

/// One line of a deep-archived session's message log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchivedMessageRecord {
    pub role: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<&MessageArchive> for ArchivedMessageRecord {
    fn from(row: &MessageArchive) -> Self {
        Self {
            role: row.role.clone(),
            content: row.content.clone(),
            created_at: row.created_at,
        }
    }
}

/// Encode a user profile to JSON bytes.
pub fn serialize_profile(profile: &Profile) -> Vec<u8> {
    // serde_json leaves non-ASCII unescaped
    serde_json::to_vec(profile).expect("JSON maps always serialize")
}

/// Decode JSON bytes to a user profile. Malformed input is a decode error,
/// propagated to the caller.
pub fn parse_profile(raw: &[u8]) -> Result<Profile> {
    serde_json::from_slice(raw).map_err(|e| MemoriaError::Decode(format!("profile: {e}")))
}

/// Encode triples to JSONL: one 3-element JSON array per line, order
/// preserved.
pub fn serialize_triples(triples: &[KnowledgeTriple]) -> Vec<u8> {
    let lines: Vec<String> = triples
        .iter()
        .map(|t| {
            serde_json::to_string(&[&t.subject, &t.predicate, &t.object])
                .expect("string arrays always serialize")
        })
        .collect();
    lines.join("\n").into_bytes()
}

/// Decode JSONL to triples.
///
/// Blank lines are skipped. A line holding a JSON array with fewer than 3
/// elements (or valid JSON that is not an array) is silently dropped;
/// elements beyond the third are ignored. A line that is not valid JSON is a
/// decode error. This permissive stance favors availability for a format
/// written by the same system that reads it.
pub fn parse_triples(raw: &[u8]) -> Result<Vec<KnowledgeTriple>> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| MemoriaError::Decode(format!("triples: invalid utf-8: {e}")))?;

    let mut triples = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(line)
            .map_err(|e| MemoriaError::Decode(format!("triple line: {e}")))?;
        let Value::Array(items) = value else {
            continue;
        };
        if items.len() < 3 {
            continue;
        }
        triples.push(KnowledgeTriple::new(
            value_to_text(&items[0]),
            value_to_text(&items[1]),
            value_to_text(&items[2]),
        ));
    }
    Ok(triples)
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Encode a deep-archive message log to JSONL.
pub fn serialize_archive(records: &[ArchivedMessageRecord]) -> Vec<u8> {
    let lines: Vec<String> = records
        .iter()
        .map(|r| serde_json::to_string(r).expect("archive records always serialize"))
        .collect();
    lines.join("\n").into_bytes()
}

/// Decode a deep-archive message log. Blank lines are skipped; any other
/// malformed line is a decode error.
pub fn parse_archive(raw: &[u8]) -> Result<Vec<ArchivedMessageRecord>> {
    let text = std::str::from_utf8(raw)
        .map_err(|e| MemoriaError::Decode(format!("archive: invalid utf-8: {e}")))?;

    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            serde_json::from_str(line).map_err(|e| MemoriaError::Decode(format!("archive line: {e}")))
        })
        .collect()
}

/// Load a user profile from storage; `None` if the key does not exist.
pub async fn load_user_profile(store: &dyn ObjectStore, user_id: &str) -> Result<Option<Profile>> {
    match store.get(&profile_key(user_id)).await? {
        Some(raw) => Ok(Some(parse_profile(&raw)?)),
        None => Ok(None),
    }
}

/// Save a user profile to storage (full overwrite, no partial patch).
pub async fn save_user_profile(
    store: &dyn ObjectStore,
    user_id: &str,
    profile: &Profile,
) -> Result<()> {
    store
        .put(
            &profile_key(user_id),
            Bytes::from(serialize_profile(profile)),
            Some("application/json"),
        )
        .await
}

/// Load a user's knowledge triples; empty if the key does not exist.
pub async fn load_knowledge_triples(
    store: &dyn ObjectStore,
    user_id: &str,
) -> Result<Vec<KnowledgeTriple>> {
    match store.get(&knowledge_key(user_id)).await? {
        Some(raw) => parse_triples(&raw),
        None => Ok(Vec::new()),
    }
}

/// Save a user's knowledge triples (whole-collection overwrite).
pub async fn save_knowledge_triples(
    store: &dyn ObjectStore,
    user_id: &str,
    triples: &[KnowledgeTriple],
) -> Result<()> {
    store
        .put(
            &knowledge_key(user_id),
            Bytes::from(serialize_triples(triples)),
            Some("application/x-ndjson"),
        )
        .await
}

/// Load a deep-archived session's message log; `None` if never archived.
pub async fn load_session_archive(
    store: &dyn ObjectStore,
    session_id: uuid::Uuid,
) -> Result<Option<Vec<ArchivedMessageRecord>>> {
    match store.get(&archive_key(session_id)).await? {
        Some(raw) => Ok(Some(parse_archive(&raw)?)),
        None => Ok(None),
    }
}
