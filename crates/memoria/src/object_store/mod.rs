//! Long-term object storage for the deep tier
//!
//! Defines the ObjectStore trait that abstracts heterogeneous object-storage
//! backends (in-memory reference, S3-compatible, BOS, OSS) behind one
//! put/get/delete/list contract, plus the canonical key scheme and the
//! config-driven backend factory.

pub mod bos;
pub mod memory;
pub mod oss;
pub mod s3;
mod sign;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::config::ObjectStoreConfig;
use crate::error::Result;

pub use bos::BosStore;
pub use memory::MemoryStore;
pub use oss::OssStore;
pub use s3::S3Store;

/// Object storage key for a user profile (e.g. `profiles/u123.json`).
pub fn profile_key(user_id: &str) -> String {
    format!("profiles/{user_id}.json")
}

/// Object storage key for a user's knowledge triples
/// (e.g. `knowledge/u123.jsonl`).
pub fn knowledge_key(user_id: &str) -> String {
    format!("knowledge/{user_id}.jsonl")
}

/// Object storage key for a deep-archived session's message log.
pub fn archive_key(session_id: Uuid) -> String {
    format!("archives/{session_id}.jsonl")
}

/// Uniform capability contract for long-term object storage backends.
///
/// Every backend maps its vendor-specific not-found signal to `Ok(None)` in
/// `get`: "no object" is a data value, never an error, so callers can treat
/// a new user with no history as normal control flow. `delete` is idempotent
/// and `list` fully drains vendor pagination before returning.
///
/// Keys are UTF-8 path strings; callers are responsible for path-safe key
/// content (the key scheme functions above produce safe keys for safe ids).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload an object, overwriting any previous value for the key.
    ///
    /// `content_type` is advisory metadata passed to the vendor API when
    /// present; it is never validated against the payload.
    async fn put(&self, key: &str, body: Bytes, content_type: Option<&str>) -> Result<()>;

    /// Download an object. Returns `Ok(None)` when the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Delete an object. Deleting a non-existent key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// List every key whose name begins with `prefix`. Order is unspecified.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

/// Normalize a configured endpoint into a fully-qualified URL, defaulting to
/// a secure scheme for bare hostnames.
pub(crate) fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Build an object store from configuration.
///
/// If any of endpoint/bucket/access-key-id/access-key-secret is missing the
/// factory degrades to the in-memory reference backend instead of failing,
/// so calling code keeps working in local and test environments without
/// cloud credentials.
pub fn from_config(config: &ObjectStoreConfig) -> Arc<dyn ObjectStore> {
    if !config.has_credentials() {
        warn!(
            provider = %config.provider,
            "object store credentials incomplete, using in-memory backend"
        );
        return Arc::new(MemoryStore::new());
    }

    // has_credentials() guarantees these are present
    let endpoint = normalize_endpoint(config.endpoint.as_deref().unwrap_or_default());
    let bucket = config.bucket.clone().unwrap_or_default();
    let access_key_id = config.access_key_id.clone().unwrap_or_default();
    let access_key_secret = config.access_key_secret.clone().unwrap_or_default();

    match config.provider.as_str() {
        "bos" => Arc::new(BosStore::new(endpoint, bucket, access_key_id, access_key_secret)),
        "oss" => Arc::new(OssStore::new(endpoint, bucket, access_key_id, access_key_secret)),
        _ => Arc::new(S3Store::new(
            endpoint,
            bucket,
            config.region.clone(),
            access_key_id,
            access_key_secret,
        )),
    }
}
