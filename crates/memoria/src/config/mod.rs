use std::path::Path;

use serde::Deserialize;

use crate::error::{MemoriaError, Result};

/// Main configuration structure for Memoria
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Relational tier configuration (PostgreSQL + pgvector)
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Long-term object storage configuration
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    /// Archival window configuration (hot/cold/deep tiers)
    #[serde(default)]
    pub archival: ArchivalConfig,
}

/// Relational tier configuration
///
/// A missing `url` is a fatal setup error at the point of first use; there is
/// no safe relational fallback.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL (e.g., "postgres://localhost/memoria")
    #[serde(default)]
    pub url: Option<String>,
    /// Maximum pool connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum idle pool connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

/// Long-term object storage configuration
///
/// Credentials are all-or-nothing: if `endpoint`, `bucket`, `access_key_id`
/// or `access_key_secret` is missing the factory degrades to the in-memory
/// reference backend instead of raising, so local and test environments keep
/// working without cloud credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStoreConfig {
    /// Backend provider: "s3" (MinIO / AWS S3 / compatible), "bos", or "oss"
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Service endpoint; a bare hostname is normalized to "https://{host}"
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bucket name
    #[serde(default)]
    pub bucket: Option<String>,
    /// Access key id
    #[serde(default)]
    pub access_key_id: Option<String>,
    /// Access key secret
    #[serde(default)]
    pub access_key_secret: Option<String>,
    /// Region (S3-compatible backends)
    #[serde(default = "default_region")]
    pub region: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            endpoint: None,
            bucket: None,
            access_key_id: None,
            access_key_secret: None,
            region: default_region(),
        }
    }
}

fn default_provider() -> String {
    "s3".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

/// Archival window configuration
///
/// Sessions older than `hot_days` are eligible for cold archival; older than
/// `cold_days` for deep archival. `deep_days` bounds deep retention before
/// retention-driven deletion. These are policy parameters, not hard
/// constants.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchivalConfig {
    /// Hot window in days (active relational storage)
    #[serde(default = "default_hot_days")]
    pub hot_days: i64,
    /// Cold window in days (archived relational storage)
    #[serde(default = "default_cold_days")]
    pub cold_days: i64,
    /// Deep window in days (object-storage tier)
    #[serde(default = "default_deep_days")]
    pub deep_days: i64,
}

impl Default for ArchivalConfig {
    fn default() -> Self {
        Self {
            hot_days: default_hot_days(),
            cold_days: default_cold_days(),
            deep_days: default_deep_days(),
        }
    }
}

fn default_hot_days() -> i64 {
    7
}

fn default_cold_days() -> i64 {
    180
}

fn default_deep_days() -> i64 {
    1095
}

impl Config {
    /// Parse configuration from a TOML string.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| MemoriaError::Config(format!("invalid config: {e}")))
    }

    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }
}

impl ObjectStoreConfig {
    /// True when every credential field required for a remote backend is
    /// present and non-empty.
    pub fn has_credentials(&self) -> bool {
        [
            &self.endpoint,
            &self.bucket,
            &self.access_key_id,
            &self.access_key_secret,
        ]
        .iter()
        .all(|field| field.as_deref().is_some_and(|v| !v.is_empty()))
    }
}
