//! Baidu BOS backend
//!
//! Talks to the BOS REST API with bce-auth-v1 request signing. Listing
//! drains marker pagination; a 404 on GET maps to the absent sentinel and a
//! 404 on DELETE is treated as an idempotent success.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use crate::error::{MemoriaError, Result};
use crate::object_store::ObjectStore;
use crate::object_store::sign::{canonical_query, encode_key_path, hex_encode, hmac_sha256};

/// Default BOS endpoint (Beijing region).
pub const DEFAULT_BOS_ENDPOINT: &str = "https://bj.bcebos.com";

const EXPIRATION_SECONDS: u32 = 1800;
const MAX_KEYS_PER_PAGE: &str = "1000";

/// Baidu BOS object store using path-style addressing.
pub struct BosStore {
    endpoint: String,
    bucket: String,
    access_key_id: String,
    access_key_secret: String,
    client: OnceCell<Client>,
}

/// BOS list-objects response page (JSON)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListObjectsResponse {
    #[serde(default)]
    is_truncated: bool,
    next_marker: Option<String>,
    #[serde(default)]
    contents: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    key: String,
}

impl BosStore {
    pub fn new(
        endpoint: String,
        bucket: String,
        access_key_id: String,
        access_key_secret: String,
    ) -> Self {
        Self {
            endpoint,
            bucket,
            access_key_id,
            access_key_secret,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&Client> {
        self.client
            .get_or_try_init(|| async {
                Client::builder()
                    .build()
                    .map_err(|e| MemoriaError::ObjectStore(format!("http client: {e}")))
            })
            .await
    }

    fn host(&self) -> Result<String> {
        let url = Url::parse(&self.endpoint)
            .map_err(|e| MemoriaError::Config(format!("invalid endpoint {}: {e}", self.endpoint)))?;
        let host = url
            .host_str()
            .ok_or_else(|| MemoriaError::Config(format!("endpoint has no host: {}", self.endpoint)))?;
        Ok(match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        })
    }

    /// bce-auth-v1 Authorization header.
    fn sign(
        &self,
        method: &str,
        canonical_uri: &str,
        query: &str,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let host = self.host()?;
        let timestamp = now.format("%Y-%m-%dT%H:%M:%SZ");
        let auth_prefix = format!(
            "bce-auth-v1/{}/{timestamp}/{EXPIRATION_SECONDS}",
            self.access_key_id
        );

        let signing_key = hex_encode(&hmac_sha256(
            self.access_key_secret.as_bytes(),
            auth_prefix.as_bytes(),
        ));

        let canonical_headers = format!("host:{}", urlencoding::encode(&host));
        let canonical_request = format!("{method}\n{canonical_uri}\n{query}\n{canonical_headers}");
        let signature = hex_encode(&hmac_sha256(
            signing_key.as_bytes(),
            canonical_request.as_bytes(),
        ));

        Ok(format!("{auth_prefix}/host/{signature}"))
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, encode_key_path(key))
    }

    fn object_uri(&self, key: &str) -> String {
        format!("/{}/{}", self.bucket, encode_key_path(key))
    }

    async fn list_page(&self, prefix: &str, marker: Option<&str>) -> Result<ListObjectsResponse> {
        let mut params: Vec<(&str, &str)> =
            vec![("maxKeys", MAX_KEYS_PER_PAGE), ("prefix", prefix)];
        if let Some(marker) = marker {
            params.push(("marker", marker));
        }
        let query = canonical_query(&params);
        let canonical_uri = format!("/{}", self.bucket);
        let authorization = self.sign("GET", &canonical_uri, &query, Utc::now())?;

        let url = format!("{}/{}?{query}", self.endpoint, self.bucket);
        let response = self
            .client()
            .await?
            .get(&url)
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("bos list: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("bos list: {e}")))?;
        if !status.is_success() {
            return Err(MemoriaError::ObjectStore(format!(
                "bos list returned {status}: {text}"
            )));
        }

        serde_json::from_str(&text)
            .map_err(|e| MemoriaError::ObjectStore(format!("bos list response: {e}")))
    }
}

#[async_trait]
impl ObjectStore for BosStore {
    async fn put(&self, key: &str, body: Bytes, content_type: Option<&str>) -> Result<()> {
        let authorization = self.sign("PUT", &self.object_uri(key), "", Utc::now())?;

        let mut request = self
            .client()
            .await?
            .put(self.object_url(key))
            .header("Authorization", authorization)
            .body(body);
        if let Some(content_type) = content_type {
            request = request.header("Content-Type", content_type);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("bos put {key}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MemoriaError::ObjectStore(format!(
                "bos put {key} returned {status}: {text}"
            )));
        }
        debug!(key, "bos put ok");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let authorization = self.sign("GET", &self.object_uri(key), "", Utc::now())?;

        let response = self
            .client()
            .await?
            .get(self.object_url(key))
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("bos get {key}: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MemoriaError::ObjectStore(format!(
                "bos get {key} returned {status}: {text}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("bos get {key}: {e}")))?;
        Ok(Some(body))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let authorization = self.sign("DELETE", &self.object_uri(key), "", Utc::now())?;

        let response = self
            .client()
            .await?
            .delete(self.object_url(key))
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("bos delete {key}: {e}")))?;

        let status = response.status();
        // BOS reports 404 for missing keys; deletes are idempotent here
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            let text = response.text().await.unwrap_or_default();
            return Err(MemoriaError::ObjectStore(format!(
                "bos delete {key} returned {status}: {text}"
            )));
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let page = self.list_page(prefix, marker.as_deref()).await?;
            keys.extend(page.contents.into_iter().map(|entry| entry.key));
            if !page.is_truncated {
                break;
            }
            match page.next_marker {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "bos"
    }
}
