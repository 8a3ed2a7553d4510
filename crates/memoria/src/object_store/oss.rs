//! Aliyun OSS backend
//!
//! Talks to the OSS REST API with the classic header signature
//! (`OSS AccessKeyId:base64(hmac-sha1(...))`). Listing drains marker
//! pagination; a 404 on GET maps to the absent sentinel.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::{MemoriaError, Result};
use crate::object_store::ObjectStore;
use crate::object_store::sign::{canonical_query, encode_key_path, hmac_sha1};

const MAX_KEYS_PER_PAGE: &str = "1000";

/// Aliyun OSS object store using path-style addressing.
pub struct OssStore {
    endpoint: String,
    bucket: String,
    access_key_id: String,
    access_key_secret: String,
    client: OnceCell<Client>,
}

/// OSS list-objects response page
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    contents: Vec<ListEntry>,
    next_marker: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListEntry {
    key: String,
}

impl OssStore {
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

    /// Header signature over the canonicalized resource. Returns the `Date`
    /// header value and the `Authorization` header.
    fn sign(
        &self,
        method: &str,
        content_type: &str,
        resource: &str,
        now: DateTime<Utc>,
    ) -> (String, String) {
        let date = now.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let string_to_sign = format!("{method}\n\n{content_type}\n{date}\n{resource}");
        let signature = BASE64.encode(hmac_sha1(
            self.access_key_secret.as_bytes(),
            string_to_sign.as_bytes(),
        ));
        let authorization = format!("OSS {}:{signature}", self.access_key_id);
        (date, authorization)
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, encode_key_path(key))
    }

    fn object_resource(&self, key: &str) -> String {
        format!("/{}/{}", self.bucket, key)
    }

    async fn list_page(&self, prefix: &str, marker: Option<&str>) -> Result<ListBucketResult> {
        let mut params: Vec<(&str, &str)> =
            vec![("max-keys", MAX_KEYS_PER_PAGE), ("prefix", prefix)];
        if let Some(marker) = marker {
            params.push(("marker", marker));
        }
        let query = canonical_query(&params);
        // Query parameters other than sub-resources stay out of the
        // canonicalized resource
        let resource = format!("/{}/", self.bucket);
        let (date, authorization) = self.sign("GET", "", &resource, Utc::now());

        let url = format!("{}/{}?{query}", self.endpoint, self.bucket);
        let response = self
            .client()
            .await?
            .get(&url)
            .header("Date", date)
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("oss list: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("oss list: {e}")))?;
        if !status.is_success() {
            return Err(MemoriaError::ObjectStore(format!(
                "oss list returned {status}: {text}"
            )));
        }

        quick_xml::de::from_str(&text)
            .map_err(|e| MemoriaError::ObjectStore(format!("oss list response: {e}")))
    }
}

#[async_trait]
impl ObjectStore for OssStore {
    async fn put(&self, key: &str, body: Bytes, content_type: Option<&str>) -> Result<()> {
        let content_type = content_type.unwrap_or("");
        let (date, authorization) =
            self.sign("PUT", content_type, &self.object_resource(key), Utc::now());

        let mut request = self
            .client()
            .await?
            .put(self.object_url(key))
            .header("Date", date)
            .header("Authorization", authorization)
            .body(body);
        if !content_type.is_empty() {
            request = request.header("Content-Type", content_type);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("oss put {key}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MemoriaError::ObjectStore(format!(
                "oss put {key} returned {status}: {text}"
            )));
        }
        debug!(key, "oss put ok");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let (date, authorization) =
            self.sign("GET", "", &self.object_resource(key), Utc::now());

        let response = self
            .client()
            .await?
            .get(self.object_url(key))
            .header("Date", date)
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("oss get {key}: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MemoriaError::ObjectStore(format!(
                "oss get {key} returned {status}: {text}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("oss get {key}: {e}")))?;
        Ok(Some(body))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let (date, authorization) =
            self.sign("DELETE", "", &self.object_resource(key), Utc::now());

        let response = self
            .client()
            .await?
            .delete(self.object_url(key))
            .header("Date", date)
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("oss delete {key}: {e}")))?;

        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            let text = response.text().await.unwrap_or_default();
            return Err(MemoriaError::ObjectStore(format!(
                "oss delete {key} returned {status}: {text}"
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
        "oss"
    }
}
