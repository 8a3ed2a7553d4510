//! S3-compatible backend (MinIO, AWS S3, etc.)
//!
//! Talks to the S3 REST API directly over HTTP with SigV4 request signing.
//! Listing drains ListObjectsV2 continuation tokens until the final page;
//! a 404 on GET maps to the absent sentinel rather than an error.

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
use crate::object_store::sign::{
    canonical_query, encode_key_path, hex_encode, hmac_sha256, sha256_hex,
};

const SIGNED_HEADERS: &str = "host;x-amz-content-sha256;x-amz-date";

/// S3-compatible object store using path-style addressing.
pub struct S3Store {
    endpoint: String,
    bucket: String,
    region: String,
    access_key_id: String,
    access_key_secret: String,
    client: OnceCell<Client>,
}

/// ListObjectsV2 response page
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListBucketResult {
    #[serde(default)]
    is_truncated: bool,
    #[serde(default)]
    contents: Vec<ListEntry>,
    next_continuation_token: Option<String>,
}

/// Object entry in a listing page
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListEntry {
    key: String,
}

impl S3Store {
    /// Create a store for `bucket` behind `endpoint` (a fully-qualified URL,
    /// e.g. `http://localhost:9000` for MinIO).
    pub fn new(
        endpoint: String,
        bucket: String,
        region: String,
        access_key_id: String,
        access_key_secret: String,
    ) -> Self {
        Self {
            endpoint,
            bucket,
            region,
            access_key_id,
            access_key_secret,
            client: OnceCell::new(),
        }
    }

    /// The HTTP client, constructed once on first use.
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

    /// SigV4 authorization for a request. Returns the `x-amz-date` value and
    /// the `Authorization` header.
    fn sign(
        &self,
        method: &str,
        canonical_uri: &str,
        query: &str,
        payload_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<(String, String)> {
        let host = self.host()?;
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
        let date = now.format("%Y%m%d").to_string();

        let canonical_headers =
            format!("host:{host}\nx-amz-content-sha256:{payload_hash}\nx-amz-date:{amz_date}\n");
        let canonical_request = format!(
            "{method}\n{canonical_uri}\n{query}\n{canonical_headers}\n{SIGNED_HEADERS}\n{payload_hash}"
        );

        let scope = format!("{date}/{}/s3/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{amz_date}\n{scope}\n{}",
            sha256_hex(canonical_request.as_bytes())
        );

        let k_date = hmac_sha256(
            format!("AWS4{}", self.access_key_secret).as_bytes(),
            date.as_bytes(),
        );
        let k_region = hmac_sha256(&k_date, self.region.as_bytes());
        let k_service = hmac_sha256(&k_region, b"s3");
        let k_signing = hmac_sha256(&k_service, b"aws4_request");
        let signature = hex_encode(&hmac_sha256(&k_signing, string_to_sign.as_bytes()));

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            self.access_key_id
        );
        Ok((amz_date, authorization))
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, encode_key_path(key))
    }

    fn object_uri(&self, key: &str) -> String {
        format!("/{}/{}", self.bucket, encode_key_path(key))
    }

    /// One ListObjectsV2 page.
    async fn list_page(
        &self,
        prefix: &str,
        continuation_token: Option<&str>,
    ) -> Result<ListBucketResult> {
        let mut params: Vec<(&str, &str)> = vec![("list-type", "2"), ("prefix", prefix)];
        if let Some(token) = continuation_token {
            params.push(("continuation-token", token));
        }
        let query = canonical_query(&params);
        let payload_hash = sha256_hex(b"");
        let canonical_uri = format!("/{}", self.bucket);
        let (amz_date, authorization) =
            self.sign("GET", &canonical_uri, &query, &payload_hash, Utc::now())?;

        let url = format!("{}/{}?{query}", self.endpoint, self.bucket);
        let response = self
            .client()
            .await?
            .get(&url)
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_hash)
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("s3 list: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("s3 list: {e}")))?;
        if !status.is_success() {
            return Err(MemoriaError::ObjectStore(format!(
                "s3 list returned {status}: {text}"
            )));
        }

        quick_xml::de::from_str(&text)
            .map_err(|e| MemoriaError::ObjectStore(format!("s3 list response: {e}")))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, body: Bytes, content_type: Option<&str>) -> Result<()> {
        let payload_hash = sha256_hex(&body);
        let (amz_date, authorization) =
            self.sign("PUT", &self.object_uri(key), "", &payload_hash, Utc::now())?;

        let mut request = self
            .client()
            .await?
            .put(self.object_url(key))
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_hash)
            .header("Authorization", authorization)
            .body(body);
        if let Some(content_type) = content_type {
            request = request.header("Content-Type", content_type);
        }

        let response = request
            .send()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("s3 put {key}: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MemoriaError::ObjectStore(format!(
                "s3 put {key} returned {status}: {text}"
            )));
        }
        debug!(key, "s3 put ok");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let payload_hash = sha256_hex(b"");
        let (amz_date, authorization) =
            self.sign("GET", &self.object_uri(key), "", &payload_hash, Utc::now())?;

        let response = self
            .client()
            .await?
            .get(self.object_url(key))
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_hash)
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("s3 get {key}: {e}")))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(MemoriaError::ObjectStore(format!(
                "s3 get {key} returned {status}: {text}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("s3 get {key}: {e}")))?;
        Ok(Some(body))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let payload_hash = sha256_hex(b"");
        let (amz_date, authorization) =
            self.sign("DELETE", &self.object_uri(key), "", &payload_hash, Utc::now())?;

        let response = self
            .client()
            .await?
            .delete(self.object_url(key))
            .header("x-amz-date", amz_date)
            .header("x-amz-content-sha256", payload_hash)
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| MemoriaError::ObjectStore(format!("s3 delete {key}: {e}")))?;

        let status = response.status();
        // S3 deletes are idempotent; treat 404 from stricter compatibles the
        // same way
        if !status.is_success() && status != reqwest::StatusCode::NOT_FOUND {
            let text = response.text().await.unwrap_or_default();
            return Err(MemoriaError::ObjectStore(format!(
                "s3 delete {key} returned {status}: {text}"
            )));
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation_token: Option<String> = None;

        loop {
            let page = self.list_page(prefix, continuation_token.as_deref()).await?;
            keys.extend(page.contents.into_iter().map(|entry| entry.key));
            if !page.is_truncated {
                break;
            }
            match page.next_continuation_token {
                Some(token) => continuation_token = Some(token),
                // Truncated page without a token would loop forever
                None => break,
            }
        }

        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
