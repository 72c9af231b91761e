//! Object storage for uploaded PDFs.
//!
//! Two backends implement [`ObjectStore`]:
//!
//! - [`LocalStore`] writes under `[storage] root_dir` on the local disk;
//!   the default and all a single-machine deployment needs.
//! - [`S3Store`] talks to S3 (or an S3-compatible service like MinIO via
//!   `endpoint_url`) using the REST API with AWS Signature V4, built from
//!   pure-Rust `hmac` + `sha2` so no C signing library is pulled in.
//!
//! Keys are server-generated (`pdfs/{uuid}.pdf`); callers never pass
//! user-controlled paths.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::config::Config;
use crate::error::ApiError;

type HmacSha256 = Hmac<Sha256>;

/// Durable storage for uploaded file bodies.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend identifier surfaced by the health endpoint.
    fn backend_name(&self) -> &'static str;

    /// Store a body under a key, replacing any previous content.
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), ApiError>;

    /// Remove a key. Deleting a key that is already gone is not an error.
    async fn delete(&self, key: &str) -> Result<(), ApiError>;

    /// Cheap liveness probe for the health endpoint.
    async fn reachable(&self) -> bool;
}

/// Build the store selected by `[storage] backend`.
pub fn create_object_store(config: &Config) -> Result<Arc<dyn ObjectStore>> {
    match config.storage.backend.as_str() {
        "local" => Ok(Arc::new(LocalStore::new(&config.storage.root_dir))),
        "s3" => {
            let bucket = config
                .storage
                .bucket
                .clone()
                .context("[storage] backend = \"s3\" requires [storage] bucket")?;
            let store = S3Store::from_env(
                bucket,
                config.storage.region.clone(),
                config.storage.endpoint_url.clone(),
            )?;
            Ok(Arc::new(store))
        }
        other => anyhow::bail!("Unknown storage backend: {}. Use local or s3.", other),
    }
}

// ============ Local filesystem backend ============

/// Objects as plain files under a root directory.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: root_dir.into(),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn backend_name(&self) -> &'static str {
        "local"
    }

    async fn put(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<(), ApiError> {
        let path = self.path_for(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ApiError::Storage(format!("create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| ApiError::Storage(format!("write {}: {}", path.display(), e)))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), ApiError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::Storage(format!(
                "delete {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn reachable(&self) -> bool {
        tokio::fs::create_dir_all(&self.root).await.is_ok()
    }
}

// ============ S3 backend ============

/// AWS credentials loaded from environment variables.
struct AwsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: Option<String>,
}

impl AwsCredentials {
    /// Load credentials from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// and optionally `AWS_SESSION_TOKEN`.
    fn from_env() -> Result<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID")
            .context("AWS_ACCESS_KEY_ID environment variable not set")?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        let session_token = std::env::var("AWS_SESSION_TOKEN").ok();

        Ok(Self {
            access_key_id,
            secret_access_key,
            session_token,
        })
    }
}

/// Objects in an S3 bucket, every request signed with SigV4.
pub struct S3Store {
    client: reqwest::Client,
    creds: AwsCredentials,
    bucket: String,
    region: String,
    endpoint_url: Option<String>,
}

impl S3Store {
    fn from_env(bucket: String, region: String, endpoint_url: Option<String>) -> Result<Self> {
        let creds = AwsCredentials::from_env()?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            creds,
            bucket,
            region,
            endpoint_url,
        })
    }

    /// Hostname for the bucket: the standard virtual-hosted AWS form, or a
    /// custom endpoint for S3-compatible services (MinIO, LocalStack).
    fn host(&self) -> String {
        if let Some(ref endpoint) = self.endpoint_url {
            endpoint
                .trim_start_matches("https://")
                .trim_start_matches("http://")
                .trim_end_matches('/')
                .to_string()
        } else {
            format!("{}.s3.{}.amazonaws.com", self.bucket, self.region)
        }
    }

    fn scheme(&self) -> &'static str {
        match self.endpoint_url {
            Some(ref e) if e.starts_with("http://") => "http",
            _ => "https",
        }
    }

    /// Send one signed request. `key` is empty for bucket-level calls.
    async fn signed_request(
        &self,
        method: reqwest::Method,
        key: &str,
        body: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<reqwest::Response, ApiError> {
        let host = self.host();
        let encoded_key = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        let canonical_uri = format!("/{}", encoded_key);
        let url = format!("{}://{}{}", self.scheme(), host, canonical_uri);

        let now = Utc::now();
        let date_stamp = now.format("%Y%m%d").to_string();
        let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();

        let payload_hash = hex_sha256(&body);

        // Canonical headers must be sorted by name; everything listed here
        // is also sent on the wire.
        let mut headers = vec![
            ("host".to_string(), host.clone()),
            ("x-amz-content-sha256".to_string(), payload_hash.clone()),
            ("x-amz-date".to_string(), amz_date.clone()),
        ];
        if let Some(ct) = content_type {
            headers.push(("content-type".to_string(), ct.to_string()));
        }
        if let Some(ref token) = self.creds.session_token {
            headers.push(("x-amz-security-token".to_string(), token.clone()));
        }
        headers.sort_by(|a, b| a.0.cmp(&b.0));

        let signed_headers: String = headers
            .iter()
            .map(|(k, _)| k.as_str())
            .collect::<Vec<_>>()
            .join(";");
        let canonical_headers: String = headers
            .iter()
            .map(|(k, v)| format!("{}:{}\n", k, v))
            .collect();

        let canonical_request = format!(
            "{}\n{}\n\n{}\n{}\n{}",
            method.as_str(),
            canonical_uri,
            canonical_headers,
            signed_headers,
            payload_hash
        );

        let credential_scope = format!("{}/{}/s3/aws4_request", date_stamp, self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{}\n{}\n{}",
            amz_date,
            credential_scope,
            hex_sha256(canonical_request.as_bytes())
        );

        let signing_key = derive_signing_key(
            &self.creds.secret_access_key,
            &date_stamp,
            &self.region,
            "s3",
        );
        let signature = hex_hmac_sha256(&signing_key, string_to_sign.as_bytes());

        let authorization = format!(
            "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.creds.access_key_id, credential_scope, signed_headers, signature
        );

        let mut req = self
            .client
            .request(method, &url)
            .header("Authorization", &authorization)
            .header("x-amz-content-sha256", &payload_hash)
            .header("x-amz-date", &amz_date);
        if let Some(ct) = content_type {
            req = req.header("Content-Type", ct);
        }
        if let Some(ref token) = self.creds.session_token {
            req = req.header("x-amz-security-token", token);
        }
        if !body.is_empty() {
            req = req.body(body);
        }

        req.send()
            .await
            .map_err(|e| ApiError::Storage(format!("s3 request failed: {}", e)))
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn backend_name(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), ApiError> {
        let resp = self
            .signed_request(
                reqwest::Method::PUT,
                key,
                bytes.to_vec(),
                Some(content_type),
            )
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            Err(ApiError::Storage(format!(
                "S3 PutObject failed (HTTP {}) for key '{}': {}",
                status,
                key,
                body.chars().take(500).collect::<String>()
            )))
        }
    }

    async fn delete(&self, key: &str) -> Result<(), ApiError> {
        let resp = self
            .signed_request(reqwest::Method::DELETE, key, Vec::new(), None)
            .await?;

        // S3 answers 204 whether or not the key existed; 404 can only come
        // from a missing bucket on compatible services, treat it the same.
        if resp.status().is_success() || resp.status() == reqwest::StatusCode::NOT_FOUND {
            Ok(())
        } else {
            let status = resp.status();
            Err(ApiError::Storage(format!(
                "S3 DeleteObject failed (HTTP {}) for key '{}'",
                status, key
            )))
        }
    }

    async fn reachable(&self) -> bool {
        match self
            .signed_request(reqwest::Method::HEAD, "", Vec::new(), None)
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

// ============ AWS SigV4 helpers ============

/// Hex-encoded SHA-256 of data.
fn hex_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// HMAC-SHA256 of data with the given key.
fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

/// Hex-encoded HMAC-SHA256.
fn hex_hmac_sha256(key: &[u8], data: &[u8]) -> String {
    hex::encode(hmac_sha256(key, data))
}

/// Derive the SigV4 signing key for a date, region, and service.
///
/// ```text
/// kDate    = HMAC("AWS4" + secret, dateStamp)
/// kRegion  = HMAC(kDate, region)
/// kService = HMAC(kRegion, service)
/// kSigning = HMAC(kService, "aws4_request")
/// ```
fn derive_signing_key(secret_key: &str, date_stamp: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(
        format!("AWS4{}", secret_key).as_bytes(),
        date_stamp.as_bytes(),
    );
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

/// URI-encode a string per RFC 3986, keeping only unreserved characters:
/// `A-Z a-z 0-9 - _ . ~`
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => {
                result.push_str(&format!("%{:02X}", byte));
            }
        }
    }
    result
}
