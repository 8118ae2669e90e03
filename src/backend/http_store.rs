//! S3-compatible HTTP object backend
//!
//! Objects are addressed as `{endpoint}/{bucket}/{path}`. The API key is sent
//! as the access key of an AWS4-style `Authorization` header and the
//! encryption key travels as SSE-C customer key headers, so the endpoint
//! encrypts the object at rest with a key it never stores.

use crate::backend::{ByteStream, EncryptionKey, ObjectBackend, ObjectReader};
use crate::error::{BackendError, CloseStage};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use futures::StreamExt;
use log::{debug, info};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, RANGE};
use reqwest::{Client, StatusCode};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const SSE_ALGORITHM: &str = "x-amz-server-side-encryption-customer-algorithm";
const SSE_KEY: &str = "x-amz-server-side-encryption-customer-key";
const SSE_KEY_MD5: &str = "x-amz-server-side-encryption-customer-key-md5";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Object store reached over an S3-compatible HTTP API
pub struct HttpObjectStore {
    client: Client,
    api_key: Arc<str>,
    endpoint: String,
    bucket: String,
    session_open: AtomicBool,
    project_open: AtomicBool,
    bucket_open: AtomicBool,
}

impl HttpObjectStore {
    /// Build the session client, attach credentials and check the bucket is reachable
    pub async fn connect(
        addr: &str,
        api_key: &str,
        encryption_key: &EncryptionKey,
        bucket: &str,
    ) -> Result<Self, BackendError> {
        let endpoint = endpoint_url(addr);
        let headers = encryption_headers(encryption_key)?;
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Session { addr: endpoint.clone(), reason: e.to_string() })?;

        let bucket_url = format!("{}/{}", endpoint, bucket);
        let response = client
            .get(&bucket_url)
            .header(AUTHORIZATION, authorization(api_key, Utc::now())?)
            .send()
            .await
            .map_err(|e| BackendError::Session { addr: endpoint.clone(), reason: e.to_string() })?;
        if !response.status().is_success() {
            return Err(BackendError::Bucket {
                bucket: bucket.to_string(),
                reason: format!("endpoint answered {}", response.status()),
            });
        }

        info!("Connected to {} bucket {}", endpoint, bucket);
        Ok(Self {
            client,
            api_key: Arc::from(api_key),
            endpoint,
            bucket: bucket.to_string(),
            session_open: AtomicBool::new(true),
            project_open: AtomicBool::new(true),
            bucket_open: AtomicBool::new(true),
        })
    }

    fn object_url(&self, path: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, path.trim_start_matches('/'))
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if !self.session_open.load(Ordering::SeqCst) {
            return Err(BackendError::Closed(CloseStage::Session));
        }
        if !self.bucket_open.load(Ordering::SeqCst) {
            return Err(BackendError::Closed(CloseStage::Bucket));
        }
        Ok(())
    }

    fn close(&self, flag: &AtomicBool, stage: CloseStage) -> Result<(), BackendError> {
        if flag.swap(false, Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BackendError::Close { stage, reason: "already closed".to_string() })
        }
    }
}

/// Base URL for a satellite address, defaulting to plain http
pub fn endpoint_url(addr: &str) -> String {
    let addr = addr.trim_end_matches('/');
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    }
}

/// Access key header; the credential scope carries the request date
fn authorization(api_key: &str, now: DateTime<Utc>) -> Result<HeaderValue, BackendError> {
    let value = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}/us-east-1/s3/aws4_request, SignedHeaders=host, Signature=unsigned",
        api_key,
        now.format("%Y%m%d")
    );
    HeaderValue::from_str(&value).map_err(|_| BackendError::Project("api key is not a valid header value".to_string()))
}

/// SSE-C customer key headers sent with every request
fn encryption_headers(encryption_key: &EncryptionKey) -> Result<HeaderMap, BackendError> {
    let invalid = |what: &str| BackendError::Project(format!("{} is not a valid header value", what));
    let key = encryption_key.as_bytes();

    let mut headers = HeaderMap::new();
    headers.insert(SSE_ALGORITHM, HeaderValue::from_static("AES256"));
    headers.insert(
        SSE_KEY,
        HeaderValue::from_str(&BASE64.encode(key)).map_err(|_| invalid("encryption key"))?,
    );
    headers.insert(
        SSE_KEY_MD5,
        HeaderValue::from_str(&BASE64.encode(md5::compute(key).0)).map_err(|_| invalid("encryption key"))?,
    );
    Ok(headers)
}

#[async_trait]
impl ObjectBackend for HttpObjectStore {
    async fn upload_object(&self, path: &str, data: Bytes) -> Result<(), BackendError> {
        self.ensure_open()?;
        let size = data.len();
        let upload_err = |reason: String| BackendError::Upload { path: path.to_string(), reason };

        let response = self
            .client
            .put(self.object_url(path))
            .header(AUTHORIZATION, authorization(&self.api_key, Utc::now())?)
            .body(data)
            .send()
            .await
            .map_err(|e| upload_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(upload_err(format!("endpoint answered {}", response.status())));
        }

        info!("Uploaded {} bytes to {}", size, self.object_url(path));
        Ok(())
    }

    async fn open_object(&self, path: &str) -> Result<Box<dyn ObjectReader>, BackendError> {
        self.ensure_open()?;
        let open_err = |reason: String| BackendError::Object { operation: "open", path: path.to_string(), reason };

        let response = self
            .client
            .head(self.object_url(path))
            .header(AUTHORIZATION, authorization(&self.api_key, Utc::now())?)
            .send()
            .await
            .map_err(|e| open_err(e.to_string()))?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => return Err(BackendError::NotFound { path: path.to_string() }),
            status => return Err(open_err(format!("endpoint answered {}", status))),
        }

        let size = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .ok_or_else(|| open_err("missing Content-Length".to_string()))?;

        debug!("Opened {} ({} bytes)", self.object_url(path), size);
        Ok(Box::new(HttpObjectReader {
            client: self.client.clone(),
            api_key: Arc::clone(&self.api_key),
            url: self.object_url(path),
            path: path.to_string(),
            size,
        }))
    }

    async fn close_bucket(&self) -> Result<(), BackendError> {
        self.close(&self.bucket_open, CloseStage::Bucket)
    }

    async fn close_project(&self) -> Result<(), BackendError> {
        self.close(&self.project_open, CloseStage::Project)
    }

    async fn close_session(&self) -> Result<(), BackendError> {
        self.close(&self.session_open, CloseStage::Session)
    }
}

struct HttpObjectReader {
    client: Client,
    api_key: Arc<str>,
    url: String,
    path: String,
    size: u64,
}

#[async_trait]
impl ObjectReader for HttpObjectReader {
    fn size(&self) -> u64 {
        self.size
    }

    async fn download_range(&mut self, offset: u64, length: u64) -> Result<ByteStream, BackendError> {
        let download_err = |reason: String| BackendError::Object {
            operation: "download",
            path: self.path.clone(),
            reason,
        };

        let mut request = self
            .client
            .get(&self.url)
            .header(AUTHORIZATION, authorization(&self.api_key, Utc::now())?);
        // An empty range is unsatisfiable, so zero-length objects are fetched plainly
        if length > 0 {
            request = request.header(RANGE, format!("bytes={}-{}", offset, offset + length - 1));
        }
        let response = request.send().await.map_err(|e| download_err(e.to_string()))?;
        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(download_err(format!("endpoint answered {}", status)));
        }

        let path = self.path.clone();
        let stream = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| BackendError::Object {
                operation: "read",
                path: path.clone(),
                reason: e.to_string(),
            })
        });
        Ok(stream.boxed())
    }
}
