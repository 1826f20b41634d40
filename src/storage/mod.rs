//! Object storage upload collaborator
//!
//! ## Responsibilities
//!
//! - Abstract capability for storing snapshot bytes under a bucket/path
//! - HTTP (S3/MinIO-style) implementation
//! - Public URL templating for uploaded objects
//!
//! The capability is injected at construction so tests substitute an
//! in-memory fake.

use crate::error::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;

/// Upload capability.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `data` at `path` inside `bucket`.
    ///
    /// Returns the number of bytes written.
    async fn put(&self, bucket: &str, path: &str, data: Bytes, content_type: &str) -> Result<u64>;
}

/// Public URL for an uploaded object.
pub fn object_url(bucket: &str, domain: &str, path: &str) -> String {
    format!("https://{bucket}.{domain}/{bucket}/{path}")
}

/// S3/MinIO-style storage over plain HTTP PUT.
///
/// Targets buckets that accept unauthenticated writes (or an authenticating
/// proxy in front of them); credentialed schemes are a different
/// `ObjectStorage` implementation.
pub struct HttpObjectStorage {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpObjectStorage {
    pub fn new(endpoint: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, endpoint }
    }
}

#[async_trait]
impl ObjectStorage for HttpObjectStorage {
    async fn put(&self, bucket: &str, path: &str, data: Bytes, content_type: &str) -> Result<u64> {
        let url = format!("{}/{}/{}", self.endpoint.trim_end_matches('/'), bucket, path);
        let len = data.len() as u64;

        let resp = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(data)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(Error::Storage(format!(
                "upload to {} returned {}",
                url,
                resp.status()
            )));
        }

        tracing::debug!(bucket = bucket, path = path, bytes = len, "Object stored");
        Ok(len)
    }
}
