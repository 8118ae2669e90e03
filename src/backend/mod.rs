//! Object Backend Abstraction
//!
//! This module provides an abstraction over the storage network holding the
//! monitored object, so the check engine can run against a local directory,
//! an S3-compatible endpoint, or an in-memory store without changes.

pub mod config;
pub mod http_store;
pub mod local_store;
pub mod mock_store;

#[cfg(test)]
mod comprehensive_test;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::BoxStream;
use futures::StreamExt;
use log::{error, info};

use crate::error::{BackendError, CloseStage, ShutdownError};

/// Stream of object content chunks
pub type ByteStream = BoxStream<'static, Result<Bytes, BackendError>>;

/// Trait defining the object backend interface
#[async_trait]
pub trait ObjectBackend: Send + Sync {
    /// Store `data` under `path`, replacing any existing object
    async fn upload_object(&self, path: &str, data: Bytes) -> Result<(), BackendError>;

    /// Open an existing object for reading
    async fn open_object(&self, path: &str) -> Result<Box<dyn ObjectReader>, BackendError>;

    /// Release the bucket handle
    async fn close_bucket(&self) -> Result<(), BackendError>;

    /// Release the project handle
    async fn close_project(&self) -> Result<(), BackendError>;

    /// Release the session with the storage network
    async fn close_session(&self) -> Result<(), BackendError>;
}

/// An opened object
#[async_trait]
pub trait ObjectReader: Send {
    /// Full object length in bytes
    fn size(&self) -> u64;

    /// Start streaming `length` bytes beginning at `offset`
    async fn download_range(&mut self, offset: u64, length: u64) -> Result<ByteStream, BackendError>;
}

/// Drain a download stream into a single buffer.
pub async fn read_to_end(mut stream: ByteStream) -> Result<Bytes, BackendError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

/// Close bucket, project and session in that order.
///
/// Every step is attempted even when an earlier one fails, so a failed bucket
/// close never leaks the project or session.
pub async fn close_all(backend: &dyn ObjectBackend) -> Result<(), ShutdownError> {
    let mut failures = Vec::new();
    for stage in CloseStage::ALL {
        let result = match stage {
            CloseStage::Bucket => backend.close_bucket().await,
            CloseStage::Project => backend.close_project().await,
            CloseStage::Session => backend.close_session().await,
        };
        match result {
            Ok(()) => info!("Closed {}", stage),
            Err(e) => {
                error!("Failed to close {}: {}", stage, e);
                failures.push(e);
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ShutdownError { failures })
    }
}

/// 32-byte key protecting the monitored object at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    /// Copy the passphrase bytes into a zeroed key, truncating past 32 bytes.
    pub fn from_passphrase(passphrase: &str) -> Self {
        let mut key = [0u8; 32];
        let bytes = passphrase.as_bytes();
        let len = bytes.len().min(key.len());
        key[..len].copy_from_slice(&bytes[..len]);
        Self(key)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Remote path for the reference file, optionally under a prefix.
pub fn object_path(prefix: Option<&str>, file: &str) -> String {
    let file = file.trim_start_matches("./");
    let joined = match prefix.map(|p| p.trim_matches('/')).filter(|p| !p.is_empty()) {
        Some(prefix) => format!("{}/{}", prefix, file),
        None => file.to_string(),
    };
    joined
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_path_without_prefix() {
        assert_eq!(object_path(None, "testfile.bin"), "testfile.bin");
        assert_eq!(object_path(Some(""), "./testfile.bin"), "testfile.bin");
    }

    #[test]
    fn test_object_path_with_prefix() {
        assert_eq!(object_path(Some("checks"), "testfile.bin"), "checks/testfile.bin");
        assert_eq!(object_path(Some("/checks/daily/"), "data//testfile.bin"), "checks/daily/data/testfile.bin");
    }

    #[test]
    fn test_encryption_key_padding_and_truncation() {
        let short = EncryptionKey::from_passphrase("abc");
        assert_eq!(&short.as_bytes()[..3], b"abc");
        assert!(short.as_bytes()[3..].iter().all(|&b| b == 0));

        let long = EncryptionKey::from_passphrase(&"k".repeat(40));
        assert!(long.as_bytes().iter().all(|&b| b == b'k'));
        assert_eq!(format!("{:?}", long), "EncryptionKey(..)");
    }

    #[tokio::test]
    async fn test_read_to_end_concatenates_chunks() {
        let chunks: Vec<Result<Bytes, BackendError>> =
            vec![Ok(Bytes::from_static(b"hello ")), Ok(Bytes::from_static(b"world"))];
        let stream: ByteStream = futures::stream::iter(chunks).boxed();
        assert_eq!(read_to_end(stream).await.unwrap(), Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn test_read_to_end_surfaces_stream_error() {
        let chunks: Vec<Result<Bytes, BackendError>> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(BackendError::Object { operation: "read", path: "p".into(), reason: "reset".into() }),
        ];
        let stream: ByteStream = futures::stream::iter(chunks).boxed();
        assert!(read_to_end(stream).await.is_err());
    }
}
