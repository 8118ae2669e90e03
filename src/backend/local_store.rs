//! Local filesystem object backend
//!
//! Objects live under `<base_path>/<project>/<bucket>/<path>`, where the
//! project directory is derived from the API key so that different keys see
//! separate namespaces.

use crate::backend::{ByteStream, ObjectBackend, ObjectReader};
use crate::error::{BackendError, CloseStage};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use log::{debug, info};
use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;

/// Local filesystem object store
pub struct LocalObjectStore {
    bucket_path: PathBuf,
    session_open: AtomicBool,
    project_open: AtomicBool,
    bucket_open: AtomicBool,
}

impl LocalObjectStore {
    /// Open session, project and bucket directories, creating them as needed
    pub async fn connect(base_path: &Path, api_key: &str, bucket: &str) -> Result<Self, BackendError> {
        fs::create_dir_all(base_path).await.map_err(|e| BackendError::Session {
            addr: base_path.display().to_string(),
            reason: e.to_string(),
        })?;

        let project_path = base_path.join(project_dir(api_key));
        fs::create_dir_all(&project_path)
            .await
            .map_err(|e| BackendError::Project(e.to_string()))?;

        if bucket.is_empty() || bucket.contains(['/', '\\']) || bucket == "." || bucket == ".." {
            return Err(BackendError::Bucket {
                bucket: bucket.to_string(),
                reason: "invalid bucket name".to_string(),
            });
        }
        let bucket_path = project_path.join(bucket);
        fs::create_dir_all(&bucket_path).await.map_err(|e| BackendError::Bucket {
            bucket: bucket.to_string(),
            reason: e.to_string(),
        })?;

        info!("Using local object store at {}", bucket_path.display());
        Ok(Self {
            bucket_path,
            session_open: AtomicBool::new(true),
            project_open: AtomicBool::new(true),
            bucket_open: AtomicBool::new(true),
        })
    }

    /// Filesystem location of an object
    pub fn object_file(&self, path: &str) -> Result<PathBuf, BackendError> {
        let relative = Path::new(path);
        let valid = !path.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !valid {
            return Err(BackendError::Object {
                operation: "resolve",
                path: path.to_string(),
                reason: "path must be relative without '..' segments".to_string(),
            });
        }
        Ok(self.bucket_path.join(relative))
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

/// Project directory name for an API key
fn project_dir(api_key: &str) -> String {
    hex::encode(md5::compute(api_key.as_bytes()).0)
}

#[async_trait]
impl ObjectBackend for LocalObjectStore {
    async fn upload_object(&self, path: &str, data: Bytes) -> Result<(), BackendError> {
        self.ensure_open()?;
        let target = self.object_file(path)?;
        let upload_err = |e: std::io::Error| BackendError::Upload {
            path: path.to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await.map_err(upload_err)?;
        }

        // Write beside the target and rename so readers never see a partial object
        let temp = target.with_extension("upload-tmp");
        let mut file = fs::File::create(&temp).await.map_err(upload_err)?;
        file.write_all(&data).await.map_err(upload_err)?;
        file.sync_all().await.map_err(upload_err)?;
        drop(file);
        fs::rename(&temp, &target).await.map_err(upload_err)?;

        info!("Stored {} bytes at {}", data.len(), target.display());
        Ok(())
    }

    async fn open_object(&self, path: &str) -> Result<Box<dyn ObjectReader>, BackendError> {
        self.ensure_open()?;
        let file_path = self.object_file(path)?;
        let file = match fs::File::open(&file_path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BackendError::NotFound { path: path.to_string() });
            }
            Err(e) => {
                return Err(BackendError::Object {
                    operation: "open",
                    path: path.to_string(),
                    reason: e.to_string(),
                });
            }
        };
        let size = file
            .metadata()
            .await
            .map_err(|e| BackendError::Object {
                operation: "stat",
                path: path.to_string(),
                reason: e.to_string(),
            })?
            .len();

        debug!("Opened {} ({} bytes)", file_path.display(), size);
        Ok(Box::new(LocalObjectReader {
            path: path.to_string(),
            file: Some(file),
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

struct LocalObjectReader {
    path: String,
    file: Option<fs::File>,
    size: u64,
}

#[async_trait]
impl ObjectReader for LocalObjectReader {
    fn size(&self) -> u64 {
        self.size
    }

    async fn download_range(&mut self, offset: u64, length: u64) -> Result<ByteStream, BackendError> {
        let download_err = |reason: String| BackendError::Object {
            operation: "download",
            path: self.path.clone(),
            reason,
        };
        let mut file = self
            .file
            .take()
            .ok_or_else(|| download_err("object already downloaded".to_string()))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| download_err(e.to_string()))?;

        let path = self.path.clone();
        let stream = ReaderStream::new(file.take(length)).map(move |chunk| {
            chunk.map_err(|e| BackendError::Object {
                operation: "read",
                path: path.clone(),
                reason: e.to_string(),
            })
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::read_to_end;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_local_store_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::connect(dir.path(), "key", "file-durability").await.unwrap();

        store.upload_object("checks/hello.txt", Bytes::from_static(b"hello world")).await.unwrap();
        let mut reader = store.open_object("checks/hello.txt").await.unwrap();
        assert_eq!(reader.size(), 11);

        let stream = reader.download_range(0, reader.size()).await.unwrap();
        assert_eq!(read_to_end(stream).await.unwrap(), Bytes::from_static(b"hello world"));
    }

    #[tokio::test]
    async fn test_local_store_partial_range() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::connect(dir.path(), "key", "bucket").await.unwrap();
        store.upload_object("obj", Bytes::from_static(b"0123456789")).await.unwrap();

        let mut reader = store.open_object("obj").await.unwrap();
        let stream = reader.download_range(3, 4).await.unwrap();
        assert_eq!(read_to_end(stream).await.unwrap(), Bytes::from_static(b"3456"));
        // A reader streams its file once
        assert!(reader.download_range(0, 1).await.is_err());
    }

    #[tokio::test]
    async fn test_local_store_separates_api_keys() {
        let dir = TempDir::new().unwrap();
        let first = LocalObjectStore::connect(dir.path(), "key-a", "bucket").await.unwrap();
        let second = LocalObjectStore::connect(dir.path(), "key-b", "bucket").await.unwrap();

        first.upload_object("obj", Bytes::from_static(b"a")).await.unwrap();
        assert!(matches!(second.open_object("obj").await, Err(BackendError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_local_store_rejects_escaping_paths() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::connect(dir.path(), "key", "bucket").await.unwrap();
        assert!(store.object_file("../outside").is_err());
        assert!(store.object_file("/etc/passwd").is_err());
        assert!(store.object_file("").is_err());
        assert!(LocalObjectStore::connect(dir.path(), "key", "../up").await.is_err());
    }

    #[tokio::test]
    async fn test_local_store_close_sequence() {
        let dir = TempDir::new().unwrap();
        let store = LocalObjectStore::connect(dir.path(), "key", "bucket").await.unwrap();
        store.upload_object("obj", Bytes::from_static(b"x")).await.unwrap();

        store.close_bucket().await.unwrap();
        assert!(matches!(store.open_object("obj").await, Err(BackendError::Closed(CloseStage::Bucket))));
        assert!(store.close_bucket().await.is_err());
        store.close_project().await.unwrap();
        store.close_session().await.unwrap();
    }
}
