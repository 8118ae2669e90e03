//! Comprehensive tests for the object backend abstraction

#[cfg(test)]
mod integration_tests {
    use crate::backend::config::{BackendConfig, BackendKind};
    use crate::backend::{close_all, read_to_end, EncryptionKey};
    use crate::error::BackendError;
    use bytes::Bytes;
    use tempfile::TempDir;

    fn config(kind: BackendKind, base_path: &std::path::Path) -> BackendConfig {
        BackendConfig {
            kind,
            satellite_addr: "127.0.0.1:1".to_string(),
            api_key: "comprehensive-key".to_string(),
            encryption_key: EncryptionKey::from_passphrase("you'll never guess this"),
            bucket: "file-durability".to_string(),
            base_path: base_path.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_backend_abstraction_end_to_end() {
        let dir = TempDir::new().unwrap();
        for kind in [BackendKind::Mock, BackendKind::Local] {
            let backend = config(kind, dir.path()).connect().await.expect("connect failed");
            let data = Bytes::from(format!("End-to-end test data for {:?}", kind));

            backend.upload_object("e2e/object", data.clone()).await.expect("upload failed");
            let mut reader = backend.open_object("e2e/object").await.expect("open failed");
            assert_eq!(reader.size(), data.len() as u64, "{:?}: size", kind);

            let stream = reader.download_range(0, reader.size()).await.expect("download failed");
            assert_eq!(read_to_end(stream).await.unwrap(), data, "{:?}: content", kind);

            close_all(backend.as_ref()).await.expect("close failed");
            assert!(backend.open_object("e2e/object").await.is_err(), "{:?}: open after close", kind);
        }
    }

    #[tokio::test]
    async fn test_upload_replaces_existing_object() {
        let dir = TempDir::new().unwrap();
        for kind in [BackendKind::Mock, BackendKind::Local] {
            let backend = config(kind, dir.path()).connect().await.unwrap();
            backend.upload_object("obj", Bytes::from_static(b"first")).await.unwrap();
            backend.upload_object("obj", Bytes::from_static(b"second!")).await.unwrap();

            let mut reader = backend.open_object("obj").await.unwrap();
            let stream = reader.download_range(0, reader.size()).await.unwrap();
            assert_eq!(read_to_end(stream).await.unwrap(), Bytes::from_static(b"second!"));
        }
    }

    #[tokio::test]
    async fn test_http_backend_unreachable_is_session_error() {
        let dir = TempDir::new().unwrap();
        let result = config(BackendKind::Http, dir.path()).connect().await;
        assert!(matches!(result, Err(BackendError::Session { .. })));
    }
}
