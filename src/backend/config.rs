//! Configuration for object backends

use crate::backend::{
    http_store::HttpObjectStore, local_store::LocalObjectStore, mock_store::MockObjectStore, EncryptionKey,
    ObjectBackend,
};
use crate::error::BackendError;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

/// Available object backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// S3-compatible endpoint at the satellite address
    #[default]
    Http,
    /// Directory tree on the local filesystem
    Local,
    /// In-memory store, lost on exit
    Mock,
}

impl std::str::FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" | "s3" => Ok(BackendKind::Http),
            "local" | "fs" => Ok(BackendKind::Local),
            "mock" => Ok(BackendKind::Mock),
            _ => Err(format!("Unknown object backend: {}", s)),
        }
    }
}

/// Everything needed to open a backend handle
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub satellite_addr: String,
    pub api_key: String,
    pub encryption_key: EncryptionKey,
    pub bucket: String,
    /// Root directory for the local backend
    pub base_path: PathBuf,
}

impl BackendConfig {
    /// Open session, project and bucket for the configured backend
    pub async fn connect(&self) -> Result<Arc<dyn ObjectBackend>, BackendError> {
        match self.kind {
            BackendKind::Http => {
                info!("Using HTTP object backend at {}", self.satellite_addr);
                let store =
                    HttpObjectStore::connect(&self.satellite_addr, &self.api_key, &self.encryption_key, &self.bucket)
                        .await?;
                Ok(Arc::new(store))
            }
            BackendKind::Local => {
                info!("Using local object backend with base_path: {}", self.base_path.display());
                let store = LocalObjectStore::connect(&self.base_path, &self.api_key, &self.bucket).await?;
                Ok(Arc::new(store))
            }
            BackendKind::Mock => {
                warn!("Using mock object backend, nothing leaves this process");
                Ok(Arc::new(MockObjectStore::new()))
            }
        }
    }
}
