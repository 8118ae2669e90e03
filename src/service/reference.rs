//! Ground-truth bytes the downloaded object is compared against

use bytes::Bytes;
use std::io;
use std::path::{Path, PathBuf};

/// Where the reference content comes from
#[derive(Debug, Clone)]
pub enum ReferenceStore {
    /// Re-read from disk on every check, so local edits show up as mismatches
    File(PathBuf),
    /// Fixed content held in memory
    Memory { name: String, data: Bytes },
}

/// Identity of the reference shown on the status page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceInfo {
    pub name: String,
    pub size: u64,
}

impl ReferenceStore {
    /// Reference backed by a file, resolved to an absolute path
    pub fn from_path(path: &Path) -> io::Result<Self> {
        Ok(Self::File(std::path::absolute(path)?))
    }

    pub fn in_memory(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self::Memory { name: name.into(), data: data.into() }
    }

    /// Current reference bytes
    pub async fn current_bytes(&self) -> io::Result<Bytes> {
        match self {
            Self::File(path) => tokio::fs::read(path).await.map(Bytes::from),
            Self::Memory { data, .. } => Ok(data.clone()),
        }
    }

    /// File name and size, failing if the file cannot be stat'ed
    pub async fn info(&self) -> io::Result<ReferenceInfo> {
        match self {
            Self::File(path) => {
                let metadata = tokio::fs::metadata(path).await?;
                if !metadata.is_file() {
                    return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"));
                }
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Ok(ReferenceInfo { name, size: metadata.len() })
            }
            Self::Memory { name, data } => Ok(ReferenceInfo { name: name.clone(), size: data.len() as u64 }),
        }
    }

    /// Human-readable origin for log and error messages
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Memory { name, .. } => format!("{} (in memory)", name),
        }
    }
}
