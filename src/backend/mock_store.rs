//! Mock implementation of ObjectBackend for testing

use crate::backend::{ByteStream, ObjectBackend, ObjectReader};
use crate::error::{BackendError, CloseStage};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use log::info;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Failure points that can be armed on the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    Open,
    Download,
    Read,
    Close(CloseStage),
}

#[derive(Default)]
struct MockState {
    objects: HashMap<String, Bytes>,
    faults: HashSet<Fault>,
    closed: Vec<CloseStage>,
    downloads: usize,
    download_delay: Option<Duration>,
}

/// Mock implementation of ObjectBackend for testing
#[derive(Clone, Default)]
pub struct MockObjectStore {
    // In-memory objects keyed by path, plus armed faults
    state: Arc<Mutex<MockState>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace stored content without going through upload, simulating bit rot
    pub fn corrupt(&self, path: &str, data: &[u8]) {
        self.state().objects.insert(path.to_string(), Bytes::copy_from_slice(data));
    }

    /// Drop an object, simulating loss on the network
    pub fn remove(&self, path: &str) {
        self.state().objects.remove(path);
    }

    /// Arm a fault; it stays armed until cleared
    pub fn inject(&self, fault: Fault) {
        self.state().faults.insert(fault);
    }

    pub fn clear(&self, fault: Fault) {
        self.state().faults.remove(&fault);
    }

    /// Make every download wait before returning its stream
    pub fn set_download_delay(&self, delay: Duration) {
        self.state().download_delay = Some(delay);
    }

    /// Close steps invoked so far, in call order
    pub fn closed(&self) -> Vec<CloseStage> {
        self.state().closed.clone()
    }

    /// Number of downloads started
    pub fn download_count(&self) -> usize {
        self.state().downloads
    }

    fn ensure_open(state: &MockState) -> Result<(), BackendError> {
        match state.closed.first() {
            Some(stage) => Err(BackendError::Closed(*stage)),
            None => Ok(()),
        }
    }

    fn close(&self, stage: CloseStage) -> Result<(), BackendError> {
        let mut state = self.state();
        state.closed.push(stage);
        if state.faults.contains(&Fault::Close(stage)) {
            return Err(BackendError::Close { stage, reason: "injected failure".to_string() });
        }
        info!("Mock: Closed {}", stage);
        Ok(())
    }
}

#[async_trait]
impl ObjectBackend for MockObjectStore {
    async fn upload_object(&self, path: &str, data: Bytes) -> Result<(), BackendError> {
        let mut state = self.state();
        Self::ensure_open(&state)?;
        info!("Mock: Uploaded {} bytes to {}", data.len(), path);
        state.objects.insert(path.to_string(), data);
        Ok(())
    }

    async fn open_object(&self, path: &str) -> Result<Box<dyn ObjectReader>, BackendError> {
        let state = self.state();
        Self::ensure_open(&state)?;
        if state.faults.contains(&Fault::Open) {
            return Err(BackendError::Object {
                operation: "open",
                path: path.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        let data = state
            .objects
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::NotFound { path: path.to_string() })?;

        Ok(Box::new(MockObjectReader {
            store: self.clone(),
            path: path.to_string(),
            data,
        }))
    }

    async fn close_bucket(&self) -> Result<(), BackendError> {
        self.close(CloseStage::Bucket)
    }

    async fn close_project(&self) -> Result<(), BackendError> {
        self.close(CloseStage::Project)
    }

    async fn close_session(&self) -> Result<(), BackendError> {
        self.close(CloseStage::Session)
    }
}

struct MockObjectReader {
    store: MockObjectStore,
    path: String,
    // Content as of open time
    data: Bytes,
}

#[async_trait]
impl ObjectReader for MockObjectReader {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn download_range(&mut self, offset: u64, length: u64) -> Result<ByteStream, BackendError> {
        let (delay, faults) = {
            let mut state = self.store.state();
            state.downloads += 1;
            (state.download_delay, state.faults.clone())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if faults.contains(&Fault::Download) {
            return Err(BackendError::Object {
                operation: "download",
                path: self.path.clone(),
                reason: "injected failure".to_string(),
            });
        }

        let start = (offset as usize).min(self.data.len());
        let end = start.saturating_add(length as usize).min(self.data.len());
        let body = self.data.slice(start..end);

        let mut chunks: Vec<Result<Bytes, BackendError>> = vec![Ok(body)];
        if faults.contains(&Fault::Read) {
            chunks.push(Err(BackendError::Object {
                operation: "read",
                path: self.path.clone(),
                reason: "connection reset".to_string(),
            }));
        }
        Ok(futures::stream::iter(chunks).boxed())
    }
}
