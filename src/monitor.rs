//! Startup sequence
//!
//! Stat the reference file, connect the backend, upload the reference once,
//! and build the status store and check engine. Every step here is fatal.

use log::{error, info};
use std::sync::Arc;

use crate::backend::close_all;
use crate::config::RuntimeConfig;
use crate::error::StartupError;
use crate::service::check_engine::CheckEngine;
use crate::service::reference::ReferenceStore;
use crate::status::StatusStore;

/// A monitor ready to start checking
pub struct Monitor {
    pub status: Arc<StatusStore>,
    pub engine: CheckEngine,
    pub object_path: String,
}

/// Run the startup sequence for `config`
pub async fn prepare(config: &RuntimeConfig) -> Result<Monitor, StartupError> {
    let reference_err = |source| StartupError::Reference { path: config.reference_file.clone(), source };

    let reference = ReferenceStore::from_path(&config.reference_file).map_err(reference_err)?;
    let reference_info = reference.info().await.map_err(reference_err)?;
    let data = reference.current_bytes().await.map_err(reference_err)?;

    let backend = config.backend.connect().await.map_err(StartupError::Connect)?;

    let object_path = config.object_path();
    info!("Uploading file: {} ({} bytes)", object_path, data.len());
    let file_size = data.len() as u64;
    if let Err(e) = backend.upload_object(&object_path, data).await {
        if let Err(close_err) = close_all(backend.as_ref()).await {
            error!("Cleanup after failed upload: {}", close_err);
        }
        return Err(StartupError::Upload(e));
    }

    let status = Arc::new(StatusStore::new(reference_info.name, file_size, config.check_interval));
    let engine = CheckEngine::new(
        backend,
        reference,
        &object_path,
        Arc::clone(&status),
        config.check_interval,
        config.check_mode,
    );

    Ok(Monitor { status, engine, object_path })
}
