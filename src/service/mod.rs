//! Durability check service
//!
//! A check cycle downloads the whole monitored object and compares it
//! byte-for-byte with the reference. The engine in [`check_engine`] drives
//! cycles on a timer and records their outcome.

pub mod check_engine;
pub mod reference;

use log::debug;

use crate::backend::{read_to_end, ObjectBackend};
use crate::error::CheckError;
use crate::service::reference::ReferenceStore;

/// Run one check cycle against `path`
pub async fn check_object(
    backend: &dyn ObjectBackend,
    path: &str,
    reference: &ReferenceStore,
) -> Result<(), CheckError> {
    let mut object = backend
        .open_object(path)
        .await
        .map_err(|source| CheckError::OpenObject { path: path.to_string(), source })?;

    // Whole object: offset 0 through its full length
    let size = object.size();
    let stream = object
        .download_range(0, size)
        .await
        .map_err(|source| CheckError::StartDownload { path: path.to_string(), source })?;
    let received = read_to_end(stream)
        .await
        .map_err(|source| CheckError::ReadStream { path: path.to_string(), source })?;
    debug!("Downloaded {} of {} bytes from {}", received.len(), size, path);

    let expected = reference
        .current_bytes()
        .await
        .map_err(|source| CheckError::ReadReference { origin: reference.describe(), source })?;

    if received != expected {
        return Err(CheckError::Mismatch {
            expected_len: expected.len(),
            expected_md5: hex::encode(md5::compute(&expected).0),
            actual_len: received.len(),
            actual_md5: hex::encode(md5::compute(&received).0),
        });
    }
    Ok(())
}
