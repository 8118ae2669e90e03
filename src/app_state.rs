//! Application State Management
//!
//! State shared with the status page handlers. It holds only the status
//! store; the backend handle stays with the check engine.

use std::sync::Arc;

use crate::status::StatusStore;

/// Application state handed to every request handler
#[derive(Clone)]
pub struct AppState {
    pub status: Arc<StatusStore>,
}

impl AppState {
    pub fn new(status: Arc<StatusStore>) -> Self {
        Self { status }
    }
}
