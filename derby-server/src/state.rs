//! Application state management

use derby_backends::InMemoryBackend;
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Garage, winners and engine sessions
    pub backend: Arc<InMemoryBackend>,
}

impl AppState {
    pub fn new(backend: InMemoryBackend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(InMemoryBackend::seeded())
    }
}
