//! Application state shared across handlers.

use std::sync::Arc;

use sightline_core::{EngineHandle, SightlineConfig};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

/// Handle type used by routers and extractors.
pub type SharedState = AppState;

struct AppStateInner {
    engine: EngineHandle,
    config: SightlineConfig,
}

impl AppState {
    /// Wrap a running engine and the configuration it was started with.
    #[must_use]
    pub fn new(engine: EngineHandle, config: SightlineConfig) -> Self {
        Self {
            inner: Arc::new(AppStateInner { engine, config }),
        }
    }

    /// The discovery engine.
    #[must_use]
    pub fn engine(&self) -> &EngineHandle {
        &self.inner.engine
    }

    /// Configuration loaded at startup.
    #[must_use]
    pub fn config(&self) -> &SightlineConfig {
        &self.inner.config
    }
}
