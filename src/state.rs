//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::registry::PanelRegistry;

/// Shared application state for the bridge server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// One long-lived session client per configured panel.
    pub panels: Arc<PanelRegistry>,
}

impl AppState {
    pub fn new(config: Config, panels: PanelRegistry) -> Self {
        Self {
            config: Arc::new(config),
            start_time: Instant::now(),
            panels: Arc::new(panels),
        }
    }
}
