use std::sync::Arc;

use crate::config::Config;
use crate::runtime::ExtensionRuntime;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// The running extension: background, popup, and page contexts.
    pub runtime: Arc<ExtensionRuntime>,
}
