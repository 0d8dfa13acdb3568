use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use dataforge_engine::Engine;

/// Shared state injected into every handler.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) engine: Arc<Engine>,
    pub(crate) api_key: Option<String>,
    pub(crate) whitelist: Arc<Vec<IpAddr>>,
    pub(crate) started_at: Instant,
}

impl AppState {
    pub(crate) fn new(
        engine: Arc<Engine>,
        api_key: Option<String>,
        whitelist: Vec<IpAddr>,
    ) -> Self {
        Self {
            engine,
            api_key,
            whitelist: Arc::new(whitelist),
            started_at: Instant::now(),
        }
    }
}
