use crate::config::Config;
use crate::services::UpstreamClient;
use anyhow::Result;
use std::sync::Arc;

/// Process-wide state: the immutable configuration and the shared upstream
/// client. Read-only after startup; all per-turn state lives in handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub upstream: Arc<UpstreamClient>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config);
        let upstream = Arc::new(UpstreamClient::new(config.clone())?);
        Ok(Self { config, upstream })
    }
}
