use std::{sync::Arc, time::Instant};

use sandboxed_engine::SandboxEngine;

/// Shared state for all HTTP handlers.
pub struct GatewayState {
    pub engine: SandboxEngine,
    /// Server version string.
    pub version: String,
    pub started_at: Instant,
}

impl GatewayState {
    pub fn new(engine: SandboxEngine) -> Arc<Self> {
        Arc::new(Self {
            engine,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Instant::now(),
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}
