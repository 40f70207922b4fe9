//! Engine-wide constants
//!
//! Single source of truth for timing defaults and reserved names.

/// Remote task backend timing (in milliseconds)
pub mod remote {
    /// Delay between status polls
    pub const POLL_INTERVAL_MS: u64 = 1_000;
    /// Floor for the poll interval
    pub const MIN_POLL_INTERVAL_MS: u64 = 1;
    /// Wall-clock limit for a single remote task
    pub const TIMEOUT_MS: u64 = 60_000;
    /// Ceiling for the task timeout (24 hours)
    pub const MAX_TIMEOUT_MS: u64 = 86_400_000;
    /// Poll interval multiplier; 1.0 keeps the interval fixed
    pub const POLL_BACKOFF: f64 = 1.0;
    /// Upper bound for a backed-off poll interval
    pub const MAX_POLL_INTERVAL_MS: u64 = 10_000;
    /// Timeout for a single HTTP request to the task service
    pub const REQUEST_TIMEOUT_MS: u64 = 10_000;
    /// Default task service endpoint
    pub const ENDPOINT: &str = "http://127.0.0.1:3000";
}

/// Task service HTTP routes
pub mod routes {
    pub const DISPATCH: &str = "/api/engine/dispatch";
    pub const TASKS: &str = "/api/engine/tasks";
}

/// Local retry timing
pub mod retry {
    /// Base delay; attempt `n` waits `n` times this long
    pub const BASE_DELAY_MS: u64 = 500;
}

/// Environment variables read by [`crate::EngineConfig::apply_env_overrides`]
pub mod env {
    pub const MODE: &str = "AUDITFLOW_MODE";
    pub const REMOTE_ENDPOINT: &str = "AUDITFLOW_REMOTE_ENDPOINT";
    pub const POLL_INTERVAL_MS: &str = "AUDITFLOW_POLL_INTERVAL_MS";
    pub const TIMEOUT_MS: &str = "AUDITFLOW_TIMEOUT_MS";
}
