//! Engine configuration

use std::time::Duration;

/// Timing and buffering knobs for negotiation runs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for a single agent invocation
    pub turn_timeout: Duration,
    /// Wall-clock budget for a whole run, enforced by the run manager
    pub run_timeout: Duration,
    /// Capacity of each run's broadcast event channel
    pub event_buffer: usize,
}

impl EngineConfig {
    /// Read configuration from the environment
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        let turn_secs = std::env::var("PARLEY_TURN_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);
        let run_secs = std::env::var("PARLEY_RUN_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(300);

        Self {
            turn_timeout: Duration::from_secs(turn_secs),
            run_timeout: Duration::from_secs(run_secs),
            event_buffer: 256,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            turn_timeout: Duration::from_secs(120),
            run_timeout: Duration::from_secs(300),
            event_buffer: 256,
        }
    }
}
