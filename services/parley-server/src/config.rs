//! Server configuration

/// Runtime configuration for the HTTP service
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Negotiations a single buyer may start per UTC day
    pub max_negotiations_per_day: i64,
    /// How long daily usage counters are retained
    pub usage_retention_days: i64,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            port: std::env::var("PARLEY_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3000),
            max_negotiations_per_day: std::env::var("PARLEY_MAX_NEGOTIATIONS_PER_DAY")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
            usage_retention_days: 7,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            max_negotiations_per_day: 10,
            usage_retention_days: 7,
        }
    }
}
