//! Database configuration

/// Connection configuration for the SQLite store
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite://parley.db`
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Read configuration from the environment
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();

        Self {
            url: std::env::var("PARLEY_DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://parley.db".to_string()),
            max_connections: std::env::var("PARLEY_DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
            acquire_timeout_secs: std::env::var("PARLEY_DB_ACQUIRE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://parley.db".to_string(),
            max_connections: 5,
            acquire_timeout_secs: 5,
        }
    }
}
