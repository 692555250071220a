//! Shared application state

use std::sync::Arc;

use parley_db::Database;
use parley_engine::RunManager;

use crate::auth::AuthVerifier;
use crate::config::ServerConfig;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub runs: Arc<RunManager>,
    pub verifier: Arc<dyn AuthVerifier>,
    pub config: Arc<ServerConfig>,
}
