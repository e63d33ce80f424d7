use crate::config::AppConfig;
use crate::db::connection::DbPool;
use crate::services::secrets::SecretStore;
use std::collections::HashSet;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub secrets: SecretStore,
    /// Config ids with an in-flight backup or restore run. At most one run
    /// per config may hold an entry at any time.
    pub running: Mutex<HashSet<String>>,
    /// Cancelled on shutdown; runs check it between files.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        Self {
            db,
            config,
            secrets: SecretStore::from_env(),
            running: Mutex::new(HashSet::new()),
            shutdown: CancellationToken::new(),
        }
    }
}
