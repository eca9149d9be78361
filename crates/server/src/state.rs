//! Shared application state.

use gangway_core::config::ServerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::deploy::SnapshotStore;
use crate::inventory::state::InventoryStore;
use crate::ratelimit::RateLimiter;

/// Requests admitted per window for `/check`.
const CHECK_LIMIT: usize = 60;
/// Requests admitted per window for the shared `/deploy` + `/rollback` pool.
const DEPLOY_LIMIT: usize = 10;
/// Sliding-window length for both limiters.
const WINDOW: Duration = Duration::from_secs(60);

/// Shared application state.
///
/// Each component owns its mutable state and is its sole writer; handlers
/// receive everything through this struct rather than ad-hoc singletons.
#[derive(Clone)]
pub struct AppState {
    /// Daemon configuration.
    pub config: Arc<ServerConfig>,
    /// Process-wide single-deployment lock. `/deploy` and `/rollback` take
    /// it with a non-waiting acquisition and answer 409 when it is held.
    pub deploy_lock: Arc<Mutex<()>>,
    /// Limiter for `/check`.
    pub check_limiter: RateLimiter,
    /// Limiter shared by `/deploy` and `/rollback`.
    pub deploy_limiter: RateLimiter,
    /// Per-project rollback snapshots.
    pub snapshots: SnapshotStore,
    /// Per-project stored inventory plus the host-global owners registry.
    pub inventory: InventoryStore,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let snapshots = SnapshotStore::new(config.state_dir.clone());
        let inventory = InventoryStore::new(config.state_dir.clone());
        Self {
            config: Arc::new(config),
            deploy_lock: Arc::new(Mutex::new(())),
            check_limiter: RateLimiter::new(CHECK_LIMIT, WINDOW),
            deploy_limiter: RateLimiter::new(DEPLOY_LIMIT, WINDOW),
            snapshots,
            inventory,
        }
    }
}
