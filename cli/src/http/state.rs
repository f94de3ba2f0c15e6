use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Instant;

use molmesh_core::api::AppContext;
use tokio::sync::broadcast;
use uuid::Uuid;

#[derive(Debug)]
pub struct ServerStats {
    started: Instant,
    pub started_at: chrono::DateTime<chrono::Local>,
    pub requests_total: u64,
    pub errors_total: u64,
    pub artifacts_sent: u64,
    pub requests_by_route: HashMap<&'static str, u64>,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            started_at: chrono::Local::now(),
            requests_total: 0,
            errors_total: 0,
            artifacts_sent: 0,
            requests_by_route: HashMap::new(),
        }
    }

    pub fn increment_request(&mut self, route: &'static str) {
        self.requests_total += 1;
        *self.requests_by_route.entry(route).or_insert(0) += 1;
    }

    pub fn increment_error(&mut self) {
        self.errors_total += 1;
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub session_id: String,
    pub ctx: AppContext,
    pub stats: Arc<RwLock<ServerStats>>,
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    pub fn new(ctx: AppContext, shutdown_tx: broadcast::Sender<()>) -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            ctx,
            stats: Arc::new(RwLock::new(ServerStats::new())),
            shutdown_tx,
        }
    }

    // Counters stay usable after a panic elsewhere.
    pub fn stats(&self) -> RwLockReadGuard<'_, ServerStats> {
        self.stats.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stats_mut(&self) -> RwLockWriteGuard<'_, ServerStats> {
        self.stats.write().unwrap_or_else(|e| e.into_inner())
    }
}
