use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{RwLock, mpsc};

use crate::config::ServerConfig;
use crate::durability::RowUpdate;
use crate::room_manager::RoomManager;

pub type SharedRoomManager = Arc<RwLock<RoomManager>>;

#[derive(Clone)]
pub struct AppState {
    pub rooms: SharedRoomManager,
    pub config: Arc<ServerConfig>,
    pub sse_subscriber_count: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: ServerConfig, durability_tx: mpsc::UnboundedSender<RowUpdate>) -> Self {
        let config = Arc::new(config);
        Self {
            rooms: Arc::new(RwLock::new(RoomManager::new(
                Arc::clone(&config),
                durability_tx,
            ))),
            config,
            sse_subscriber_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

/// RAII counter for connection-style resources (SSE subscribers).
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_guard_counts_up_and_down() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let _a = ConnectionGuard::new(Arc::clone(&counter));
            let _b = ConnectionGuard::new(Arc::clone(&counter));
            assert_eq!(counter.load(Ordering::Relaxed), 2);
        }
        assert_eq!(counter.load(Ordering::Relaxed), 0);
    }
}
