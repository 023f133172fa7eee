use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use pursuit_core::player::{PlayerId, PlayerPursuitState, RoomId};
use pursuit_core::room::RoomPursuitState;

use crate::config::DurabilityConfig;

/// A state mutation headed for the durability collaborator.
#[derive(Debug, Clone)]
pub enum RowUpdate {
    Player(PlayerPursuitState),
    Room(RoomPursuitState),
}

/// Row addressing: one row per player record keyed `(room_id, player_id)`,
/// one per room record keyed `room_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RowKey {
    Player { room_id: RoomId, player_id: PlayerId },
    Room { room_id: RoomId },
}

#[derive(Debug)]
pub struct SinkError(pub String);

impl std::fmt::Display for SinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for SinkError {}

/// The external durability collaborator. Implementations receive
/// msgpack-encoded rows; the writer task handles retry, so a sink only
/// reports success or failure for a single put.
pub trait DurabilitySink: Send + Sync {
    fn put(&self, key: &RowKey, bytes: &[u8]) -> Result<(), SinkError>;
}

/// Discards rows. The default when no durability collaborator is wired up.
pub struct NoopSink;

impl DurabilitySink for NoopSink {
    fn put(&self, _key: &RowKey, _bytes: &[u8]) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps rows in memory. Useful for tests and local runs.
#[derive(Default)]
pub struct MemorySink {
    rows: Mutex<HashMap<RowKey, Vec<u8>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }

    pub fn get(&self, key: &RowKey) -> Option<Vec<u8>> {
        self.rows.lock().unwrap().get(key).cloned()
    }
}

impl DurabilitySink for MemorySink {
    fn put(&self, key: &RowKey, bytes: &[u8]) -> Result<(), SinkError> {
        self.rows.lock().unwrap().insert(key.clone(), bytes.to_vec());
        Ok(())
    }
}

/// Consume row updates and hand them to the sink, retrying failures a
/// bounded number of times with exponential backoff. Exhausted retries are
/// logged and dropped; the in-memory authoritative state stays correct and
/// the room keeps functioning.
pub fn spawn_durability_writer(
    mut rx: mpsc::UnboundedReceiver<RowUpdate>,
    sink: Arc<dyn DurabilitySink>,
    config: DurabilityConfig,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(update) = rx.recv().await {
            let (key, bytes) = match encode_row(&update) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode durability row");
                    continue;
                },
            };

            let mut backoff = Duration::from_millis(config.initial_backoff_ms);
            let mut attempt = 0u32;
            loop {
                match sink.put(&key, &bytes) {
                    Ok(()) => break,
                    Err(e) => {
                        attempt += 1;
                        if attempt > config.max_retries {
                            tracing::warn!(
                                ?key,
                                error = %e,
                                retries = config.max_retries,
                                "durability write dropped after retries exhausted"
                            );
                            break;
                        }
                        let jitter_ms = rand::rng().random_range(0..=backoff.as_millis() as u64 / 4);
                        tokio::time::sleep(backoff + Duration::from_millis(jitter_ms)).await;
                        backoff *= 2;
                    },
                }
            }
        }
        tracing::debug!("durability writer stopped");
    })
}

fn encode_row(update: &RowUpdate) -> Result<(RowKey, Vec<u8>), rmp_serde::encode::Error> {
    match update {
        RowUpdate::Player(p) => Ok((
            RowKey::Player {
                room_id: p.room_id.clone(),
                player_id: p.player_id,
            },
            rmp_serde::to_vec(p)?,
        )),
        RowUpdate::Room(r) => Ok((
            RowKey::Room {
                room_id: r.room_id.clone(),
            },
            rmp_serde::to_vec(r)?,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` puts, then succeeds.
    struct FlakySink {
        failures: u32,
        attempts: AtomicU32,
        inner: MemorySink,
    }

    impl FlakySink {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                attempts: AtomicU32::new(0),
                inner: MemorySink::new(),
            }
        }
    }

    impl DurabilitySink for FlakySink {
        fn put(&self, key: &RowKey, bytes: &[u8]) -> Result<(), SinkError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                return Err(SinkError("collaborator unavailable".to_string()));
            }
            self.inner.put(key, bytes)
        }
    }

    fn player_row() -> RowUpdate {
        RowUpdate::Player(PlayerPursuitState::new("ROOM-0001".to_string(), 1, 3, 0))
    }

    fn fast_config() -> DurabilityConfig {
        DurabilityConfig {
            max_retries: 3,
            initial_backoff_ms: 1,
        }
    }

    #[tokio::test]
    async fn rows_land_in_sink() {
        let sink = Arc::new(MemorySink::new());
        let (tx, rx) = mpsc::unbounded_channel();
        let handle =
            spawn_durability_writer(rx, Arc::clone(&sink) as Arc<dyn DurabilitySink>, fast_config());

        tx.send(player_row()).unwrap();
        tx.send(RowUpdate::Room(RoomPursuitState::new("ROOM-0001".to_string())))
            .unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(sink.row_count(), 2);
        let key = RowKey::Player {
            room_id: "ROOM-0001".to_string(),
            player_id: 1,
        };
        let bytes = sink.get(&key).unwrap();
        let decoded: PlayerPursuitState = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(decoded.player_id, 1);
        assert_eq!(decoded.health, 3);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let sink = Arc::new(FlakySink::new(2));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle =
            spawn_durability_writer(rx, Arc::clone(&sink) as Arc<dyn DurabilitySink>, fast_config());

        tx.send(player_row()).unwrap();
        drop(tx);
        handle.await.unwrap();

        assert_eq!(sink.inner.row_count(), 1);
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_drop_the_row_and_keep_going() {
        let sink = Arc::new(FlakySink::new(u32::MAX));
        let (tx, rx) = mpsc::unbounded_channel();
        let handle =
            spawn_durability_writer(rx, Arc::clone(&sink) as Arc<dyn DurabilitySink>, fast_config());

        tx.send(player_row()).unwrap();
        tx.send(player_row()).unwrap();
        drop(tx);
        handle.await.unwrap();

        // 1 initial + 3 retries per row, nothing stored, no panic.
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 8);
        assert_eq!(sink.inner.row_count(), 0);
    }
}
