use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use uuid::Uuid;

use pursuit_core::attack::AttackPhase;
use pursuit_core::engine::RoomSnapshot;
use pursuit_core::mirror::ObserverMirror;
use pursuit_core::player::RoomId;

use crate::state::SharedRoomManager;

/// How an observer keeps its mirror current. Push is a latency
/// optimization; the pull loop is the correctness backstop, so an observer
/// with push disabled still converges within one pull interval.
#[derive(Debug, Clone)]
pub struct ObserverOptions {
    pub push_enabled: bool,
    /// Anti-entropy cadence for player records (reference: 2 s).
    pub player_pull_interval: Duration,
    /// Anti-entropy cadence for room-wide attack/countdown display
    /// (reference: 1 s).
    pub room_pull_interval: Duration,
}

impl Default for ObserverOptions {
    fn default() -> Self {
        Self {
            push_enabled: true,
            player_pull_interval: Duration::from_secs(2),
            room_pull_interval: Duration::from_secs(1),
        }
    }
}

/// A running observer (a moderator view or one participant's view): a
/// shared mirror plus the tasks keeping it synchronized. Dropping the
/// handle does not stop the tasks; call [`ObserverHandle::stop`].
pub struct ObserverHandle {
    mirror: Arc<Mutex<ObserverMirror>>,
    pull_task: JoinHandle<()>,
    push_task: Option<JoinHandle<()>>,
}

impl ObserverHandle {
    pub fn mirror(&self) -> Arc<Mutex<ObserverMirror>> {
        Arc::clone(&self.mirror)
    }

    /// Run a closure against the current mirror contents.
    pub fn with_mirror<R>(&self, f: impl FnOnce(&ObserverMirror) -> R) -> R {
        f(&self.mirror.lock().unwrap())
    }

    /// Cancel the observer's pull loop and push subscription.
    pub fn stop(self) {
        self.pull_task.abort();
        if let Some(task) = self.push_task {
            task.abort();
        }
    }
}

/// Spawn an observer for one room. The push subscription and the pull loop
/// run independently and never block the authoritative side; a slow
/// observer only affects its own staleness.
pub fn spawn_observer(
    rooms: SharedRoomManager,
    room_id: RoomId,
    options: ObserverOptions,
) -> ObserverHandle {
    let observer_id = Uuid::new_v4();
    let mirror = Arc::new(Mutex::new(ObserverMirror::new(room_id.clone())));

    let push_task = options.push_enabled.then(|| {
        tokio::spawn(run_push_loop(
            Arc::clone(&rooms),
            room_id.clone(),
            observer_id,
            Arc::clone(&mirror),
        ))
    });
    let pull_task = tokio::spawn(run_pull_loop(
        rooms,
        room_id,
        observer_id,
        options,
        Arc::clone(&mirror),
    ));

    ObserverHandle {
        mirror,
        pull_task,
        push_task,
    }
}

async fn pull_snapshot(rooms: &SharedRoomManager, room_id: &str) -> Option<RoomSnapshot> {
    let rx = {
        let mgr = rooms.read().await;
        mgr.request_snapshot(room_id)?
    };
    rx.await.ok()
}

fn snapshot_progress(snapshot: &RoomSnapshot) -> Option<f32> {
    match snapshot.attack {
        AttackPhase::Attacking { progress, .. } => Some(progress),
        AttackPhase::Idle => None,
    }
}

async fn run_push_loop(
    rooms: SharedRoomManager,
    room_id: RoomId,
    observer_id: Uuid,
    mirror: Arc<Mutex<ObserverMirror>>,
) {
    let Some(mut rx) = rooms.read().await.subscribe(&room_id) else {
        tracing::debug!(room = %room_id, %observer_id, "push subscription failed: room gone");
        return;
    };
    // One full pull before consuming push, so a (re)connecting observer
    // starts from authoritative state rather than an empty mirror.
    if let Some(snapshot) = pull_snapshot(&rooms, &room_id).await {
        mirror.lock().unwrap().reconcile(&snapshot);
    }

    loop {
        match rx.recv().await {
            Ok(envelope) => {
                mirror.lock().unwrap().apply(&envelope);
            },
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(room = %room_id, %observer_id, missed = n, "push subscription lagged; repairing by pull");
                if let Some(snapshot) = pull_snapshot(&rooms, &room_id).await {
                    mirror.lock().unwrap().reconcile(&snapshot);
                }
            },
            Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                tracing::debug!(room = %room_id, %observer_id, "push channel closed");
                break;
            },
        }
    }
}

async fn run_pull_loop(
    rooms: SharedRoomManager,
    room_id: RoomId,
    observer_id: Uuid,
    options: ObserverOptions,
    mirror: Arc<Mutex<ObserverMirror>>,
) {
    if let Some(snapshot) = pull_snapshot(&rooms, &room_id).await {
        mirror.lock().unwrap().reconcile(&snapshot);
    }

    let mut player_interval = tokio::time::interval(options.player_pull_interval);
    player_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut room_interval = tokio::time::interval(options.room_pull_interval);
    room_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = player_interval.tick() => {
                let Some(snapshot) = pull_snapshot(&rooms, &room_id).await else {
                    break;
                };
                mirror
                    .lock()
                    .unwrap()
                    .reconcile_players(snapshot.seq, snapshot.players);
            }
            _ = room_interval.tick() => {
                let Some(snapshot) = pull_snapshot(&rooms, &room_id).await else {
                    break;
                };
                let progress = snapshot_progress(&snapshot);
                mirror
                    .lock()
                    .unwrap()
                    .reconcile_room(snapshot.seq, snapshot.room, progress);
            }
        }

        // A sequence gap seen on the push path: repair now instead of
        // waiting out the next interval. The guard must not be held across
        // the pull.
        let needs_repair = mirror.lock().unwrap().needs_repair();
        if needs_repair && let Some(snapshot) = pull_snapshot(&rooms, &room_id).await {
            mirror.lock().unwrap().reconcile(&snapshot);
        }
    }
    tracing::debug!(room = %room_id, %observer_id, "pull loop ended: room gone");
}
