use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use pursuit_core::engine::{EngineError, PursuitEngine, RoomSnapshot};
use pursuit_core::events::{EventEnvelope, PursuitEvent};
use pursuit_core::player::PlayerId;
use pursuit_core::time::now_ms;

use crate::bus::RoomEventBus;
use crate::durability::RowUpdate;

/// Commands routed into a room's session actor. All state transitions for
/// the room happen inside the actor, one command or tick at a time; this
/// channel is the room's serialization point.
#[derive(Debug)]
pub enum RoomCommand {
    Answer {
        player_id: PlayerId,
        is_correct: bool,
        question_index: Option<u32>,
        reply: oneshot::Sender<Result<(), EngineError>>,
    },
    PlayerJoined {
        player_id: PlayerId,
    },
    PlayerLeft {
        player_id: PlayerId,
    },
    Reset,
    Query {
        reply: oneshot::Sender<RoomSnapshot>,
    },
    Stop,
}

/// Tick cadences for a session, taken from server config.
#[derive(Debug, Clone, Copy)]
pub struct SessionTiming {
    pub status_tick_ms: u64,
    pub attack_tick_ms: u64,
}

/// Spawn the authoritative tick loop for one room.
/// Returns the command sender and the task handle.
pub fn spawn_room_session(
    engine: PursuitEngine,
    bus: Arc<Mutex<RoomEventBus>>,
    durability_tx: mpsc::UnboundedSender<RowUpdate>,
    timing: SessionTiming,
) -> (mpsc::UnboundedSender<RoomCommand>, JoinHandle<()>) {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(async move {
        run_room_session(engine, bus, durability_tx, timing, cmd_rx).await;
    });
    (cmd_tx, handle)
}

async fn run_room_session(
    mut engine: PursuitEngine,
    bus: Arc<Mutex<RoomEventBus>>,
    durability_tx: mpsc::UnboundedSender<RowUpdate>,
    timing: SessionTiming,
    mut cmd_rx: mpsc::UnboundedReceiver<RoomCommand>,
) {
    let room_id = engine.room_id().to_string();
    tracing::info!(room = %room_id, players = engine.player_count(), "room session starting");

    // Initial records exist before the first tick; fan them out so
    // observers and the durability worker see the creation writes.
    publish(&bus, &durability_tx, engine.take_events());

    let mut status_interval = tokio::time::interval(Duration::from_millis(timing.status_tick_ms));
    status_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut attack_interval = tokio::time::interval(Duration::from_millis(timing.attack_tick_ms));
    attack_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        // biased: when a tick and a queued answer are ready together, the
        // tick runs first, so a same-tick correct answer is applied last
        // (decay never overrides a correct answer within one tick).
        tokio::select! {
            biased;
            _ = status_interval.tick() => {
                publish(&bus, &durability_tx, engine.tick_status(now_ms()));
            }
            _ = attack_interval.tick() => {
                publish(&bus, &durability_tx, engine.tick_attack());
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(RoomCommand::Answer { player_id, is_correct, question_index, reply }) => {
                        tracing::debug!(room = %room_id, player_id, is_correct, ?question_index, "answer received");
                        let result = match engine.report_answer(player_id, is_correct, now_ms()) {
                            Ok(events) => {
                                publish(&bus, &durability_tx, events);
                                Ok(())
                            },
                            Err(e) => Err(e),
                        };
                        let _ = reply.send(result);
                    },
                    Some(RoomCommand::PlayerJoined { player_id }) => {
                        publish(&bus, &durability_tx, engine.player_joined(player_id, now_ms()));
                    },
                    Some(RoomCommand::PlayerLeft { player_id }) => {
                        publish(&bus, &durability_tx, engine.player_left(player_id));
                    },
                    Some(RoomCommand::Reset) => {
                        publish(&bus, &durability_tx, engine.reset(now_ms()));
                    },
                    Some(RoomCommand::Query { reply }) => {
                        let _ = reply.send(engine.snapshot(now_ms()));
                    },
                    Some(RoomCommand::Stop) | None => break,
                }
            }
        }
    }

    tracing::info!(room = %room_id, "room session stopped");
}

/// Fan a batch of events out to the room bus and the durability worker.
fn publish(
    bus: &Arc<Mutex<RoomEventBus>>,
    durability_tx: &mpsc::UnboundedSender<RowUpdate>,
    events: Vec<EventEnvelope>,
) {
    if events.is_empty() {
        return;
    }
    let mut bus = bus.lock().unwrap();
    for envelope in events {
        match &envelope.event {
            PursuitEvent::PlayerChanged { player } => {
                let _ = durability_tx.send(RowUpdate::Player(player.clone()));
            },
            PursuitEvent::RoomChanged { room } => {
                let _ = durability_tx.send(RowUpdate::Room(room.clone()));
            },
            _ => {},
        }
        bus.publish(envelope);
    }
}
