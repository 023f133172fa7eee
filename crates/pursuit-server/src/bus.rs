use std::collections::VecDeque;

use pursuit_core::events::EventEnvelope;
use tokio::sync::broadcast;

/// Default number of events retained per room.
const DEFAULT_EVENT_BUFFER: usize = 256;

/// Default broadcast channel capacity for event fan-out.
const DEFAULT_BROADCAST_CAPACITY: usize = 1024;

/// In-memory, bounded per-room event bus with broadcast fan-out.
///
/// Push delivery to observers goes through the broadcast channel; the
/// bounded buffer keeps the most recent events for diagnostics. Delivery is
/// best-effort (slow subscribers lag and drop), which is why observers pair
/// this with the anti-entropy pull endpoints.
pub struct RoomEventBus {
    events: VecDeque<EventEnvelope>,
    broadcast_tx: broadcast::Sender<EventEnvelope>,
    max_events: usize,
}

impl Default for RoomEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomEventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_EVENT_BUFFER, DEFAULT_BROADCAST_CAPACITY)
    }

    /// Create a bus with configurable capacity limits.
    pub fn with_capacity(max_events: usize, broadcast_capacity: usize) -> Self {
        let (broadcast_tx, _) = broadcast::channel(broadcast_capacity);
        Self {
            events: VecDeque::new(),
            broadcast_tx,
            max_events,
        }
    }

    /// Publish an event: broadcast to all subscribers and retain it,
    /// evicting the oldest past capacity.
    pub fn publish(&mut self, envelope: EventEnvelope) {
        let _ = self.broadcast_tx.send(envelope.clone());
        self.events.push_back(envelope);
        while self.events.len() > self.max_events {
            self.events.pop_front();
        }
    }

    /// Subscribe to the broadcast channel for new events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.broadcast_tx.subscribe()
    }

    /// The most recent N events, newest first.
    pub fn recent(&self, count: usize) -> Vec<EventEnvelope> {
        self.events.iter().rev().take(count).cloned().collect()
    }

    /// Sequence number of the newest retained event.
    pub fn last_seq(&self) -> u64 {
        self.events.back().map_or(0, |e| e.seq)
    }
}
