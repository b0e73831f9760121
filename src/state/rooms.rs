use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::{clock::QuizDate, dto::ws::QuizRoomEvent};

/// Capacity of each per-day broadcast channel. Slow consumers lag and drop.
const ROOM_CAPACITY: usize = 64;

/// Broadcast hub for one quiz date.
#[derive(Clone)]
pub struct RoomHub {
    sender: broadcast::Sender<QuizRoomEvent>,
}

impl RoomHub {
    fn new() -> Self {
        let (sender, _receiver) = broadcast::channel(ROOM_CAPACITY);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<QuizRoomEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: QuizRoomEvent) {
        let _ = self.sender.send(event);
    }
}

/// One logical room per quiz date.
#[derive(Default)]
pub struct RoomState {
    rooms: DashMap<QuizDate, RoomHub>,
}

impl RoomState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hub for `date`, created on first use.
    pub fn room(&self, date: QuizDate) -> RoomHub {
        self.rooms.entry(date).or_insert_with(RoomHub::new).clone()
    }

    /// Broadcast into the day's room if it exists; terminal states also tear
    /// the room down so every client is force-left.
    pub fn broadcast(&self, date: QuizDate, event: QuizRoomEvent) {
        if let Some(hub) = self.rooms.get(&date) {
            hub.broadcast(event);
        }
    }

    /// Drop the room; subscribers observe the closed channel and disconnect.
    pub fn close(&self, date: QuizDate) {
        self.rooms.remove(&date);
    }
}
