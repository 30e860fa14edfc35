//! Room runner - drives one game session.
//!
//! A single task owns the [`GameStateHandler`]. It wakes on three things:
//! a poll tick (fetch the room, turn what changed into [`RoomEvent`]s), an
//! event from the session channel (local input, prompt results), or
//! shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use arcade_domain::GameData;

use crate::infrastructure::ports::RoomSyncPort;
use crate::use_cases::game_state::{GameStateHandler, RoomEvent};

pub struct RoomRunner {
    handler: GameStateHandler,
    room: Arc<dyn RoomSyncPort>,
    events: mpsc::Receiver<RoomEvent>,
    last_seen: GameData,
    poll_interval: Duration,
    poll_backoff: Duration,
}

impl RoomRunner {
    pub fn new(
        handler: GameStateHandler,
        room: Arc<dyn RoomSyncPort>,
        events: mpsc::Receiver<RoomEvent>,
        snapshot: GameData,
        poll_interval: Duration,
        poll_backoff: Duration,
    ) -> Self {
        Self {
            handler,
            room,
            events,
            last_seen: snapshot,
            poll_interval,
            poll_backoff,
        }
    }

    pub fn handler(&self) -> &GameStateHandler {
        &self.handler
    }

    /// Run until `shutdown` fires. Returns the handler so callers can read
    /// the final state.
    pub async fn run(mut self, shutdown: CancellationToken) -> GameStateHandler {
        tracing::info!(player = %self.handler.local_player().client_id, "Starting room runner");

        match self.handler.initialize_game().await {
            Ok(start) => tracing::info!(start = ?start, "Game initialized"),
            Err(e) => tracing::error!(error = %e, "Failed to initialize game"),
        }

        let mut delay = self.poll_interval;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("Room runner shutting down");
                    break;
                }
                Some(event) = self.events.recv() => {
                    if let Err(e) = self.handler.handle_event(event).await {
                        tracing::error!(error = %e, "Failed to handle session event");
                    }
                }
                _ = tokio::time::sleep(delay) => {
                    delay = match self.poll().await {
                        Ok(()) => self.poll_interval,
                        Err(e) => {
                            tracing::warn!(error = %e, backoff_ms = self.poll_backoff.as_millis() as u64, "Room poll failed");
                            self.poll_backoff
                        }
                    };
                }
            }
        }

        self.handler
    }

    /// Fetch the room and feed every changed section to the handler.
    async fn poll(&mut self) -> anyhow::Result<()> {
        let room = self.room.fetch_room().await?;
        let events = diff_snapshot(&self.last_seen, &room.game_data);
        if !events.is_empty() {
            tracing::debug!(count = events.len(), "Room changed");
        }
        self.last_seen = room.game_data;

        for event in events {
            if let Err(e) = self.handler.handle_event(event).await {
                tracing::error!(error = %e, "Failed to apply room change");
            }
        }
        Ok(())
    }
}

/// Events for the sections of `current` that differ from `previous`.
///
/// Players and global state go first so ownership and position are current
/// before chat is interpreted.
pub fn diff_snapshot(previous: &GameData, current: &GameData) -> Vec<RoomEvent> {
    let mut events = Vec::new();
    if current.players != previous.players {
        events.push(RoomEvent::Players(current.players.clone()));
    }
    if current.global_state_data != previous.global_state_data {
        events.push(RoomEvent::GlobalState(current.global_state_data.clone()));
    }
    if current.player_state_data != previous.player_state_data {
        events.push(RoomEvent::PlayerState(current.player_state_data.clone()));
    }
    if current.chat != previous.chat {
        events.push(RoomEvent::ChatLog(current.chat.clone()));
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcade_domain::{ChatMessage, Player, SessionId};

    #[test]
    fn unchanged_room_produces_no_events() {
        let data = GameData::default();
        assert!(diff_snapshot(&data, &data.clone()).is_empty());
    }

    #[test]
    fn changed_sections_are_reported_in_order() {
        let previous = GameData::default();
        let mut current = previous.clone();
        current.chat.push(ChatMessage::system("Welcome", SessionId::default()));
        current.players.push(Player::new("p1", "Alice"));
        current.global_state_data.cur_stage_id = "intro".into();

        let events = diff_snapshot(&previous, &current);

        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], RoomEvent::Players(ref p) if p.len() == 1));
        assert!(matches!(events[1], RoomEvent::GlobalState(ref g) if g.cur_stage_id.as_str() == "intro"));
        assert!(matches!(events[2], RoomEvent::ChatLog(ref c) if c.len() == 1));
    }
}
