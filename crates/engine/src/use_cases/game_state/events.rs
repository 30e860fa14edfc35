use arcade_domain::{
    ChatMessage, GlobalStateData, Player, PlayerStateData, StageListId, StagePosition,
};

use crate::infrastructure::ports::{PromptError, PromptResponse};

/// Everything that can wake a game session.
#[derive(Debug, Clone)]
pub enum RoomEvent {
    // Room snapshots from the poller.
    ChatLog(Vec<ChatMessage>),
    GlobalState(GlobalStateData),
    PlayerState(Vec<PlayerStateData>),
    Players(Vec<Player>),

    /// The local player finished watching the simulation.
    SimulationEnded,

    /// A spawned prompt call finished (or was cancelled).
    PromptSettled {
        position: StagePosition,
        attempt: u32,
        result: Result<PromptResponse, PromptError>,
    },

    // Local player actions.
    RetryRequested,
    LocalChat(String),
    SubmitReflection(String),
    ReadyToContinue,
}

/// How `initialize_game` found the room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameStart {
    /// A position was already stored; play continues from it.
    Resumed(StagePosition),
    /// This client owns the room and placed play at the first stage.
    Started(StagePosition),
    /// No position yet and this client is not the owner.
    AwaitingOwner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Uninitialized,
    AwaitingFirstStage,
    InDiscussion,
    InSimulation,
    Finished,
    /// A fatal discussion error stopped play at the current position.
    Halted,
}

/// Player-state flag set once a player has watched the simulation for a
/// stage.
pub fn simulation_viewed_key(stage_id: &StageListId) -> String {
    format!("simulationViewed:{stage_id}")
}
