//! Synchronized room state.
//!
//! The room API owns these documents; clients read them from polling and
//! write partial updates through [`crate::patch::RoomStatePatch`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::chat::ChatMessage;
use crate::ids::{PlayerId, RoomId, StageListId, StepId};
use crate::player::Player;
use crate::value::StateValue;
use crate::wire;

/// A key/value pair in `gameStateData`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameStateEntry {
    pub key: String,
    pub value: StateValue,
}

impl GameStateEntry {
    pub fn new(key: impl Into<String>, value: impl Into<StateValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Current position in the stage list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StagePosition {
    pub stage_id: StageListId,
    pub step_id: StepId,
}

impl StagePosition {
    pub fn new(stage_id: impl Into<StageListId>, step_id: impl Into<StepId>) -> Self {
        Self {
            stage_id: stage_id.into(),
            step_id: step_id.into(),
        }
    }
}

impl std::fmt::Display for StagePosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.stage_id, self.step_id)
    }
}

/// Observable sub-state of the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GameStatePhase {
    SingleResponseRequired,
    AllUserResponsesRequiredFreeForAll,
    AllRequiredInOrder,
    WaitingForSimulation,
    EndOfPhaseReflection,
    WaitingForStudentReadyToContinue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurGameState {
    pub cur_state: GameStatePhase,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub players_left_to_respond: Vec<PlayerId>,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub student_ready_to_continue: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cur_round_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_of_phase_step_id: Option<StepId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_question: Option<String>,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub student_reflections: BTreeMap<PlayerId, String>,
}

impl CurGameState {
    pub fn new(cur_state: GameStatePhase) -> Self {
        Self {
            cur_state,
            players_left_to_respond: Vec::new(),
            student_ready_to_continue: false,
            cur_round_number: None,
            end_of_phase_step_id: None,
            selected_question: None,
            student_reflections: BTreeMap::new(),
        }
    }
}

/// Room-wide state shared by every client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStateData {
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub cur_stage_id: StageListId,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub cur_step_id: StepId,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub room_owner_id: PlayerId,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub game_state_data: Vec<GameStateEntry>,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub discussion_data_stringified: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cur_game_state: Option<CurGameState>,
}

impl GlobalStateData {
    /// `None` until the room owner has written a stage.
    pub fn position(&self) -> Option<StagePosition> {
        if self.cur_stage_id.is_empty() || self.cur_step_id.is_empty() {
            return None;
        }
        Some(StagePosition::new(
            self.cur_stage_id.clone(),
            self.cur_step_id.clone(),
        ))
    }

    pub fn is_owned_by(&self, player_id: &PlayerId) -> bool {
        !self.room_owner_id.is_empty() && &self.room_owner_id == player_id
    }

    pub fn value(&self, key: &str) -> Option<&StateValue> {
        find_value(&self.game_state_data, key)
    }
}

/// Per-player state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStateData {
    pub player: PlayerId,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub animation: String,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub game_state_data: Vec<GameStateEntry>,
}

impl PlayerStateData {
    pub fn new(player: impl Into<PlayerId>) -> Self {
        Self {
            player: player.into(),
            animation: String::new(),
            game_state_data: Vec::new(),
        }
    }

    pub fn value(&self, key: &str) -> Option<&StateValue> {
        find_value(&self.game_state_data, key)
    }

    pub fn has_true(&self, key: &str) -> bool {
        self.value(key).is_some_and(StateValue::is_true)
    }
}

/// Everything a client mirrors about its room.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameData {
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub game_id: String,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub players: Vec<Player>,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub chat: Vec<ChatMessage>,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub global_state_data: GlobalStateData,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub player_state_data: Vec<PlayerStateData>,
}

impl GameData {
    pub fn player_state(&self, player_id: &PlayerId) -> Option<&PlayerStateData> {
        self.player_state_data.iter().find(|p| &p.player == player_id)
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.client_id.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Room {
    #[serde(rename = "_id")]
    pub id: RoomId,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub name: String,
    #[serde(rename = "gameData", default, deserialize_with = "wire::null_as_default")]
    pub game_data: GameData,
}

fn find_value<'a>(entries: &'a [GameStateEntry], key: &str) -> Option<&'a StateValue> {
    entries.iter().find(|e| e.key == key).map(|e| &e.value)
}

/// Upsert `updates` into `entries` by key.
///
/// A key listed in `persist_truth` whose current value is true keeps that
/// value.
pub fn merge_entries(
    entries: &mut Vec<GameStateEntry>,
    updates: &[GameStateEntry],
    persist_truth: &[String],
) {
    for update in updates {
        match entries.iter_mut().find(|e| e.key == update.key) {
            Some(existing) => {
                let pinned = existing.value.is_true() && persist_truth.iter().any(|k| k == &update.key);
                if !pinned {
                    existing.value = update.value.clone();
                }
            }
            None => entries.push(update.clone()),
        }
    }
}
