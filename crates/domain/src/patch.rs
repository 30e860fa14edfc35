//! Partial room updates.
//!
//! A patch names only the fields it changes. The same patch is sent to the
//! room API and applied to the local mirror, so both sides agree on the merge.

use serde::Serialize;

use crate::ids::{PlayerId, StageListId, StepId};
use crate::state::{
    merge_entries, CurGameState, GameData, GameStateEntry, GlobalStateData, PlayerStateData,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalStatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cur_stage_id: Option<StageListId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cur_step_id: Option<StepId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_owner_id: Option<PlayerId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub game_state_data: Vec<GameStateEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discussion_data_stringified: Option<String>,
    /// `Some(None)` clears the sub-state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cur_game_state: Option<Option<CurGameState>>,
}

impl GlobalStatePatch {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Later fields win; entries accumulate.
    pub fn merge(&mut self, other: GlobalStatePatch) {
        if other.cur_stage_id.is_some() {
            self.cur_stage_id = other.cur_stage_id;
        }
        if other.cur_step_id.is_some() {
            self.cur_step_id = other.cur_step_id;
        }
        if other.room_owner_id.is_some() {
            self.room_owner_id = other.room_owner_id;
        }
        if other.discussion_data_stringified.is_some() {
            self.discussion_data_stringified = other.discussion_data_stringified;
        }
        if other.cur_game_state.is_some() {
            self.cur_game_state = other.cur_game_state;
        }
        self.game_state_data.extend(other.game_state_data);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStatePatch {
    pub player: PlayerId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animation: Option<String>,
    pub game_state_data: Vec<GameStateEntry>,
}

impl PlayerStatePatch {
    pub fn entries(player: PlayerId, entries: Vec<GameStateEntry>) -> Self {
        Self {
            player,
            animation: None,
            game_state_data: entries,
        }
    }
}

/// Body of `updateRoomGameData`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomStatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub global_state_data: Option<GlobalStatePatch>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub player_state_data: Vec<PlayerStatePatch>,
}

impl RoomStatePatch {
    /// Move to a stage/step.
    pub fn position(stage_id: StageListId, step_id: StepId) -> Self {
        Self::global(GlobalStatePatch {
            cur_stage_id: Some(stage_id),
            cur_step_id: Some(step_id),
            ..Default::default()
        })
    }

    pub fn global(patch: GlobalStatePatch) -> Self {
        Self {
            global_state_data: Some(patch),
            player_state_data: Vec::new(),
        }
    }

    pub fn player_entries(player: PlayerId, entries: Vec<GameStateEntry>) -> Self {
        Self {
            global_state_data: None,
            player_state_data: vec![PlayerStatePatch::entries(player, entries)],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.global_state_data.as_ref().map_or(true, GlobalStatePatch::is_empty)
            && self.player_state_data.iter().all(|p| p.game_state_data.is_empty() && p.animation.is_none())
    }

    /// Fold another patch into this one so a step's writes go out together.
    pub fn merge(&mut self, other: RoomStatePatch) {
        if let Some(global) = other.global_state_data {
            match self.global_state_data.as_mut() {
                Some(existing) => existing.merge(global),
                None => self.global_state_data = Some(global),
            }
        }
        for incoming in other.player_state_data {
            match self
                .player_state_data
                .iter_mut()
                .find(|p| p.player == incoming.player)
            {
                Some(existing) => {
                    if incoming.animation.is_some() {
                        existing.animation = incoming.animation;
                    }
                    existing.game_state_data.extend(incoming.game_state_data);
                }
                None => self.player_state_data.push(incoming),
            }
        }
    }
}

impl GlobalStateData {
    pub fn apply(&mut self, patch: &GlobalStatePatch, persist_truth: &[String]) {
        if let Some(stage_id) = &patch.cur_stage_id {
            self.cur_stage_id = stage_id.clone();
        }
        if let Some(step_id) = &patch.cur_step_id {
            self.cur_step_id = step_id.clone();
        }
        if let Some(owner) = &patch.room_owner_id {
            self.room_owner_id = owner.clone();
        }
        if let Some(stringified) = &patch.discussion_data_stringified {
            self.discussion_data_stringified = stringified.clone();
        }
        if let Some(cur_game_state) = &patch.cur_game_state {
            self.cur_game_state = cur_game_state.clone();
        }
        merge_entries(&mut self.game_state_data, &patch.game_state_data, persist_truth);
    }
}

impl PlayerStateData {
    pub fn apply(&mut self, patch: &PlayerStatePatch, persist_truth: &[String]) {
        if let Some(animation) = &patch.animation {
            self.animation = animation.clone();
        }
        merge_entries(&mut self.game_state_data, &patch.game_state_data, persist_truth);
    }
}

impl GameData {
    /// Apply a patch to the local mirror, creating player records on demand.
    pub fn apply(&mut self, patch: &RoomStatePatch, persist_truth: &[String]) {
        if let Some(global) = &patch.global_state_data {
            self.global_state_data.apply(global, persist_truth);
        }
        for player_patch in &patch.player_state_data {
            let index = match self
                .player_state_data
                .iter()
                .position(|p| p.player == player_patch.player)
            {
                Some(index) => index,
                None => {
                    self.player_state_data
                        .push(PlayerStateData::new(player_patch.player.clone()));
                    self.player_state_data.len() - 1
                }
            };
            self.player_state_data[index].apply(player_patch, persist_truth);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::GameStatePhase;
    use crate::value::StateValue;

    #[test]
    fn position_patch_serializes_only_changed_fields() {
        let patch = RoomStatePatch::position("collect-variables".into(), "ask".into());
        let value = serde_json::to_value(&patch).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "globalStateData": {"curStageId": "collect-variables", "curStepId": "ask"}
            })
        );
    }

    #[test]
    fn clearing_cur_game_state_serializes_null() {
        let patch = RoomStatePatch::global(GlobalStatePatch {
            cur_game_state: Some(None),
            ..Default::default()
        });
        let value = serde_json::to_value(&patch).unwrap();
        assert!(value["globalStateData"]["curGameState"].is_null());
        assert!(value["globalStateData"].get("curGameState").is_some());
    }

    #[test]
    fn merge_combines_global_and_player_writes() {
        let mut patch = RoomStatePatch::player_entries("p1".into(), vec![GameStateEntry::new("a", 1.0)]);
        patch.merge(RoomStatePatch::player_entries("p1".into(), vec![GameStateEntry::new("b", 2.0)]));
        patch.merge(RoomStatePatch::position("s".into(), "x".into()));
        patch.merge(RoomStatePatch::position("s".into(), "y".into()));

        assert_eq!(patch.player_state_data.len(), 1);
        assert_eq!(patch.player_state_data[0].game_state_data.len(), 2);
        let global = patch.global_state_data.as_ref().unwrap();
        assert_eq!(global.cur_step_id, Some(StepId::new("y")));
        assert!(!patch.is_empty());
        assert!(RoomStatePatch::default().is_empty());
    }

    #[test]
    fn apply_updates_mirror_and_creates_missing_players() {
        let mut data = GameData::default();
        let mut patch = RoomStatePatch::position("intro".into(), "welcome".into());
        patch.merge(RoomStatePatch::global(GlobalStatePatch {
            cur_game_state: Some(Some(CurGameState::new(GameStatePhase::WaitingForSimulation))),
            ..Default::default()
        }));
        patch.merge(RoomStatePatch::player_entries(
            "p2".into(),
            vec![GameStateEntry::new("simulationViewed:sim", true)],
        ));

        data.apply(&patch, &[]);

        assert_eq!(data.global_state_data.cur_stage_id.as_str(), "intro");
        assert_eq!(
            data.global_state_data.cur_game_state.as_ref().map(|s| s.cur_state),
            Some(GameStatePhase::WaitingForSimulation)
        );
        let p2 = data.player_state(&PlayerId::new("p2")).unwrap();
        assert_eq!(p2.value("simulationViewed:sim"), Some(&StateValue::Bool(true)));

        data.apply(
            &RoomStatePatch::global(GlobalStatePatch {
                cur_game_state: Some(None),
                ..Default::default()
            }),
            &[],
        );
        assert!(data.global_state_data.cur_game_state.is_none());
    }
}
