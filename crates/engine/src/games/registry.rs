//! Ordered stage lists and the per-game trait that builds them.

use arcade_domain::{
    first_step_id, CollectedDiscussionData, GameStateEntry, Stage, StageListId, StagePosition,
};

use crate::use_cases::discussion::StageCondition;
use crate::use_cases::game_state::GameStateError;

/// Which stage follows a finished one.
#[derive(Debug, Clone, PartialEq)]
pub enum NextStage {
    Fixed(StageListId),
    /// `then` when collected `key` renders as `equals`, else `otherwise`.
    Branch {
        key: String,
        equals: String,
        then: StageListId,
        otherwise: StageListId,
    },
    End,
}

impl NextStage {
    pub fn resolve(&self, collected: &CollectedDiscussionData) -> Option<StageListId> {
        match self {
            Self::Fixed(next) => Some(next.clone()),
            Self::Branch {
                key,
                equals,
                then,
                otherwise,
            } => {
                let holds = StageCondition::new(key.clone(), equals.clone()).holds(collected);
                Some(if holds { then.clone() } else { otherwise.clone() })
            }
            Self::End => None,
        }
    }
}

/// One stage in a game's list.
#[derive(Debug, Clone)]
pub struct StageEntry {
    pub id: StageListId,
    pub stage: Stage,
    /// Exit-early predicate installed when the stage is entered.
    pub before_start: Option<StageCondition>,
    pub next: NextStage,
}

impl StageEntry {
    pub fn new(id: impl Into<StageListId>, stage: Stage, next: NextStage) -> Self {
        Self {
            id: id.into(),
            stage,
            before_start: None,
            next,
        }
    }

    pub fn with_before_start(mut self, condition: StageCondition) -> Self {
        self.before_start = Some(condition);
        self
    }

    /// Position of the stage's first step.
    pub fn start(&self) -> Option<StagePosition> {
        first_step_id(&self.stage).map(|step_id| StagePosition {
            stage_id: self.id.clone(),
            step_id,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct StageList {
    entries: Vec<StageEntry>,
}

impl StageList {
    pub fn new(entries: Vec<StageEntry>) -> Self {
        Self { entries }
    }

    pub fn first(&self) -> Option<&StageEntry> {
        self.entries.first()
    }

    pub fn get(&self, id: &StageListId) -> Option<&StageEntry> {
        self.entries.iter().find(|entry| &entry.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Game-specific wiring around the shared discussion engine.
pub trait StageAdvancer: Send + Sync {
    fn game_id(&self) -> &'static str;

    /// Assemble this game's stage list from the authored discussion stages.
    fn stage_list(&self, authored: &[Stage]) -> Result<StageList, GameStateError>;

    /// Keys that, once true, later writes never clear.
    fn persist_truth_keys(&self) -> &'static [&'static str] {
        &[]
    }

    /// State writes implied by a free-text player message.
    fn keyword_writes(&self, _message: &str) -> Vec<GameStateEntry> {
        Vec::new()
    }
}

/// Find an authored discussion stage by its client id.
pub fn authored_stage(authored: &[Stage], client_id: &str) -> Result<Stage, GameStateError> {
    authored
        .iter()
        .find(|stage| stage.client_id.as_str() == client_id)
        .cloned()
        .ok_or_else(|| GameStateError::MissingStage(client_id.to_string()))
}
