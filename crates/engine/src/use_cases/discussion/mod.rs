//! Discussion step interpreter.
//!
//! Executes one authored step at a time against the synchronized room state
//! and reports what should happen next. The interpreter performs no I/O: side
//! effects come back as [`StepEffect`]s and the next move as a
//! [`StepOutcome`], which the game state handler applies.

mod interpreter;
mod prompt;

#[cfg(test)]
mod tests;

use arcade_domain::{
    CollectedDiscussionData, ConditionError, CurGameState, GameData, GameStateEntry,
    JsonOutputError, PlayerId, Stage, StageId, StepId, StepType,
};

use crate::infrastructure::ports::GenericLlmRequest;

pub use interpreter::DiscussionInterpreter;
pub use prompt::{build_prompt_request, CHAT_LOG_CONTEXT_PREFIX};

/// Player-state key a player sets to submit an end-of-phase reflection.
pub fn reflection_key(step_id: &StepId) -> String {
    format!("phaseReflection:{step_id}")
}

/// Player-state key a player sets once ready to leave a reflection step.
pub fn ready_key(step_id: &StepId) -> String {
    format!("readyToContinue:{step_id}")
}

/// `key == equals` over collected data, compared in rendered text form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageCondition {
    pub key: String,
    pub equals: String,
}

impl StageCondition {
    pub fn new(key: impl Into<String>, equals: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            equals: equals.into(),
        }
    }

    pub fn holds(&self, data: &CollectedDiscussionData) -> bool {
        data.get(&self.key)
            .is_some_and(|value| value.render() == self.equals)
    }
}

/// Everything a step reads.
pub struct StepContext<'a> {
    pub stage: &'a Stage,
    pub game_data: &'a GameData,
    /// Player whose state layers into the read view and receives prompt
    /// output (the room owner running the interpreter).
    pub player: &'a PlayerId,
}

impl StepContext<'_> {
    /// Global state, then this player's state, then collected data.
    pub fn view(&self, collected: &CollectedDiscussionData) -> CollectedDiscussionData {
        let player_entries = self
            .game_data
            .player_state(self.player)
            .map(|p| p.game_state_data.as_slice())
            .unwrap_or_default();
        CollectedDiscussionData::layered(
            &self.game_data.global_state_data.game_state_data,
            player_entries,
            collected,
        )
    }
}

/// How a step is being entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepEntry {
    /// Normal advance. Subject to loop detection.
    Fresh,
    /// Re-entering the current step after a rejoin or a retry. The prompt
    /// for input steps is already in the chat and is not repeated.
    Resume,
}

/// A SYSTEM chat message to send.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutgoingMessage {
    pub message: String,
    pub disable_user_input: bool,
    pub mcq_choices: Vec<String>,
    pub is_prompt_response: bool,
}

impl OutgoingMessage {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepEffect {
    SystemMessage(OutgoingMessage),
    PlayerState {
        player: PlayerId,
        entries: Vec<GameStateEntry>,
    },
    /// Replace (`Some`) or clear (`None`) `curGameState`.
    GameState(Option<CurGameState>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Advance(StepId),
    AwaitInput,
    AwaitPrompt(GenericLlmRequest),
    /// A last step resolved (or the exit-early condition held). Carries the
    /// collected data, which the interpreter has already reset.
    Finished(CollectedDiscussionData),
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub effects: Vec<StepEffect>,
    pub outcome: StepOutcome,
}

impl StepReport {
    fn new(effects: Vec<StepEffect>, outcome: StepOutcome) -> Self {
        Self { effects, outcome }
    }
}

/// Errors raised while walking a stage. Except for
/// [`DiscussionError::InvalidPromptOutput`], these are authoring defects and
/// halt the session. The display text is what players see in the chat.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DiscussionError {
    #[error("Unable to find step {step} in stage {stage}")]
    StepNotFound { stage: StageId, step: StepId },

    #[error("Unable to find target step {target}, maybe you deleted it and forgot to update this step?")]
    MissingJumpTarget { from: StepId, target: StepId },

    #[error("Unable to find target step {target} for predefined input {response}, maybe you deleted it and forgot to update this step?")]
    MissingResponseTarget { target: StepId, response: String },

    #[error("No next step found, maybe you forgot to add a jumpToStepId for the last step in a flow?")]
    NoNextStep { step: StepId },

    #[error("Oops! A loop was detected in this activity, we are halting the activity to prevent an infinite loop. Please contact the activity creator to fix this issue.")]
    StepLoopDetected { step: StepId },

    #[error("No built activity data found for stage {stage}")]
    EmptyStage { stage: StageId },

    #[error("An error occured during this activity. Could not find state value {key}.")]
    MissingStateValue { key: String },

    #[error("An error occured during this activity. {0}")]
    Condition(ConditionError),

    #[error("{0}")]
    InvalidPromptOutput(JsonOutputError),

    #[error("Step {step} is {actual}, expected {expected}")]
    WrongStepType {
        step: StepId,
        expected: StepType,
        actual: StepType,
    },
}

impl DiscussionError {
    /// Only bad prompt output is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::InvalidPromptOutput(_))
    }
}

impl From<ConditionError> for DiscussionError {
    fn from(error: ConditionError) -> Self {
        match error {
            ConditionError::MissingKey(key) => Self::MissingStateValue { key },
            other => Self::Condition(other),
        }
    }
}
