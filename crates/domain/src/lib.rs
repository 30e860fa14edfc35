extern crate self as arcade_domain;

pub mod authoring;
pub mod chat;
pub mod conditional;
pub mod error;
pub mod ids;
pub mod json_response;
pub mod patch;
pub mod player;
pub mod stage;
pub mod state;
pub mod step;
pub mod template;
pub mod value;
pub mod wire;

pub use error::DomainError;

// Re-export the step graph model
pub use authoring::{StepEdit, StepPatch};
pub use conditional::{Checking, ConditionError, Operation, StepConditional};
pub use stage::{first_step_id, Flow, Stage, StageDefect, StageType};
pub use step::{
    ConditionalStep, DiscussionStep, EndOfPhaseReflectionStep, PredefinedResponse,
    PromptOutputType, PromptStep, RequestUserInputStep, RequireInputType, ResponseMatching,
    StepKind, StepType, SystemMessageStep,
};

// Re-export room state
pub use chat::{chat_log_to_string, ChatMessage, MessageDisplayType, SenderType};
pub use patch::{GlobalStatePatch, PlayerStatePatch, RoomStatePatch};
pub use player::Player;
pub use state::{
    merge_entries, CurGameState, GameData, GameStateEntry, GameStatePhase, GlobalStateData,
    PlayerStateData, Room, StagePosition,
};
pub use value::{CollectedDiscussionData, StateValue};

// Re-export prompt helpers
pub use json_response::{
    schema_prompt, validate_response, JsonFieldType, JsonOutputError, JsonResponseField,
};
pub use template::{placeholder_keys, render_template};

// Re-export ID types
pub use ids::{FlowId, MessageId, PlayerId, RoomId, SessionId, StageId, StageListId, StepId};
