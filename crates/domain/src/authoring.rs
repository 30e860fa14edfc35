//! Typed step edits for authoring tools.
//!
//! An edit names only the fields it changes. The step kind of the edit must
//! match the step it is applied to; changing a step's kind means replacing
//! the step.

use serde::{Deserialize, Serialize};

use crate::conditional::StepConditional;
use crate::error::DomainError;
use crate::ids::StepId;
use crate::stage::Stage;
use crate::step::{
    DiscussionStep, PredefinedResponse, PromptOutputType, RequireInputType, ResponseMatching,
    StepKind, StepType,
};
use crate::wire;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEdit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_step: Option<bool>,
    /// `Some(None)` removes the jump.
    #[serde(
        default,
        deserialize_with = "wire::clearable",
        skip_serializing_if = "Option::is_none"
    )]
    pub jump_to_step_id: Option<Option<StepId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patch: Option<StepPatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "stepType",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum StepPatch {
    SystemMessage {
        message: Option<String>,
    },
    Prompt {
        prompt_text: Option<String>,
        response_format: Option<String>,
        include_chat_log_context: Option<bool>,
        output_data_type: Option<PromptOutputType>,
        custom_system_role: Option<String>,
    },
    RequestUserInput {
        message: Option<String>,
        save_response_variable_name: Option<String>,
        disable_free_input: Option<bool>,
        predefined_responses: Option<Vec<PredefinedResponse>>,
        require_input_type: Option<RequireInputType>,
        response_matching: Option<ResponseMatching>,
    },
    Conditional {
        conditionals: Option<Vec<StepConditional>>,
    },
    EndOfPhaseReflection {
        phase_title: Option<String>,
        message: Option<String>,
        questions: Option<Vec<String>>,
    },
}

fn set<T>(target: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *target = value;
    }
}

impl DiscussionStep {
    pub fn apply_edit(&mut self, edit: StepEdit) -> Result<(), DomainError> {
        if let Some(patch) = edit.patch {
            self.kind.apply_patch(patch, &self.step_id)?;
        }
        set(&mut self.last_step, edit.last_step);
        set(&mut self.jump_to_step_id, edit.jump_to_step_id);
        Ok(())
    }
}

impl StepKind {
    fn apply_patch(&mut self, patch: StepPatch, step_id: &StepId) -> Result<(), DomainError> {
        match (self, patch) {
            (StepKind::SystemMessage(step), StepPatch::SystemMessage { message }) => {
                set(&mut step.message, message);
            }
            (
                StepKind::Prompt(step),
                StepPatch::Prompt {
                    prompt_text,
                    response_format,
                    include_chat_log_context,
                    output_data_type,
                    custom_system_role,
                },
            ) => {
                set(&mut step.prompt_text, prompt_text);
                set(&mut step.response_format, response_format);
                set(&mut step.include_chat_log_context, include_chat_log_context);
                set(&mut step.output_data_type, output_data_type);
                set(&mut step.custom_system_role, custom_system_role);
            }
            (
                StepKind::RequestUserInput(step),
                StepPatch::RequestUserInput {
                    message,
                    save_response_variable_name,
                    disable_free_input,
                    predefined_responses,
                    require_input_type,
                    response_matching,
                },
            ) => {
                set(&mut step.message, message);
                set(&mut step.save_response_variable_name, save_response_variable_name);
                set(&mut step.disable_free_input, disable_free_input);
                set(&mut step.predefined_responses, predefined_responses);
                set(&mut step.require_input_type, require_input_type);
                set(&mut step.response_matching, response_matching);
            }
            (StepKind::Conditional(step), StepPatch::Conditional { conditionals }) => {
                set(&mut step.conditionals, conditionals);
            }
            (
                StepKind::EndOfPhaseReflection(step),
                StepPatch::EndOfPhaseReflection {
                    phase_title,
                    message,
                    questions,
                },
            ) => {
                set(&mut step.phase_title, phase_title);
                set(&mut step.message, message);
                set(&mut step.questions, questions);
            }
            (kind, patch) => {
                return Err(DomainError::invalid_state_transition(format!(
                    "step {step_id} is {}, edit targets {}",
                    kind.step_type(),
                    patch.step_type()
                )));
            }
        }
        Ok(())
    }
}

impl StepPatch {
    pub fn step_type(&self) -> StepType {
        match self {
            Self::SystemMessage { .. } => StepType::SystemMessage,
            Self::Prompt { .. } => StepType::Prompt,
            Self::RequestUserInput { .. } => StepType::RequestUserInput,
            Self::Conditional { .. } => StepType::Conditional,
            Self::EndOfPhaseReflection { .. } => StepType::EndOfPhaseReflection,
        }
    }
}

impl Stage {
    pub fn apply_step_edit(&mut self, step_id: &StepId, edit: StepEdit) -> Result<(), DomainError> {
        let step = self
            .step_mut(step_id)
            .ok_or_else(|| DomainError::not_found("Step", step_id.as_str()))?;
        step.apply_edit(edit)
    }
}
