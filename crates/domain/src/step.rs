//! Authored discussion steps.

use serde::{Deserialize, Serialize};

use crate::conditional::StepConditional;
use crate::ids::StepId;
use crate::json_response::JsonResponseField;
use crate::state::GameStatePhase;
use crate::wire;

/// One node of a stage's step graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscussionStep {
    pub step_id: StepId,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub last_step: bool,
    #[serde(
        default,
        deserialize_with = "wire::empty_string_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub jump_to_step_id: Option<StepId>,
    #[serde(flatten)]
    pub kind: StepKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stepType", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepKind {
    SystemMessage(SystemMessageStep),
    Prompt(PromptStep),
    RequestUserInput(RequestUserInputStep),
    Conditional(ConditionalStep),
    EndOfPhaseReflection(EndOfPhaseReflectionStep),
}

/// Discriminant of [`StepKind`], handy for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepType {
    SystemMessage,
    Prompt,
    RequestUserInput,
    Conditional,
    EndOfPhaseReflection,
}

impl std::fmt::Display for StepType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::SystemMessage => "SYSTEM_MESSAGE",
            Self::Prompt => "PROMPT",
            Self::RequestUserInput => "REQUEST_USER_INPUT",
            Self::Conditional => "CONDITIONAL",
            Self::EndOfPhaseReflection => "END_OF_PHASE_REFLECTION",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMessageStep {
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromptOutputType {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptStep {
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub prompt_text: String,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub response_format: String,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub include_chat_log_context: bool,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub output_data_type: PromptOutputType,
    /// Expected fields when `output_data_type` is JSON.
    #[serde(
        default,
        deserialize_with = "wire::json_or_stringified",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub json_response_data: Vec<JsonResponseField>,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub custom_system_role: String,
}

/// How many players must answer a REQUEST_USER_INPUT step, and in what order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequireInputType {
    #[default]
    SingleResponseRequired,
    AllUserResponsesRequiredFreeForAll,
    AllRequiredInOrder,
}

impl From<RequireInputType> for GameStatePhase {
    fn from(value: RequireInputType) -> Self {
        match value {
            RequireInputType::SingleResponseRequired => Self::SingleResponseRequired,
            RequireInputType::AllUserResponsesRequiredFreeForAll => {
                Self::AllUserResponsesRequiredFreeForAll
            }
            RequireInputType::AllRequiredInOrder => Self::AllRequiredInOrder,
        }
    }
}

/// How player text is compared against predefined responses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResponseMatching {
    /// Byte-for-byte equality.
    #[default]
    Exact,
    /// Trimmed, case-insensitive equality.
    Normalized,
}

impl ResponseMatching {
    pub fn matches(self, candidate: &str, message: &str) -> bool {
        match self {
            Self::Exact => candidate == message,
            Self::Normalized => candidate.trim().to_lowercase() == message.trim().to_lowercase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredefinedResponse {
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub client_id: String,
    pub message: String,
    /// `message` is a comma separated list of choices.
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub is_array: bool,
    #[serde(
        default,
        deserialize_with = "wire::empty_string_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub jump_to_step_id: Option<StepId>,
    #[serde(
        default,
        deserialize_with = "wire::string_or_number",
        skip_serializing_if = "Option::is_none"
    )]
    pub response_weight: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestUserInputStep {
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub save_response_variable_name: String,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub disable_free_input: bool,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub predefined_responses: Vec<PredefinedResponse>,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub require_input_type: RequireInputType,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub response_matching: ResponseMatching,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalStep {
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub conditionals: Vec<StepConditional>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndOfPhaseReflectionStep {
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub phase_title: String,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub message: String,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub questions: Vec<String>,
}

impl DiscussionStep {
    pub fn new(step_id: impl Into<StepId>, kind: StepKind) -> Self {
        Self {
            step_id: step_id.into(),
            last_step: false,
            jump_to_step_id: None,
            kind,
        }
    }

    pub fn with_last_step(mut self) -> Self {
        self.last_step = true;
        self
    }

    pub fn with_jump_to(mut self, target: impl Into<StepId>) -> Self {
        self.jump_to_step_id = Some(target.into());
        self
    }

    pub fn step_type(&self) -> StepType {
        self.kind.step_type()
    }

    /// Steps that wait on players count as input for loop detection.
    pub fn collects_input(&self) -> bool {
        matches!(
            self.kind,
            StepKind::RequestUserInput(_) | StepKind::EndOfPhaseReflection(_)
        )
    }

    /// Every step id this step can jump to.
    pub fn jump_targets(&self) -> Vec<&StepId> {
        let mut targets: Vec<&StepId> = self.jump_to_step_id.iter().collect();
        match &self.kind {
            StepKind::RequestUserInput(step) => targets.extend(
                step.predefined_responses
                    .iter()
                    .filter_map(|r| r.jump_to_step_id.as_ref()),
            ),
            StepKind::Conditional(step) => {
                targets.extend(step.conditionals.iter().map(|c| &c.target_step_id))
            }
            _ => {}
        }
        targets
    }
}

// Convenience constructors used by stage builders and tests.
impl StepKind {
    pub fn step_type(&self) -> StepType {
        match self {
            Self::SystemMessage(_) => StepType::SystemMessage,
            Self::Prompt(_) => StepType::Prompt,
            Self::RequestUserInput(_) => StepType::RequestUserInput,
            Self::Conditional(_) => StepType::Conditional,
            Self::EndOfPhaseReflection(_) => StepType::EndOfPhaseReflection,
        }
    }

    pub fn system_message(message: impl Into<String>) -> Self {
        Self::SystemMessage(SystemMessageStep {
            message: message.into(),
        })
    }

    pub fn request_user_input(
        message: impl Into<String>,
        save_response_variable_name: impl Into<String>,
    ) -> Self {
        Self::RequestUserInput(RequestUserInputStep {
            message: message.into(),
            save_response_variable_name: save_response_variable_name.into(),
            disable_free_input: false,
            predefined_responses: Vec::new(),
            require_input_type: RequireInputType::default(),
            response_matching: ResponseMatching::default(),
        })
    }

    pub fn prompt(prompt_text: impl Into<String>) -> Self {
        Self::Prompt(PromptStep {
            prompt_text: prompt_text.into(),
            response_format: String::new(),
            include_chat_log_context: false,
            output_data_type: PromptOutputType::Text,
            json_response_data: Vec::new(),
            custom_system_role: String::new(),
        })
    }

    pub fn conditional(conditionals: Vec<StepConditional>) -> Self {
        Self::Conditional(ConditionalStep { conditionals })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_authored_request_user_input_step() {
        let step: DiscussionStep = serde_json::from_value(json!({
            "stepId": "ask",
            "stepType": "REQUEST_USER_INPUT",
            "lastStep": false,
            "jumpToStepId": "",
            "message": "Pick one",
            "saveResponseVariableName": "pick",
            "disableFreeInput": true,
            "predefinedResponses": [
                {"clientId": "r1", "message": "Yes", "jumpToStepId": "yes-step", "responseWeight": "2"},
                {"clientId": "r2", "message": "No", "responseWeight": 1}
            ],
            "requireInputType": "ALL_REQUIRED_IN_ORDER"
        }))
        .unwrap();

        assert_eq!(step.jump_to_step_id, None);
        assert_eq!(step.step_type(), StepType::RequestUserInput);
        let StepKind::RequestUserInput(input) = &step.kind else {
            panic!("expected request user input");
        };
        assert!(input.disable_free_input);
        assert_eq!(input.require_input_type, RequireInputType::AllRequiredInOrder);
        assert_eq!(input.response_matching, ResponseMatching::Exact);
        assert_eq!(input.predefined_responses[1].response_weight.as_deref(), Some("1"));
        assert_eq!(step.jump_targets(), vec![&StepId::new("yes-step")]);
    }

    #[test]
    fn prompt_accepts_stringified_json_response_data() {
        let step: DiscussionStep = serde_json::from_value(json!({
            "stepId": "p",
            "stepType": "PROMPT",
            "promptText": "Judge it",
            "outputDataType": "JSON",
            "jsonResponseData": "[{\"name\":\"understands_algorithm\",\"type\":\"string\",\"isRequired\":true}]",
            "customSystemRole": null
        }))
        .unwrap();

        let StepKind::Prompt(prompt) = &step.kind else {
            panic!("expected prompt");
        };
        assert_eq!(prompt.output_data_type, PromptOutputType::Json);
        assert_eq!(prompt.json_response_data.len(), 1);
        assert!(prompt.json_response_data[0].is_required);
        assert_eq!(prompt.custom_system_role, "");
    }

    #[test]
    fn serializes_with_step_type_tag() {
        let step = DiscussionStep::new("hello", StepKind::system_message("Welcome")).with_last_step();
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["stepType"], "SYSTEM_MESSAGE");
        assert_eq!(value["message"], "Welcome");
        assert_eq!(value["lastStep"], true);
        assert!(value.get("jumpToStepId").is_none());
    }

    #[test]
    fn normalized_matching_ignores_case_and_padding() {
        assert!(ResponseMatching::Normalized.matches("Yes", "  yes "));
        assert!(!ResponseMatching::Exact.matches("Yes", "yes"));
    }
}
