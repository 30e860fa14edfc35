use arcade_domain::{
    chat_log_to_string, render_template, schema_prompt, ChatMessage, CollectedDiscussionData,
    PromptOutputType, PromptStep,
};

use crate::infrastructure::ports::{GenericLlmRequest, PromptMessage};

pub const CHAT_LOG_CONTEXT_PREFIX: &str = "Current state of chat log between user and system: ";

/// Assemble the request for a PROMPT step from the current read view.
pub fn build_prompt_request(
    step: &PromptStep,
    view: &CollectedDiscussionData,
    chat: &[ChatMessage],
) -> GenericLlmRequest {
    let mut prompts = Vec::new();
    if step.include_chat_log_context {
        prompts.push(PromptMessage::user(format!(
            "{CHAT_LOG_CONTEXT_PREFIX}{}",
            chat_log_to_string(chat)
        )));
    }
    prompts.push(PromptMessage::user(render_template(&step.prompt_text, view)));

    let mut response_format = render_template(&step.response_format, view);
    if step.output_data_type == PromptOutputType::Json {
        if !response_format.is_empty() {
            response_format.push('\n');
        }
        response_format.push_str(&schema_prompt(&step.json_response_data, view));
    }

    GenericLlmRequest {
        prompts,
        output_data_type: step.output_data_type,
        response_format,
        system_role: render_template(&step.custom_system_role, view),
    }
}
