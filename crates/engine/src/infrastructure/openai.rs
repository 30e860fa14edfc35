//! Prompt client for OpenAI-compatible chat completion APIs

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use arcade_domain::PromptOutputType;

use crate::infrastructure::ports::{
    GenericLlmRequest, PromptError, PromptPort, PromptResponse, PromptRole,
};

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint
#[derive(Clone)]
pub struct OpenAiPromptClient {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

/// Default prompt service base URL.
pub const DEFAULT_PROMPT_BASE_URL: &str = "http://localhost:11434";

/// Default model.
pub const DEFAULT_PROMPT_MODEL: &str = "gpt-4o-mini";

/// Prompts can be slow.
pub const DEFAULT_PROMPT_TIMEOUT_SECS: u64 = 120;

impl OpenAiPromptClient {
    pub fn new(base_url: &str, model: &str, api_key: Option<String>) -> Self {
        Self::with_timeout(base_url, model, api_key, DEFAULT_PROMPT_TIMEOUT_SECS)
    }

    pub fn with_timeout(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout_secs: u64,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        }
    }

    async fn send(&self, request: &GenericLlmRequest) -> Result<PromptResponse, PromptError> {
        let api_request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: build_messages(request),
            response_format: (request.output_data_type == PromptOutputType::Json).then(|| {
                ResponseFormat {
                    r#type: "json_object".to_string(),
                }
            }),
        };

        let mut builder = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&api_request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| PromptError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .map_err(|e| PromptError::RequestFailed(e.to_string()))?;
            return Err(PromptError::RequestFailed(format!("{status}: {error_text}")));
        }

        let api_response: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| PromptError::InvalidResponse(e.to_string()))?;

        convert_response(api_response)
    }
}

impl Default for OpenAiPromptClient {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_BASE_URL, DEFAULT_PROMPT_MODEL, None)
    }
}

#[async_trait]
impl PromptPort for OpenAiPromptClient {
    async fn execute(
        &self,
        request: GenericLlmRequest,
        cancel: CancellationToken,
    ) -> Result<PromptResponse, PromptError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PromptError::Cancelled),
            result = self.send(&request) => result,
        }
    }
}

/// System role first, then the response format as a second system message,
/// then the prompts in order.
fn build_messages(request: &GenericLlmRequest) -> Vec<ApiMessage> {
    let mut messages = Vec::new();

    if !request.system_role.trim().is_empty() {
        messages.push(ApiMessage::new("system", &request.system_role));
    }
    if !request.response_format.trim().is_empty() {
        messages.push(ApiMessage::new("system", &request.response_format));
    }

    for prompt in &request.prompts {
        let role = match prompt.prompt_role {
            PromptRole::System => "system",
            PromptRole::User => "user",
            PromptRole::Assistant => "assistant",
        };
        messages.push(ApiMessage::new(role, &prompt.prompt_text));
    }

    messages
}

fn convert_response(response: ChatCompletionResponse) -> Result<PromptResponse, PromptError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| PromptError::InvalidResponse("No choices in prompt response".to_string()))?;

    let content = choice.message.content.unwrap_or_default();
    if content.trim().is_empty() {
        return Err(PromptError::InvalidResponse(
            "Prompt response was empty".to_string(),
        ));
    }
    Ok(PromptResponse { content })
}

// =============================================================================
// OpenAI API types
// =============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

impl ApiMessage {
    fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize, Default)]
struct ApiChoice {
    message: ApiMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::ports::PromptMessage;

    fn request(output: PromptOutputType) -> GenericLlmRequest {
        GenericLlmRequest {
            prompts: vec![
                PromptMessage::user("Current state of chat log between user and system: SYSTEM: hi\n"),
                PromptMessage::user("Does the student understand?"),
            ],
            output_data_type: output,
            response_format: "Respond in JSON.".to_string(),
            system_role: "You are a math tutor.".to_string(),
        }
    }

    #[test]
    fn messages_put_system_role_and_format_first() {
        let messages = build_messages(&request(PromptOutputType::Json));
        let roles: Vec<&str> = messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "system", "user", "user"]);
        assert_eq!(messages[0].content.as_deref(), Some("You are a math tutor."));
        assert_eq!(messages[3].content.as_deref(), Some("Does the student understand?"));
    }

    #[test]
    fn blank_system_role_is_omitted() {
        let mut req = request(PromptOutputType::Text);
        req.system_role = "  ".to_string();
        req.response_format = String::new();
        let messages = build_messages(&req);
        assert!(messages.iter().all(|m| m.role == "user"));
    }

    #[test]
    fn empty_choice_list_is_invalid() {
        let err = convert_response(ChatCompletionResponse { choices: vec![] }).unwrap_err();
        assert!(matches!(err, PromptError::InvalidResponse(_)));
    }

    #[test]
    fn parses_completion_payload() {
        let payload: ChatCompletionResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"understands_algorithm\": \"true\"}"}}]
        }))
        .unwrap();
        let response = convert_response(payload).unwrap();
        assert!(response.content.contains("understands_algorithm"));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let client = OpenAiPromptClient::with_timeout("http://127.0.0.1:9", "m", None, 1);
        let token = CancellationToken::new();
        token.cancel();
        let result = client.execute(request(PromptOutputType::Text), token).await;
        assert_eq!(result, Err(PromptError::Cancelled));
    }
}
