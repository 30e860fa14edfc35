//! External service port traits (room sync, prompt execution).

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use arcade_domain::{ChatMessage, PromptOutputType, Room, RoomStatePatch, Stage};

use super::error::{PromptError, RoomSyncError};

// =============================================================================
// Prompt Types
// =============================================================================

/// Role of a prompt message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PromptRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptMessage {
    pub prompt_text: String,
    pub prompt_role: PromptRole,
}

impl PromptMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            prompt_text: text.into(),
            prompt_role: PromptRole::User,
        }
    }
}

/// A single text-generation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericLlmRequest {
    /// Sent in order after the system role.
    pub prompts: Vec<PromptMessage>,
    pub output_data_type: PromptOutputType,
    /// Output instructions, including the JSON schema description for JSON
    /// output.
    pub response_format: String,
    /// Empty means the service default.
    pub system_role: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptResponse {
    pub content: String,
}

/// Prompt-execution service.
///
/// Implementations must return [`PromptError::Cancelled`] promptly once the
/// token is cancelled.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PromptPort: Send + Sync {
    async fn execute(
        &self,
        request: GenericLlmRequest,
        cancel: CancellationToken,
    ) -> Result<PromptResponse, PromptError>;
}

// =============================================================================
// Room Sync
// =============================================================================

/// The room API, bound to one room.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoomSyncPort: Send + Sync {
    async fn fetch_room(&self) -> Result<Room, RoomSyncError>;

    /// Persist a partial update. The result is reconciled on the next poll.
    async fn update_room_game_data(&self, patch: RoomStatePatch) -> Result<(), RoomSyncError>;

    async fn send_message(&self, message: ChatMessage) -> Result<(), RoomSyncError>;

    async fn fetch_discussion_stages(&self) -> Result<Vec<Stage>, RoomSyncError>;
}
