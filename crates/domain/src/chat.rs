//! Room chat log entries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ids::{MessageId, PlayerId, SessionId};
use crate::player::Player;
use crate::wire;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SenderType {
    Player,
    System,
}

impl fmt::Display for SenderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Player => f.write_str("PLAYER"),
            Self::System => f.write_str("SYSTEM"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageDisplayType {
    #[default]
    Text,
    PendingMessage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender: SenderType,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<PlayerId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_type: Option<MessageDisplayType>,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub disable_user_input: bool,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub mcq_choices: Vec<String>,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub is_prompt_response: bool,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub session_id: SessionId,
}

impl ChatMessage {
    pub fn system(message: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            id: MessageId::generate(),
            sender: SenderType::System,
            message: message.into(),
            sender_id: None,
            sender_name: None,
            display_type: Some(MessageDisplayType::Text),
            disable_user_input: false,
            mcq_choices: Vec::new(),
            is_prompt_response: false,
            session_id,
        }
    }

    pub fn player(sender: &Player, message: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            id: MessageId::generate(),
            sender: SenderType::Player,
            message: message.into(),
            sender_id: Some(sender.client_id.clone()),
            sender_name: Some(sender.name.clone()),
            display_type: Some(MessageDisplayType::Text),
            disable_user_input: false,
            mcq_choices: Vec::new(),
            is_prompt_response: false,
            session_id,
        }
    }

    pub fn is_from_player(&self) -> bool {
        self.sender == SenderType::Player
    }
}

/// Plain-text transcript used as prompt context, one `SENDER: message` line
/// per entry.
pub fn chat_log_to_string(chat: &[ChatMessage]) -> String {
    chat.iter()
        .map(|entry| format!("{}: {}\n", entry.sender, entry.message))
        .collect()
}
