//! Error types for port operations.

/// Prompt-service failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PromptError {
    #[error("Prompt request failed: {0}")]
    RequestFailed(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Prompt request cancelled")]
    Cancelled,
}

/// Room API failures, with the operation for tracing.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RoomSyncError {
    #[error("Room request failed in {operation}: {message}")]
    Request {
        operation: &'static str,
        message: String,
    },

    /// The API answered but the payload did not have the expected shape.
    #[error("Unexpected room payload in {operation}: {message}")]
    Payload {
        operation: &'static str,
        message: String,
    },

    #[error("Room not found: {0}")]
    RoomNotFound(String),
}

impl RoomSyncError {
    pub fn request(operation: &'static str, message: impl ToString) -> Self {
        Self::Request {
            operation,
            message: message.to_string(),
        }
    }

    pub fn payload(operation: &'static str, message: impl ToString) -> Self {
        Self::Payload {
            operation,
            message: message.to_string(),
        }
    }
}
