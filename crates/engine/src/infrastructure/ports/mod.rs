//! Port traits for infrastructure boundaries.
//!
//! These are the ONLY abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - The room API (could swap GraphQL polling -> websocket push)
//! - Prompt execution (could swap the OpenAI-compatible endpoint for another service)

mod error;
mod external;

// =============================================================================
// External Service Ports
// =============================================================================
pub use external::{
    GenericLlmRequest, PromptMessage, PromptPort, PromptResponse, PromptRole, RoomSyncPort,
};

// =============================================================================
// Test-Only Mocks (only available during test builds)
// =============================================================================
#[cfg(test)]
pub use external::{MockPromptPort, MockRoomSyncPort};

// =============================================================================
// Error Types
// =============================================================================
pub use error::{PromptError, RoomSyncError};
