//! Infrastructure implementations.
//!
//! Contains port trait implementations for external dependencies.

pub mod config;
pub mod openai;
pub mod ports;
pub mod resilient_prompt;
pub mod room_sync;
pub mod stage_file;
