//! Engine configuration read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use arcade_domain::{PlayerId, RoomId};

use super::openai::{DEFAULT_PROMPT_BASE_URL, DEFAULT_PROMPT_MODEL, DEFAULT_PROMPT_TIMEOUT_SECS};
use crate::use_cases::game_state::MAX_PROMPT_ATTEMPTS;

const DEFAULT_ROOM_API_URL: &str = "http://localhost:4000/graphql";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const DEFAULT_POLL_BACKOFF_MS: u64 = 5000;
const DEFAULT_PROMPT_MAX_RETRIES: u32 = 0;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub room_api_url: String,
    pub room_id: RoomId,
    pub player_id: PlayerId,
    pub player_name: String,
    /// Falls back to the room's own `gameId` when unset.
    pub game_id: Option<String>,
    pub poll_interval: Duration,
    pub poll_backoff: Duration,
    pub prompt_api_url: String,
    pub prompt_model: String,
    pub prompt_api_key: Option<String>,
    pub prompt_timeout_secs: u64,
    /// Transport retries inside each of the handler's prompt attempts. The
    /// two multiply, see [`EngineConfig::prompt_call_budget`].
    pub prompt_max_retries: u32,
    /// Authored stages from a file instead of the room API.
    pub stages_path: Option<PathBuf>,
}

impl EngineConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).with_context(|| format!("{key} must be set"));

        let player_id = PlayerId::new(required("PLAYER_ID")?);
        let player_name = get("PLAYER_NAME").unwrap_or_else(|| player_id.to_string());

        Ok(Self {
            room_api_url: get("ROOM_API_URL").unwrap_or_else(|| DEFAULT_ROOM_API_URL.into()),
            room_id: RoomId::new(required("ROOM_ID")?),
            player_id,
            player_name,
            game_id: get("GAME_ID"),
            poll_interval: Duration::from_millis(parse_or(
                get("ROOM_POLL_INTERVAL_MS"),
                "ROOM_POLL_INTERVAL_MS",
                DEFAULT_POLL_INTERVAL_MS,
            )?),
            poll_backoff: Duration::from_millis(parse_or(
                get("ROOM_POLL_BACKOFF_MS"),
                "ROOM_POLL_BACKOFF_MS",
                DEFAULT_POLL_BACKOFF_MS,
            )?),
            prompt_api_url: get("PROMPT_API_URL").unwrap_or_else(|| DEFAULT_PROMPT_BASE_URL.into()),
            prompt_model: get("PROMPT_MODEL").unwrap_or_else(|| DEFAULT_PROMPT_MODEL.into()),
            prompt_api_key: get("PROMPT_API_KEY"),
            prompt_timeout_secs: parse_or(
                get("PROMPT_TIMEOUT_SECS"),
                "PROMPT_TIMEOUT_SECS",
                DEFAULT_PROMPT_TIMEOUT_SECS,
            )?,
            prompt_max_retries: parse_or(
                get("PROMPT_MAX_RETRIES"),
                "PROMPT_MAX_RETRIES",
                DEFAULT_PROMPT_MAX_RETRIES,
            )?,
            stages_path: get("STAGES_PATH").map(PathBuf::from),
        })
    }

    /// Most prompt service calls one PROMPT step can make before the
    /// failure message is sent.
    pub fn prompt_call_budget(&self) -> u32 {
        MAX_PROMPT_ATTEMPTS.saturating_mul(self.prompt_max_retries.saturating_add(1))
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match raw {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("{key} is not a valid number: {value}")),
        None => Ok(default),
    }
}
