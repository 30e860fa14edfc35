//! Application composition.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;

use arcade_domain::Player;

use crate::games;
use crate::infrastructure::{
    config::EngineConfig,
    openai::OpenAiPromptClient,
    ports::{PromptPort, RoomSyncPort},
    resilient_prompt::{ResilientPromptClient, RetryConfig},
    room_sync::GraphqlRoomSync,
    stage_file::load_stages,
};
use crate::runner::RoomRunner;
use crate::use_cases::game_state::{GameStateHandler, RoomEvent};

const SESSION_CHANNEL_CAPACITY: usize = 64;

/// A wired-up session: the runner plus a sender for local input.
pub struct App {
    pub runner: RoomRunner,
    pub events: mpsc::Sender<RoomEvent>,
}

impl App {
    /// Connect to the room, load its stages and build the session.
    pub async fn connect(config: &EngineConfig) -> anyhow::Result<Self> {
        let room: Arc<dyn RoomSyncPort> = Arc::new(GraphqlRoomSync::new(
            &config.room_api_url,
            config.room_id.clone(),
        ));

        let retry_config = RetryConfig {
            max_retries: config.prompt_max_retries,
            ..RetryConfig::default()
        };
        tracing::info!(
            url = %config.prompt_api_url,
            model = %config.prompt_model,
            max_retries = retry_config.max_retries,
            call_budget = config.prompt_call_budget(),
            "Prompt client configured"
        );
        let prompt_client = Arc::new(OpenAiPromptClient::with_timeout(
            &config.prompt_api_url,
            &config.prompt_model,
            config.prompt_api_key.clone(),
            config.prompt_timeout_secs,
        ));
        let prompts: Arc<dyn PromptPort> =
            Arc::new(ResilientPromptClient::new(prompt_client, retry_config));

        let snapshot = room
            .fetch_room()
            .await
            .with_context(|| format!("Failed to fetch room {}", config.room_id))?;

        let game_id = config
            .game_id
            .clone()
            .unwrap_or_else(|| snapshot.game_data.game_id.clone());
        let game = games::for_id(&game_id).with_context(|| format!("Unknown game: {game_id}"))?;

        let authored = match &config.stages_path {
            Some(path) => load_stages(path)?,
            None => room.fetch_discussion_stages().await?,
        };
        let stages = game.stage_list(&authored)?;
        tracing::info!(game = game.game_id(), stages = stages.len(), "Stage list built");

        let local_player = snapshot
            .game_data
            .players
            .iter()
            .find(|p| p.client_id == config.player_id)
            .cloned()
            .unwrap_or_else(|| Player::new(config.player_id.clone(), config.player_name.clone()));

        let (events_tx, events_rx) = mpsc::channel(SESSION_CHANNEL_CAPACITY);
        let handler = GameStateHandler::new(
            room.clone(),
            prompts,
            game,
            stages,
            local_player,
            snapshot.game_data.clone(),
            events_tx.clone(),
        );
        let runner = RoomRunner::new(
            handler,
            room,
            events_rx,
            snapshot.game_data,
            config.poll_interval,
            config.poll_backoff,
        );

        Ok(Self {
            runner,
            events: events_tx,
        })
    }
}
