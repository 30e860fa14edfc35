//! Game state handler.
//!
//! Owns one client's view of a room and drives the discussion interpreter:
//! room events come in, interpreter reports go out as chat messages and room
//! state patches. Only the room owner advances play; every other client keeps
//! its mirror current and forwards local player actions.
//!
//! Writes are applied to the local mirror with the same merge the room API
//! uses, then sent. Prompt calls run on spawned tasks and report back through
//! the session channel as [`RoomEvent::PromptSettled`].

mod events;


use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use arcade_domain::{
    ChatMessage, CollectedDiscussionData, GameData, GameStateEntry, GlobalStatePatch,
    GlobalStateData, MessageId, Player, PlayerStateData, RoomStatePatch, SessionId, StageListId,
    StagePosition, StepId,
};

use crate::games::{StageAdvancer, StageList};
use crate::infrastructure::ports::{
    GenericLlmRequest, PromptError, PromptPort, PromptResponse, RoomSyncError, RoomSyncPort,
};
use crate::use_cases::discussion::{
    ready_key, reflection_key, DiscussionError, DiscussionInterpreter, OutgoingMessage,
    StepContext, StepEffect, StepEntry, StepOutcome, StepReport,
};

pub use events::{simulation_viewed_key, GameStart, RoomEvent, SessionPhase};

/// Attempts per prompt step before the failure is surfaced.
pub const MAX_PROMPT_ATTEMPTS: u32 = 3;

pub const PROMPT_FAILED_MESSAGE: &str = "AI Service request failed";

#[derive(Debug, thiserror::Error)]
pub enum GameStateError {
    #[error(transparent)]
    Discussion(#[from] DiscussionError),
    #[error("missing stage: {0}")]
    MissingStage(String),
    #[error("Stage {0} is not in this game's stage list")]
    UnknownStage(StageListId),
    #[error("Game has no stages")]
    NoStages,
    #[error("Room sync error: {0}")]
    RoomSync(#[from] RoomSyncError),
}

struct PendingPrompt {
    position: StagePosition,
    attempt: u32,
    request: GenericLlmRequest,
    cancel: CancellationToken,
}

pub struct GameStateHandler {
    room: Arc<dyn RoomSyncPort>,
    prompts: Arc<dyn PromptPort>,
    game: Arc<dyn StageAdvancer>,
    stages: StageList,
    persist_truth: Vec<String>,
    events: mpsc::Sender<RoomEvent>,
    local_player: Player,
    session_id: SessionId,
    data: GameData,
    acknowledged: HashSet<MessageId>,
    interpreter: DiscussionInterpreter,
    phase: SessionPhase,
    pending_prompt: Option<PendingPrompt>,
    error_message: Option<String>,
    last_failed_step_id: Option<StepId>,
}

impl GameStateHandler {
    pub fn new(
        room: Arc<dyn RoomSyncPort>,
        prompts: Arc<dyn PromptPort>,
        game: Arc<dyn StageAdvancer>,
        stages: StageList,
        local_player: Player,
        initial: GameData,
        events: mpsc::Sender<RoomEvent>,
    ) -> Self {
        let persist_truth = game
            .persist_truth_keys()
            .iter()
            .map(|key| key.to_string())
            .collect();

        Self {
            room,
            prompts,
            game,
            stages,
            persist_truth,
            events,
            local_player,
            session_id: SessionId::generate(),
            data: initial,
            acknowledged: HashSet::new(),
            interpreter: DiscussionInterpreter::new(),
            phase: SessionPhase::Uninitialized,
            pending_prompt: None,
            error_message: None,
            last_failed_step_id: None,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn players(&self) -> &[Player] {
        &self.data.players
    }

    pub fn chat_log(&self) -> &[ChatMessage] {
        &self.data.chat
    }

    pub fn global_state(&self) -> &GlobalStateData {
        &self.data.global_state_data
    }

    pub fn player_state(&self) -> &[PlayerStateData] {
        &self.data.player_state_data
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn last_failed_step_id(&self) -> Option<&StepId> {
        self.last_failed_step_id.as_ref()
    }

    /// True while a prompt call is outstanding.
    pub fn response_pending(&self) -> bool {
        self.pending_prompt.is_some()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn collected(&self) -> &CollectedDiscussionData {
        self.interpreter.collected()
    }

    pub fn local_player(&self) -> &Player {
        &self.local_player
    }

    pub fn is_owner(&self) -> bool {
        self.data
            .global_state_data
            .is_owned_by(&self.local_player.client_id)
    }

    // =========================================================================
    // Operations
    // =========================================================================

    pub async fn handle_event(&mut self, event: RoomEvent) -> Result<(), GameStateError> {
        match event {
            RoomEvent::ChatLog(log) => self.new_chat_log_received(log).await.map(|_| ()),
            RoomEvent::GlobalState(global) => self.global_state_updated(global).await,
            RoomEvent::PlayerState(states) => self.player_state_updated(states).await,
            RoomEvent::Players(players) => self.players_updated(players).await,
            RoomEvent::SimulationEnded => self.simulation_ended().await,
            RoomEvent::PromptSettled {
                position,
                attempt,
                result,
            } => self.prompt_settled(position, attempt, result).await,
            RoomEvent::RetryRequested => self.retry_failed_step().await,
            RoomEvent::LocalChat(text) => self.send_player_message(&text).await,
            RoomEvent::SubmitReflection(text) => self.submit_reflection(&text).await,
            RoomEvent::ReadyToContinue => self.ready_to_continue().await,
        }
    }

    /// Join the room: resume from a stored position, or (as owner) start the
    /// first stage. Chat already in the log is treated as handled.
    pub async fn initialize_game(&mut self) -> Result<GameStart, GameStateError> {
        self.acknowledged = self.data.chat.iter().map(|m| m.id.clone()).collect();

        if let Some(position) = self.data.global_state_data.position() {
            let entry = self
                .stages
                .get(&position.stage_id)
                .ok_or_else(|| GameStateError::UnknownStage(position.stage_id.clone()))?;
            let before_start = entry.before_start.clone();
            let discussion = entry.stage.is_discussion();

            self.interpreter.restore(self.stored_collected(), before_start);
            self.phase = phase_for(discussion);
            tracing::info!(
                stage = %position.stage_id,
                step_id = %position.step_id,
                owner = self.is_owner(),
                "Resuming game in progress"
            );

            if self.is_owner() {
                if discussion {
                    self.run_from(position.clone(), StepEntry::Resume).await?;
                } else {
                    self.check_simulation_viewed().await?;
                }
            }
            return Ok(GameStart::Resumed(position));
        }

        if !self.is_owner() {
            tracing::info!(player = %self.local_player.client_id, "Waiting for the room owner to start");
            self.phase = SessionPhase::AwaitingFirstStage;
            return Ok(GameStart::AwaitingOwner);
        }

        let first = self.stages.first().ok_or(GameStateError::NoStages)?.id.clone();
        let start = self.enter_stage(&first).await?;
        let position = start
            .clone()
            .or_else(|| self.data.global_state_data.position())
            .ok_or(GameStateError::NoStages)?;
        if let Some(start) = start {
            self.run_from(start, StepEntry::Fresh).await?;
        }
        Ok(GameStart::Started(position))
    }

    pub async fn global_state_updated(&mut self, global: GlobalStateData) -> Result<(), GameStateError> {
        let previous = self.data.global_state_data.position();
        self.data.global_state_data = global;
        let current = self.data.global_state_data.position();
        if current == previous {
            return Ok(());
        }
        let Some(position) = current else {
            return Ok(());
        };

        if self
            .pending_prompt
            .as_ref()
            .is_some_and(|pending| pending.position != position)
        {
            self.cancel_prompt();
        }

        let entry = self
            .stages
            .get(&position.stage_id)
            .ok_or_else(|| GameStateError::UnknownStage(position.stage_id.clone()))?;
        let before_start = entry.before_start.clone();
        let discussion = entry.stage.is_discussion();

        tracing::info!(
            stage = %position.stage_id,
            step_id = %position.step_id,
            "Room moved to a new position"
        );
        self.interpreter.restore(self.stored_collected(), before_start);
        self.phase = phase_for(discussion);

        if !self.is_owner() {
            return Ok(());
        }
        if discussion {
            self.run_from(position, StepEntry::Fresh).await
        } else {
            self.check_simulation_viewed().await
        }
    }

    /// Process PLAYER messages not seen before, in log order. Returns how
    /// many reached the interpreter.
    pub async fn new_chat_log_received(&mut self, log: Vec<ChatMessage>) -> Result<usize, GameStateError> {
        self.data.chat = log;
        let unseen: Vec<ChatMessage> = self
            .data
            .chat
            .iter()
            .filter(|m| !self.acknowledged.contains(&m.id))
            .cloned()
            .collect();

        let mut handled = 0;
        for message in unseen {
            self.acknowledged.insert(message.id.clone());
            if !message.is_from_player() {
                continue;
            }
            if !self.is_owner() || self.phase != SessionPhase::InDiscussion {
                tracing::debug!(message_id = %message.id, phase = ?self.phase, "Not handling player message");
                continue;
            }
            let (Some(position), Some(sender)) =
                (self.data.global_state_data.position(), message.sender_id.clone())
            else {
                continue;
            };

            let report = self.with_step_context(&position.stage_id, |interpreter, ctx| {
                interpreter.handle_player_message(ctx, &position.step_id, &sender, &message.message)
            })?;
            match report {
                Ok(None) => {}
                Ok(Some(report)) => {
                    handled += 1;
                    self.settle(position, Ok(report)).await?;
                }
                Err(error) => {
                    handled += 1;
                    self.settle(position, Err(error)).await?;
                }
            }
        }
        Ok(handled)
    }

    pub async fn player_state_updated(&mut self, states: Vec<PlayerStateData>) -> Result<(), GameStateError> {
        self.data.player_state_data = states;
        self.react_to_player_state().await
    }

    pub async fn players_updated(&mut self, players: Vec<Player>) -> Result<(), GameStateError> {
        if players == self.data.players {
            return Ok(());
        }
        self.data.players = players;
        if !self.is_owner() || self.phase != SessionPhase::InDiscussion {
            return Ok(());
        }
        let Some(position) = self.data.global_state_data.position() else {
            return Ok(());
        };

        let report = self.with_step_context(&position.stage_id, |interpreter, ctx| {
            interpreter.handle_players_changed(ctx, &position.step_id)
        })?;
        self.settle_optional(position, report).await
    }

    /// Record that the local player watched the simulation.
    pub async fn simulation_ended(&mut self) -> Result<(), GameStateError> {
        if self.phase != SessionPhase::InSimulation {
            tracing::debug!(phase = ?self.phase, "Simulation ended outside a simulation stage");
            return Ok(());
        }
        let Some(position) = self.data.global_state_data.position() else {
            return Ok(());
        };

        let viewed = GameStateEntry::new(simulation_viewed_key(&position.stage_id), true);
        self.write(RoomStatePatch::player_entries(
            self.local_player.client_id.clone(),
            vec![viewed],
        ))
        .await?;
        self.check_simulation_viewed().await
    }

    pub async fn update_stage_by_stage_list_id(&mut self, stage_id: &StageListId) -> Result<(), GameStateError> {
        if !self.is_owner() {
            tracing::debug!(stage = %stage_id, "Ignoring stage change: not the room owner");
            return Ok(());
        }
        self.advance_to_stage(Some(stage_id.clone())).await
    }

    pub async fn update_room_stage_step_id(
        &mut self,
        stage_id: &StageListId,
        step_id: &StepId,
    ) -> Result<(), GameStateError> {
        if !self.is_owner() {
            tracing::debug!(stage = %stage_id, step_id = %step_id, "Ignoring position change: not the room owner");
            return Ok(());
        }
        let entry = self
            .stages
            .get(stage_id)
            .ok_or_else(|| GameStateError::UnknownStage(stage_id.clone()))?;
        let before_start = entry.before_start.clone();
        let discussion = entry.stage.is_discussion();

        self.cancel_prompt();
        let stage_changed = self
            .data
            .global_state_data
            .position()
            .map_or(true, |current| &current.stage_id != stage_id);
        if stage_changed {
            self.interpreter.enter_stage(before_start);
        } else {
            self.interpreter.reset_visits();
        }

        let position = StagePosition {
            stage_id: stage_id.clone(),
            step_id: step_id.clone(),
        };
        self.flush(RoomStatePatch::position(stage_id.clone(), step_id.clone()))
            .await?;
        self.phase = phase_for(discussion);
        if discussion {
            self.run_from(position, StepEntry::Fresh).await
        } else {
            Ok(())
        }
    }

    /// Re-run the prompt step that last failed, if play is still on it.
    pub async fn retry_failed_step(&mut self) -> Result<(), GameStateError> {
        if !self.is_owner() {
            return Ok(());
        }
        let Some(failed) = self.last_failed_step_id.take() else {
            return Ok(());
        };
        self.error_message = None;

        let Some(position) = self.data.global_state_data.position() else {
            return Ok(());
        };
        if position.step_id != failed {
            tracing::debug!(failed = %failed, current = %position.step_id, "Failed step is no longer current");
            return Ok(());
        }
        tracing::info!(step_id = %failed, "Retrying failed step");
        self.run_from(position, StepEntry::Resume).await
    }

    /// Send a chat message as the local player, applying the game's keyword
    /// writes first.
    pub async fn send_player_message(&mut self, text: &str) -> Result<(), GameStateError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        let writes = self.game.keyword_writes(text);
        if !writes.is_empty() {
            let mut patch = RoomStatePatch::global(GlobalStatePatch {
                game_state_data: writes.clone(),
                ..Default::default()
            });
            patch.merge(RoomStatePatch::player_entries(
                self.local_player.client_id.clone(),
                writes,
            ));
            self.write(patch).await?;
        }

        let message = ChatMessage::player(&self.local_player, text, self.session_id.clone());
        self.room.send_message(message).await?;
        Ok(())
    }

    pub async fn submit_reflection(&mut self, text: &str) -> Result<(), GameStateError> {
        let Some(step_id) = self.reflection_step() else {
            tracing::debug!("No reflection in progress");
            return Ok(());
        };
        let entry = GameStateEntry::new(reflection_key(&step_id), text.trim());
        self.write(RoomStatePatch::player_entries(
            self.local_player.client_id.clone(),
            vec![entry],
        ))
        .await?;
        self.react_to_player_state().await
    }

    pub async fn ready_to_continue(&mut self) -> Result<(), GameStateError> {
        let Some(step_id) = self.reflection_step() else {
            tracing::debug!("No reflection in progress");
            return Ok(());
        };
        let entry = GameStateEntry::new(ready_key(&step_id), true);
        self.write(RoomStatePatch::player_entries(
            self.local_player.client_id.clone(),
            vec![entry],
        ))
        .await?;
        self.react_to_player_state().await
    }

    // =========================================================================
    // Driving the interpreter
    // =========================================================================

    async fn run_from(&mut self, position: StagePosition, entry: StepEntry) -> Result<(), GameStateError> {
        let report = self.with_step_context(&position.stage_id, |interpreter, ctx| {
            interpreter.execute_step(ctx, &position.step_id, entry)
        })?;
        self.settle(position, report).await
    }

    /// Apply a report and keep executing until play waits on something.
    async fn settle(
        &mut self,
        mut position: StagePosition,
        mut report: Result<StepReport, DiscussionError>,
    ) -> Result<(), GameStateError> {
        loop {
            let StepReport { effects, outcome } = match report {
                Ok(report) => report,
                Err(error) => return self.halt(&position, error).await,
            };

            let mut patch = RoomStatePatch::default();
            for effect in effects {
                match effect {
                    StepEffect::SystemMessage(message) => self.send_system(message).await?,
                    StepEffect::PlayerState { player, entries } => {
                        patch.merge(RoomStatePatch::player_entries(player, entries))
                    }
                    StepEffect::GameState(state) => patch.merge(RoomStatePatch::global(GlobalStatePatch {
                        cur_game_state: Some(state),
                        ..Default::default()
                    })),
                }
            }

            match outcome {
                StepOutcome::Advance(step_id) => {
                    tracing::info!(stage = %position.stage_id, from = %position.step_id, to = %step_id, "Advancing step");
                    position.step_id = step_id;
                    patch.merge(RoomStatePatch::position(
                        position.stage_id.clone(),
                        position.step_id.clone(),
                    ));
                    self.flush(patch).await?;
                }
                StepOutcome::AwaitInput => return self.flush(patch).await,
                StepOutcome::AwaitPrompt(request) => {
                    self.flush(patch).await?;
                    self.dispatch_prompt(position, request, 1);
                    return Ok(());
                }
                StepOutcome::Finished(collected) => {
                    self.flush(patch).await?;
                    let next = self.next_stage(&position.stage_id, &collected)?;
                    tracing::info!(stage = %position.stage_id, next = ?next, "Stage finished");
                    match next {
                        Some(next) => match self.enter_stage(&next).await? {
                            Some(start) => position = start,
                            None => return Ok(()),
                        },
                        None => {
                            self.phase = SessionPhase::Finished;
                            return Ok(());
                        }
                    }
                }
            }

            report = self.with_step_context(&position.stage_id, |interpreter, ctx| {
                interpreter.execute_step(ctx, &position.step_id, StepEntry::Fresh)
            })?;
        }
    }

    async fn settle_optional(
        &mut self,
        position: StagePosition,
        report: Result<Option<StepReport>, DiscussionError>,
    ) -> Result<(), GameStateError> {
        match report {
            Ok(None) => Ok(()),
            Ok(Some(report)) => self.settle(position, Ok(report)).await,
            Err(error) => self.settle(position, Err(error)).await,
        }
    }

    /// Report a fatal discussion error in the chat and stop.
    async fn halt(&mut self, position: &StagePosition, error: DiscussionError) -> Result<(), GameStateError> {
        tracing::error!(
            stage = %position.stage_id,
            step_id = %position.step_id,
            error = %error,
            "Discussion halted"
        );
        self.cancel_prompt();
        self.phase = SessionPhase::Halted;
        self.error_message = Some(error.to_string());
        self.send_system(OutgoingMessage::text(error.to_string())).await?;
        Err(GameStateError::Discussion(error))
    }

    /// Write the start of `stage_id` and reset the interpreter for it.
    /// Returns the start position when it is a discussion stage to run.
    async fn enter_stage(&mut self, stage_id: &StageListId) -> Result<Option<StagePosition>, GameStateError> {
        let entry = self
            .stages
            .get(stage_id)
            .ok_or_else(|| GameStateError::UnknownStage(stage_id.clone()))?;
        let start = entry.start().ok_or_else(|| DiscussionError::EmptyStage {
            stage: entry.stage.client_id.clone(),
        })?;
        let before_start = entry.before_start.clone();
        let discussion = entry.stage.is_discussion();

        self.cancel_prompt();
        self.interpreter.enter_stage(before_start);
        tracing::info!(stage = %stage_id, step_id = %start.step_id, "Entering stage");
        self.flush(RoomStatePatch::position(
            start.stage_id.clone(),
            start.step_id.clone(),
        ))
        .await?;
        self.phase = phase_for(discussion);
        Ok(discussion.then_some(start))
    }

    async fn advance_to_stage(&mut self, next: Option<StageListId>) -> Result<(), GameStateError> {
        let Some(next) = next else {
            tracing::info!("Final stage finished");
            self.phase = SessionPhase::Finished;
            return Ok(());
        };
        match self.enter_stage(&next).await? {
            Some(start) => self.run_from(start, StepEntry::Fresh).await,
            None => Ok(()),
        }
    }

    /// Resolve the follow-up stage over the full read view, so values kept
    /// in room state count alongside this stage's collected data.
    fn next_stage(
        &self,
        stage_id: &StageListId,
        collected: &CollectedDiscussionData,
    ) -> Result<Option<StageListId>, GameStateError> {
        let entry = self
            .stages
            .get(stage_id)
            .ok_or_else(|| GameStateError::UnknownStage(stage_id.clone()))?;
        let owner_entries = self
            .data
            .player_state(&self.local_player.client_id)
            .map(|p| p.game_state_data.as_slice())
            .unwrap_or_default();
        let view = CollectedDiscussionData::layered(
            &self.data.global_state_data.game_state_data,
            owner_entries,
            collected,
        );
        Ok(entry.next.resolve(&view))
    }

    async fn react_to_player_state(&mut self) -> Result<(), GameStateError> {
        if !self.is_owner() {
            return Ok(());
        }
        match self.phase {
            SessionPhase::InSimulation => self.check_simulation_viewed().await,
            SessionPhase::InDiscussion => {
                let Some(position) = self.data.global_state_data.position() else {
                    return Ok(());
                };
                let report = self.with_step_context(&position.stage_id, |interpreter, ctx| {
                    interpreter.handle_player_state(ctx, &position.step_id)
                })?;
                self.settle_optional(position, report).await
            }
            _ => Ok(()),
        }
    }

    /// Owner only: leave the simulation stage once anyone has watched it.
    async fn check_simulation_viewed(&mut self) -> Result<(), GameStateError> {
        if !self.is_owner() {
            return Ok(());
        }
        let Some(position) = self.data.global_state_data.position() else {
            return Ok(());
        };
        let key = simulation_viewed_key(&position.stage_id);
        if !self.data.player_state_data.iter().any(|p| p.has_true(&key)) {
            return Ok(());
        }

        tracing::info!(stage = %position.stage_id, "Simulation viewed, advancing");
        let next = self.next_stage(&position.stage_id, &CollectedDiscussionData::new())?;
        self.advance_to_stage(next).await
    }

    // =========================================================================
    // Prompts
    // =========================================================================

    fn dispatch_prompt(&mut self, position: StagePosition, request: GenericLlmRequest, attempt: u32) {
        self.cancel_prompt();
        let cancel = CancellationToken::new();

        let prompts = Arc::clone(&self.prompts);
        let events = self.events.clone();
        let task_request = request.clone();
        let task_position = position.clone();
        let task_cancel = cancel.clone();

        tracing::info!(step_id = %position.step_id, attempt, "Dispatching prompt");
        tokio::spawn(async move {
            let result = prompts.execute(task_request, task_cancel).await;
            let settled = RoomEvent::PromptSettled {
                position: task_position,
                attempt,
                result,
            };
            if events.send(settled).await.is_err() {
                tracing::debug!("Session closed before prompt settled");
            }
        });

        self.pending_prompt = Some(PendingPrompt {
            position,
            attempt,
            request,
            cancel,
        });
    }

    fn cancel_prompt(&mut self) {
        if let Some(pending) = self.pending_prompt.take() {
            tracing::debug!(step_id = %pending.position.step_id, "Cancelling in-flight prompt");
            pending.cancel.cancel();
        }
    }

    async fn prompt_settled(
        &mut self,
        position: StagePosition,
        attempt: u32,
        result: Result<PromptResponse, PromptError>,
    ) -> Result<(), GameStateError> {
        let current = matches!(
            &self.pending_prompt,
            Some(pending) if pending.position == position && pending.attempt == attempt
        );
        if !current {
            tracing::debug!(step_id = %position.step_id, attempt, "Discarding stale prompt result");
            return Ok(());
        }
        let Some(pending) = self.pending_prompt.take() else {
            return Ok(());
        };

        let failure = match result {
            Err(PromptError::Cancelled) => return Ok(()),
            Err(error) => error.to_string(),
            Ok(response) => {
                let report = self.with_step_context(&position.stage_id, |interpreter, ctx| {
                    interpreter.complete_prompt(ctx, &position.step_id, &response.content)
                })?;
                match report {
                    Err(error) if error.is_retryable() => error.to_string(),
                    other => return self.settle(position, other).await,
                }
            }
        };

        if attempt < MAX_PROMPT_ATTEMPTS {
            tracing::warn!(step_id = %position.step_id, attempt, error = %failure, "Prompt attempt failed, retrying");
            self.dispatch_prompt(position, pending.request, attempt + 1);
            return Ok(());
        }

        tracing::error!(step_id = %position.step_id, attempt, error = %failure, "Prompt step failed");
        self.error_message = Some(failure);
        self.last_failed_step_id = Some(position.step_id);
        self.send_system(OutgoingMessage::text(PROMPT_FAILED_MESSAGE)).await
    }

    // =========================================================================
    // Room writes
    // =========================================================================

    fn with_step_context<T>(
        &mut self,
        stage_id: &StageListId,
        run: impl FnOnce(&mut DiscussionInterpreter, &StepContext<'_>) -> T,
    ) -> Result<T, GameStateError> {
        let entry = self
            .stages
            .get(stage_id)
            .ok_or_else(|| GameStateError::UnknownStage(stage_id.clone()))?;
        let ctx = StepContext {
            stage: &entry.stage,
            game_data: &self.data,
            player: &self.local_player.client_id,
        };
        Ok(run(&mut self.interpreter, &ctx))
    }

    async fn send_system(&mut self, outgoing: OutgoingMessage) -> Result<(), GameStateError> {
        let mut message = ChatMessage::system(outgoing.message, self.session_id.clone());
        message.disable_user_input = outgoing.disable_user_input;
        message.mcq_choices = outgoing.mcq_choices;
        message.is_prompt_response = outgoing.is_prompt_response;

        self.acknowledged.insert(message.id.clone());
        self.data.chat.push(message.clone());
        self.room.send_message(message).await?;
        Ok(())
    }

    /// Write `patch` plus the collected-data mirror when it changed.
    async fn flush(&mut self, mut patch: RoomStatePatch) -> Result<(), GameStateError> {
        let collected = self.interpreter.collected();
        let stored = &self.data.global_state_data.discussion_data_stringified;
        let unchanged = (collected.is_empty() && stored.trim().is_empty())
            || collected.to_stringified() == *stored;
        if !unchanged {
            patch.merge(RoomStatePatch::global(GlobalStatePatch {
                discussion_data_stringified: Some(collected.to_stringified()),
                ..Default::default()
            }));
        }
        self.write(patch).await
    }

    async fn write(&mut self, patch: RoomStatePatch) -> Result<(), GameStateError> {
        if patch.is_empty() {
            return Ok(());
        }
        self.data.apply(&patch, &self.persist_truth);
        self.room.update_room_game_data(patch).await?;
        Ok(())
    }

    fn stored_collected(&self) -> CollectedDiscussionData {
        let raw = &self.data.global_state_data.discussion_data_stringified;
        CollectedDiscussionData::from_stringified(raw).unwrap_or_else(|error| {
            tracing::warn!(error = %error, "Ignoring unreadable stored discussion data");
            CollectedDiscussionData::new()
        })
    }

    fn reflection_step(&self) -> Option<StepId> {
        self.data
            .global_state_data
            .cur_game_state
            .as_ref()
            .and_then(|state| state.end_of_phase_step_id.clone())
    }
}

fn phase_for(discussion: bool) -> SessionPhase {
    if discussion {
        SessionPhase::InDiscussion
    } else {
        SessionPhase::InSimulation
    }
}
