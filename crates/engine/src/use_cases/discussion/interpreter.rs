use rand::seq::SliceRandom;

use arcade_domain::{
    render_template, validate_response, CollectedDiscussionData, CurGameState, DiscussionStep,
    EndOfPhaseReflectionStep, GameStateEntry, GameStatePhase, PlayerId, PromptOutputType,
    RequestUserInputStep, RequireInputType, ResponseMatching, StateValue, StepId, StepKind,
    StepType,
};

use super::{
    build_prompt_request, ready_key, reflection_key, DiscussionError, OutgoingMessage,
    StageCondition, StepContext, StepEffect, StepEntry, StepOutcome, StepReport,
};

/// Players still owing an answer to a multi-response input step.
#[derive(Debug, Clone)]
struct ResponseRound {
    step_id: StepId,
    mode: RequireInputType,
    remaining: Vec<PlayerId>,
    answers: Vec<String>,
}

impl ResponseRound {
    fn new(step_id: StepId, mode: RequireInputType, players: Vec<PlayerId>) -> Self {
        Self {
            step_id,
            mode,
            remaining: players,
            answers: Vec::new(),
        }
    }

    fn accepts(&self, sender: &PlayerId) -> bool {
        match self.mode {
            RequireInputType::AllRequiredInOrder => self.remaining.first() == Some(sender),
            _ => self.remaining.contains(sender),
        }
    }

    fn record(&mut self, sender: &PlayerId, answer: &str) {
        self.remaining.retain(|p| p != sender);
        self.answers.push(answer.to_string());
    }

    fn state(&self) -> CurGameState {
        let mut state = CurGameState::new(self.mode.into());
        state.players_left_to_respond = self.remaining.clone();
        state
    }
}

/// Walks the steps of one discussion stage.
///
/// Holds only per-stage working state; the authored stage and the room
/// snapshot are passed in through [`StepContext`] on every call.
#[derive(Debug, Default)]
pub struct DiscussionInterpreter {
    collected: CollectedDiscussionData,
    visited: Vec<StepId>,
    round: Option<ResponseRound>,
    exit_early: Option<StageCondition>,
}

impl DiscussionInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collected(&self) -> &CollectedDiscussionData {
        &self.collected
    }

    /// Steps executed since the last input step, oldest first.
    pub fn visited(&self) -> &[StepId] {
        &self.visited
    }

    pub fn exit_early(&self) -> Option<&StageCondition> {
        self.exit_early.as_ref()
    }

    /// Reset for a newly entered stage.
    pub fn enter_stage(&mut self, exit_early: Option<StageCondition>) {
        self.restore(CollectedDiscussionData::new(), exit_early);
    }

    /// Reset for a stage already in progress, keeping its collected data.
    pub fn restore(&mut self, collected: CollectedDiscussionData, exit_early: Option<StageCondition>) {
        self.collected = collected;
        self.visited.clear();
        self.round = None;
        self.exit_early = exit_early;
    }

    /// Forget the steps run since the last input, for an explicit move to
    /// another step of the same stage.
    pub fn reset_visits(&mut self) {
        self.visited.clear();
    }

    pub fn execute_step(
        &mut self,
        ctx: &StepContext<'_>,
        step_id: &StepId,
        entry: StepEntry,
    ) -> Result<StepReport, DiscussionError> {
        if ctx.stage.steps().next().is_none() {
            return Err(DiscussionError::EmptyStage {
                stage: ctx.stage.client_id.clone(),
            });
        }
        let step = find_step(ctx, step_id)?;

        if step.collects_input() {
            self.visited.clear();
        }
        if entry == StepEntry::Fresh && self.visited.contains(step_id) {
            tracing::warn!(step_id = %step_id, visited = ?self.visited, "Step loop detected");
            return Err(DiscussionError::StepLoopDetected {
                step: step_id.clone(),
            });
        }
        if let Some(condition) = &self.exit_early {
            if condition.holds(&ctx.view(&self.collected)) {
                tracing::info!(
                    step_id = %step_id,
                    key = %condition.key,
                    "Exit-early condition met, finishing stage"
                );
                return Ok(StepReport::new(Vec::new(), StepOutcome::Finished(self.finish())));
            }
        }
        if !self.visited.contains(step_id) {
            self.visited.push(step_id.clone());
        }

        tracing::debug!(
            stage = %ctx.stage.client_id,
            step_id = %step_id,
            step_type = %step.step_type(),
            ?entry,
            "Executing discussion step"
        );

        match &step.kind {
            StepKind::SystemMessage(system) => {
                let message = render_template(&system.message, &ctx.view(&self.collected));
                let outcome = self.resolve_after(ctx, step)?;
                Ok(StepReport::new(
                    vec![StepEffect::SystemMessage(OutgoingMessage::text(message))],
                    outcome,
                ))
            }
            StepKind::RequestUserInput(input) => Ok(self.start_input(ctx, step, input, entry)),
            StepKind::Prompt(prompt) => {
                let request =
                    build_prompt_request(prompt, &ctx.view(&self.collected), &ctx.game_data.chat);
                Ok(StepReport::new(Vec::new(), StepOutcome::AwaitPrompt(request)))
            }
            StepKind::Conditional(conditional) => {
                let view = ctx.view(&self.collected);
                for branch in &conditional.conditionals {
                    if branch.matches(&view)? {
                        let target = self.checked_jump(ctx, step, &branch.target_step_id)?;
                        return Ok(StepReport::new(Vec::new(), StepOutcome::Advance(target)));
                    }
                }
                let outcome = self.resolve_after(ctx, step)?;
                Ok(StepReport::new(Vec::new(), outcome))
            }
            StepKind::EndOfPhaseReflection(reflection) => {
                if entry == StepEntry::Resume && reflection_in_progress(ctx, step_id) {
                    let report = self.reconcile_reflection(ctx, step)?;
                    return Ok(report
                        .unwrap_or_else(|| StepReport::new(Vec::new(), StepOutcome::AwaitInput)));
                }
                Ok(self.start_reflection(ctx, step_id, reflection))
            }
        }
    }

    /// Handle a chat message from `sender` while `step_id` is current.
    ///
    /// `None` means the message was not an answer to anything (wrong step
    /// type, or not this player's turn).
    pub fn handle_player_message(
        &mut self,
        ctx: &StepContext<'_>,
        step_id: &StepId,
        sender: &PlayerId,
        message: &str,
    ) -> Result<Option<StepReport>, DiscussionError> {
        let step = find_step(ctx, step_id)?;
        let StepKind::RequestUserInput(input) = &step.kind else {
            tracing::debug!(step_id = %step_id, sender = %sender, "Step is not waiting for input");
            return Ok(None);
        };

        let navigation = response_target(input, &ctx.view(&self.collected), message);
        let name = input.save_response_variable_name.as_str();
        let mut effects = Vec::new();

        if input.require_input_type == RequireInputType::SingleResponseRequired {
            self.visited.clear();
            self.round = None;
            if let Some(target) = navigation {
                let target = checked_response_target(ctx, target, message)?;
                return Ok(Some(StepReport::new(effects, StepOutcome::Advance(target))));
            }
            if !name.is_empty() {
                self.collected.insert(name, message);
                effects.push(StepEffect::PlayerState {
                    player: sender.clone(),
                    entries: vec![GameStateEntry::new(name, message)],
                });
            }
            let outcome = self.resolve_after(ctx, step)?;
            return Ok(Some(StepReport::new(effects, outcome)));
        }

        let mut round = match self.round.take() {
            Some(round) if &round.step_id == step_id => round,
            _ => ResponseRound::new(
                step_id.clone(),
                input.require_input_type,
                ctx.game_data.player_ids(),
            ),
        };
        if !round.accepts(sender) {
            tracing::debug!(
                step_id = %step_id,
                sender = %sender,
                remaining = ?round.remaining,
                "Ignoring out-of-turn response"
            );
            self.round = Some(round);
            return Ok(None);
        }

        self.visited.clear();
        round.record(sender, message);
        if !name.is_empty() {
            self.collected
                .insert(name, StateValue::List(round.answers.clone()));
            effects.push(StepEffect::PlayerState {
                player: sender.clone(),
                entries: vec![GameStateEntry::new(name, message)],
            });
        }

        if !round.remaining.is_empty() {
            effects.push(StepEffect::GameState(Some(round.state())));
            self.round = Some(round);
            return Ok(Some(StepReport::new(effects, StepOutcome::AwaitInput)));
        }

        effects.push(StepEffect::GameState(None));
        let outcome = match navigation {
            Some(target) => StepOutcome::Advance(checked_response_target(ctx, target, message)?),
            None => self.resolve_after(ctx, step)?,
        };
        Ok(Some(StepReport::new(effects, outcome)))
    }

    /// Apply a prompt result for the PROMPT step `step_id`.
    pub fn complete_prompt(
        &mut self,
        ctx: &StepContext<'_>,
        step_id: &StepId,
        raw: &str,
    ) -> Result<StepReport, DiscussionError> {
        let step = find_step(ctx, step_id)?;
        let StepKind::Prompt(prompt) = &step.kind else {
            return Err(DiscussionError::WrongStepType {
                step: step_id.clone(),
                expected: StepType::Prompt,
                actual: step.step_type(),
            });
        };

        let effect = match prompt.output_data_type {
            PromptOutputType::Text => StepEffect::SystemMessage(OutgoingMessage {
                message: raw.trim().to_string(),
                is_prompt_response: true,
                ..Default::default()
            }),
            PromptOutputType::Json => {
                let object = validate_response(&prompt.json_response_data, raw)
                    .map_err(DiscussionError::InvalidPromptOutput)?;
                let entries = object
                    .iter()
                    .map(|(key, value)| {
                        GameStateEntry::new(key.clone(), StateValue::from_json(value.clone()))
                    })
                    .collect();
                self.collected.merge_json_object(object);
                StepEffect::PlayerState {
                    player: ctx.player.clone(),
                    entries,
                }
            }
        };

        let outcome = self.resolve_after(ctx, step)?;
        Ok(StepReport::new(vec![effect], outcome))
    }

    /// Re-check player-owned progress (reflections, ready flags) after a
    /// player state change.
    pub fn handle_player_state(
        &mut self,
        ctx: &StepContext<'_>,
        step_id: &StepId,
    ) -> Result<Option<StepReport>, DiscussionError> {
        let step = find_step(ctx, step_id)?;
        match &step.kind {
            StepKind::EndOfPhaseReflection(_) if reflection_in_progress(ctx, step_id) => {
                self.reconcile_reflection(ctx, step)
            }
            _ => Ok(None),
        }
    }

    /// Drop departed players from whatever the current step is waiting on.
    pub fn handle_players_changed(
        &mut self,
        ctx: &StepContext<'_>,
        step_id: &StepId,
    ) -> Result<Option<StepReport>, DiscussionError> {
        let step = find_step(ctx, step_id)?;
        match &step.kind {
            StepKind::EndOfPhaseReflection(_) if reflection_in_progress(ctx, step_id) => {
                self.reconcile_reflection(ctx, step)
            }
            StepKind::RequestUserInput(_) => {
                let Some(mut round) = self.round.take() else {
                    return Ok(None);
                };
                if &round.step_id != step_id {
                    return Ok(None);
                }

                let present = ctx.game_data.player_ids();
                let before = round.remaining.len();
                round.remaining.retain(|p| present.contains(p));
                if round.remaining.len() == before {
                    self.round = Some(round);
                    return Ok(None);
                }

                if round.remaining.is_empty() && !round.answers.is_empty() {
                    tracing::info!(step_id = %step_id, "Remaining responders left, closing round");
                    self.visited.clear();
                    let outcome = self.resolve_after(ctx, step)?;
                    return Ok(Some(StepReport::new(
                        vec![StepEffect::GameState(None)],
                        outcome,
                    )));
                }

                let state = round.state();
                self.round = Some(round);
                Ok(Some(StepReport::new(
                    vec![StepEffect::GameState(Some(state))],
                    StepOutcome::AwaitInput,
                )))
            }
            _ => Ok(None),
        }
    }

    fn start_input(
        &mut self,
        ctx: &StepContext<'_>,
        step: &DiscussionStep,
        input: &RequestUserInputStep,
        entry: StepEntry,
    ) -> StepReport {
        let mode = input.require_input_type;
        let players = ctx.game_data.player_ids();

        if entry == StepEntry::Resume {
            self.round = (mode != RequireInputType::SingleResponseRequired).then(|| {
                let mut round = ResponseRound::new(step.step_id.clone(), mode, players);
                if let Some(current) = ctx
                    .game_data
                    .global_state_data
                    .cur_game_state
                    .as_ref()
                    .filter(|s| s.cur_state == GameStatePhase::from(mode))
                {
                    round.remaining = current.players_left_to_respond.clone();
                }
                if let Some(StateValue::List(answers)) =
                    self.collected.get(&input.save_response_variable_name)
                {
                    round.answers = answers.clone();
                }
                round
            });
            return StepReport::new(Vec::new(), StepOutcome::AwaitInput);
        }

        let view = ctx.view(&self.collected);
        let mut effects = vec![StepEffect::SystemMessage(OutgoingMessage {
            message: render_template(&input.message, &view),
            disable_user_input: input.disable_free_input,
            mcq_choices: response_choices(input, &view)
                .into_iter()
                .map(|(choice, _)| choice)
                .collect(),
            is_prompt_response: false,
        })];

        self.round = None;
        if mode != RequireInputType::SingleResponseRequired {
            let round = ResponseRound::new(step.step_id.clone(), mode, players);
            effects.push(StepEffect::GameState(Some(round.state())));
            self.round = Some(round);
        }
        StepReport::new(effects, StepOutcome::AwaitInput)
    }

    fn start_reflection(
        &self,
        ctx: &StepContext<'_>,
        step_id: &StepId,
        reflection: &EndOfPhaseReflectionStep,
    ) -> StepReport {
        let view = ctx.view(&self.collected);
        let mut effects = Vec::new();

        let message = if reflection.message.trim().is_empty() {
            reflection.phase_title.trim().to_string()
        } else {
            render_template(&reflection.message, &view)
        };
        if !message.is_empty() {
            effects.push(StepEffect::SystemMessage(OutgoingMessage {
                message,
                disable_user_input: true,
                ..Default::default()
            }));
        }

        let mut state = CurGameState::new(GameStatePhase::EndOfPhaseReflection);
        state.players_left_to_respond = ctx.game_data.player_ids();
        state.end_of_phase_step_id = Some(step_id.clone());
        state.selected_question = reflection
            .questions
            .choose(&mut rand::thread_rng())
            .map(|question| render_template(question, &view));
        effects.push(StepEffect::GameState(Some(state)));

        StepReport::new(effects, StepOutcome::AwaitInput)
    }

    fn reconcile_reflection(
        &mut self,
        ctx: &StepContext<'_>,
        step: &DiscussionStep,
    ) -> Result<Option<StepReport>, DiscussionError> {
        let Some(current) = ctx.game_data.global_state_data.cur_game_state.as_ref() else {
            return Ok(None);
        };
        let players = ctx.game_data.player_ids();
        let written = reflection_key(&step.step_id);
        let ready = ready_key(&step.step_id);

        let mut next = current.clone();
        next.student_reflections = players
            .iter()
            .filter_map(|player| {
                let text = ctx.game_data.player_state(player)?.value(&written)?.render();
                (!text.trim().is_empty()).then(|| (player.clone(), text))
            })
            .collect();
        next.players_left_to_respond = players
            .iter()
            .filter(|p| !next.student_reflections.contains_key(*p))
            .cloned()
            .collect();

        if next.players_left_to_respond.is_empty() && !players.is_empty() {
            next.cur_state = GameStatePhase::WaitingForStudentReadyToContinue;
            let everyone_ready = players.iter().all(|player| {
                ctx.game_data
                    .player_state(player)
                    .is_some_and(|state| state.has_true(&ready))
            });
            if everyone_ready {
                tracing::info!(step_id = %step.step_id, "All players reflected and are ready");
                self.visited.clear();
                let outcome = self.resolve_after(ctx, step)?;
                return Ok(Some(StepReport::new(vec![StepEffect::GameState(None)], outcome)));
            }
        }

        if &next == current {
            return Ok(None);
        }
        Ok(Some(StepReport::new(
            vec![StepEffect::GameState(Some(next))],
            StepOutcome::AwaitInput,
        )))
    }

    /// Where to go once `step` has done its work: finish on a last step,
    /// else its jump target, else the next step in its flow.
    fn resolve_after(
        &mut self,
        ctx: &StepContext<'_>,
        step: &DiscussionStep,
    ) -> Result<StepOutcome, DiscussionError> {
        if step.last_step {
            return Ok(StepOutcome::Finished(self.finish()));
        }
        if let Some(target) = &step.jump_to_step_id {
            return self.checked_jump(ctx, step, target).map(StepOutcome::Advance);
        }
        ctx.stage
            .default_successor(&step.step_id)
            .map(|next| StepOutcome::Advance(next.step_id.clone()))
            .map_err(|_| DiscussionError::NoNextStep {
                step: step.step_id.clone(),
            })
    }

    fn checked_jump(
        &self,
        ctx: &StepContext<'_>,
        step: &DiscussionStep,
        target: &StepId,
    ) -> Result<StepId, DiscussionError> {
        if ctx.stage.step(target).is_none() {
            return Err(DiscussionError::MissingJumpTarget {
                from: step.step_id.clone(),
                target: target.clone(),
            });
        }
        Ok(target.clone())
    }

    fn finish(&mut self) -> CollectedDiscussionData {
        self.visited.clear();
        self.round = None;
        self.exit_early = None;
        self.collected.take()
    }
}

fn find_step<'a>(
    ctx: &StepContext<'a>,
    step_id: &StepId,
) -> Result<&'a DiscussionStep, DiscussionError> {
    ctx.stage
        .step(step_id)
        .ok_or_else(|| DiscussionError::StepNotFound {
            stage: ctx.stage.client_id.clone(),
            step: step_id.clone(),
        })
}

fn reflection_in_progress(ctx: &StepContext<'_>, step_id: &StepId) -> bool {
    ctx.game_data
        .global_state_data
        .cur_game_state
        .as_ref()
        .and_then(|state| state.end_of_phase_step_id.as_ref())
        == Some(step_id)
}

/// Choices offered for an input step, heaviest first. Array responses expand
/// into one choice per comma separated item.
fn response_choices(
    input: &RequestUserInputStep,
    view: &CollectedDiscussionData,
) -> Vec<(String, Option<StepId>)> {
    let mut weighted: Vec<_> = input
        .predefined_responses
        .iter()
        .map(|response| {
            let weight = response
                .response_weight
                .as_deref()
                .map(|w| render_template(w, view))
                .and_then(|w| w.trim().parse::<f64>().ok())
                .unwrap_or(0.0);
            (weight, response)
        })
        .collect();
    weighted.sort_by(|a, b| b.0.total_cmp(&a.0));

    weighted
        .into_iter()
        .flat_map(|(_, response)| {
            let text = render_template(&response.message, view);
            let items: Vec<String> = if response.is_array {
                text.split(',')
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect()
            } else {
                vec![text]
            };
            items
                .into_iter()
                .map(move |item| (item, response.jump_to_step_id.clone()))
        })
        .collect()
}

fn response_target(
    input: &RequestUserInputStep,
    view: &CollectedDiscussionData,
    message: &str,
) -> Option<StepId> {
    let matching: ResponseMatching = input.response_matching;
    response_choices(input, view)
        .into_iter()
        .find_map(|(choice, target)| target.filter(|_| matching.matches(&choice, message)))
}

fn checked_response_target(
    ctx: &StepContext<'_>,
    target: StepId,
    response: &str,
) -> Result<StepId, DiscussionError> {
    if ctx.stage.step(&target).is_none() {
        return Err(DiscussionError::MissingResponseTarget {
            target,
            response: response.to_string(),
        });
    }
    Ok(target)
}
