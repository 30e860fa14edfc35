use arcade_domain::{
    Checking, CollectedDiscussionData, CurGameState, DiscussionStep, Flow, GameData,
    GameStateEntry, GameStatePhase, JsonFieldType, JsonResponseField, Operation, Player,
    PlayerId, PlayerStateData, PredefinedResponse, PromptOutputType, RequireInputType,
    ResponseMatching, Stage, StateValue, StepConditional, StepId, StepKind,
};

use super::*;

fn stage(flows: Vec<Flow>) -> Stage {
    Stage::discussion("intro-discussion", flows)
}

fn room(players: &[&str]) -> GameData {
    let mut data = GameData::default();
    for id in players {
        data.players.push(Player::new(*id, id.to_uppercase()));
        data.player_state_data.push(PlayerStateData::new(*id));
    }
    data.global_state_data.room_owner_id = PlayerId::new(players.first().copied().unwrap_or(""));
    data
}

fn owner() -> PlayerId {
    PlayerId::new("p1")
}

fn input_step(id: &str, var: &str) -> DiscussionStep {
    DiscussionStep::new(id, StepKind::request_user_input("Your name?", var))
}

fn with_input(step: DiscussionStep, edit: impl FnOnce(&mut arcade_domain::RequestUserInputStep)) -> DiscussionStep {
    let mut step = step;
    if let StepKind::RequestUserInput(input) = &mut step.kind {
        edit(input);
    }
    step
}

fn predefined(message: &str, target: Option<&str>) -> PredefinedResponse {
    PredefinedResponse {
        client_id: message.to_string(),
        message: message.to_string(),
        is_array: false,
        jump_to_step_id: target.map(StepId::new),
        response_weight: None,
    }
}

fn branch(key: &str, operation: Operation, expected: &str, target: &str) -> StepConditional {
    StepConditional {
        state_data_key: key.to_string(),
        checking: Checking::Value,
        operation,
        expected_value: expected.to_string(),
        target_step_id: StepId::new(target),
    }
}

fn run(
    interpreter: &mut DiscussionInterpreter,
    stage: &Stage,
    data: &GameData,
    step: &str,
) -> Result<StepReport, DiscussionError> {
    let player = owner();
    let ctx = StepContext {
        stage,
        game_data: data,
        player: &player,
    };
    interpreter.execute_step(&ctx, &StepId::new(step), StepEntry::Fresh)
}

fn answer(
    interpreter: &mut DiscussionInterpreter,
    stage: &Stage,
    data: &GameData,
    step: &str,
    sender: &str,
    message: &str,
) -> Result<Option<StepReport>, DiscussionError> {
    let player = owner();
    let ctx = StepContext {
        stage,
        game_data: data,
        player: &player,
    };
    interpreter.handle_player_message(&ctx, &StepId::new(step), &PlayerId::new(sender), message)
}

fn messages(report: &StepReport) -> Vec<&str> {
    report
        .effects
        .iter()
        .filter_map(|effect| match effect {
            StepEffect::SystemMessage(out) => Some(out.message.as_str()),
            _ => None,
        })
        .collect()
}

#[test]
fn system_message_falls_through_to_next_step_in_flow() {
    let stage = stage(vec![Flow::new(
        "f1",
        vec![
            DiscussionStep::new("welcome", StepKind::system_message("Welcome")),
            input_step("ask", "name"),
        ],
    )]);
    let data = room(&["p1"]);
    let mut interpreter = DiscussionInterpreter::new();

    let report = run(&mut interpreter, &stage, &data, "welcome").unwrap();

    assert_eq!(messages(&report), vec!["Welcome"]);
    assert_eq!(report.outcome, StepOutcome::Advance(StepId::new("ask")));
}

#[test]
fn jump_takes_precedence_over_flow_order() {
    let stage = stage(vec![
        Flow::new(
            "f1",
            vec![
                DiscussionStep::new("a", StepKind::system_message("A")).with_jump_to("c"),
                DiscussionStep::new("b", StepKind::system_message("B")),
            ],
        ),
        Flow::new(
            "f2",
            vec![DiscussionStep::new("c", StepKind::system_message("C")).with_last_step()],
        ),
    ]);
    let data = room(&["p1"]);
    let mut interpreter = DiscussionInterpreter::new();

    let report = run(&mut interpreter, &stage, &data, "a").unwrap();
    assert_eq!(report.outcome, StepOutcome::Advance(StepId::new("c")));
}

#[test]
fn missing_jump_target_names_the_target() {
    let stage = stage(vec![Flow::new(
        "f1",
        vec![DiscussionStep::new("a", StepKind::system_message("A")).with_jump_to("gone")],
    )]);
    let data = room(&["p1"]);
    let mut interpreter = DiscussionInterpreter::new();

    let err = run(&mut interpreter, &stage, &data, "a").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unable to find target step gone, maybe you deleted it and forgot to update this step?"
    );
}

#[test]
fn end_of_flow_without_last_step_is_an_error() {
    let stage = stage(vec![Flow::new(
        "f1",
        vec![DiscussionStep::new("a", StepKind::system_message("A"))],
    )]);
    let data = room(&["p1"]);
    let mut interpreter = DiscussionInterpreter::new();

    let err = run(&mut interpreter, &stage, &data, "a").unwrap_err();
    assert!(matches!(err, DiscussionError::NoNextStep { .. }));
}

#[test]
fn last_step_finishes_and_resets_collected_data() {
    let stage = stage(vec![Flow::new(
        "f1",
        vec![
            input_step("ask", "name"),
            DiscussionStep::new("bye", StepKind::system_message("Bye {{name}}")).with_last_step(),
        ],
    )]);
    let data = room(&["p1"]);
    let mut interpreter = DiscussionInterpreter::new();

    run(&mut interpreter, &stage, &data, "ask").unwrap();
    answer(&mut interpreter, &stage, &data, "ask", "p1", "Alice").unwrap();
    let report = run(&mut interpreter, &stage, &data, "bye").unwrap();

    assert_eq!(messages(&report), vec!["Bye Alice"]);
    let StepOutcome::Finished(collected) = report.outcome else {
        panic!("expected stage to finish");
    };
    assert_eq!(collected.get("name"), Some(&StateValue::text("Alice")));
    assert!(interpreter.collected().is_empty());
    assert!(interpreter.visited().is_empty());
}

#[test]
fn conditional_takes_first_matching_branch() {
    let stage = stage(vec![Flow::new(
        "f1",
        vec![
            DiscussionStep::new(
                "check",
                StepKind::conditional(vec![
                    branch("score", Operation::GreaterThan, "5", "high"),
                    branch("score", Operation::GreaterThan, "1", "mid"),
                ]),
            ),
            DiscussionStep::new("low", StepKind::system_message("low")).with_last_step(),
            DiscussionStep::new("mid", StepKind::system_message("mid")).with_last_step(),
            DiscussionStep::new("high", StepKind::system_message("high")).with_last_step(),
        ],
    )]);
    let mut data = room(&["p1"]);
    data.global_state_data
        .game_state_data
        .push(GameStateEntry::new("score", 7.0));
    let mut interpreter = DiscussionInterpreter::new();

    let report = run(&mut interpreter, &stage, &data, "check").unwrap();
    assert_eq!(report.outcome, StepOutcome::Advance(StepId::new("high")));

    data.global_state_data.game_state_data[0].value = StateValue::Number(0.0);
    let mut interpreter = DiscussionInterpreter::new();
    let report = run(&mut interpreter, &stage, &data, "check").unwrap();
    assert_eq!(report.outcome, StepOutcome::Advance(StepId::new("low")));
}

#[test]
fn conditional_branch_beats_its_own_jump_target() {
    let stage = stage(vec![Flow::new(
        "f1",
        vec![
            DiscussionStep::new(
                "check",
                StepKind::conditional(vec![branch("score", Operation::GreaterThan, "5", "high")]),
            )
            .with_jump_to("fallback"),
            DiscussionStep::new("next", StepKind::system_message("next")).with_last_step(),
            DiscussionStep::new("high", StepKind::system_message("high")).with_last_step(),
            DiscussionStep::new("fallback", StepKind::system_message("fallback")).with_last_step(),
        ],
    )]);
    let mut data = room(&["p1"]);
    data.global_state_data
        .game_state_data
        .push(GameStateEntry::new("score", 7.0));
    let mut interpreter = DiscussionInterpreter::new();

    let report = run(&mut interpreter, &stage, &data, "check").unwrap();
    assert_eq!(report.outcome, StepOutcome::Advance(StepId::new("high")));

    data.global_state_data.game_state_data[0].value = StateValue::Number(2.0);
    let mut interpreter = DiscussionInterpreter::new();
    let report = run(&mut interpreter, &stage, &data, "check").unwrap();
    assert_eq!(report.outcome, StepOutcome::Advance(StepId::new("fallback")));
}

#[test]
fn conditional_on_missing_key_halts() {
    let stage = stage(vec![Flow::new(
        "f1",
        vec![
            DiscussionStep::new(
                "check",
                StepKind::conditional(vec![branch("absent", Operation::Equals, "x", "done")]),
            ),
            DiscussionStep::new("done", StepKind::system_message("done")).with_last_step(),
        ],
    )]);
    let data = room(&["p1"]);
    let mut interpreter = DiscussionInterpreter::new();

    let err = run(&mut interpreter, &stage, &data, "check").unwrap_err();
    assert_eq!(
        err.to_string(),
        "An error occured during this activity. Could not find state value absent."
    );
}

#[test]
fn revisiting_a_step_without_input_is_a_loop() {
    let stage = stage(vec![Flow::new(
        "f1",
        vec![
            DiscussionStep::new("a", StepKind::system_message("A")),
            DiscussionStep::new("b", StepKind::system_message("B")).with_jump_to("a"),
        ],
    )]);
    let data = room(&["p1"]);
    let mut interpreter = DiscussionInterpreter::new();

    assert_eq!(
        run(&mut interpreter, &stage, &data, "a").unwrap().outcome,
        StepOutcome::Advance(StepId::new("b"))
    );
    assert_eq!(
        run(&mut interpreter, &stage, &data, "b").unwrap().outcome,
        StepOutcome::Advance(StepId::new("a"))
    );
    let err = run(&mut interpreter, &stage, &data, "a").unwrap_err();
    assert!(matches!(err, DiscussionError::StepLoopDetected { step } if step.as_str() == "a"));
}

#[test]
fn input_step_breaks_loop_detection() {
    let stage = stage(vec![Flow::new(
        "f1",
        vec![
            input_step("ask", "guess"),
            DiscussionStep::new("again", StepKind::system_message("Try again")).with_jump_to("ask"),
        ],
    )]);
    let data = room(&["p1"]);
    let mut interpreter = DiscussionInterpreter::new();

    run(&mut interpreter, &stage, &data, "ask").unwrap();
    answer(&mut interpreter, &stage, &data, "ask", "p1", "1").unwrap();
    run(&mut interpreter, &stage, &data, "again").unwrap();
    let report = run(&mut interpreter, &stage, &data, "ask").unwrap();

    assert_eq!(report.outcome, StepOutcome::AwaitInput);
}

#[test]
fn predefined_response_navigates_without_saving() {
    let ask = with_input(input_step("ask", "choice"), |input| {
        input.predefined_responses = vec![predefined("Yes", Some("yes")), predefined("No", None)];
        input.response_matching = ResponseMatching::Normalized;
    });
    let stage = stage(vec![Flow::new(
        "f1",
        vec![
            ask,
            DiscussionStep::new("next", StepKind::system_message("next")).with_last_step(),
            DiscussionStep::new("yes", StepKind::system_message("yes")).with_last_step(),
        ],
    )]);
    let data = room(&["p1"]);
    let mut interpreter = DiscussionInterpreter::new();

    let report = run(&mut interpreter, &stage, &data, "ask").unwrap();
    let StepEffect::SystemMessage(prompt) = &report.effects[0] else {
        panic!("expected the input prompt");
    };
    assert_eq!(prompt.mcq_choices, vec!["Yes", "No"]);

    let report = answer(&mut interpreter, &stage, &data, "ask", "p1", " yes ")
        .unwrap()
        .unwrap();
    assert_eq!(report.outcome, StepOutcome::Advance(StepId::new("yes")));
    assert!(report.effects.is_empty());
    assert!(!interpreter.collected().contains_key("choice"));
}

#[test]
fn unmatched_response_is_saved_for_the_player() {
    let ask = with_input(input_step("ask", "choice"), |input| {
        input.predefined_responses = vec![predefined("Yes", Some("next"))];
    });
    let stage = stage(vec![Flow::new(
        "f1",
        vec![ask, DiscussionStep::new("next", StepKind::system_message("n")).with_last_step()],
    )]);
    let data = room(&["p1", "p2"]);
    let mut interpreter = DiscussionInterpreter::new();

    run(&mut interpreter, &stage, &data, "ask").unwrap();
    let report = answer(&mut interpreter, &stage, &data, "ask", "p2", "Maybe")
        .unwrap()
        .unwrap();

    assert_eq!(
        report.effects,
        vec![StepEffect::PlayerState {
            player: PlayerId::new("p2"),
            entries: vec![GameStateEntry::new("choice", "Maybe")],
        }]
    );
    assert_eq!(interpreter.collected().get("choice"), Some(&StateValue::text("Maybe")));
}

#[test]
fn predefined_target_missing_is_reported_with_the_response() {
    let ask = with_input(input_step("ask", "choice"), |input| {
        input.predefined_responses = vec![predefined("Go", Some("nowhere"))];
    });
    let stage = stage(vec![Flow::new("f1", vec![ask])]);
    let data = room(&["p1"]);
    let mut interpreter = DiscussionInterpreter::new();

    run(&mut interpreter, &stage, &data, "ask").unwrap();
    let err = answer(&mut interpreter, &stage, &data, "ask", "p1", "Go").unwrap_err();
    assert_eq!(
        err.to_string(),
        "Unable to find target step nowhere for predefined input Go, maybe you deleted it and forgot to update this step?"
    );
}

#[test]
fn choices_are_ordered_by_weight_and_arrays_expand() {
    let ask = with_input(input_step("ask", "pick"), |input| {
        input.predefined_responses = vec![
            PredefinedResponse {
                response_weight: Some("1".into()),
                ..predefined("Low", None)
            },
            PredefinedResponse {
                is_array: true,
                response_weight: Some("5".into()),
                ..predefined("{{options}}", None)
            },
        ];
    });
    let stage = stage(vec![Flow::new("f1", vec![ask])]);
    let mut data = room(&["p1"]);
    data.global_state_data
        .game_state_data
        .push(GameStateEntry::new("options", "Inside, Outside"));
    let mut interpreter = DiscussionInterpreter::new();

    let report = run(&mut interpreter, &stage, &data, "ask").unwrap();
    let StepEffect::SystemMessage(prompt) = &report.effects[0] else {
        panic!("expected the input prompt");
    };
    assert_eq!(prompt.mcq_choices, vec!["Inside", "Outside", "Low"]);
}

#[test]
fn in_order_round_waits_for_each_player_in_turn() {
    let ask = with_input(input_step("ask", "ideas"), |input| {
        input.require_input_type = RequireInputType::AllRequiredInOrder;
    });
    let stage = stage(vec![Flow::new(
        "f1",
        vec![ask, DiscussionStep::new("next", StepKind::system_message("n")).with_last_step()],
    )]);
    let data = room(&["p1", "p2"]);
    let mut interpreter = DiscussionInterpreter::new();

    let report = run(&mut interpreter, &stage, &data, "ask").unwrap();
    let Some(StepEffect::GameState(Some(state))) = report.effects.last() else {
        panic!("expected round state");
    };
    assert_eq!(state.cur_state, GameStatePhase::AllRequiredInOrder);
    assert_eq!(state.players_left_to_respond.len(), 2);

    assert!(answer(&mut interpreter, &stage, &data, "ask", "p2", "early")
        .unwrap()
        .is_none());

    let report = answer(&mut interpreter, &stage, &data, "ask", "p1", "first")
        .unwrap()
        .unwrap();
    assert_eq!(report.outcome, StepOutcome::AwaitInput);

    let report = answer(&mut interpreter, &stage, &data, "ask", "p2", "second")
        .unwrap()
        .unwrap();
    assert!(report.effects.contains(&StepEffect::GameState(None)));
    assert_eq!(report.outcome, StepOutcome::Advance(StepId::new("next")));
    assert_eq!(
        interpreter.collected().get("ideas"),
        Some(&StateValue::List(vec!["first".into(), "second".into()]))
    );
}

#[test]
fn departed_player_no_longer_blocks_the_round() {
    let ask = with_input(input_step("ask", "ideas"), |input| {
        input.require_input_type = RequireInputType::AllUserResponsesRequiredFreeForAll;
    });
    let stage = stage(vec![Flow::new(
        "f1",
        vec![ask, DiscussionStep::new("next", StepKind::system_message("n")).with_last_step()],
    )]);
    let mut data = room(&["p1", "p2"]);
    let mut interpreter = DiscussionInterpreter::new();

    run(&mut interpreter, &stage, &data, "ask").unwrap();
    answer(&mut interpreter, &stage, &data, "ask", "p1", "mine").unwrap();

    data.players.retain(|p| p.client_id.as_str() != "p2");
    let player = owner();
    let ctx = StepContext {
        stage: &stage,
        game_data: &data,
        player: &player,
    };
    let report = interpreter
        .handle_players_changed(&ctx, &StepId::new("ask"))
        .unwrap()
        .unwrap();
    assert_eq!(report.outcome, StepOutcome::Advance(StepId::new("next")));
}

#[test]
fn exit_early_condition_finishes_before_the_step_runs() {
    let stage = stage(vec![Flow::new(
        "f1",
        vec![DiscussionStep::new("a", StepKind::system_message("A")).with_last_step()],
    )]);
    let mut data = room(&["p1"]);
    data.player_state_data[0]
        .game_state_data
        .push(GameStateEntry::new("understands_algorithm", "true"));
    let mut interpreter = DiscussionInterpreter::new();
    interpreter.enter_stage(Some(StageCondition::new("understands_algorithm", "true")));

    let report = run(&mut interpreter, &stage, &data, "a").unwrap();
    assert!(report.effects.is_empty());
    assert!(matches!(report.outcome, StepOutcome::Finished(_)));
    assert!(interpreter.exit_early().is_none());
}

#[test]
fn prompt_step_builds_templated_request() {
    let mut step = StepKind::prompt("Summarize {{name}}'s idea");
    if let StepKind::Prompt(prompt) = &mut step {
        prompt.include_chat_log_context = true;
        prompt.custom_system_role = "You coach {{name}}".into();
    }
    let stage = stage(vec![Flow::new(
        "f1",
        vec![DiscussionStep::new("p", step).with_last_step()],
    )]);
    let mut data = room(&["p1"]);
    data.global_state_data
        .game_state_data
        .push(GameStateEntry::new("name", "Alice"));
    let mut interpreter = DiscussionInterpreter::new();

    let report = run(&mut interpreter, &stage, &data, "p").unwrap();
    let StepOutcome::AwaitPrompt(request) = report.outcome else {
        panic!("expected a prompt request");
    };
    assert_eq!(request.prompts.len(), 2);
    assert!(request.prompts[0].prompt_text.starts_with(CHAT_LOG_CONTEXT_PREFIX));
    assert_eq!(request.prompts[1].prompt_text, "Summarize Alice's idea");
    assert_eq!(request.system_role, "You coach Alice");
}

fn json_prompt_stage() -> Stage {
    let mut step = StepKind::prompt("Grade it");
    if let StepKind::Prompt(prompt) = &mut step {
        prompt.output_data_type = PromptOutputType::Json;
        prompt.json_response_data = vec![
            JsonResponseField::new("understands_algorithm", JsonFieldType::String).required(),
        ];
    }
    stage(vec![Flow::new(
        "f1",
        vec![
            DiscussionStep::new("grade", step),
            DiscussionStep::new("done", StepKind::system_message("{{understands_algorithm}}"))
                .with_last_step(),
        ],
    )])
}

#[test]
fn json_prompt_output_is_collected_and_written_to_owner() {
    let stage = json_prompt_stage();
    let data = room(&["p1"]);
    let player = owner();
    let ctx = StepContext {
        stage: &stage,
        game_data: &data,
        player: &player,
    };
    let mut interpreter = DiscussionInterpreter::new();

    let report = interpreter
        .complete_prompt(&ctx, &StepId::new("grade"), r#"{"understands_algorithm": "true"}"#)
        .unwrap();

    assert_eq!(report.outcome, StepOutcome::Advance(StepId::new("done")));
    assert_eq!(
        report.effects,
        vec![StepEffect::PlayerState {
            player: owner(),
            entries: vec![GameStateEntry::new("understands_algorithm", "true")],
        }]
    );
    assert_eq!(
        interpreter.collected().get("understands_algorithm"),
        Some(&StateValue::text("true"))
    );
}

#[test]
fn invalid_json_prompt_output_is_retryable() {
    let stage = json_prompt_stage();
    let data = room(&["p1"]);
    let player = owner();
    let ctx = StepContext {
        stage: &stage,
        game_data: &data,
        player: &player,
    };
    let mut interpreter = DiscussionInterpreter::new();

    let err = interpreter
        .complete_prompt(&ctx, &StepId::new("grade"), "sure thing!")
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(interpreter.collected().is_empty());
}

#[test]
fn text_prompt_output_becomes_a_prompt_response_message() {
    let stage = stage(vec![Flow::new(
        "f1",
        vec![DiscussionStep::new("p", StepKind::prompt("hi")).with_last_step()],
    )]);
    let data = room(&["p1"]);
    let player = owner();
    let ctx = StepContext {
        stage: &stage,
        game_data: &data,
        player: &player,
    };
    let mut interpreter = DiscussionInterpreter::new();

    let report = interpreter
        .complete_prompt(&ctx, &StepId::new("p"), "Great work!\n")
        .unwrap();
    let StepEffect::SystemMessage(out) = &report.effects[0] else {
        panic!("expected a chat message");
    };
    assert_eq!(out.message, "Great work!");
    assert!(out.is_prompt_response);
    assert!(matches!(report.outcome, StepOutcome::Finished(_)));
}

#[test]
fn reflection_waits_for_reflections_then_ready_flags() {
    let stage = stage(vec![Flow::new(
        "f1",
        vec![
            DiscussionStep::new(
                "reflect",
                StepKind::EndOfPhaseReflection(arcade_domain::EndOfPhaseReflectionStep {
                    phase_title: "Wrap up".into(),
                    message: String::new(),
                    questions: vec!["What surprised you?".into()],
                }),
            ),
            DiscussionStep::new("after", StepKind::system_message("after")).with_last_step(),
        ],
    )]);
    let mut data = room(&["p1", "p2"]);
    let mut interpreter = DiscussionInterpreter::new();
    let step = StepId::new("reflect");

    let report = run(&mut interpreter, &stage, &data, "reflect").unwrap();
    assert_eq!(messages(&report), vec!["Wrap up"]);
    let Some(StepEffect::GameState(Some(state))) = report.effects.last().cloned() else {
        panic!("expected reflection state");
    };
    assert_eq!(state.selected_question.as_deref(), Some("What surprised you?"));
    data.global_state_data.cur_game_state = Some(state);

    for player in &mut data.player_state_data {
        player
            .game_state_data
            .push(GameStateEntry::new(reflection_key(&step), "Shots matter"));
    }
    let player = owner();
    let report = {
        let ctx = StepContext {
            stage: &stage,
            game_data: &data,
            player: &player,
        };
        interpreter.handle_player_state(&ctx, &step).unwrap().unwrap()
    };
    let Some(StepEffect::GameState(Some(state))) = report.effects.first().cloned() else {
        panic!("expected waiting state");
    };
    assert_eq!(state.cur_state, GameStatePhase::WaitingForStudentReadyToContinue);
    assert_eq!(state.student_reflections.len(), 2);
    data.global_state_data.cur_game_state = Some(state);

    for player in &mut data.player_state_data {
        player
            .game_state_data
            .push(GameStateEntry::new(ready_key(&step), true));
    }
    let ctx = StepContext {
        stage: &stage,
        game_data: &data,
        player: &player,
    };
    let report = interpreter.handle_player_state(&ctx, &step).unwrap().unwrap();
    assert_eq!(report.effects, vec![StepEffect::GameState(None)]);
    assert_eq!(report.outcome, StepOutcome::Advance(StepId::new("after")));
}

#[test]
fn resume_of_input_step_does_not_repeat_the_prompt() {
    let ask = with_input(input_step("ask", "ideas"), |input| {
        input.require_input_type = RequireInputType::AllUserResponsesRequiredFreeForAll;
    });
    let stage = stage(vec![Flow::new(
        "f1",
        vec![ask, DiscussionStep::new("next", StepKind::system_message("n")).with_last_step()],
    )]);
    let mut data = room(&["p1", "p2"]);
    let mut state = CurGameState::new(GameStatePhase::AllUserResponsesRequiredFreeForAll);
    state.players_left_to_respond = vec![PlayerId::new("p2")];
    data.global_state_data.cur_game_state = Some(state);

    let mut collected = CollectedDiscussionData::new();
    collected.insert("ideas", StateValue::List(vec!["mine".into()]));
    let mut interpreter = DiscussionInterpreter::new();
    interpreter.restore(collected, None);

    let player = owner();
    let ctx = StepContext {
        stage: &stage,
        game_data: &data,
        player: &player,
    };
    let report = interpreter
        .execute_step(&ctx, &StepId::new("ask"), StepEntry::Resume)
        .unwrap();
    assert!(report.effects.is_empty());
    assert_eq!(report.outcome, StepOutcome::AwaitInput);

    assert!(answer(&mut interpreter, &stage, &data, "ask", "p1", "again")
        .unwrap()
        .is_none());
    let report = answer(&mut interpreter, &stage, &data, "ask", "p2", "theirs")
        .unwrap()
        .unwrap();
    assert_eq!(report.outcome, StepOutcome::Advance(StepId::new("next")));
    assert_eq!(
        interpreter.collected().get("ideas"),
        Some(&StateValue::List(vec!["mine".into(), "theirs".into()]))
    );
}

#[test]
fn empty_stage_is_an_error() {
    let stage = stage(Vec::new());
    let data = room(&["p1"]);
    let mut interpreter = DiscussionInterpreter::new();

    let err = run(&mut interpreter, &stage, &data, "anything").unwrap_err();
    assert!(matches!(err, DiscussionError::EmptyStage { .. }));
}
