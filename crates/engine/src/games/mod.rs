//! Game definitions: which authored stages each game plays, in what order.

pub mod basketball;
pub mod concert_tickets;
pub mod registry;
pub mod soccer;

use std::sync::Arc;

use arcade_domain::{GameStateEntry, Stage};

pub use registry::{authored_stage, NextStage, StageAdvancer, StageEntry, StageList};

use crate::use_cases::discussion::StageCondition;
use crate::use_cases::game_state::GameStateError;

/// Id of the synthetic simulation stage every game inserts.
pub const WAIT_FOR_SIMULATION: &str = "wait-for-simulation";

/// Look up a game by id.
pub fn for_id(game_id: &str) -> Option<Arc<dyn StageAdvancer>> {
    match game_id {
        basketball::GAME_ID | "new-game" => Some(Arc::new(basketball::Basketball)),
        soccer::GAME_ID => Some(Arc::new(soccer::Soccer)),
        concert_tickets::GAME_ID => Some(Arc::new(concert_tickets::ConcertTicketSales)),
        _ => None,
    }
}

/// Authored stage ids of the shared strategy lesson layout.
pub(crate) struct StrategyLessonStages {
    pub intro: &'static str,
    pub collect_variables: &'static str,
    pub explain_concepts: &'static str,
    pub key_concepts_convo: &'static str,
    pub select_strategy: &'static str,
    pub discuss_new_strategy: &'static str,
    pub discuss_best_strategy: &'static str,
    pub finished: &'static str,
}

/// Intro, variables, concepts (repeated until understood), strategy pick,
/// simulation, then strategy review until the best strategy is found.
pub(crate) fn strategy_lesson(
    authored: &[Stage],
    ids: &StrategyLessonStages,
) -> Result<StageList, GameStateError> {
    let understood = || NextStage::Branch {
        key: "understands_algorithm".into(),
        equals: "true".into(),
        then: "select-strategy".into(),
        otherwise: "key-concepts-convo".into(),
    };
    let reviewed = || NextStage::Branch {
        key: "best_strategy_found".into(),
        equals: "false".into(),
        then: "discuss-best-strategy".into(),
        otherwise: "finished".into(),
    };

    Ok(StageList::new(vec![
        StageEntry::new(
            "intro-discussion",
            authored_stage(authored, ids.intro)?,
            NextStage::Fixed("collect-variables".into()),
        ),
        StageEntry::new(
            "collect-variables",
            authored_stage(authored, ids.collect_variables)?,
            NextStage::Fixed("explain-concepts".into()),
        ),
        StageEntry::new(
            "explain-concepts",
            authored_stage(authored, ids.explain_concepts)?,
            understood(),
        ),
        StageEntry::new(
            "key-concepts-convo",
            authored_stage(authored, ids.key_concepts_convo)?,
            understood(),
        )
        .with_before_start(StageCondition::new("understands_algorithm", "true")),
        StageEntry::new(
            "select-strategy",
            authored_stage(authored, ids.select_strategy)?,
            NextStage::Fixed(WAIT_FOR_SIMULATION.into()),
        ),
        StageEntry::new(
            WAIT_FOR_SIMULATION,
            Stage::simulation(WAIT_FOR_SIMULATION),
            NextStage::Fixed("discuss-new-strategy".into()),
        ),
        StageEntry::new(
            "discuss-new-strategy",
            authored_stage(authored, ids.discuss_new_strategy)?,
            reviewed(),
        ),
        StageEntry::new(
            "discuss-best-strategy",
            authored_stage(authored, ids.discuss_best_strategy)?,
            reviewed(),
        ),
        StageEntry::new(
            "finished",
            authored_stage(authored, ids.finished)?,
            NextStage::End,
        ),
    ]))
}

/// One keyword hook: when `phrase` appears in a lowercased message, write
/// `key` with `value` if any of `evidence` also appears (or always, when
/// `evidence` is empty).
pub(crate) struct KeywordRule {
    pub phrase: &'static str,
    pub evidence: &'static [&'static str],
    pub key: &'static str,
    pub value: f64,
}

pub(crate) fn apply_keyword_rules(rules: &[KeywordRule], message: &str) -> Vec<GameStateEntry> {
    let message = message.to_lowercase();
    rules
        .iter()
        .filter(|rule| message.contains(rule.phrase))
        .filter(|rule| rule.evidence.is_empty() || rule.evidence.iter().any(|e| message.contains(e)))
        .map(|rule| GameStateEntry::new(rule.key, rule.value))
        .collect()
}
