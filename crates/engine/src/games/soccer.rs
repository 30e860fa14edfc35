//! Soccer scoring-strategy lesson.

use arcade_domain::{GameStateEntry, Stage};

use super::{apply_keyword_rules, strategy_lesson, KeywordRule, StageAdvancer, StageList, StrategyLessonStages};
use crate::use_cases::game_state::GameStateError;

pub const GAME_ID: &str = "soccer";

const STAGES: StrategyLessonStages = StrategyLessonStages {
    intro: "de0b94b9-1fc2-4ea1-995e-21a75670c16d",
    collect_variables: "86587083-9279-4c27-8470-836f992670fc",
    explain_concepts: "909a0d5a-345d-4f6e-8d9c-2e7f6cfa4714",
    key_concepts_convo: "5421ef02-3cca-4281-a832-69ce040ed848",
    select_strategy: "3095c6cd-d377-4660-aa4d-e79409592210",
    discuss_new_strategy: "9265f1ef-2a2e-4a14-b98f-5bbf6fd879d8",
    discuss_best_strategy: "e11d3273-e0e8-4b15-a5f0-3b80e5665e01",
    finished: "bdf123b5-1fd1-4de9-bc4e-74a53623475a",
};

// Every goal counts once; mentioning the shot type is enough.
const GOAL_VALUES: &[KeywordRule] = &[
    KeywordRule {
        phrase: "free kick",
        evidence: &[],
        key: "Points per free kick",
        value: 1.0,
    },
    KeywordRule {
        phrase: "penalty kick",
        evidence: &[],
        key: "Points per penalty kick",
        value: 1.0,
    },
    KeywordRule {
        phrase: "open play shot",
        evidence: &[],
        key: "Points per open play shot",
        value: 1.0,
    },
];

pub struct Soccer;

impl StageAdvancer for Soccer {
    fn game_id(&self) -> &'static str {
        GAME_ID
    }

    fn stage_list(&self, authored: &[Stage]) -> Result<StageList, GameStateError> {
        strategy_lesson(authored, &STAGES)
    }

    fn keyword_writes(&self, message: &str) -> Vec<GameStateEntry> {
        apply_keyword_rules(GOAL_VALUES, message)
    }
}
