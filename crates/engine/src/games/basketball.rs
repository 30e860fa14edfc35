//! Basketball shot-strategy lesson.

use arcade_domain::{GameStateEntry, Stage};

use super::{apply_keyword_rules, strategy_lesson, KeywordRule, StageAdvancer, StageList, StrategyLessonStages};
use crate::use_cases::game_state::GameStateError;

pub const GAME_ID: &str = "basketball";

const STAGES: StrategyLessonStages = StrategyLessonStages {
    intro: "64de5488-c851-41b3-8347-18ffa340c753",
    collect_variables: "e20e0247-03a2-485f-b0be-b12ceb2af8b9",
    explain_concepts: "0d8f3055-373f-4726-9392-b3fd1dac8385",
    key_concepts_convo: "821ea615-c727-4d3d-bd35-30f0ba3866a9",
    select_strategy: "f289f022-3fa7-42a1-9d3d-0642c3015867",
    discuss_new_strategy: "80419d6d-1eca-491e-a648-8db3db951c02",
    discuss_best_strategy: "6edb8b9f-8752-49a7-9327-acb2c80eebb9",
    finished: "d1323982-4f52-491e-b5e0-dbc70250e52b",
};

const PERSIST_TRUTH: &[&str] = &[
    "Points per outside shot",
    "Points per inside shot",
    "Points per mid shot",
    "understands_algorithm",
    "understands_multiplication",
    "understands_addition",
    "understands_success_shots",
    "understands_shot_points",
    "best_strategy_found",
];

const SHOT_VALUES: &[KeywordRule] = &[
    KeywordRule {
        phrase: "outside shot",
        evidence: &["3", "three"],
        key: "Points per outside shot",
        value: 3.0,
    },
    KeywordRule {
        phrase: "inside shot",
        evidence: &["2", "two"],
        key: "Points per inside shot",
        value: 2.0,
    },
    KeywordRule {
        phrase: "mid shot",
        evidence: &["2", "two"],
        key: "Points per mid shot",
        value: 2.0,
    },
];

pub struct Basketball;

impl StageAdvancer for Basketball {
    fn game_id(&self) -> &'static str {
        GAME_ID
    }

    fn stage_list(&self, authored: &[Stage]) -> Result<StageList, GameStateError> {
        strategy_lesson(authored, &STAGES)
    }

    fn persist_truth_keys(&self) -> &'static [&'static str] {
        PERSIST_TRUTH
    }

    fn keyword_writes(&self, message: &str) -> Vec<GameStateEntry> {
        apply_keyword_rules(SHOT_VALUES, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::test_support::authored;
    use crate::games::{NextStage, WAIT_FOR_SIMULATION};
    use arcade_domain::{CollectedDiscussionData, StageListId};

    fn all_stages() -> Vec<Stage> {
        authored(&[
            STAGES.intro,
            STAGES.collect_variables,
            STAGES.explain_concepts,
            STAGES.key_concepts_convo,
            STAGES.select_strategy,
            STAGES.discuss_new_strategy,
            STAGES.discuss_best_strategy,
            STAGES.finished,
        ])
    }

    #[test]
    fn builds_the_full_stage_list() {
        let list = Basketball.stage_list(&all_stages()).unwrap();

        let ids: Vec<&str> = list.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "intro-discussion",
                "collect-variables",
                "explain-concepts",
                "key-concepts-convo",
                "select-strategy",
                WAIT_FOR_SIMULATION,
                "discuss-new-strategy",
                "discuss-best-strategy",
                "finished",
            ]
        );
        assert!(!list.get(&StageListId::new(WAIT_FOR_SIMULATION)).unwrap().stage.is_discussion());
        assert!(list
            .get(&StageListId::new("key-concepts-convo"))
            .unwrap()
            .before_start
            .is_some());
        assert_eq!(list.get(&StageListId::new("finished")).unwrap().next, NextStage::End);
    }

    #[test]
    fn concepts_repeat_until_understood() {
        let list = Basketball.stage_list(&all_stages()).unwrap();
        let explain = list.get(&StageListId::new("explain-concepts")).unwrap();

        let mut data = CollectedDiscussionData::new();
        data.insert("understands_algorithm", "false");
        assert_eq!(explain.next.resolve(&data), Some(StageListId::new("key-concepts-convo")));

        data.insert("understands_algorithm", "true");
        assert_eq!(explain.next.resolve(&data), Some(StageListId::new("select-strategy")));
    }

    #[test]
    fn missing_authored_stage_fails() {
        let mut stages = all_stages();
        stages.retain(|s| s.client_id.as_str() != STAGES.finished);

        let err = Basketball.stage_list(&stages).unwrap_err();
        assert_eq!(err.to_string(), format!("missing stage: {}", STAGES.finished));
    }

    #[test]
    fn shot_values_come_from_free_text() {
        assert_eq!(
            Basketball.keyword_writes("I think a mid shot is worth two"),
            vec![GameStateEntry::new("Points per mid shot", 2.0)]
        );
        assert!(Basketball.keyword_writes("inside shot?").is_empty());
    }
}
