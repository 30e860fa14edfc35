//! Concert ticket pricing lesson. Linear: no repeated stages.

use arcade_domain::Stage;

use super::{authored_stage, NextStage, StageAdvancer, StageEntry, StageList, WAIT_FOR_SIMULATION};
use crate::use_cases::game_state::GameStateError;

pub const GAME_ID: &str = "concert-ticket-sales";

const INTRO: &str = "64de5488-c851-41b3-8347-18ffa340c753";
const COLLECT_STRATEGY: &str = "e20e0247-03a2-485f-b0be-b12ceb2af8b9";
const UNDERSTANDING_EQUATION: &str = "0d8f3055-373f-4726-9392-b3fd1dac8385";
const SELECT_STRATEGY: &str = "f289f022-3fa7-42a1-9d3d-0642c3015867";
const DETERMINE_BEST_STRATEGY: &str = "80419d6d-1eca-491e-a648-8db3db951c02";
const FINISHED: &str = "d1323982-4f52-491e-b5e0-dbc70250e52b";

const PERSIST_TRUTH: &[&str] = &[
    "understands_algorithm",
    "understands_multiplication",
    "understands_addition",
    "understands_conversion_rate",
    "understands_ticket_prices",
    "best_strategy_found",
];

pub struct ConcertTicketSales;

impl StageAdvancer for ConcertTicketSales {
    fn game_id(&self) -> &'static str {
        GAME_ID
    }

    fn stage_list(&self, authored: &[Stage]) -> Result<StageList, GameStateError> {
        let sequence = [
            ("intro-discussion", Some(INTRO)),
            ("collect-strategy", Some(COLLECT_STRATEGY)),
            ("understanding-equation", Some(UNDERSTANDING_EQUATION)),
            ("select-strategy", Some(SELECT_STRATEGY)),
            (WAIT_FOR_SIMULATION, None),
            ("determine-best-strategy", Some(DETERMINE_BEST_STRATEGY)),
            ("finished", Some(FINISHED)),
        ];

        let mut entries = Vec::with_capacity(sequence.len());
        for (index, (id, client_id)) in sequence.iter().enumerate() {
            let stage = match client_id {
                Some(client_id) => authored_stage(authored, client_id)?,
                None => Stage::simulation(*id),
            };
            let next = sequence
                .get(index + 1)
                .map(|(next, _)| NextStage::Fixed((*next).into()))
                .unwrap_or(NextStage::End);
            entries.push(StageEntry::new(*id, stage, next));
        }
        Ok(StageList::new(entries))
    }

    fn persist_truth_keys(&self) -> &'static [&'static str] {
        PERSIST_TRUTH
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::test_support::authored;
    use arcade_domain::{CollectedDiscussionData, StageListId};

    #[test]
    fn stages_run_in_a_straight_line() {
        let stages = authored(&[
            INTRO,
            COLLECT_STRATEGY,
            UNDERSTANDING_EQUATION,
            SELECT_STRATEGY,
            DETERMINE_BEST_STRATEGY,
            FINISHED,
        ]);
        let list = ConcertTicketSales.stage_list(&stages).unwrap();
        let empty = CollectedDiscussionData::new();

        let mut walked = Vec::new();
        let mut current = list.first().map(|e| e.id.clone());
        while let Some(id) = current {
            let entry = list.get(&id).unwrap();
            walked.push(id.to_string());
            current = entry.next.resolve(&empty);
        }

        assert_eq!(
            walked,
            vec![
                "intro-discussion",
                "collect-strategy",
                "understanding-equation",
                "select-strategy",
                WAIT_FOR_SIMULATION,
                "determine-best-strategy",
                "finished",
            ]
        );
        assert!(!list
            .get(&StageListId::new(WAIT_FOR_SIMULATION))
            .unwrap()
            .stage
            .is_discussion());
    }

    #[test]
    fn needs_every_authored_stage() {
        let stages = authored(&[INTRO, COLLECT_STRATEGY]);
        assert!(matches!(
            ConcertTicketSales.stage_list(&stages),
            Err(GameStateError::MissingStage(_))
        ));
    }
}
