//! Stages and flows: the authored step graph.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::ids::{FlowId, StageId, StepId};
use crate::step::DiscussionStep;
use crate::wire;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageType {
    #[default]
    Discussion,
    Simulation,
}

/// An ordered list of steps. Order defines each step's default successor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub client_id: FlowId,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub steps: Vec<DiscussionStep>,
}

impl Flow {
    pub fn new(client_id: impl Into<FlowId>, steps: Vec<DiscussionStep>) -> Self {
        let client_id = client_id.into();
        Self {
            name: client_id.to_string(),
            client_id,
            steps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    #[serde(rename = "_id", default, deserialize_with = "wire::null_as_default")]
    pub id: StageId,
    pub client_id: StageId,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub stage_type: StageType,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub flows_list: Vec<Flow>,
}

/// Structural problem in an authored stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageDefect {
    NoSteps,
    EmptyFlow { flow: FlowId },
    DuplicateStepId { step: StepId },
    DanglingJump { from: StepId, target: StepId },
}

impl fmt::Display for StageDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoSteps => f.write_str("stage has no steps"),
            Self::EmptyFlow { flow } => write!(f, "flow {flow} has no steps"),
            Self::DuplicateStepId { step } => write!(f, "step id {step} is used more than once"),
            Self::DanglingJump { from, target } => {
                write!(f, "step {from} jumps to missing step {target}")
            }
        }
    }
}

impl Stage {
    pub fn discussion(client_id: impl Into<StageId>, flows_list: Vec<Flow>) -> Self {
        let client_id = client_id.into();
        Self {
            id: client_id.clone(),
            client_id,
            stage_type: StageType::Discussion,
            title: String::new(),
            description: String::new(),
            flows_list,
        }
    }

    /// Synthetic stage that waits for players to watch the simulation.
    pub fn simulation(client_id: impl Into<StageId>) -> Self {
        let client_id = client_id.into();
        Self {
            id: client_id.clone(),
            client_id,
            stage_type: StageType::Simulation,
            title: String::new(),
            description: String::new(),
            flows_list: Vec::new(),
        }
    }

    pub fn is_discussion(&self) -> bool {
        self.stage_type == StageType::Discussion
    }

    /// A discussion stage needs at least one step in its first flow.
    pub fn is_runnable(&self) -> bool {
        self.flows_list.first().is_some_and(|flow| !flow.steps.is_empty())
    }

    pub fn steps(&self) -> impl Iterator<Item = &DiscussionStep> {
        self.flows_list.iter().flat_map(|flow| flow.steps.iter())
    }

    pub fn step(&self, step_id: &StepId) -> Option<&DiscussionStep> {
        self.steps().find(|step| &step.step_id == step_id)
    }

    pub fn step_mut(&mut self, step_id: &StepId) -> Option<&mut DiscussionStep> {
        self.flows_list
            .iter_mut()
            .flat_map(|flow| flow.steps.iter_mut())
            .find(|step| &step.step_id == step_id)
    }

    pub fn flow_for_step(&self, step_id: &StepId) -> Option<&Flow> {
        self.flows_list
            .iter()
            .find(|flow| flow.steps.iter().any(|step| &step.step_id == step_id))
    }

    /// The step after `step_id` in its own flow.
    pub fn default_successor(&self, step_id: &StepId) -> Result<&DiscussionStep, DomainError> {
        let flow = self
            .flow_for_step(step_id)
            .ok_or_else(|| DomainError::not_found("Step", step_id.as_str()))?;
        let index = flow
            .steps
            .iter()
            .position(|step| &step.step_id == step_id)
            .ok_or_else(|| DomainError::not_found("Step", step_id.as_str()))?;
        flow.steps.get(index + 1).ok_or_else(|| {
            DomainError::validation(
                "No next step found, maybe you forgot to add a jumpToStepId for the last step in a flow?",
            )
        })
    }

    /// Every structural defect, in authoring order.
    pub fn validate_references(&self) -> Vec<StageDefect> {
        if !self.is_discussion() {
            return Vec::new();
        }

        let mut defects = Vec::new();
        if self.steps().next().is_none() {
            defects.push(StageDefect::NoSteps);
        }
        for flow in &self.flows_list {
            if flow.steps.is_empty() {
                defects.push(StageDefect::EmptyFlow {
                    flow: flow.client_id.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for step in self.steps() {
            if !seen.insert(&step.step_id) {
                defects.push(StageDefect::DuplicateStepId {
                    step: step.step_id.clone(),
                });
            }
        }

        for step in self.steps() {
            for target in step.jump_targets() {
                if self.step(target).is_none() {
                    defects.push(StageDefect::DanglingJump {
                        from: step.step_id.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        defects
    }
}

/// Where play starts inside a stage.
///
/// Discussion stages start at the first step of their first flow. Simulation
/// stages have no steps, so their own client id stands in as the step id.
pub fn first_step_id(stage: &Stage) -> Option<StepId> {
    if stage.is_discussion() {
        stage
            .flows_list
            .first()
            .and_then(|flow| flow.steps.first())
            .map(|step| step.step_id.clone())
    } else {
        Some(StepId::new(stage.client_id.as_str()))
    }
}
