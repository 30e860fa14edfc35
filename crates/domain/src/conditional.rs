//! CONDITIONAL step branches.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ids::StepId;
use crate::template::render_template;
use crate::value::{CollectedDiscussionData, StateValue};
use crate::wire;

/// What part of the state value is compared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Checking {
    #[default]
    Value,
    Length,
    Contains,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "==")]
    Equals,
    #[serde(rename = "!=")]
    NotEquals,
    #[serde(rename = ">=")]
    GreaterThanOrEqual,
    #[serde(rename = "<=")]
    LessThanOrEqual,
}

impl Operation {
    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::GreaterThan => ordering == Ordering::Greater,
            Self::LessThan => ordering == Ordering::Less,
            Self::Equals => ordering == Ordering::Equal,
            Self::NotEquals => ordering != Ordering::Equal,
            Self::GreaterThanOrEqual => ordering != Ordering::Less,
            Self::LessThanOrEqual => ordering != Ordering::Greater,
        }
    }
}

/// One branch of a CONDITIONAL step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepConditional {
    pub state_data_key: String,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub checking: Checking,
    pub operation: Operation,
    /// May contain `{{key}}` placeholders.
    #[serde(deserialize_with = "wire::required_string_or_number")]
    pub expected_value: String,
    pub target_step_id: StepId,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConditionError {
    #[error("Could not find state value {0}")]
    MissingKey(String),
    #[error("Expected a string or array for state value {0}")]
    NotMeasurable(String),
    #[error("Expected a number to compare length of {key} against, got '{expected}'")]
    NonNumericExpectation { key: String, expected: String },
}

impl StepConditional {
    /// Evaluate against the read view. The expected value is templated from
    /// the same view first.
    pub fn matches(&self, data: &CollectedDiscussionData) -> Result<bool, ConditionError> {
        let value = data
            .get(&self.state_data_key)
            .ok_or_else(|| ConditionError::MissingKey(self.state_data_key.clone()))?;
        let expected = render_template(&self.expected_value, data);

        match self.checking {
            Checking::Value => Ok(self.operation.holds(compare_loosely(&value.render(), &expected))),
            Checking::Length => {
                let length = value
                    .len()
                    .ok_or_else(|| ConditionError::NotMeasurable(self.state_data_key.clone()))?;
                let target: f64 = expected.trim().parse().map_err(|_| {
                    ConditionError::NonNumericExpectation {
                        key: self.state_data_key.clone(),
                        expected: expected.clone(),
                    }
                })?;
                let ordering = (length as f64).partial_cmp(&target).unwrap_or(Ordering::Less);
                Ok(self.operation.holds(ordering))
            }
            Checking::Contains => Ok(contains(value, &expected)),
        }
    }
}

/// Numbers compare numerically, `true`/`false` compare as booleans, anything
/// else compares as text.
fn compare_loosely(actual: &str, expected: &str) -> Ordering {
    let (a, e) = (actual.trim(), expected.trim());
    if let (Ok(a), Ok(e)) = (a.parse::<f64>(), e.parse::<f64>()) {
        return a.partial_cmp(&e).unwrap_or(Ordering::Less);
    }
    if let (Some(a), Some(e)) = (parse_bool(a), parse_bool(e)) {
        return a.cmp(&e);
    }
    a.cmp(e)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn contains(value: &StateValue, expected: &str) -> bool {
    match value {
        StateValue::List(items) => items.iter().any(|item| item == expected),
        StateValue::Json(serde_json::Value::Array(items)) => items
            .iter()
            .any(|item| StateValue::from_json(item.clone()).render() == expected),
        other => other.render().contains(expected),
    }
}
