//! Values stored in room state and collected while walking a discussion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DomainError;
use crate::state::GameStateEntry;

/// A single state value.
///
/// Mirrors what the room API accepts in `gameStateData` and what prompt steps
/// can extract from structured output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Bool(bool),
    Number(f64),
    Text(String),
    List(Vec<String>),
    Json(Value),
}

impl StateValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Narrow a JSON value to the most specific variant.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_f64() {
                Some(f) => Self::Number(f),
                None => Self::Json(Value::Number(n)),
            },
            Value::String(s) => Self::Text(s),
            Value::Array(items) if items.iter().all(Value::is_string) => Self::List(
                items
                    .into_iter()
                    .filter_map(|item| match item {
                        Value::String(s) => Some(s),
                        _ => None,
                    })
                    .collect(),
            ),
            other => Self::Json(other),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::Text(s) => Value::String(s.clone()),
            Self::List(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
            Self::Json(v) => v.clone(),
        }
    }

    /// Text form used for templating and string comparisons.
    pub fn render(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => render_number(*n),
            Self::Text(s) => s.clone(),
            Self::List(items) => items.join(","),
            Self::Json(v) => render_json(v),
        }
    }

    /// True for `true` and for the string `"true"`, which is how authored
    /// prompt output usually reports flags.
    pub fn is_true(&self) -> bool {
        match self {
            Self::Bool(b) => *b,
            Self::Text(s) => s == "true",
            Self::Json(Value::Bool(b)) => *b,
            _ => false,
        }
    }

    /// Length of a list or string value.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Text(s) => Some(s.chars().count()),
            Self::List(items) => Some(items.len()),
            Self::Json(Value::Array(items)) => Some(items.len()),
            Self::Json(Value::String(s)) => Some(s.chars().count()),
            _ => None,
        }
    }
}

impl From<&str> for StateValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for StateValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for StateValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<f64> for StateValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<Vec<String>> for StateValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value)
    }
}

pub(crate) fn render_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

pub(crate) fn render_json(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.as_f64().map(render_number).unwrap_or_else(|| n.to_string()),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(render_json).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}

/// Data accumulated while walking one discussion stage.
///
/// Reset when a stage is entered and handed to the stage's finished
/// continuation when a last step resolves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectedDiscussionData(BTreeMap<String, StateValue>);

impl CollectedDiscussionData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&StateValue> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<StateValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StateValue)> {
        self.0.iter()
    }

    /// Move the data out, leaving this map empty.
    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }

    /// Merge the top-level fields of a JSON object.
    pub fn merge_json_object(&mut self, object: serde_json::Map<String, Value>) {
        for (key, value) in object {
            self.0.insert(key, StateValue::from_json(value));
        }
    }

    pub fn to_entries(&self) -> Vec<GameStateEntry> {
        self.0
            .iter()
            .map(|(key, value)| GameStateEntry::new(key.clone(), value.clone()))
            .collect()
    }

    /// Parse the `discussionDataStringified` mirror. An empty string is an
    /// empty map.
    pub fn from_stringified(raw: &str) -> Result<Self, DomainError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw)
            .map_err(|e| DomainError::parse(format!("discussion data: {e}")))
    }

    pub fn to_stringified(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    /// Read view used for templating and conditionals: global state, then the
    /// player's state, then collected data, later layers winning.
    pub fn layered(
        global: &[GameStateEntry],
        player: &[GameStateEntry],
        collected: &CollectedDiscussionData,
    ) -> Self {
        let mut view = BTreeMap::new();
        for entry in global.iter().chain(player.iter()) {
            view.insert(entry.key.clone(), entry.value.clone());
        }
        for (key, value) in collected.iter() {
            view.insert(key.clone(), value.clone());
        }
        Self(view)
    }
}

impl FromIterator<(String, StateValue)> for CollectedDiscussionData {
    fn from_iter<I: IntoIterator<Item = (String, StateValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
