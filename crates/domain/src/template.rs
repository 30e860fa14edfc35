//! `{{key}}` / `{{key.path}}` placeholder substitution.

use std::sync::LazyLock;

use regex_lite::{Captures, Regex};
use serde_json::Value;

use crate::value::{render_json, CollectedDiscussionData};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(.*?)\}\}").expect("valid placeholder regex"));

/// Replace every placeholder with the stored value. The template is trimmed
/// first; unknown keys render as an empty string.
pub fn render_template(template: &str, data: &CollectedDiscussionData) -> String {
    PLACEHOLDER
        .replace_all(template.trim(), |caps: &Captures<'_>| {
            lookup_path(data, &caps[1]).unwrap_or_default()
        })
        .into_owned()
}

/// Keys referenced by placeholders, in order of appearance.
pub fn placeholder_keys(template: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(template)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

fn lookup_path(data: &CollectedDiscussionData, path: &str) -> Option<String> {
    let mut segments = path.trim().split('.');
    let root = data.get(segments.next()?)?;

    let rest: Vec<&str> = segments.collect();
    if rest.is_empty() {
        return Some(root.render());
    }

    let mut current = root.to_json();
    for segment in rest {
        current = match current {
            Value::Object(mut map) => map.remove(segment)?,
            Value::Array(mut items) => {
                let index: usize = segment.parse().ok()?;
                if index >= items.len() {
                    return None;
                }
                items.swap_remove(index)
            }
            _ => return None,
        };
    }
    Some(render_json(&current))
}
