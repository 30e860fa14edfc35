//! Expected shape of structured (JSON) prompt output.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::template::render_template;
use crate::value::CollectedDiscussionData;
use crate::wire;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JsonFieldType {
    #[default]
    String,
    Object,
    Array,
}

impl JsonFieldType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Object => "object",
            Self::Array => "array",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonResponseField {
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub client_id: String,
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "wire::null_as_default")]
    pub field_type: JsonFieldType,
    #[serde(default, deserialize_with = "wire::null_as_default")]
    pub is_required: bool,
    /// Hint for the model, may contain `{{key}}` placeholders.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<String>,
    #[serde(
        default,
        deserialize_with = "wire::null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub sub_data: Vec<JsonResponseField>,
}

impl JsonResponseField {
    pub fn new(name: impl Into<String>, field_type: JsonFieldType) -> Self {
        Self {
            client_id: String::new(),
            name: name.into(),
            field_type,
            is_required: false,
            additional_info: None,
            sub_data: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = Some(info.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum JsonOutputError {
    #[error("Did not receive valid JSON data: {0}")]
    NotJson(String),
    #[error("Did not receive expected JSON data: response is not an object")]
    NotAnObject,
    #[error("Did not receive expected JSON data: missing required field '{0}'")]
    MissingField(String),
    #[error("Did not receive expected JSON data: field '{field}' should be {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
    },
}

/// Instructions appended to a prompt's response format so the model answers
/// with the expected fields.
pub fn schema_prompt(fields: &[JsonResponseField], data: &CollectedDiscussionData) -> String {
    let mut prompt = String::from(
        "Respond in JSON. Validate that your response is valid JSON. Your JSON must follow this format:\n",
    );
    prompt.push_str("{\n");
    write_fields(&mut prompt, fields, "  ", data);
    prompt.push_str("}\n");
    prompt
}

fn write_fields(out: &mut String, fields: &[JsonResponseField], indent: &str, data: &CollectedDiscussionData) {
    for (index, field) in fields.iter().enumerate() {
        let info = field
            .additional_info
            .as_deref()
            .map(|info| render_template(info, data))
            .filter(|info| !info.is_empty())
            .map(|info| format!("\t// {info}"))
            .unwrap_or_default();

        out.push_str(&format!("{indent}\"{}\": ", field.name));
        if field.field_type == JsonFieldType::Object && !field.sub_data.is_empty() {
            out.push_str(&format!("{{{info}\n"));
            write_fields(out, &field.sub_data, &format!("{indent}  "), data);
            out.push_str(&format!("{indent}}}"));
        } else {
            out.push_str(&format!("\"{}\"{info}", field.field_type.as_str()));
        }
        if index + 1 < fields.len() {
            out.push(',');
        }
        out.push('\n');
    }
}

/// Parse a model response and check it against the expected fields.
pub fn validate_response(
    fields: &[JsonResponseField],
    raw: &str,
) -> Result<Map<String, Value>, JsonOutputError> {
    let parsed: Value =
        serde_json::from_str(strip_code_fence(raw)).map_err(|e| JsonOutputError::NotJson(e.to_string()))?;
    let Value::Object(object) = parsed else {
        return Err(JsonOutputError::NotAnObject);
    };
    check_fields(fields, &object)?;
    Ok(object)
}

fn check_fields(fields: &[JsonResponseField], object: &Map<String, Value>) -> Result<(), JsonOutputError> {
    for field in fields {
        match object.get(&field.name) {
            None | Some(Value::Null) if field.is_required => {
                return Err(JsonOutputError::MissingField(field.name.clone()))
            }
            None | Some(Value::Null) => {}
            Some(value) if !field.field_type.accepts(value) => {
                return Err(JsonOutputError::WrongType {
                    field: field.name.clone(),
                    expected: field.field_type.as_str(),
                })
            }
            Some(Value::Object(nested)) => check_fields(&field.sub_data, nested)?,
            Some(_) => {}
        }
    }
    Ok(())
}

// Models often wrap JSON in a ```json fence despite instructions.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}
