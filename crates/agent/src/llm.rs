use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use actgate_core::domain::action::{ActionRequest, ActionType};

#[derive(Debug, Error, PartialEq)]
pub enum ToolCallError {
    #[error("tool call has no function name")]
    MissingName,
    #[error("tool call arguments are not a JSON object: {0}")]
    InvalidArguments(String),
    #[error("confidence score must be between 0 and 1, got {0}")]
    ConfidenceOutOfRange(f64),
}

/// Function call as emitted by the chat model. Accepts both the flat shape and the
/// `{"function": {...}}` envelope; arguments may be an object or a JSON string.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
    pub confidence: Option<f64>,
}

#[derive(Deserialize)]
struct RawToolCall {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<Value>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    function: Option<Box<RawToolCall>>,
}

impl ToolCall {
    pub fn from_value(value: Value) -> Result<Self, ToolCallError> {
        let mut raw: RawToolCall = serde_json::from_value(value)
            .map_err(|error| ToolCallError::InvalidArguments(error.to_string()))?;
        let confidence = raw.confidence;
        let inner = match raw.function.take() {
            Some(function) => *function,
            None => raw,
        };

        let name = inner
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .ok_or(ToolCallError::MissingName)?;
        let arguments = parse_arguments(inner.arguments)?;

        Ok(Self { name, arguments, confidence: confidence.or(inner.confidence) })
    }

    pub fn into_request(self) -> Result<ActionRequest, ToolCallError> {
        let request = ActionRequest::new(ActionType::parse(&self.name), self.arguments);
        match self.confidence {
            Some(score) if !(0.0..=1.0).contains(&score) => {
                Err(ToolCallError::ConfidenceOutOfRange(score))
            }
            Some(score) => Ok(request.with_confidence(score)),
            None => Ok(request),
        }
    }
}

fn parse_arguments(arguments: Option<Value>) -> Result<Map<String, Value>, ToolCallError> {
    match arguments {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map),
        Some(Value::String(raw)) if raw.trim().is_empty() => Ok(Map::new()),
        Some(Value::String(raw)) => match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(ToolCallError::InvalidArguments(other.to_string())),
            Err(error) => Err(ToolCallError::InvalidArguments(error.to_string())),
        },
        Some(other) => Err(ToolCallError::InvalidArguments(other.to_string())),
    }
}
