//! Structural validation of `POST /api/chat` bodies.
//!
//! Validation walks the raw JSON instead of deserializing straight into
//! `ChatRequest` so that every bad field is reported, not just the first.

use serde_json::Value;
use watashi_shared::{ChatMessage, MessageRole, PathSegment, ValidationIssue};

/// Parse and validate a request body into a conversation.
pub fn parse_request(body: &[u8]) -> Result<Vec<ChatMessage>, Vec<ValidationIssue>> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        vec![ValidationIssue {
            path: Vec::new(),
            message: format!("Malformed JSON: {e}"),
        }]
    })?;
    validate_request(&value)
}

pub fn validate_request(value: &Value) -> Result<Vec<ChatMessage>, Vec<ValidationIssue>> {
    let mut issues = Vec::new();

    let Some(object) = value.as_object() else {
        issues.push(expected(Vec::new(), "object", value));
        return Err(issues);
    };

    let messages = match object.get("messages") {
        None => {
            issues.push(ValidationIssue {
                path: vec!["messages".into()],
                message: "Required".to_string(),
            });
            return Err(issues);
        }
        Some(Value::Array(items)) => items,
        Some(other) => {
            issues.push(expected(vec!["messages".into()], "array", other));
            return Err(issues);
        }
    };

    let mut conversation = Vec::with_capacity(messages.len());
    for (index, item) in messages.iter().enumerate() {
        if let Some(message) = validate_message(index, item, &mut issues) {
            conversation.push(message);
        }
    }

    if issues.is_empty() {
        Ok(conversation)
    } else {
        Err(issues)
    }
}

fn validate_message(index: usize, item: &Value, issues: &mut Vec<ValidationIssue>) -> Option<ChatMessage> {
    let base = || vec![PathSegment::from("messages"), PathSegment::from(index)];
    let field = |name: &str| {
        let mut path = base();
        path.push(name.into());
        path
    };

    let Some(object) = item.as_object() else {
        issues.push(expected(base(), "object", item));
        return None;
    };

    let role = match object.get("role") {
        Some(Value::String(raw)) => match MessageRole::parse(raw) {
            Some(role) => Some(role),
            None => {
                issues.push(ValidationIssue {
                    path: field("role"),
                    message: format!(
                        "Invalid enum value. Expected 'user' | 'assistant' | 'system', received '{raw}'"
                    ),
                });
                None
            }
        },
        Some(other) => {
            issues.push(expected(field("role"), "'user' | 'assistant' | 'system'", other));
            None
        }
        None => {
            issues.push(required(field("role")));
            None
        }
    };

    let content = match object.get("content") {
        Some(Value::String(content)) => Some(content.clone()),
        Some(other) => {
            issues.push(expected(field("content"), "string", other));
            None
        }
        None => {
            issues.push(required(field("content")));
            None
        }
    };

    Some(ChatMessage {
        role: role?,
        content: content?,
    })
}

fn required(path: Vec<PathSegment>) -> ValidationIssue {
    ValidationIssue {
        path,
        message: "Required".to_string(),
    }
}

fn expected(path: Vec<PathSegment>, wanted: &str, got: &Value) -> ValidationIssue {
    ValidationIssue {
        path,
        message: format!("Expected {wanted}, received {}", json_kind(got)),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
