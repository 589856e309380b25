mod frame;

pub use frame::{FrameDecoder, FrameError};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub const ALL: [MessageRole; 3] = [MessageRole::User, MessageRole::Assistant, MessageRole::System];

    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == value)
    }
}

/// Request from client to the relay: the whole conversation so far.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
}

/// One framed unit of model output on the relay's response stream.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Text(String),
    Error(String),
    Finish(FinishMetadata),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinishMetadata {
    pub finish_reason: FinishReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
    Other,
    /// Any reason this version does not know about.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

/// Body of every non-streaming error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ValidationIssue>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Single line suitable for showing to a user.
    pub fn summary(&self) -> String {
        if let Some(message) = &self.message {
            return format!("{}: {}", self.error, message);
        }
        match self.details.as_deref() {
            Some([first, rest @ ..]) if rest.is_empty() => format!("{}: {}", self.error, first),
            Some([first, rest @ ..]) => {
                format!("{}: {} (and {} more)", self.error, first, rest.len())
            }
            _ => self.error.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub path: Vec<PathSegment>,
    pub message: String,
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = self
            .path
            .iter()
            .map(|segment| match segment {
                PathSegment::Key(key) => key.clone(),
                PathSegment::Index(index) => index.to_string(),
            })
            .collect::<Vec<_>>()
            .join(".");
        write!(f, "{} at '{}'", self.message, path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Key(String),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roles_parse_only_known_values() {
        assert_eq!(MessageRole::parse("user"), Some(MessageRole::User));
        assert_eq!(MessageRole::parse("system"), Some(MessageRole::System));
        assert_eq!(MessageRole::parse("User"), None);
        assert_eq!(MessageRole::parse("tool"), None);
    }

    #[test]
    fn validation_issue_path_serializes_as_mixed_array() {
        let issue = ValidationIssue {
            path: vec!["messages".into(), 2.into(), "role".into()],
            message: "Invalid enum value".to_string(),
        };
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["path"], serde_json::json!(["messages", 2, "role"]));
        assert_eq!(issue.to_string(), "Invalid enum value at 'messages.2.role'");
    }

    #[test]
    fn error_body_summary_prefers_message_then_details() {
        let provider = ErrorBody {
            error: "Internal server error".to_string(),
            details: None,
            message: Some("request timed out after 30s".to_string()),
        };
        assert_eq!(provider.summary(), "Internal server error: request timed out after 30s");

        let body: ErrorBody = serde_json::from_str(
            r#"{"error":"Invalid request format","details":[
                {"path":["messages"],"message":"Expected array, received string"},
                {"path":["x"],"message":"other"}]}"#,
        )
        .unwrap();
        assert_eq!(
            body.summary(),
            "Invalid request format: Expected array, received string at 'messages' (and 1 more)"
        );
    }
}
