use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LlmError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A tool invocation requested by the model. `arguments` are already decoded.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// One conversation entry.
///
/// Assistant messages may carry tool calls; tool messages carry the id of the call they
/// answer in `tool_call_id`.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub tool_call_id: Option<String>,
}

impl Message {
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::plain(Role::System, text.into())
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::plain(Role::User, text.into())
    }

    #[must_use]
    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
        }
    }

    #[must_use]
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    fn plain(role: Role, text: String) -> Self {
        Self {
            role,
            content: Some(text),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }
}

/// Why the model stopped generating.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Other(String),
}

impl FinishReason {
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Some("stop") => Self::Stop,
            Some("tool_calls") => Self::ToolCalls,
            Some(other) => Self::Other(other.to_owned()),
            None => Self::Other("unknown".into()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatResponse {
    pub message: Message,
    pub finish_reason: FinishReason,
}

impl ChatResponse {
    /// A final text answer.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            message: Message::assistant(Some(content.into()), Vec::new()),
            finish_reason: FinishReason::Stop,
        }
    }

    /// A turn that requests tool execution.
    #[must_use]
    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            message: Message::assistant(None, calls),
            finish_reason: FinishReason::ToolCalls,
        }
    }
}

/// Tool schema as advertised to the model.
#[derive(Clone, Debug, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

pub trait LlmProvider: Send + Sync {
    /// Send the conversation plus tool schemas and return the model's next turn.
    ///
    /// An empty `tools` slice sends no schemas.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider fails to communicate or the response is invalid.
    fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> impl Future<Output = Result<ChatResponse, LlmError>> + Send;

    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finish_reason_parsing() {
        assert_eq!(FinishReason::parse(Some("stop")), FinishReason::Stop);
        assert_eq!(FinishReason::parse(Some("tool_calls")), FinishReason::ToolCalls);
        assert_eq!(
            FinishReason::parse(Some("length")),
            FinishReason::Other("length".into())
        );
        assert_eq!(
            FinishReason::parse(None),
            FinishReason::Other("unknown".into())
        );
    }

    #[test]
    fn constructors_set_roles() {
        assert_eq!(Message::system("s").role, Role::System);
        assert_eq!(Message::user("u").content.as_deref(), Some("u"));
        let tool = Message::tool_result("call_1", "{}");
        assert_eq!(tool.role, Role::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn role_serialization() {
        assert_eq!(serde_json::to_string(&Role::Tool).unwrap(), "\"tool\"");
        assert_eq!(Role::Assistant.as_str(), "assistant");
    }

    #[test]
    fn response_helpers() {
        let r = ChatResponse::text("done");
        assert_eq!(r.finish_reason, FinishReason::Stop);
        assert_eq!(r.message.content.as_deref(), Some("done"));

        let r = ChatResponse::tool_calls(vec![ToolCallRequest {
            id: "1".into(),
            name: "bash".into(),
            arguments: Map::new(),
        }]);
        assert_eq!(r.finish_reason, FinishReason::ToolCalls);
        assert!(r.message.content.is_none());
        assert_eq!(r.message.tool_calls.len(), 1);
    }
}
