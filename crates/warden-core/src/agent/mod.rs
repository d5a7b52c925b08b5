mod error;
mod tool_execution;

pub use error::AgentError;

use std::sync::Arc;

use tracing::Instrument;
use warden_llm::{
    ChatResponse, FinishReason, LlmProvider, Message, RateLimiter, ToolDefinition,
};
use warden_tools::{PermissionManager, ToolDef, ToolRegistry};

use crate::config::default_max_tool_iterations;

/// Drives one conversation: model call, tool execution, repeat until the model answers.
pub struct Agent<P: LlmProvider> {
    provider: P,
    registry: ToolRegistry,
    tool_defs: Vec<ToolDefinition>,
    rate_limiter: Arc<RateLimiter>,
    permissions: Arc<PermissionManager>,
    messages: Vec<Message>,
    max_tool_iterations: usize,
}

impl<P: LlmProvider> std::fmt::Debug for Agent<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("provider", &self.provider.name())
            .field("tools", &self.registry.names())
            .field("messages", &self.messages.len())
            .field("max_tool_iterations", &self.max_tool_iterations)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> Agent<P> {
    #[must_use]
    pub fn new(
        provider: P,
        registry: ToolRegistry,
        rate_limiter: Arc<RateLimiter>,
        permissions: Arc<PermissionManager>,
        system_prompt: impl Into<String>,
    ) -> Self {
        let tool_defs = registry.schemas().iter().map(tool_def_to_definition).collect();
        Self {
            provider,
            registry,
            tool_defs,
            rate_limiter,
            permissions,
            messages: vec![Message::system(system_prompt)],
            max_tool_iterations: default_max_tool_iterations(),
        }
    }

    #[must_use]
    pub fn with_max_tool_iterations(mut self, max: usize) -> Self {
        self.max_tool_iterations = max;
        self
    }

    #[must_use]
    pub fn conversation(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Answer `input`, executing the tool calls the model requests along the way.
    ///
    /// Tool failures are reported back to the model and never end the loop.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Llm` if the model call fails, `SessionLimit` once the session
    /// call budget is spent, or `MaxIterationsExceeded` if the model is still requesting
    /// tools after `max_tool_iterations` calls.
    pub async fn run(&mut self, input: &str) -> Result<String, AgentError> {
        self.messages.push(Message::user(input));

        for iteration in 0..self.max_tool_iterations {
            let ChatResponse {
                mut message,
                finish_reason,
            } = self.call_llm(&self.tool_defs).await?;

            match finish_reason {
                FinishReason::ToolCalls if !message.tool_calls.is_empty() => {
                    let calls = message.tool_calls.clone();
                    tracing::debug!(iteration, calls = calls.len(), "model requested tools");
                    self.messages.push(message);
                    self.execute_tool_calls(&calls).await;
                }
                FinishReason::Stop => {
                    drop_unanswered_calls(&mut message);
                    let answer = message.content.clone().unwrap_or_default();
                    self.messages.push(message);
                    return Ok(answer);
                }
                other => {
                    tracing::warn!(
                        finish_reason = ?other,
                        iteration,
                        "unexpected model response, treating content as the final answer"
                    );
                    drop_unanswered_calls(&mut message);
                    let answer = message.content.clone().unwrap_or_default();
                    self.messages.push(message);
                    return Ok(answer);
                }
            }
        }

        tracing::warn!(
            iterations = self.max_tool_iterations,
            "tool loop hit the iteration ceiling"
        );
        Err(AgentError::MaxIterationsExceeded {
            iterations: self.max_tool_iterations,
        })
    }

    /// One model call with no tool schemas and no tool execution.
    ///
    /// # Errors
    ///
    /// Returns `AgentError::Llm` or `AgentError::SessionLimit`.
    pub async fn ask_once(&mut self, input: &str) -> Result<String, AgentError> {
        self.messages.push(Message::user(input));
        let ChatResponse { mut message, .. } = self.call_llm(&[]).await?;
        drop_unanswered_calls(&mut message);
        let answer = message.content.clone().unwrap_or_default();
        self.messages.push(message);
        Ok(answer)
    }

    /// Start over: keep only the system prompt and forget cached permission decisions.
    pub fn reset(&mut self) {
        self.messages.truncate(1);
        self.permissions.reset();
        tracing::debug!("conversation reset");
    }

    async fn call_llm(&self, tools: &[ToolDefinition]) -> Result<ChatResponse, AgentError> {
        self.rate_limiter.admit().await?;
        let span = tracing::info_span!(
            "llm_call",
            provider = self.provider.name(),
            messages = self.messages.len(),
            tools = tools.len()
        );
        let response = self
            .provider
            .chat_with_tools(&self.messages, tools)
            .instrument(span)
            .await?;
        Ok(response)
    }
}

/// Tool calls left on a final message would have no matching tool results in history.
fn drop_unanswered_calls(message: &mut Message) {
    if !message.tool_calls.is_empty() {
        tracing::debug!(
            dropped = message.tool_calls.len(),
            "discarding tool calls on a final answer"
        );
        message.tool_calls.clear();
    }
}

#[must_use]
pub fn tool_def_to_definition(def: &ToolDef) -> ToolDefinition {
    ToolDefinition {
        name: def.name.to_owned(),
        description: def.description.to_owned(),
        parameters: def.schema.as_value().clone(),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use futures::future::BoxFuture;
    use serde_json::{Map, Value, json};
    use warden_llm::mock::MockProvider;
    use warden_llm::{RateLimitConfig, Role, ToolCallRequest};
    use warden_tools::{
        AuditLogger, PermissionRequest, ProcessRunner, PromptError, Prompter, SafetyContext,
        SafetyPolicy, ShellConfig,
    };

    use super::*;

    struct ClosedInput;

    impl Prompter for ClosedInput {
        fn ask<'a>(
            &'a self,
            _request: &'a PermissionRequest<'a>,
        ) -> BoxFuture<'a, Result<Option<String>, PromptError>> {
            Box::pin(async { Ok(None) })
        }

        fn notify<'a>(&'a self, _message: &'a str) -> BoxFuture<'a, ()> {
            Box::pin(async {})
        }
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCallRequest {
        let Value::Object(arguments) = args else {
            panic!("arguments must be an object");
        };
        ToolCallRequest {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    fn agent_in(dir: &Path, provider: MockProvider, limits: RateLimitConfig) -> Agent<MockProvider> {
        let audit = Arc::new(AuditLogger::disabled());
        let permissions = Arc::new(PermissionManager::new(
            Box::new(ClosedInput),
            Arc::clone(&audit),
        ));
        let ctx = SafetyContext::new(
            &SafetyPolicy::builtin().unwrap(),
            dir,
            Arc::clone(&permissions),
            audit,
            Arc::new(ProcessRunner),
        )
        .unwrap();
        let registry = ctx.builtin_registry(&ShellConfig::default()).unwrap();
        Agent::new(
            provider,
            registry,
            Arc::new(RateLimiter::new(limits)),
            permissions,
            "system prompt",
        )
    }

    fn agent(provider: MockProvider) -> Agent<MockProvider> {
        agent_in(&std::env::temp_dir(), provider, RateLimitConfig::default())
    }

    fn tool_message(agent: &Agent<MockProvider>) -> Value {
        let msg = agent
            .conversation()
            .iter()
            .find(|m| m.role == Role::Tool)
            .unwrap();
        serde_json::from_str(msg.content.as_deref().unwrap()).unwrap()
    }

    #[tokio::test]
    async fn plain_answer_ends_turn() {
        let mock = MockProvider::with_responses([ChatResponse::text("hello there")]);
        let mut agent = agent(mock.clone());

        let answer = agent.run("hi").await.unwrap();

        assert_eq!(answer, "hello there");
        assert_eq!(mock.call_count(), 1);
        let roles: Vec<_> = agent.conversation().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::System, Role::User, Role::Assistant]);
        assert_eq!(mock.requests()[0].tool_names.len(), 6);
    }

    #[tokio::test]
    async fn tool_results_are_fed_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "alpha\nbeta\n").unwrap();
        let mock = MockProvider::with_responses([
            ChatResponse::tool_calls(vec![call(
                "call_1",
                "read_file",
                json!({"file_path": "notes.txt"}),
            )]),
            ChatResponse::text("two lines"),
        ]);
        let mut agent = agent_in(dir.path(), mock.clone(), RateLimitConfig::default());

        let answer = agent.run("what is in notes.txt?").await.unwrap();

        assert_eq!(answer, "two lines");
        assert_eq!(mock.call_count(), 2);
        let second = &mock.requests()[1].messages;
        let tool_msg = second.last().unwrap();
        assert_eq!(tool_msg.role, Role::Tool);
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_1"));
        let record = tool_message(&agent);
        assert_eq!(record["success"], true);
        assert!(record["content"].as_str().unwrap().contains("beta"));
    }

    #[tokio::test]
    async fn unknown_tool_is_reported_and_loop_continues() {
        let mock = MockProvider::with_responses([
            ChatResponse::tool_calls(vec![call("c1", "teleport", json!({}))]),
            ChatResponse::text("sorry"),
        ]);
        let mut agent = agent(mock.clone());

        assert_eq!(agent.run("go").await.unwrap(), "sorry");
        let record = tool_message(&agent);
        assert_eq!(record["success"], false);
        let error = record["error"].as_str().unwrap();
        assert!(error.contains("unknown tool 'teleport'"));
        assert!(error.contains("read_file"));
    }

    #[tokio::test]
    async fn one_tool_message_per_call_in_order() {
        let mock = MockProvider::with_responses([
            ChatResponse::tool_calls(vec![
                call("a", "teleport", json!({})),
                call("b", "read_file", Value::Object(Map::new())),
            ]),
            ChatResponse::text("done"),
        ]);
        let mut agent = agent(mock);

        agent.run("go").await.unwrap();
        let ids: Vec<_> = agent
            .conversation()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| m.tool_call_id.clone().unwrap())
            .collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[tokio::test]
    async fn iteration_ceiling_is_exact() {
        let mock = MockProvider::repeating(ChatResponse::tool_calls(vec![call(
            "loop",
            "teleport",
            json!({}),
        )]));
        let mut agent = agent(mock.clone()).with_max_tool_iterations(3);

        let err = agent.run("loop forever").await.unwrap_err();

        assert!(matches!(err, AgentError::MaxIterationsExceeded { iterations: 3 }));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn unexpected_finish_reason_returns_content() {
        let mut response = ChatResponse::text("cut off");
        response.finish_reason = FinishReason::Other("length".into());
        let mock = MockProvider::with_responses([response]);
        let mut agent = agent(mock.clone());

        assert_eq!(agent.run("long answer").await.unwrap(), "cut off");
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn tool_calls_without_calls_are_final() {
        let mut response = ChatResponse::tool_calls(Vec::new());
        response.message.content = Some("nothing to do".into());
        let mut agent = agent(MockProvider::with_responses([response]));

        assert_eq!(agent.run("go").await.unwrap(), "nothing to do");
    }

    #[tokio::test]
    async fn session_limit_aborts() {
        let limits = RateLimitConfig {
            requests_per_minute: 60,
            max_session_calls: 1,
        };
        let mock = MockProvider::default();
        let mut agent = agent_in(&std::env::temp_dir(), mock.clone(), limits);

        agent.run("first").await.unwrap();
        let err = agent.run("second").await.unwrap_err();

        assert!(matches!(err, AgentError::SessionLimit(_)));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn provider_failure_surfaces() {
        let mut agent = agent(MockProvider::failing());
        assert!(matches!(agent.run("hi").await, Err(AgentError::Llm(_))));
    }

    #[tokio::test]
    async fn ask_once_sends_no_tools() {
        let mock = MockProvider::with_responses([ChatResponse::text("plain")]);
        let mut agent = agent(mock.clone());

        assert_eq!(agent.ask_once("hi").await.unwrap(), "plain");
        assert!(mock.requests()[0].tool_names.is_empty());
        assert_eq!(agent.conversation().len(), 3);
    }

    #[tokio::test]
    async fn reset_keeps_system_prompt() {
        let mut agent = agent(MockProvider::default());
        agent.run("hi").await.unwrap();
        agent.reset();

        let conversation = agent.conversation();
        assert_eq!(conversation.len(), 1);
        assert_eq!(conversation[0].role, Role::System);
        assert_eq!(conversation[0].content.as_deref(), Some("system prompt"));
    }

    #[test]
    fn definitions_carry_schemas() {
        let agent = agent(MockProvider::default());
        let read = agent
            .registry()
            .schemas()
            .into_iter()
            .find(|d| d.name == "read_file")
            .unwrap();
        let def = tool_def_to_definition(&read);
        assert_eq!(def.name, "read_file");
        assert!(def.parameters["properties"]["file_path"].is_object());
    }
}
