//! OpenAI-compatible chat completions client with function calling.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::LlmError;
use crate::provider::{
    ChatResponse, FinishReason, LlmProvider, Message, ToolCallRequest, ToolDefinition,
};

const PROVIDER: &str = "openai";

#[derive(Clone)]
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl OpenAiProvider {
    /// Build a provider for `{base_url}/chat/completions`.
    ///
    /// # Errors
    ///
    /// Returns `LlmError::Http` if the HTTP client cannot be constructed.
    pub fn new(
        api_key: String,
        mut base_url: String,
        model: String,
        temperature: f32,
        request_timeout: Duration,
    ) -> Result<Self, LlmError> {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            client: crate::http::default_client(request_timeout)?,
            api_key,
            base_url,
            model,
            temperature,
        })
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<ChatCompletion, LlmError> {
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.map_err(LlmError::Http)?;

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited { provider: PROVIDER });
        }

        if !status.is_success() {
            tracing::error!("chat completions error {status}: {text}");
            return Err(LlmError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }
}

impl LlmProvider for OpenAiProvider {
    async fn chat_with_tools(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse, LlmError> {
        let api_messages = convert_messages(messages);
        let api_tools: Vec<ApiTool<'_>> = tools
            .iter()
            .map(|t| ApiTool {
                r#type: "function",
                function: ApiFunction {
                    name: &t.name,
                    description: &t.description,
                    parameters: &t.parameters,
                },
            })
            .collect();

        let body = ChatRequest {
            model: &self.model,
            messages: &api_messages,
            temperature: self.temperature,
            tools: &api_tools,
        };

        let completion = self.send(&body).await?;
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse { provider: PROVIDER })?;

        let calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCallRequest {
                arguments: decode_arguments(&tc.function.name, &tc.function.arguments),
                id: tc.id,
                name: tc.function.name,
            })
            .collect();

        Ok(ChatResponse {
            message: Message::assistant(choice.message.content, calls),
            finish_reason: FinishReason::parse(choice.finish_reason.as_deref()),
        })
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        PROVIDER
    }
}

/// Arguments arrive as a JSON-encoded string. Anything that is not a JSON object decodes
/// to an empty map so the tool reports the missing parameters itself.
fn decode_arguments(tool: &str, raw: &str) -> Map<String, Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            tracing::warn!(tool, "tool call arguments are not a JSON object");
            Map::new()
        }
    }
}

fn convert_messages(messages: &[Message]) -> Vec<ApiMessage<'_>> {
    messages
        .iter()
        .map(|m| ApiMessage {
            role: m.role.as_str(),
            content: m.content.as_deref(),
            tool_calls: if m.tool_calls.is_empty() {
                None
            } else {
                Some(
                    m.tool_calls
                        .iter()
                        .map(|tc| ApiToolCallOut {
                            id: &tc.id,
                            r#type: "function",
                            function: ApiFunctionCall {
                                name: &tc.name,
                                arguments: Value::Object(tc.arguments.clone()).to_string(),
                            },
                        })
                        .collect(),
                )
            },
            tool_call_id: m.tool_call_id.as_deref(),
        })
        .collect()
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage<'a>],
    temperature: f32,
    #[serde(skip_serializing_if = "<[_]>::is_empty")]
    tools: &'a [ApiTool<'a>],
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCallOut<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize)]
struct ApiTool<'a> {
    r#type: &'a str,
    function: ApiFunction<'a>,
}

#[derive(Serialize)]
struct ApiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Serialize)]
struct ApiToolCallOut<'a> {
    id: &'a str,
    r#type: &'a str,
    function: ApiFunctionCall<'a>,
}

#[derive(Serialize)]
struct ApiFunctionCall<'a> {
    name: &'a str,
    arguments: String,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiToolCallFunction,
}

#[derive(Deserialize)]
struct ApiToolCallFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}
