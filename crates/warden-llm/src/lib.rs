//! Model access for Warden: the provider trait, an OpenAI-compatible client and the
//! client-side rate limiter.

pub mod error;
pub mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod openai;
pub mod provider;
pub mod rate_limit;

pub use error::LlmError;
pub use provider::{
    ChatResponse, FinishReason, LlmProvider, Message, Role, ToolCallRequest, ToolDefinition,
};
pub use rate_limit::{RateLimitConfig, RateLimitError, RateLimiter};
