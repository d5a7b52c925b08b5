#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] warden_llm::LlmError),

    #[error(transparent)]
    SessionLimit(#[from] warden_llm::RateLimitError),

    #[error(
        "stopped after {iterations} model calls without a final answer; rephrase the request or use /clear to start a new conversation"
    )]
    MaxIterationsExceeded { iterations: usize },
}
