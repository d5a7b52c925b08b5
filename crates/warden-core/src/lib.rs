//! Conversation loop, system prompt and configuration for Warden.

pub mod agent;
pub mod config;
pub mod context;

pub use agent::{Agent, AgentError};
pub use config::Config;
