use std::path::PathBuf;
use std::str::FromStr;

use super::Config;

fn parsed<T: FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("ignoring invalid {key} value: {raw}");
            None
        }
    }
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("XAI_API_KEY")
            && !v.trim().is_empty()
        {
            self.llm.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("XAI_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("XAI_MODEL") {
            self.llm.model = v;
        }
        if let Some(t) = parsed::<f32>("XAI_TEMPERATURE") {
            self.llm.temperature = t;
        }
        if let Ok(v) = std::env::var("WARDEN_WORKING_DIR") {
            self.agent.working_dir = Some(PathBuf::from(v));
        }
        if let Some(n) = parsed::<usize>("WARDEN_MAX_TOOL_ITERATIONS") {
            self.agent.max_tool_iterations = n;
        }
        if let Some(n) = parsed::<u32>("WARDEN_RATE_LIMIT_PER_MINUTE") {
            self.llm.rate_limit.requests_per_minute = n;
        }
        if let Some(n) = parsed::<u64>("WARDEN_MAX_SESSION_CALLS") {
            self.llm.rate_limit.max_session_calls = n;
        }
        if let Some(secs) = parsed::<u64>("WARDEN_SHELL_TIMEOUT") {
            self.tools.shell.timeout = secs;
        }
        if let Ok(v) = std::env::var("WARDEN_AUDIT_DESTINATION") {
            self.tools.audit.destination = v;
        }
    }
}
