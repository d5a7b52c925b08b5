//! Safety policy data: destructive patterns, allowlisted prefixes, protected directories.
//!
//! The built-in policy ships as `policy/default.toml` and is embedded at compile time.
//! User configuration extends it; it never shrinks it.

use serde::Deserialize;

use crate::config::ShellConfig;

const BUILTIN_POLICY: &str = include_str!("../policy/default.toml");

#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    #[error("failed to parse safety policy: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid blocked pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct SafetyPolicy {
    pub commands: CommandPolicy,
    pub paths: PathPolicy,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommandPolicy {
    #[serde(default)]
    pub blocked: Vec<BlockedPattern>,
    #[serde(default)]
    pub safe_prefixes: Vec<String>,
    #[serde(default)]
    pub safe_exact: Vec<String>,
    #[serde(default)]
    pub unsafe_arguments: Vec<String>,
    #[serde(default)]
    pub risky: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockedPattern {
    pub pattern: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathPolicy {
    #[serde(default)]
    pub protected: Vec<String>,
    #[serde(default)]
    pub protected_aliases: Vec<String>,
    #[serde(default)]
    pub sensitive: Vec<String>,
}

impl SafetyPolicy {
    /// Parse the embedded default policy.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::Parse` if the embedded TOML is malformed.
    pub fn builtin() -> Result<Self, PolicyError> {
        Ok(toml::from_str(BUILTIN_POLICY)?)
    }

    /// Append the user's extra patterns from shell configuration.
    #[must_use]
    pub fn extended_with(mut self, shell: &ShellConfig) -> Self {
        self.commands
            .blocked
            .extend(shell.extra_blocked_patterns.iter().map(|p| BlockedPattern {
                pattern: p.clone(),
                description: "user-configured pattern".into(),
            }));
        self.commands
            .safe_prefixes
            .extend(shell.extra_safe_prefixes.iter().cloned());
        self.commands
            .risky
            .extend(shell.extra_risky_patterns.iter().cloned());
        self
    }
}
