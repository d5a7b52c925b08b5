use serde::Deserialize;

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_max_timeout() -> u64 {
    300
}

fn default_max_output_bytes() -> usize {
    100_000
}

fn default_audit_destination() -> String {
    "~/.warden/audit.log".into()
}

/// Top-level configuration for tool execution.
#[derive(Debug, Default, Deserialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Shell limits and policy extensions.
///
/// The `extra_*` lists are appended to the built-in policy. Built-in entries cannot be
/// removed through configuration.
#[derive(Debug, Deserialize)]
pub struct ShellConfig {
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_max_timeout")]
    pub max_timeout: u64,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
    #[serde(default)]
    pub extra_blocked_patterns: Vec<String>,
    #[serde(default)]
    pub extra_safe_prefixes: Vec<String>,
    #[serde(default)]
    pub extra_risky_patterns: Vec<String>,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            max_timeout: default_max_timeout(),
            max_output_bytes: default_max_output_bytes(),
            extra_blocked_patterns: Vec::new(),
            extra_safe_prefixes: Vec::new(),
            extra_risky_patterns: Vec::new(),
        }
    }
}

/// Audit trail destination: a file path (`~/` expanded) or `stdout`.
#[derive(Debug, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_audit_destination")]
    pub destination: String,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            destination: default_audit_destination(),
        }
    }
}
