use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::audit::{AuditLogger, Severity, details};
use crate::classifier::{CommandClassifier, RiskTier};
use crate::config::ShellConfig;
use crate::executor::{Params, Tool, ToolError, ToolOutput, deserialize_params};
use crate::paths::PathValidator;
use crate::permissions::PermissionManager;
use crate::registry::ToolDef;
use crate::sandbox::CommandRunner;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BashParams {
    /// The command to run. It is split into arguments without a shell, so pipes,
    /// redirects and variable expansion are not available.
    pub command: String,
    /// Timeout in seconds (default 30, max 300)
    pub timeout: Option<u64>,
    /// Working directory (default: the session working directory)
    pub cwd: Option<String>,
}

/// Runs commands after classification and, for risky ones, user approval.
pub struct BashTool {
    classifier: Arc<CommandClassifier>,
    permissions: Arc<PermissionManager>,
    audit: Arc<AuditLogger>,
    runner: Arc<dyn CommandRunner>,
    validator: Arc<PathValidator>,
    default_timeout: u64,
    max_timeout: u64,
    output_cap: usize,
}

impl std::fmt::Debug for BashTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BashTool")
            .field("default_timeout", &self.default_timeout)
            .field("max_timeout", &self.max_timeout)
            .field("output_cap", &self.output_cap)
            .finish_non_exhaustive()
    }
}

impl BashTool {
    #[must_use]
    pub fn new(
        classifier: Arc<CommandClassifier>,
        permissions: Arc<PermissionManager>,
        audit: Arc<AuditLogger>,
        runner: Arc<dyn CommandRunner>,
        validator: Arc<PathValidator>,
    ) -> Self {
        let defaults = ShellConfig::default();
        Self {
            classifier,
            permissions,
            audit,
            runner,
            validator,
            default_timeout: defaults.timeout,
            max_timeout: defaults.max_timeout,
            output_cap: defaults.max_output_bytes,
        }
    }

    #[must_use]
    pub fn with_limits(mut self, config: &ShellConfig) -> Self {
        self.max_timeout = config.max_timeout.max(1);
        self.default_timeout = config.timeout.clamp(1, self.max_timeout);
        self.output_cap = config.max_output_bytes;
        self
    }

    fn effective_timeout(&self, requested: Option<u64>) -> Duration {
        let secs = requested
            .unwrap_or(self.default_timeout)
            .clamp(1, self.max_timeout);
        Duration::from_secs(secs)
    }

    fn resolve_cwd(&self, requested: Option<&str>) -> Result<PathBuf, ToolError> {
        let dir = match requested {
            Some(raw) => self.validator.absolute(raw),
            None => self.validator.working_dir().to_path_buf(),
        };
        if dir.is_dir() {
            Ok(dir)
        } else {
            Err(ToolError::NotFound(format!(
                "Working directory not found: {}",
                dir.display()
            )))
        }
    }

    async fn run(&self, params: &Params) -> Result<ToolOutput, ToolError> {
        let p: BashParams = deserialize_params(params)?;
        let command = p.command.trim();

        let classification = self.classifier.classify(command);
        match classification.tier {
            RiskTier::Blocked => {
                tracing::warn!(command, "blocked destructive command");
                self.audit
                    .log_blocked(
                        "bash_command",
                        &classification.message,
                        details([("command", command)]),
                    )
                    .await;
                return Err(ToolError::Blocked {
                    reason: classification.message,
                });
            }
            RiskTier::Risky => {
                let cwd = self.validator.working_dir().display().to_string();
                let request = details([
                    ("command", command),
                    ("risk_level", RiskTier::Risky.as_str()),
                    ("working_directory", p.cwd.as_deref().unwrap_or(cwd.as_str())),
                ]);
                if !self.permissions.request("bash", request).await?.is_allowed() {
                    return Err(ToolError::PermissionDenied {
                        operation: "bash".into(),
                    });
                }
            }
            RiskTier::Safe => {
                tracing::debug!(command, "safe command, no approval needed");
            }
        }

        let cwd = self.resolve_cwd(p.cwd.as_deref())?;
        let timeout = self.effective_timeout(p.timeout);
        self.execute_checked(command, &cwd, timeout, classification.tier)
            .await
    }

    async fn execute_checked(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Duration,
        tier: RiskTier,
    ) -> Result<ToolOutput, ToolError> {
        let start = Instant::now();
        let result = self
            .runner
            .run(command, cwd, timeout, self.output_cap)
            .await;
        let duration_ms = start.elapsed().as_millis().to_string();

        match result {
            Ok(out) => {
                self.audit
                    .log_operation(
                        "bash",
                        details([
                            ("command", command),
                            ("risk_level", tier.as_str()),
                            ("exit_code", out.exit_code.to_string().as_str()),
                            ("duration_ms", duration_ms.as_str()),
                        ]),
                        Severity::Info,
                    )
                    .await;
                Ok(ToolOutput::new("bash")
                    .with("stdout", out.stdout)
                    .with("stderr", out.stderr)
                    .with("returncode", out.exit_code)
                    .with("command", command))
            }
            Err(err) => {
                self.audit
                    .log_operation(
                        "bash",
                        details([
                            ("command", command),
                            ("risk_level", tier.as_str()),
                            ("error", err.to_string().as_str()),
                            ("duration_ms", duration_ms.as_str()),
                        ]),
                        Severity::Warning,
                    )
                    .await;
                Err(err)
            }
        }
    }
}

impl Tool for BashTool {
    fn definition(&self) -> ToolDef {
        ToolDef {
            name: "bash",
            description: "Run a command in the working directory. Destructive commands are \
                          refused; anything not on the read-only allowlist needs user approval",
            schema: schemars::schema_for!(BashParams),
        }
    }

    fn execute<'a>(&'a self, params: &'a Params) -> BoxFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(self.run(params))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::config::AuditConfig;
    use crate::permissions::testing::ScriptedPrompter;
    use crate::policy::SafetyPolicy;
    use crate::sandbox::{CommandOutput, ProcessRunner};

    #[derive(Default)]
    struct RecordingRunner {
        calls: Mutex<Vec<(String, PathBuf, Duration)>>,
    }

    impl CommandRunner for RecordingRunner {
        fn run<'a>(
            &'a self,
            command: &'a str,
            cwd: &'a Path,
            timeout: Duration,
            _output_cap: usize,
        ) -> BoxFuture<'a, Result<CommandOutput, ToolError>> {
            self.calls
                .lock()
                .unwrap()
                .push((command.to_owned(), cwd.to_path_buf(), timeout));
            Box::pin(std::future::ready(Ok(CommandOutput {
                stdout: "ok\n".into(),
                stderr: String::new(),
                exit_code: 0,
            })))
        }
    }

    struct Harness {
        tool: BashTool,
        runner: Arc<RecordingRunner>,
        asked: Arc<Mutex<Vec<String>>>,
    }

    fn harness(dir: &Path, replies: &[&str], audit: AuditLogger) -> Harness {
        let policy = SafetyPolicy::builtin().unwrap();
        let prompter = ScriptedPrompter::new(replies.iter().copied());
        let asked = Arc::clone(&prompter.asked);
        let audit = Arc::new(audit);
        let runner = Arc::new(RecordingRunner::default());
        let tool = BashTool::new(
            Arc::new(CommandClassifier::new(&policy.commands).unwrap()),
            Arc::new(PermissionManager::new(Box::new(prompter), Arc::clone(&audit))),
            audit,
            Arc::clone(&runner) as Arc<dyn CommandRunner>,
            Arc::new(PathValidator::new(&policy.paths, dir)),
        );
        Harness {
            tool,
            runner,
            asked,
        }
    }

    fn cmd(command: &str) -> Params {
        json!({ "command": command }).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn safe_command_runs_without_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path(), &[], AuditLogger::disabled());
        let out = h.tool.execute(&cmd("ls -la")).await.unwrap();
        assert_eq!(out.get("stdout").unwrap(), "ok\n");
        assert_eq!(out.get("returncode").unwrap(), 0);
        assert!(h.asked.lock().unwrap().is_empty());
        let calls = h.runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, dir.path());
        assert_eq!(calls[0].2, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn blocked_command_never_prompts_or_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let audit = AuditLogger::from_config(&AuditConfig {
            enabled: true,
            destination: path.display().to_string(),
        })
        .await
        .unwrap();
        let h = harness(dir.path(), &["y"], audit);

        let err = h.tool.execute(&cmd("rm -rf /")).await.unwrap_err();
        assert!(matches!(err, ToolError::Blocked { .. }));
        assert!(h.asked.lock().unwrap().is_empty());
        assert!(h.runner.calls.lock().unwrap().is_empty());

        let log = std::fs::read_to_string(&path).unwrap();
        let record: crate::audit::AuditRecord =
            serde_json::from_str(log.lines().next().unwrap()).unwrap();
        assert_eq!(record.operation, "blocked:bash_command");
        assert_eq!(record.severity, Severity::Error);
        assert_eq!(record.details["command"], "rm -rf /");
    }

    #[tokio::test]
    async fn always_approval_does_not_unlock_blocked_commands() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path(), &["always"], AuditLogger::disabled());

        h.tool.execute(&cmd("rm notes.txt")).await.unwrap();
        h.tool.execute(&cmd("mv a b")).await.unwrap();
        assert_eq!(h.asked.lock().unwrap().len(), 1);

        let err = h.tool.execute(&cmd(":(){ :|:& };:")).await.unwrap_err();
        assert!(matches!(err, ToolError::Blocked { .. }));
        assert_eq!(h.runner.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn risky_denied_does_not_run() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path(), &["n"], AuditLogger::disabled());
        let err = h.tool.execute(&cmd("rm important.txt")).await.unwrap_err();
        assert_eq!(err.to_string(), "permission denied for bash");
        assert!(h.runner.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn timeout_is_clamped() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path(), &[], AuditLogger::disabled());
        let params = json!({"command": "echo hi", "timeout": 10_000})
            .as_object()
            .cloned()
            .unwrap();
        h.tool.execute(&params).await.unwrap();
        assert_eq!(h.runner.calls.lock().unwrap()[0].2, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn cwd_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path(), &[], AuditLogger::disabled());
        let params = json!({"command": "ls", "cwd": "no/such/dir"})
            .as_object()
            .cloned()
            .unwrap();
        let err = h.tool.execute(&params).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn limits_follow_config() {
        let dir = tempfile::tempdir().unwrap();
        let h = harness(dir.path(), &[], AuditLogger::disabled());
        let tool = h.tool.with_limits(&ShellConfig {
            timeout: 500,
            max_timeout: 120,
            ..ShellConfig::default()
        });
        assert_eq!(tool.effective_timeout(None), Duration::from_secs(120));
        assert_eq!(tool.effective_timeout(Some(0)), Duration::from_secs(1));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn real_process_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let policy = SafetyPolicy::builtin().unwrap();
        let audit = Arc::new(AuditLogger::disabled());
        let tool = BashTool::new(
            Arc::new(CommandClassifier::new(&policy.commands).unwrap()),
            Arc::new(PermissionManager::new(
                Box::new(ScriptedPrompter::default()),
                Arc::clone(&audit),
            )),
            audit,
            Arc::new(ProcessRunner),
            Arc::new(PathValidator::new(&policy.paths, dir.path())),
        );
        let out = tool.execute(&cmd("echo 'hello world'")).await.unwrap();
        assert_eq!(out.get("stdout").unwrap(), "hello world\n");
    }
}
