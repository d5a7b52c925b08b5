use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{Value, json};
use warden_core::{Agent, AgentError};
use warden_llm::mock::MockProvider;
use warden_llm::{ChatResponse, RateLimitConfig, RateLimiter, Role, ToolCallRequest};
use warden_tools::{
    AuditConfig, AuditLogger, CommandOutput, CommandRunner, PermissionManager, PermissionRequest,
    PromptError, Prompter, SafetyContext, SafetyPolicy, ShellConfig, ToolError,
};

// -- Test doubles --

#[derive(Clone, Default)]
struct ScriptedPrompter {
    replies: Arc<Mutex<VecDeque<String>>>,
    asked: Arc<Mutex<Vec<String>>>,
}

impl ScriptedPrompter {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.iter().map(|r| (*r).to_owned()).collect())),
            asked: Arc::default(),
        }
    }

    fn asked(&self) -> Vec<String> {
        self.asked.lock().unwrap().clone()
    }
}

impl Prompter for ScriptedPrompter {
    fn ask<'a>(
        &'a self,
        request: &'a PermissionRequest<'a>,
    ) -> BoxFuture<'a, Result<Option<String>, PromptError>> {
        self.asked
            .lock()
            .unwrap()
            .push(request.operation_kind.to_owned());
        let reply = self.replies.lock().unwrap().pop_front();
        Box::pin(async move { Ok(reply) })
    }

    fn notify<'a>(&'a self, _message: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async {})
    }
}

#[derive(Clone, Default)]
struct RecordingRunner {
    commands: Arc<Mutex<Vec<String>>>,
}

impl RecordingRunner {
    fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

impl CommandRunner for RecordingRunner {
    fn run<'a>(
        &'a self,
        command: &'a str,
        _cwd: &'a Path,
        _timeout: Duration,
        _output_cap: usize,
    ) -> BoxFuture<'a, Result<CommandOutput, ToolError>> {
        self.commands.lock().unwrap().push(command.to_owned());
        Box::pin(async {
            Ok(CommandOutput {
                stdout: "ok\n".into(),
                stderr: String::new(),
                exit_code: 0,
            })
        })
    }
}

// -- Harness --

struct Harness {
    agent: Agent<MockProvider>,
    provider: MockProvider,
    prompter: ScriptedPrompter,
    runner: RecordingRunner,
    audit_path: PathBuf,
    dir: tempfile::TempDir,
}

impl Harness {
    async fn new(responses: Vec<ChatResponse>, replies: &[&str]) -> Self {
        Self::with_provider(
            MockProvider::with_responses(responses),
            replies,
            RateLimitConfig::default(),
        )
        .await
    }

    async fn with_provider(
        provider: MockProvider,
        replies: &[&str],
        limits: RateLimitConfig,
    ) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let audit_path = dir.path().join("audit.log");
        let audit = Arc::new(
            AuditLogger::from_config(&AuditConfig {
                enabled: true,
                destination: audit_path.display().to_string(),
            })
            .await
            .unwrap(),
        );
        let prompter = ScriptedPrompter::new(replies);
        let permissions = Arc::new(PermissionManager::new(
            Box::new(prompter.clone()),
            Arc::clone(&audit),
        ));
        let runner = RecordingRunner::default();
        let safety = SafetyContext::new(
            &SafetyPolicy::builtin().unwrap(),
            dir.path(),
            Arc::clone(&permissions),
            audit,
            Arc::new(runner.clone()),
        )
        .unwrap();
        let registry = safety.builtin_registry(&ShellConfig::default()).unwrap();
        let agent = Agent::new(
            provider.clone(),
            registry,
            Arc::new(RateLimiter::new(limits)),
            permissions,
            "You are a test agent.",
        );

        Self {
            agent,
            provider,
            prompter,
            runner,
            audit_path,
            dir,
        }
    }

    fn workdir(&self) -> &Path {
        self.dir.path()
    }

    fn tool_records(&self) -> Vec<Value> {
        self.agent
            .conversation()
            .iter()
            .filter(|m| m.role == Role::Tool)
            .map(|m| serde_json::from_str(m.content.as_deref().unwrap()).unwrap())
            .collect()
    }

    fn audit_records(&self) -> Vec<Value> {
        std::fs::read_to_string(&self.audit_path)
            .unwrap_or_default()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
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

fn bash(id: &str, command: &str) -> ChatResponse {
    ChatResponse::tool_calls(vec![call(id, "bash", json!({"command": command}))])
}

// -- Scenarios --

#[tokio::test]
async fn read_then_answer() {
    let responses = vec![
        ChatResponse::tool_calls(vec![call(
            "c1",
            "read_file",
            json!({"file_path": "README.md"}),
        )]),
        ChatResponse::text("The readme says hello."),
    ];
    let mut h = Harness::new(responses, &[]).await;
    std::fs::write(h.workdir().join("README.md"), "hello\n").unwrap();

    let answer = h.agent.run("Summarize the readme").await.unwrap();

    assert_eq!(answer, "The readme says hello.");
    assert_eq!(h.provider.call_count(), 2);
    let records = h.tool_records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["success"], true);
    assert!(records[0]["content"].as_str().unwrap().contains("hello"));
    assert!(h.prompter.asked().is_empty());
    assert!(h.runner.commands().is_empty());
}

#[tokio::test]
async fn destructive_command_never_reaches_runner() {
    let responses = vec![bash("c1", "rm -rf /"), ChatResponse::text("I cannot do that.")];
    let mut h = Harness::new(responses, &[]).await;

    let answer = h.agent.run("wipe the disk").await.unwrap();

    assert_eq!(answer, "I cannot do that.");
    assert!(h.runner.commands().is_empty());
    assert!(h.prompter.asked().is_empty());

    let records = h.tool_records();
    assert_eq!(records[0]["success"], false);
    assert!(
        records[0]["error"]
            .as_str()
            .unwrap()
            .contains("Command blocked for safety")
    );

    let audit = h.audit_records();
    let blocked = audit
        .iter()
        .find(|r| r["operation"] == "blocked:bash_command")
        .expect("blocked command must be audited");
    assert_eq!(blocked["severity"], "error");
    assert_eq!(blocked["details"]["command"], "rm -rf /");
}

#[tokio::test]
async fn write_into_system_directory_is_denied_without_prompt() {
    let responses = vec![
        ChatResponse::tool_calls(vec![call(
            "c1",
            "write_file",
            json!({"file_path": "/etc/passwd", "content": "root::0:0::/root:/bin/sh\n"}),
        )]),
        ChatResponse::text("That path is protected."),
    ];
    let mut h = Harness::new(responses, &["y"]).await;

    h.agent.run("add a user").await.unwrap();

    assert!(h.prompter.asked().is_empty());
    let records = h.tool_records();
    assert_eq!(records[0]["success"], false);
    assert!(records[0]["error"].as_str().unwrap().contains("/etc"));
    assert!(
        h.audit_records()
            .iter()
            .any(|r| r["operation"] == "blocked:write_file" && r["severity"] == "error")
    );
}

#[tokio::test]
async fn always_approval_covers_later_risky_commands_but_not_blocked_ones() {
    let responses = vec![
        bash("c1", "rm notes.txt"),
        bash("c2", "rm draft.txt"),
        bash("c3", "dd if=/dev/zero of=/dev/sda"),
        ChatResponse::text("Cleaned up."),
    ];
    let mut h = Harness::new(responses, &["always"]).await;

    h.agent.run("clean up").await.unwrap();

    assert_eq!(h.prompter.asked(), ["bash"]);
    assert_eq!(h.runner.commands(), ["rm notes.txt", "rm draft.txt"]);
    let records = h.tool_records();
    assert_eq!(records[0]["success"], true);
    assert_eq!(records[1]["success"], true);
    assert_eq!(records[2]["success"], false);

    let audit = h.audit_records();
    assert!(
        audit
            .iter()
            .any(|r| r["operation"] == "permission_request:bash"
                && r["details"]["cached"] == "true")
    );
}

#[tokio::test]
async fn never_is_remembered_for_the_session() {
    let responses = vec![
        bash("c1", "pip install requests"),
        ChatResponse::text("Skipped."),
        bash("c2", "pip install numpy"),
        ChatResponse::text("Skipped again."),
    ];
    let mut h = Harness::new(responses, &["never"]).await;

    h.agent.run("install requests").await.unwrap();
    h.agent.run("install numpy").await.unwrap();

    assert_eq!(h.prompter.asked(), ["bash"]);
    assert!(h.runner.commands().is_empty());
    for record in h.tool_records() {
        assert_eq!(record["success"], false);
        assert!(record["error"].as_str().unwrap().contains("permission denied"));
    }
}

#[tokio::test]
async fn reset_forgets_cached_approvals() {
    let responses = vec![
        bash("c1", "rm a.txt"),
        ChatResponse::text("done"),
        bash("c2", "rm b.txt"),
        ChatResponse::text("done"),
    ];
    let mut h = Harness::new(responses, &["always", "n"]).await;

    h.agent.run("remove a").await.unwrap();
    h.agent.reset();
    h.agent.run("remove b").await.unwrap();

    assert_eq!(h.prompter.asked(), ["bash", "bash"]);
    assert_eq!(h.runner.commands(), ["rm a.txt"]);
}

#[tokio::test]
async fn safe_commands_run_without_approval() {
    let responses = vec![bash("c1", "git status"), ChatResponse::text("clean")];
    let mut h = Harness::new(responses, &[]).await;

    h.agent.run("status?").await.unwrap();

    assert!(h.prompter.asked().is_empty());
    assert_eq!(h.runner.commands(), ["git status"]);
    assert_eq!(h.tool_records()[0]["returncode"], 0);
}

#[tokio::test]
async fn tool_loop_stops_at_iteration_ceiling() {
    let provider = MockProvider::repeating(bash("loop", "ls"));
    let h = Harness::with_provider(provider, &[], RateLimitConfig::default()).await;
    let mut agent = h.agent.with_max_tool_iterations(4);

    let err = agent.run("keep listing").await.unwrap_err();

    assert!(matches!(err, AgentError::MaxIterationsExceeded { iterations: 4 }));
    assert_eq!(h.provider.call_count(), 4);
    assert_eq!(h.runner.commands().len(), 4);
}

#[tokio::test]
async fn session_limit_ends_the_session() {
    let limits = RateLimitConfig {
        requests_per_minute: 60,
        max_session_calls: 2,
    };
    let provider = MockProvider::repeating(ChatResponse::text("ok"));
    let mut h = Harness::with_provider(provider, &[], limits).await;

    h.agent.run("one").await.unwrap();
    h.agent.run("two").await.unwrap();
    let err = h.agent.run("three").await.unwrap_err();

    assert!(matches!(err, AgentError::SessionLimit(_)));
    assert_eq!(h.provider.call_count(), 2);
}
