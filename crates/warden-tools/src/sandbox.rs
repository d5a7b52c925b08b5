use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::executor::ToolError;

pub const TRUNCATION_MARKER: &str = "\n... [output truncated]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code, or `-1` when terminated by a signal.
    pub exit_code: i32,
}

/// Runs an already-approved command line.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(
        &'a self,
        command: &'a str,
        cwd: &'a Path,
        timeout: Duration,
        output_cap: usize,
    ) -> BoxFuture<'a, Result<CommandOutput, ToolError>>;
}

/// Spawns commands directly, without a shell.
///
/// The command line is split into argv with POSIX quoting rules, so `|`, `;`, `>` and
/// `$VAR` reach the program as literal arguments. Each stream is capped independently.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl CommandRunner for ProcessRunner {
    fn run<'a>(
        &'a self,
        command: &'a str,
        cwd: &'a Path,
        timeout: Duration,
        output_cap: usize,
    ) -> BoxFuture<'a, Result<CommandOutput, ToolError>> {
        Box::pin(run_process(command, cwd, timeout, output_cap))
    }
}

/// Split a command line into program and arguments.
///
/// # Errors
///
/// Returns `ToolError::InvalidSyntax` for unbalanced quotes or an empty command.
pub fn tokenize(command: &str) -> Result<Vec<String>, ToolError> {
    let argv = shell_words::split(command).map_err(|e| ToolError::InvalidSyntax {
        message: e.to_string(),
    })?;
    if argv.is_empty() {
        return Err(ToolError::InvalidSyntax {
            message: "empty command".into(),
        });
    }
    Ok(argv)
}

async fn run_process(
    command: &str,
    cwd: &Path,
    timeout: Duration,
    output_cap: usize,
) -> Result<CommandOutput, ToolError> {
    let argv = tokenize(command)?;
    let (program, args) = argv.split_first().ok_or_else(|| ToolError::InvalidSyntax {
        message: "empty command".into(),
    })?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    let mut child = cmd.spawn()?;
    let process_group = child.id();

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout was not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("stderr was not captured"))?;

    let deadline = tokio::time::Instant::now() + timeout;
    let collected = tokio::time::timeout_at(deadline, async {
        // Background descendants would keep the pipes open past the leader's exit.
        let wait_then_reap = async {
            let status = child.wait().await;
            kill_process_group(process_group);
            status
        };
        let (out, err, status) = tokio::join!(
            read_capped(stdout, output_cap),
            read_capped(stderr, output_cap),
            wait_then_reap
        );
        Ok::<_, std::io::Error>((out?, err?, status?))
    })
    .await;

    match collected {
        Ok(result) => {
            let (out, err, status) = result?;
            Ok(CommandOutput {
                stdout: out.into_text(),
                stderr: err.into_text(),
                exit_code: status.code().unwrap_or(-1),
            })
        }
        Err(_) => {
            kill_process_group(process_group);
            if let Err(e) = child.kill().await {
                tracing::warn!("failed to kill timed-out command: {e}");
            }
            Err(ToolError::Timeout {
                timeout_secs: timeout.as_secs(),
            })
        }
    }
}

/// SIGKILL every process left in the command's group. A group that is already gone is fine.
#[cfg(unix)]
fn kill_process_group(process_group: Option<u32>) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Some(pgid) = process_group.and_then(|id| i32::try_from(id).ok()) else {
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => tracing::warn!("failed to kill process group {pgid}: {e}"),
    }
}

#[cfg(not(unix))]
fn kill_process_group(_process_group: Option<u32>) {}

struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Captured {
    fn into_text(self) -> String {
        if !self.truncated {
            return String::from_utf8_lossy(&self.bytes).into_owned();
        }
        // Drop a multi-byte character split by the cap.
        let valid = match std::str::from_utf8(&self.bytes) {
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            _ => self.bytes.len(),
        };
        let mut text = String::from_utf8_lossy(&self.bytes[..valid]).into_owned();
        text.push_str(TRUNCATION_MARKER);
        text
    }
}

/// Read a stream to EOF, keeping at most `cap` bytes. The rest is drained so the child
/// never blocks on a full pipe.
async fn read_capped<R: AsyncRead + Unpin>(mut reader: R, cap: usize) -> std::io::Result<Captured> {
    let mut bytes = Vec::new();
    let mut truncated = false;
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = cap.saturating_sub(bytes.len());
        bytes.extend_from_slice(&buf[..n.min(room)]);
        if n > room {
            truncated = true;
        }
    }
    Ok(Captured { bytes, truncated })
}
