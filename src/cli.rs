use std::io;

use dialoguer::Input;
use futures::future::BoxFuture;
use warden_tools::{PermissionRequest, PromptError, Prompter};

const OPTIONS: &str = "Allow? [y]es once / [n]o / always / never";

/// Terminal approval prompts. Reads run on the blocking pool.
#[derive(Debug, Default)]
pub struct CliPrompter;

impl Prompter for CliPrompter {
    fn ask<'a>(
        &'a self,
        request: &'a PermissionRequest<'a>,
    ) -> BoxFuture<'a, Result<Option<String>, PromptError>> {
        let banner = format!("\n{}", request.render());
        Box::pin(async move {
            tokio::task::spawn_blocking(move || {
                eprintln!("{banner}");
                read_reply()
            })
            .await
            .map_err(|e| PromptError::Other(e.to_string()))?
        })
    }

    fn notify<'a>(&'a self, message: &'a str) -> BoxFuture<'a, ()> {
        Box::pin(async move { eprintln!("{message}") })
    }
}

fn read_reply() -> Result<Option<String>, PromptError> {
    match Input::<String>::new()
        .with_prompt(OPTIONS)
        .allow_empty(true)
        .interact_text()
    {
        Ok(reply) => Ok(Some(reply)),
        Err(dialoguer::Error::IO(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
        Err(dialoguer::Error::IO(e)) => Err(PromptError::Io(e)),
    }
}

/// One line of REPL input.
#[derive(Debug, PartialEq, Eq)]
pub enum ReplInput<'a> {
    Empty,
    Exit,
    Clear,
    Tools,
    Help,
    UnknownCommand(&'a str),
    Query(&'a str),
}

impl<'a> ReplInput<'a> {
    #[must_use]
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Self::Empty;
        }
        if !line.starts_with('/') {
            return Self::Query(line);
        }
        match line {
            "/exit" | "/quit" => Self::Exit,
            "/clear" => Self::Clear,
            "/tools" => Self::Tools,
            "/help" => Self::Help,
            other => Self::UnknownCommand(other),
        }
    }
}

pub const HELP: &str = "\
Commands:
  /tools   list available tools
  /clear   start a new conversation and forget permission decisions
  /exit    leave (also /quit)";

/// Read one REPL line. `Ok(None)` on end of input.
///
/// # Errors
///
/// Returns an error if stdin cannot be read.
pub async fn read_line(prompt: &'static str) -> io::Result<Option<String>> {
    tokio::task::spawn_blocking(move || {
        use std::io::Write as _;

        let mut stdout = io::stdout();
        write!(stdout, "{prompt}")?;
        stdout.flush()?;

        let mut line = String::new();
        if io::stdin().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    })
    .await
    .map_err(io::Error::other)?
}
