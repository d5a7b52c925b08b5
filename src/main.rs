mod cli;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use warden_core::config::resolve_config_path;
use warden_core::context::build_system_prompt;
use warden_core::{Agent, AgentError, Config};
use warden_llm::openai::OpenAiProvider;
use warden_llm::{LlmProvider, RateLimiter};
use warden_tools::{AuditLogger, PermissionManager, ProcessRunner, SafetyContext, SafetyPolicy};

use crate::cli::{CliPrompter, HELP, ReplInput};

#[derive(Debug, Parser)]
#[command(name = "warden", version, about = "Coding agent with safety-gated tools")]
struct Args {
    /// Answer a single query and exit. Starts an interactive session when omitted.
    query: Option<String>,

    /// Path to the TOML config file.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Talk to the model without offering any tools.
    #[arg(long)]
    no_tools: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_subscriber();
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref());
    let config = Config::load(&config_path)?;
    tracing::debug!(path = %config_path.display(), "configuration loaded");

    let mut agent = build_agent(&config).await?;

    if let Some(query) = args.query {
        let answer = respond(&mut agent, &query, args.no_tools).await?;
        println!("{answer}");
        return Ok(());
    }

    repl(&mut agent, args.no_tools).await
}

async fn build_agent(config: &Config) -> anyhow::Result<Agent<OpenAiProvider>> {
    let api_key = config.llm.api_key.clone().context(
        "XAI_API_KEY is not set; export it or set api_key under [llm] in the config file",
    )?;
    let working_dir = config.working_dir()?;

    let audit = Arc::new(
        AuditLogger::from_config(&config.tools.audit)
            .await
            .with_context(|| format!("failed to open audit log {}", config.tools.audit.destination))?,
    );
    let permissions = Arc::new(PermissionManager::new(
        Box::new(CliPrompter),
        Arc::clone(&audit),
    ));

    let policy = SafetyPolicy::builtin()
        .context("built-in safety policy is invalid")?
        .extended_with(&config.tools.shell);
    let safety = SafetyContext::new(
        &policy,
        working_dir.clone(),
        Arc::clone(&permissions),
        audit,
        Arc::new(ProcessRunner),
    )
    .context("invalid pattern in [tools.shell] configuration")?;
    let registry = safety.builtin_registry(&config.tools.shell)?;
    let system_prompt = build_system_prompt(&registry, &working_dir);

    let provider = OpenAiProvider::new(
        api_key,
        config.llm.base_url.clone(),
        config.llm.model.clone(),
        config.llm.temperature,
        config.llm.request_timeout(),
    )?;
    tracing::info!(
        model = provider.model(),
        working_dir = %working_dir.display(),
        tools = registry.len(),
        "agent ready"
    );

    Ok(Agent::new(
        provider,
        registry,
        Arc::new(RateLimiter::new(config.llm.rate_limit)),
        permissions,
        system_prompt,
    )
    .with_max_tool_iterations(config.agent.max_tool_iterations))
}

async fn respond<P: LlmProvider>(
    agent: &mut Agent<P>,
    input: &str,
    no_tools: bool,
) -> Result<String, AgentError> {
    if no_tools {
        agent.ask_once(input).await
    } else {
        agent.run(input).await
    }
}

async fn repl<P: LlmProvider>(agent: &mut Agent<P>, no_tools: bool) -> anyhow::Result<()> {
    println!("Warden interactive session. Type /help for commands.");

    while let Some(line) = cli::read_line("> ").await? {
        match ReplInput::parse(&line) {
            ReplInput::Empty => {}
            ReplInput::Exit => break,
            ReplInput::Clear => {
                agent.reset();
                println!("Conversation cleared.");
            }
            ReplInput::Tools => print!("{}", agent.registry().format_listing()),
            ReplInput::Help => println!("{HELP}"),
            ReplInput::UnknownCommand(cmd) => println!("Unknown command {cmd}.\n{HELP}"),
            ReplInput::Query(query) => match respond(agent, query, no_tools).await {
                Ok(answer) => println!("\n{answer}\n"),
                Err(e @ AgentError::SessionLimit(_)) => {
                    return Err(e).context("session ended; restart warden to continue");
                }
                Err(e) => eprintln!("error: {e}"),
            },
        }
    }
    Ok(())
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}
