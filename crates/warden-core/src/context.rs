use std::fmt::Write;
use std::path::Path;

use warden_tools::ToolRegistry;

const BASE_PROMPT: &str = "\
You are Warden, a coding assistant running in the user's terminal.\n\
\n\
## Tool Use\n\
Act through the provided tools only. Each call returns a JSON object with \
`success` and either the result fields or an `error` message.\n\
\n\
## Safety\n\
- Shell commands are classified before they run. Read-only commands run directly, \
destructive system commands are always blocked, and everything else needs the \
user's approval.\n\
- Commands run without a shell: pipes, redirects and `&&` are not interpreted.\n\
- Writes and deletes inside protected system directories are refused, including \
through symlinks.\n\
- Files that look like credentials or keys produce a warning and need approval.\n\
- Every blocked action and permission decision is recorded in an audit log.\n\
\n\
If a tool reports that an action was blocked or denied, do not retry it in another \
form. Explain what happened and suggest a safe alternative.\n\
\n\
## Guidelines\n\
- Be concise.\n\
- Read files before editing them.\n\
- Prefer `read_file`, `glob` and `grep` over shell equivalents.\n\
- Do not invent file contents or command output.";

/// System prompt listing the available tools and the working directory.
#[must_use]
pub fn build_system_prompt(registry: &ToolRegistry, working_dir: &Path) -> String {
    let mut prompt = BASE_PROMPT.to_string();

    if !registry.is_empty() {
        prompt.push_str("\n\n## Available Tools\n");
        for def in registry.schemas() {
            let _ = writeln!(prompt, "- {}: {}", def.name, def.description);
        }
    }

    let _ = write!(
        prompt,
        "\n## Environment\nWorking directory: {}",
        working_dir.display()
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_registry_omits_tool_section() {
        let prompt = build_system_prompt(&ToolRegistry::new(), Path::new("/work"));
        assert!(prompt.starts_with("You are Warden"));
        assert!(!prompt.contains("## Available Tools"));
        assert!(prompt.ends_with("Working directory: /work"));
    }
}
