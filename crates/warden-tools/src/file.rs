use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::audit::{AuditLogger, Severity, details};
use crate::executor::{Params, Tool, ToolError, ToolOutput, deserialize_params};
use crate::paths::{PathOperation, PathValidator, is_within};
use crate::permissions::PermissionManager;
use crate::registry::ToolDef;

const IGNORED_DIRS: &[&str] = &[".git", "target", "node_modules", ".hg", "__pycache__"];
const MAX_GLOB_RESULTS: usize = 500;
const MAX_GREP_RESULTS: usize = 1000;
const PREVIEW_CHARS: usize = 50;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadFileParams {
    /// Absolute or relative path to the file to read
    pub file_path: String,
    /// Line number to start reading from (1-indexed)
    pub offset: Option<usize>,
    /// Number of lines to read (default: all)
    pub limit: Option<usize>,
}

/// Reads a text file with `cat -n` style line numbers. Never asks for approval.
#[derive(Debug)]
pub struct ReadFileTool {
    validator: Arc<PathValidator>,
}

impl ReadFileTool {
    #[must_use]
    pub fn new(validator: Arc<PathValidator>) -> Self {
        Self { validator }
    }

    async fn read(&self, params: &Params) -> Result<ToolOutput, ToolError> {
        let p: ReadFileParams = deserialize_params(params)?;
        let path = self.validator.absolute(&p.file_path);

        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|_| ToolError::NotFound(format!("File not found: {}", p.file_path)))?;
        if !meta.is_file() {
            return Err(ToolError::NotFound(format!(
                "Path is not a file: {}",
                p.file_path
            )));
        }

        let bytes = tokio::fs::read(&path).await?;
        let text = String::from_utf8_lossy(&bytes);
        let start = p.offset.unwrap_or(1).saturating_sub(1);
        let limit = p.limit.unwrap_or(usize::MAX);

        let selected: Vec<String> = text
            .lines()
            .enumerate()
            .skip(start)
            .take(limit)
            .map(|(i, line)| format!("{:>6}\t{line}", i + 1))
            .collect();

        Ok(ToolOutput::new("read_file")
            .with("content", selected.join("\n"))
            .with("path", path.display().to_string())
            .with("lines_read", selected.len()))
    }
}

impl Tool for ReadFileTool {
    fn definition(&self) -> ToolDef {
        ToolDef {
            name: "read_file",
            description: "Read contents of a file from the filesystem, with line numbers",
            schema: schemars::schema_for!(ReadFileParams),
        }
    }

    fn execute<'a>(&'a self, params: &'a Params) -> BoxFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(self.read(params))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GlobParams {
    /// Glob pattern such as `**/*.rs`
    pub pattern: String,
    /// Directory to search in (default: working directory)
    pub path: Option<String>,
}

/// Finds files by glob pattern, newest first.
#[derive(Debug)]
pub struct GlobTool {
    validator: Arc<PathValidator>,
}

impl GlobTool {
    #[must_use]
    pub fn new(validator: Arc<PathValidator>) -> Self {
        Self { validator }
    }

    async fn find(&self, params: &Params) -> Result<ToolOutput, ToolError> {
        let p: GlobParams = deserialize_params(params)?;
        let root = self.validator.absolute(p.path.as_deref().unwrap_or("."));

        let (full_pattern, scope) = if Path::new(&p.pattern).is_absolute() {
            (p.pattern.clone(), None)
        } else {
            if !root.is_dir() {
                return Err(ToolError::NotFound(format!(
                    "Directory not found: {}",
                    root.display()
                )));
            }
            let escaped = glob::Pattern::escape(&root.to_string_lossy());
            (format!("{escaped}/{}", p.pattern), Some(root))
        };

        let (files, truncated) =
            tokio::task::spawn_blocking(move || glob_sorted(&full_pattern, scope.as_deref()))
                .await
                .map_err(|e| ToolError::Execution(std::io::Error::other(e)))??;

        Ok(ToolOutput::new("glob")
            .with("count", files.len())
            .with("files", files)
            .with("pattern", p.pattern)
            .with("truncated", truncated))
    }
}

impl Tool for GlobTool {
    fn definition(&self) -> ToolDef {
        ToolDef {
            name: "glob",
            description: "Find files matching a glob pattern, most recently modified first",
            schema: schemars::schema_for!(GlobParams),
        }
    }

    fn execute<'a>(&'a self, params: &'a Params) -> BoxFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(self.find(params))
    }
}

fn glob_sorted(pattern: &str, scope: Option<&Path>) -> Result<(Vec<String>, bool), ToolError> {
    let entries = glob::glob(pattern).map_err(|e| ToolError::InvalidParams {
        message: format!("invalid glob pattern: {e}"),
    })?;
    let scope = scope.map(|s| s.canonicalize().unwrap_or_else(|_| s.to_path_buf()));

    let mut found: Vec<(PathBuf, SystemTime)> = entries
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .filter(|p| {
            scope.as_deref().is_none_or(|root| {
                let canonical = p.canonicalize().unwrap_or_else(|_| p.clone());
                is_within(&canonical, root)
            })
        })
        .map(|p| {
            let modified = p
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(SystemTime::UNIX_EPOCH);
            (p, modified)
        })
        .collect();
    found.sort_by(|a, b| b.1.cmp(&a.1));

    let truncated = found.len() > MAX_GLOB_RESULTS;
    let files = found
        .into_iter()
        .take(MAX_GLOB_RESULTS)
        .map(|(p, _)| p.display().to_string())
        .collect();
    Ok((files, truncated))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GrepMode {
    /// Matching lines with file and line number
    Content,
    /// Paths of files containing a match
    #[default]
    FilesWithMatches,
    /// Number of matching lines per file
    Count,
}

impl GrepMode {
    fn as_str(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::FilesWithMatches => "files_with_matches",
            Self::Count => "count",
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GrepParams {
    /// Regex pattern to search for
    pub pattern: String,
    /// File or directory to search in (default: working directory)
    pub path: Option<String>,
    /// Output mode: `content`, `files_with_matches`, or `count`
    #[serde(default)]
    pub output_mode: GrepMode,
    /// Case insensitive search (default: false)
    #[serde(default)]
    pub case_insensitive: bool,
}

/// Regex search over file contents.
#[derive(Debug)]
pub struct GrepTool {
    validator: Arc<PathValidator>,
}

impl GrepTool {
    #[must_use]
    pub fn new(validator: Arc<PathValidator>) -> Self {
        Self { validator }
    }

    async fn search(&self, params: &Params) -> Result<ToolOutput, ToolError> {
        let p: GrepParams = deserialize_params(params)?;
        let root = self.validator.absolute(p.path.as_deref().unwrap_or("."));
        if !root.exists() {
            return Err(ToolError::NotFound(format!(
                "Path not found: {}",
                root.display()
            )));
        }

        let regex = regex::RegexBuilder::new(&p.pattern)
            .case_insensitive(p.case_insensitive)
            .build()
            .map_err(|e| ToolError::InvalidParams {
                message: format!("invalid regex: {e}"),
            })?;

        let mode = p.output_mode;
        let matches = tokio::task::spawn_blocking(move || {
            let mut matches = Vec::new();
            grep_recursive(&root, &regex, mode, &mut matches);
            matches
        })
        .await
        .map_err(|e| ToolError::Execution(std::io::Error::other(e)))?;

        Ok(ToolOutput::new("grep")
            .with("truncated", matches.len() >= MAX_GREP_RESULTS)
            .with("matches", matches)
            .with("pattern", p.pattern)
            .with("output_mode", mode.as_str()))
    }
}

impl Tool for GrepTool {
    fn definition(&self) -> ToolDef {
        ToolDef {
            name: "grep",
            description: "Search file contents using regex patterns",
            schema: schemars::schema_for!(GrepParams),
        }
    }

    fn execute<'a>(&'a self, params: &'a Params) -> BoxFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(self.search(params))
    }
}

fn grep_recursive(path: &Path, regex: &regex::Regex, mode: GrepMode, out: &mut Vec<Value>) {
    if out.len() >= MAX_GREP_RESULTS {
        return;
    }
    if path.is_file() {
        grep_file(path, regex, mode, out);
    } else if path.is_dir() {
        let Ok(entries) = std::fs::read_dir(path) else {
            return;
        };
        let mut children: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        children.sort();
        for child in children {
            let name = child.file_name().and_then(|n| n.to_str());
            if name.is_some_and(|n| n.starts_with('.') || IGNORED_DIRS.contains(&n)) {
                continue;
            }
            grep_recursive(&child, regex, mode, out);
        }
    }
}

fn grep_file(path: &Path, regex: &regex::Regex, mode: GrepMode, out: &mut Vec<Value>) {
    // Unreadable and binary files are skipped.
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let file = path.display().to_string();
    match mode {
        GrepMode::Content => {
            for (i, line) in content.lines().enumerate() {
                if regex.is_match(line) {
                    out.push(json!({"file": file, "line": i + 1, "content": line}));
                    if out.len() >= MAX_GREP_RESULTS {
                        return;
                    }
                }
            }
        }
        GrepMode::Count => {
            let count = content.lines().filter(|l| regex.is_match(l)).count();
            if count > 0 {
                out.push(json!({"file": file, "count": count}));
            }
        }
        GrepMode::FilesWithMatches => {
            if regex.is_match(&content) {
                out.push(Value::String(file));
            }
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteFileParams {
    /// Absolute or relative path to the file
    pub file_path: String,
    /// Full content to write
    pub content: String,
}

/// Creates or overwrites a file. Overwrites and sensitive targets need approval.
#[derive(Debug)]
pub struct WriteFileTool {
    validator: Arc<PathValidator>,
    permissions: Arc<PermissionManager>,
    audit: Arc<AuditLogger>,
}

impl WriteFileTool {
    #[must_use]
    pub fn new(
        validator: Arc<PathValidator>,
        permissions: Arc<PermissionManager>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            validator,
            permissions,
            audit,
        }
    }

    async fn write(&self, params: &Params) -> Result<ToolOutput, ToolError> {
        let p: WriteFileParams = deserialize_params(params)?;
        let path = self.validator.absolute(&p.file_path);
        let display = path.display().to_string();

        let verdict = self.validator.validate(&p.file_path, PathOperation::Write);
        if !verdict.allowed {
            let reason = verdict.warning.unwrap_or_default();
            self.audit
                .log_blocked("write_file", &reason, details([("path", display.as_str())]))
                .await;
            return Err(ToolError::Blocked { reason });
        }

        let exists = tokio::fs::try_exists(&path).await.unwrap_or(false);
        if exists || verdict.warning.is_some() {
            let (operation, risk) = if exists {
                ("overwrite", "medium")
            } else {
                ("create", "low")
            };
            let mut request = details([
                ("path", display.as_str()),
                ("operation", operation),
                ("risk", risk),
            ]);
            if let Some(warning) = &verdict.warning {
                request.insert("warning".into(), warning.clone());
            }
            if !self
                .permissions
                .request("write_file", request)
                .await?
                .is_allowed()
            {
                return Err(ToolError::PermissionDenied {
                    operation: "write_file".into(),
                });
            }
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, &p.content).await?;

        let bytes_written = p.content.len();
        self.audit
            .log_operation(
                "write_file",
                details([
                    ("path", display.as_str()),
                    ("bytes_written", bytes_written.to_string().as_str()),
                ]),
                Severity::Info,
            )
            .await;

        let mut output = ToolOutput::new("write_file")
            .with("path", display)
            .with("bytes_written", bytes_written);
        if let Some(warning) = verdict.warning {
            output = output.with("warning", warning);
        }
        Ok(output)
    }
}

impl Tool for WriteFileTool {
    fn definition(&self) -> ToolDef {
        ToolDef {
            name: "write_file",
            description: "Write content to a file, creating parent directories as needed",
            schema: schemars::schema_for!(WriteFileParams),
        }
    }

    fn execute<'a>(&'a self, params: &'a Params) -> BoxFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(self.write(params))
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EditFileParams {
    /// Absolute or relative path to the file
    pub file_path: String,
    /// Exact text to replace
    pub old_string: String,
    /// Replacement text
    pub new_string: String,
    /// Replace every occurrence instead of only the first (default: false)
    #[serde(default)]
    pub replace_all: bool,
}

/// Exact-string replacement in an existing file. Always asks for approval.
#[derive(Debug)]
pub struct EditFileTool {
    validator: Arc<PathValidator>,
    permissions: Arc<PermissionManager>,
    audit: Arc<AuditLogger>,
}

impl EditFileTool {
    #[must_use]
    pub fn new(
        validator: Arc<PathValidator>,
        permissions: Arc<PermissionManager>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            validator,
            permissions,
            audit,
        }
    }

    async fn edit(&self, params: &Params) -> Result<ToolOutput, ToolError> {
        let p: EditFileParams = deserialize_params(params)?;
        if p.old_string.is_empty() {
            return Err(ToolError::InvalidParams {
                message: "old_string must not be empty".into(),
            });
        }

        let path = self.validator.absolute(&p.file_path);
        let display = path.display().to_string();
        let verdict = self.validator.validate(&p.file_path, PathOperation::Write);
        if !verdict.allowed {
            let reason = verdict.warning.unwrap_or_default();
            self.audit
                .log_blocked("edit_file", &reason, details([("path", display.as_str())]))
                .await;
            return Err(ToolError::Blocked { reason });
        }

        if !path.is_file() {
            return Err(ToolError::NotFound(format!(
                "File not found: {}",
                p.file_path
            )));
        }

        let mut request = details([
            ("path", display.as_str()),
            ("operation", "edit"),
            ("old_string", preview(&p.old_string).as_str()),
            ("new_string", preview(&p.new_string).as_str()),
            ("risk", "medium"),
        ]);
        if let Some(warning) = &verdict.warning {
            request.insert("warning".into(), warning.clone());
        }
        if !self
            .permissions
            .request("edit_file", request)
            .await?
            .is_allowed()
        {
            return Err(ToolError::PermissionDenied {
                operation: "edit_file".into(),
            });
        }

        let content = tokio::fs::read_to_string(&path).await?;
        let occurrences = content.matches(&p.old_string).count();
        if occurrences == 0 {
            return Err(ToolError::NotFound(format!(
                "String not found in file: '{}'",
                preview(&p.old_string)
            )));
        }

        let (updated, replacements) = if p.replace_all {
            (content.replace(&p.old_string, &p.new_string), occurrences)
        } else {
            (content.replacen(&p.old_string, &p.new_string, 1), 1)
        };
        tokio::fs::write(&path, updated).await?;

        self.audit
            .log_operation(
                "edit_file",
                details([
                    ("path", display.as_str()),
                    ("replacements", replacements.to_string().as_str()),
                ]),
                Severity::Info,
            )
            .await;

        let mut output = ToolOutput::new("edit_file")
            .with("path", display)
            .with("replacements", replacements);
        if let Some(warning) = verdict.warning {
            output = output.with("warning", warning);
        }
        Ok(output)
    }
}

impl Tool for EditFileTool {
    fn definition(&self) -> ToolDef {
        ToolDef {
            name: "edit_file",
            description: "Edit an existing file by replacing exact string matches",
            schema: schemars::schema_for!(EditFileParams),
        }
    }

    fn execute<'a>(&'a self, params: &'a Params) -> BoxFuture<'a, Result<ToolOutput, ToolError>> {
        Box::pin(self.edit(params))
    }
}

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    } else {
        text.to_owned()
    }
}
