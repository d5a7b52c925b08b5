use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::policy::PathPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathOperation {
    Read,
    Write,
    Delete,
}

impl PathOperation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
        }
    }

    fn gerund(self) -> &'static str {
        match self {
            Self::Read => "Reading",
            Self::Write => "Writing",
            Self::Delete => "Deleting",
        }
    }
}

impl fmt::Display for PathOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a path check. `warning` explains a denial or flags a sensitive target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathVerdict {
    pub allowed: bool,
    pub warning: Option<String>,
}

impl PathVerdict {
    fn allow() -> Self {
        Self {
            allowed: true,
            warning: None,
        }
    }

    fn deny(message: String) -> Self {
        Self {
            allowed: false,
            warning: Some(message),
        }
    }

    fn warn(message: String) -> Self {
        Self {
            allowed: true,
            warning: Some(message),
        }
    }
}

/// Checks filesystem targets against protected system directories and sensitive names.
///
/// Writes and deletes are checked twice: once on the lexically normalized path and once
/// after symlink resolution, so a link pointing into `/etc` is caught even when the
/// literal path looks harmless.
#[derive(Debug, Clone)]
pub struct PathValidator {
    working_dir: PathBuf,
    protected: Vec<PathBuf>,
    protected_resolved: Vec<PathBuf>,
    sensitive: Vec<String>,
}

impl PathValidator {
    #[must_use]
    pub fn new(policy: &PathPolicy, working_dir: impl Into<PathBuf>) -> Self {
        let protected: Vec<PathBuf> = policy.protected.iter().map(PathBuf::from).collect();
        let protected_resolved = protected
            .iter()
            .cloned()
            .chain(policy.protected_aliases.iter().map(PathBuf::from))
            .collect();
        Self {
            working_dir: working_dir.into(),
            protected,
            protected_resolved,
            sensitive: policy.sensitive.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    #[must_use]
    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    /// Expand `~`, anchor relative paths at the working directory, and normalize `.`/`..`
    /// without touching the filesystem.
    #[must_use]
    pub fn absolute(&self, raw: &str) -> PathBuf {
        let expanded = expand_tilde(raw);
        let anchored = if expanded.is_absolute() {
            expanded
        } else {
            self.working_dir.join(expanded)
        };
        normalize(&anchored)
    }

    #[must_use]
    pub fn validate(&self, raw: &str, operation: PathOperation) -> PathVerdict {
        if operation == PathOperation::Read {
            return PathVerdict::allow();
        }

        let literal = self.absolute(raw);
        if let Some(dir) = find_protected(&literal, &self.protected) {
            return PathVerdict::deny(protected_message(raw, operation, dir));
        }

        let resolved = resolve_symlinks(&literal);
        if let Some(dir) = find_protected(&resolved, &self.protected_resolved) {
            return PathVerdict::deny(protected_message(raw, operation, dir));
        }

        let lowered = resolved.to_string_lossy().to_lowercase();
        if self.sensitive.iter().any(|s| lowered.contains(s.as_str())) {
            let name = resolved
                .file_name()
                .map_or_else(|| raw.to_owned(), |n| n.to_string_lossy().into_owned());
            return PathVerdict::warn(format!(
                "WARNING: {} sensitive file '{name}'. This file may contain credentials or secrets.",
                operation.gerund()
            ));
        }

        PathVerdict::allow()
    }
}

/// Whether `path` is `dir` itself or lies beneath it, compared component-wise.
#[must_use]
pub fn is_within(path: &Path, dir: &Path) -> bool {
    path.starts_with(dir)
}

fn find_protected<'a>(path: &Path, dirs: &'a [PathBuf]) -> Option<&'a Path> {
    dirs.iter()
        .find(|dir| is_within(path, dir))
        .map(PathBuf::as_path)
}

fn protected_message(raw: &str, operation: PathOperation, dir: &Path) -> String {
    format!(
        "Cannot {operation} '{raw}': it is inside the protected system directory {}",
        dir.display()
    )
}

fn expand_tilde(raw: &str) -> PathBuf {
    if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    } else if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Symlink hops followed before giving up on a chain.
const MAX_LINK_DEPTH: usize = 40;

/// Resolve symlinks as far as the filesystem allows.
///
/// An existing path is canonicalized in full. Otherwise the deepest ancestor that exists
/// is resolved and the missing components are re-attached, so `link/new_dir/file` lands
/// where `link` points. A dangling symlink is followed through `read_link` to its target.
fn resolve_symlinks(path: &Path) -> PathBuf {
    resolve_at_depth(path, 0)
}

fn resolve_at_depth(path: &Path, depth: usize) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let mut existing = path;
    let mut missing = Vec::new();
    while existing.symlink_metadata().is_err() {
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                missing.push(name);
                existing = parent;
            }
            _ => return path.to_path_buf(),
        }
    }

    let base = match existing.canonicalize() {
        Ok(canonical) => canonical,
        Err(_) => match std::fs::read_link(existing) {
            Ok(target) if depth < MAX_LINK_DEPTH => {
                let target = match existing.parent() {
                    Some(parent) if target.is_relative() => parent.join(target),
                    _ => target,
                };
                resolve_at_depth(&normalize(&target), depth + 1)
            }
            _ => existing.to_path_buf(),
        },
    };
    missing.iter().rev().fold(base, |acc, name| acc.join(name))
}
