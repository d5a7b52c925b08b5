use std::collections::HashMap;
use std::fmt::{self, Write as _};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::BoxFuture;

use crate::audit::{AuditDetails, AuditLogger};

/// Final outcome of an approval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Allow,
    Deny,
}

impl Verdict {
    #[must_use]
    pub fn is_allowed(self) -> bool {
        self == Self::Allow
    }
}

/// Accepted replies to an approval prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
    Always,
    Never,
}

impl Answer {
    /// Parse a reply. Only the exact tokens `y`, `n`, `always`, `never` are accepted,
    /// ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "y" => Some(Self::Yes),
            "n" => Some(Self::No),
            "always" => Some(Self::Always),
            "never" => Some(Self::Never),
            _ => None,
        }
    }
}

/// What the user is being asked to approve.
#[derive(Debug, Clone, Copy)]
pub struct PermissionRequest<'a> {
    pub operation_kind: &'a str,
    pub details: &'a AuditDetails,
}

impl PermissionRequest<'_> {
    /// Banner shown above the approval prompt: the upper-cased kind, then one
    /// indented line per detail.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = format!(
            "PERMISSION REQUIRED: {}",
            self.operation_kind.to_uppercase()
        );
        for (key, value) in self.details {
            let _ = write!(out, "\n  {key}: {value}");
        }
        out
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("prompt I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("prompt failed: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PermissionError {
    #[error("failed to read approval: {0}")]
    Prompt(#[from] PromptError),
}

/// Interactive side of the approval flow.
pub trait Prompter: Send + Sync {
    /// Show the request and read one reply. `Ok(None)` means the input stream is closed.
    fn ask<'a>(
        &'a self,
        request: &'a PermissionRequest<'a>,
    ) -> BoxFuture<'a, Result<Option<String>, PromptError>>;

    /// Show an informational line to the user.
    fn notify<'a>(&'a self, message: &'a str) -> BoxFuture<'a, ()>;
}

const INVALID_RESPONSE: &str = "Invalid response. Please enter y, n, always, or never.";

/// Decides whether gated operations may proceed, asking the user when no session
/// decision is cached.
///
/// `always`/`never` replies are cached per operation kind for the rest of the session;
/// `y`/`n` apply to the single request. Every outcome is written to the audit log.
pub struct PermissionManager {
    prompter: Box<dyn Prompter>,
    audit: Arc<AuditLogger>,
    cache: Mutex<HashMap<String, Verdict>>,
}

impl fmt::Debug for PermissionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionManager")
            .field("cache", &self.cache_status())
            .finish_non_exhaustive()
    }
}

impl PermissionManager {
    #[must_use]
    pub fn new(prompter: Box<dyn Prompter>, audit: Arc<AuditLogger>) -> Self {
        Self {
            prompter,
            audit,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Ask for approval of `kind`, consulting the session cache first.
    ///
    /// Invalid replies are rejected and the prompt repeats. A closed input stream denies
    /// this request without caching anything.
    ///
    /// # Errors
    ///
    /// Returns `PermissionError::Prompt` if reading the reply fails.
    pub async fn request(
        &self,
        kind: &str,
        details: AuditDetails,
    ) -> Result<Verdict, PermissionError> {
        if let Some(cached) = self.cached(kind) {
            tracing::debug!(kind, ?cached, "using cached permission decision");
            self.audit
                .log_permission(kind, cached.is_allowed(), with_entry(details, "cached", "true"))
                .await;
            return Ok(cached);
        }

        let request = PermissionRequest {
            operation_kind: kind,
            details: &details,
        };

        loop {
            let Some(reply) = self.prompter.ask(&request).await? else {
                tracing::info!(kind, "approval input closed, denying");
                self.audit
                    .log_permission(kind, false, with_entry(details, "input", "closed"))
                    .await;
                return Ok(Verdict::Deny);
            };

            let (verdict, cache_tag) = match Answer::parse(&reply) {
                Some(Answer::Yes) => (Verdict::Allow, None),
                Some(Answer::No) => (Verdict::Deny, None),
                Some(Answer::Always) => (Verdict::Allow, Some("always")),
                Some(Answer::Never) => (Verdict::Deny, Some("never")),
                None => {
                    self.prompter.notify(INVALID_RESPONSE).await;
                    continue;
                }
            };

            let details = if let Some(tag) = cache_tag {
                self.store(kind, verdict);
                let message = if verdict.is_allowed() {
                    format!("'{kind}' operations will be approved for the rest of this session.")
                } else {
                    format!("'{kind}' operations will be denied for the rest of this session.")
                };
                self.prompter.notify(&message).await;
                with_entry(details, "cached", tag)
            } else {
                details
            };

            self.audit
                .log_permission(kind, verdict.is_allowed(), details)
                .await;
            return Ok(verdict);
        }
    }

    /// Forget all session decisions.
    pub fn reset(&self) {
        self.lock().clear();
        tracing::debug!("permission cache cleared");
    }

    /// Cached decisions, sorted by operation kind.
    #[must_use]
    pub fn cache_status(&self) -> Vec<(String, Verdict)> {
        let mut entries: Vec<_> = self
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    fn cached(&self, kind: &str) -> Option<Verdict> {
        self.lock().get(kind).copied()
    }

    fn store(&self, kind: &str, verdict: Verdict) {
        self.lock().insert(kind.to_owned(), verdict);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Verdict>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn with_entry(mut details: AuditDetails, key: &str, value: &str) -> AuditDetails {
    details.insert(key.to_owned(), value.to_owned());
    details
}
