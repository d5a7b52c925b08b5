use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::Serialize;

use crate::policy::{CommandPolicy, PolicyError};

/// Risk tier of a shell command. Ordered from least to most dangerous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTier {
    Safe,
    Risky,
    Blocked,
}

impl RiskTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Safe => "safe",
            Self::Risky => "risky",
            Self::Blocked => "blocked",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub tier: RiskTier,
    pub message: String,
}

#[derive(Debug)]
struct CompiledPattern {
    source: String,
    description: String,
    regex: Regex,
}

/// Assigns a [`RiskTier`] to command strings.
///
/// Checks run in a fixed order: blocked patterns over the whole command, then the
/// allowlist against the leading segment, then risky substrings. Anything left over
/// is risky. An allowlisted segment carrying one of the unsafe arguments falls through
/// to the later checks.
#[derive(Debug)]
pub struct CommandClassifier {
    blocked: Vec<CompiledPattern>,
    safe_prefixes: Vec<String>,
    safe_exact: Vec<String>,
    unsafe_arguments: Vec<String>,
    risky: Vec<String>,
}

impl CommandClassifier {
    /// Compile a classifier from policy data.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError::InvalidPattern` if any blocked pattern is not a valid regex.
    pub fn new(policy: &CommandPolicy) -> Result<Self, PolicyError> {
        let blocked = policy
            .blocked
            .iter()
            .map(|b| {
                RegexBuilder::new(&b.pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|regex| CompiledPattern {
                        source: b.pattern.clone(),
                        description: b.description.clone(),
                        regex,
                    })
                    .map_err(|source| PolicyError::InvalidPattern {
                        pattern: b.pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            blocked,
            safe_prefixes: normalized(&policy.safe_prefixes),
            safe_exact: normalized(&policy.safe_exact),
            unsafe_arguments: normalized(&policy.unsafe_arguments),
            risky: policy
                .risky
                .iter()
                .map(|p| p.to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        })
    }

    #[must_use]
    pub fn classify(&self, command: &str) -> Classification {
        let trimmed = command.trim();

        if let Some(hit) = self.blocked.iter().find(|p| p.regex.is_match(trimmed)) {
            return Classification {
                tier: RiskTier::Blocked,
                message: format!(
                    "Command blocked for safety: '{trimmed}' matches destructive pattern `{}` ({}). \
                     This command cannot be executed.",
                    hit.source, hit.description
                ),
            };
        }

        let lowered = trimmed.to_lowercase();
        if self.is_allowlisted(leading_segment(&lowered)) {
            return Classification {
                tier: RiskTier::Safe,
                message: String::new(),
            };
        }

        if let Some(hit) = self.risky.iter().find(|p| lowered.contains(p.as_str())) {
            return Classification {
                tier: RiskTier::Risky,
                message: format!("command contains risky pattern '{hit}'"),
            };
        }

        Classification {
            tier: RiskTier::Risky,
            message: "unrecognized command requires approval".into(),
        }
    }

    fn is_allowlisted(&self, segment: &str) -> bool {
        let words: Vec<&str> = segment.split_whitespace().collect();
        let voided = words.iter().any(|word| {
            let flag = word.split_once('=').map_or(*word, |(flag, _)| flag);
            self.unsafe_arguments.iter().any(|a| a == flag)
        });
        if voided {
            return false;
        }
        let canonical = words.join(" ");
        self.safe_exact.contains(&canonical)
            || self
                .safe_prefixes
                .iter()
                .any(|prefix| starts_with_words(&canonical, prefix))
    }
}

fn normalized(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .map(|e| e.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Text before the first `|`, `&&`, or `;`, trimmed.
#[must_use]
pub fn leading_segment(command: &str) -> &str {
    let end = [command.find('|'), command.find("&&"), command.find(';')]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(command.len());
    command[..end].trim()
}

/// Prefix match that only succeeds at a word boundary, so `ls` covers `ls -la` but not `lsof`.
fn starts_with_words(segment: &str, prefix: &str) -> bool {
    segment
        .strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}
