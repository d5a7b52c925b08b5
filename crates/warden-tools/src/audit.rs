use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::config::AuditConfig;

/// Ordered key/value details attached to an audit record.
pub type AuditDetails = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// One line of the audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: String,
    pub operation: String,
    pub severity: Severity,
    pub details: AuditDetails,
}

impl AuditRecord {
    #[must_use]
    pub fn new(operation: impl Into<String>, severity: Severity, details: AuditDetails) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            operation: operation.into(),
            severity,
            details,
        }
    }
}

/// Build an [`AuditDetails`] map from string pairs.
#[must_use]
pub fn details<const N: usize>(pairs: [(&str, &str); N]) -> AuditDetails {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect()
}

/// Append-only recorder of security-relevant events.
///
/// Writes never fail the operation being audited: I/O errors are reported through
/// `tracing` and swallowed.
#[derive(Debug)]
pub struct AuditLogger {
    destination: AuditDestination,
}

#[derive(Debug)]
enum AuditDestination {
    Disabled,
    Stdout,
    File(tokio::sync::Mutex<tokio::fs::File>),
}

impl AuditLogger {
    /// Create a new `AuditLogger` from config.
    ///
    /// A leading `~/` in the destination expands to the home directory, and missing parent
    /// directories are created.
    ///
    /// # Errors
    ///
    /// Returns an error if a file destination cannot be opened.
    pub async fn from_config(config: &AuditConfig) -> Result<Self, std::io::Error> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        let destination = if config.destination == "stdout" {
            AuditDestination::Stdout
        } else {
            let path = expand_home(&config.destination);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                tokio::fs::create_dir_all(parent).await?;
            }
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?;
            AuditDestination::File(tokio::sync::Mutex::new(file))
        };

        Ok(Self { destination })
    }

    #[must_use]
    pub fn disabled() -> Self {
        Self {
            destination: AuditDestination::Disabled,
        }
    }

    pub async fn record(&self, record: &AuditRecord) {
        let Ok(json) = serde_json::to_string(record) else {
            return;
        };

        match &self.destination {
            AuditDestination::Disabled => {}
            AuditDestination::Stdout => {
                tracing::info!(target: "audit", "{json}");
            }
            AuditDestination::File(file) => {
                let mut f = file.lock().await;
                let line = format!("{json}\n");
                if let Err(e) = f.write_all(line.as_bytes()).await {
                    tracing::error!("failed to write audit log: {e}");
                    return;
                }
                if let Err(e) = f.flush().await {
                    tracing::error!("failed to flush audit log: {e}");
                }
            }
        }
    }

    pub async fn log_operation(&self, operation: &str, details: AuditDetails, severity: Severity) {
        self.record(&AuditRecord::new(operation, severity, details))
            .await;
    }

    /// Record the outcome of an approval request as `permission_request:<kind>`.
    pub async fn log_permission(&self, kind: &str, approved: bool, mut details: AuditDetails) {
        details.insert("approved".into(), approved.to_string());
        let severity = if approved {
            Severity::Info
        } else {
            Severity::Warning
        };
        self.log_operation(&format!("permission_request:{kind}"), details, severity)
            .await;
    }

    /// Record a refused operation as `blocked:<operation>` at error severity.
    pub async fn log_blocked(&self, operation: &str, reason: &str, mut details: AuditDetails) {
        details.insert("reason".into(), reason.to_owned());
        self.log_operation(&format!("blocked:{operation}"), details, Severity::Error)
            .await;
    }
}

fn expand_home(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    PathBuf::from(raw)
}
