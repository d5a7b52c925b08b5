//! Safety-gated tools for Warden.
//!
//! Every model-requested action passes through this crate: shell commands are classified
//! by [`classifier`], filesystem targets are checked by [`paths`], risky operations are put
//! to the user by [`permissions`], and everything security-relevant lands in [`audit`].

pub mod audit;
pub mod classifier;
pub mod config;
pub mod context;
pub mod executor;
pub mod file;
pub mod paths;
pub mod permissions;
pub mod policy;
pub mod registry;
pub mod sandbox;
pub mod shell;

pub use audit::{AuditDetails, AuditLogger, AuditRecord, Severity};
pub use classifier::{Classification, CommandClassifier, RiskTier};
pub use config::{AuditConfig, ShellConfig, ToolsConfig};
pub use context::SafetyContext;
pub use executor::{Params, Tool, ToolError, ToolOutput, result_record};
pub use paths::{PathOperation, PathValidator, PathVerdict};
pub use permissions::{
    PermissionError, PermissionManager, PermissionRequest, PromptError, Prompter, Verdict,
};
pub use policy::{PolicyError, SafetyPolicy};
pub use registry::{RegistryError, ToolDef, ToolRegistry};
pub use sandbox::{CommandOutput, CommandRunner, ProcessRunner};
