use std::path::PathBuf;
use std::sync::Arc;

use crate::audit::AuditLogger;
use crate::classifier::CommandClassifier;
use crate::config::ShellConfig;
use crate::file::{EditFileTool, GlobTool, GrepTool, ReadFileTool, WriteFileTool};
use crate::paths::PathValidator;
use crate::permissions::PermissionManager;
use crate::policy::{PolicyError, SafetyPolicy};
use crate::registry::{RegistryError, ToolRegistry};
use crate::sandbox::CommandRunner;
use crate::shell::BashTool;

/// Safety services built once per session and shared by every gated tool.
#[derive(Clone)]
pub struct SafetyContext {
    pub classifier: Arc<CommandClassifier>,
    pub validator: Arc<PathValidator>,
    pub permissions: Arc<PermissionManager>,
    pub audit: Arc<AuditLogger>,
    pub runner: Arc<dyn CommandRunner>,
}

impl std::fmt::Debug for SafetyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SafetyContext")
            .field("working_dir", &self.validator.working_dir())
            .finish_non_exhaustive()
    }
}

impl SafetyContext {
    /// Compile the policy and wire the services together.
    ///
    /// # Errors
    ///
    /// Returns `PolicyError` if a blocked pattern fails to compile.
    pub fn new(
        policy: &SafetyPolicy,
        working_dir: impl Into<PathBuf>,
        permissions: Arc<PermissionManager>,
        audit: Arc<AuditLogger>,
        runner: Arc<dyn CommandRunner>,
    ) -> Result<Self, PolicyError> {
        Ok(Self {
            classifier: Arc::new(CommandClassifier::new(&policy.commands)?),
            validator: Arc::new(PathValidator::new(&policy.paths, working_dir)),
            permissions,
            audit,
            runner,
        })
    }

    /// Registry holding every built-in tool: `read_file`, `glob`, `grep`, `write_file`,
    /// `edit_file` and `bash`.
    ///
    /// # Errors
    ///
    /// Returns `RegistryError` if two tools share a name.
    pub fn builtin_registry(&self, shell: &ShellConfig) -> Result<ToolRegistry, RegistryError> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(ReadFileTool::new(Arc::clone(&self.validator))))?;
        registry.register(Box::new(GlobTool::new(Arc::clone(&self.validator))))?;
        registry.register(Box::new(GrepTool::new(Arc::clone(&self.validator))))?;
        registry.register(Box::new(WriteFileTool::new(
            Arc::clone(&self.validator),
            Arc::clone(&self.permissions),
            Arc::clone(&self.audit),
        )))?;
        registry.register(Box::new(EditFileTool::new(
            Arc::clone(&self.validator),
            Arc::clone(&self.permissions),
            Arc::clone(&self.audit),
        )))?;
        registry.register(Box::new(
            BashTool::new(
                Arc::clone(&self.classifier),
                Arc::clone(&self.permissions),
                Arc::clone(&self.audit),
                Arc::clone(&self.runner),
                Arc::clone(&self.validator),
            )
            .with_limits(shell),
        ))?;
        Ok(registry)
    }
}
