//! Auxiliary tool installation.
//!
//! Each tool is its own step. A failed install aborts the run but does not
//! roll back tools installed before it.

use crate::command::{run_checked, CommandSpec};
use crate::config::{ToolConfig, ToolSource};
use crate::download::download_archive;
use crate::error::StepError;
use crate::step::{names, ProvisionStep, StepContext, StepOutcome};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Placeholder in archive install commands replaced by the downloaded file.
pub const ARCHIVE_PLACEHOLDER: &str = "{archive}";

/// Installs one named tool.
#[derive(Debug, Clone)]
pub struct NamedToolStep {
    name: String,
    tool: ToolConfig,
    pip: String,
    work_dir: PathBuf,
    timeout_secs: u64,
}

impl NamedToolStep {
    /// `tool` must already have build placeholders substituted.
    pub fn new(
        tool: ToolConfig,
        pip: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            name: names::install_tool(&tool.name),
            tool,
            pip: pip.into(),
            work_dir: work_dir.into(),
            timeout_secs,
        }
    }

    fn install_command(&self, archive: Option<&Path>) -> Result<CommandSpec, StepError> {
        let spec = match &self.tool.source {
            ToolSource::Pip { spec } => CommandSpec::new(
                self.pip.clone(),
                ["install", "--no-cache-dir", spec.as_str()],
            ),
            ToolSource::Npm { package } => {
                CommandSpec::new("npm", ["install", "-g", package.as_str()])
            }
            ToolSource::Archive { install, .. } => {
                let archive = archive
                    .map(|p| p.to_string_lossy().to_string())
                    .unwrap_or_else(|| ARCHIVE_PLACEHOLDER.to_string());
                let argv: Vec<String> = install
                    .iter()
                    .map(|arg| arg.replace(ARCHIVE_PLACEHOLDER, &archive))
                    .collect();
                CommandSpec::from_argv(&argv)?
            }
            ToolSource::Command { argv } => CommandSpec::from_argv(argv)?,
        };
        Ok(spec.timeout(self.timeout_secs))
    }

    /// Whether the probe says the tool is already installed.
    async fn already_present(&self, ctx: &StepContext) -> Result<bool, StepError> {
        let Some(probe) = &self.tool.probe else {
            return Ok(false);
        };
        let spec = CommandSpec::from_argv(probe)?.timeout(self.timeout_secs);
        // A missing binary means "not installed", not a failure.
        match ctx.executor.execute(&spec).await {
            Ok(output) => Ok(output.success()),
            Err(StepError::Spawn { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl ProvisionStep for NamedToolStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if let Some(probe) = &self.tool.probe {
            lines.push(format!("skip if `{}` succeeds", probe.join(" ")));
        }
        if let ToolSource::Archive { url, sha256, .. } = &self.tool.source {
            match sha256 {
                Some(digest) => lines.push(format!("download {} (sha256 {})", url, digest)),
                None => lines.push(format!("download {}", url)),
            }
        }
        match self.install_command(None) {
            Ok(spec) => lines.push(spec.display()),
            Err(e) => lines.push(format!("invalid install command: {}", e)),
        }
        lines
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        if self.already_present(ctx).await? {
            info!(tool = %self.tool.name, "Tool already present");
            return Ok(StepOutcome::AlreadyPresent(format!(
                "{} already installed",
                self.tool.name
            )));
        }

        let archive = match &self.tool.source {
            ToolSource::Archive { url, sha256, .. } => Some(
                download_archive(&ctx.http, url, &self.work_dir, sha256.as_deref()).await?,
            ),
            _ => None,
        };

        let command = self.install_command(archive.as_deref())?;
        debug!(tool = %self.tool.name, command = %command, "Installing tool");
        run_checked(ctx.executor.as_ref(), &command).await?;

        info!(tool = %self.tool.name, "Tool installed");
        Ok(StepOutcome::Applied(format!("installed {}", self.tool.name)))
    }
}
