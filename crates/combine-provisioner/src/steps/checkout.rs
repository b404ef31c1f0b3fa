//! Application checkout at the requested branch.

use crate::command::{run_checked, CommandSpec};
use crate::error::StepError;
use crate::step::{names, ProvisionStep, StepContext, StepOutcome};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{info, warn};

/// Clones the downstream application into its install directory.
#[derive(Debug, Clone)]
pub struct ApplicationCheckoutStep {
    repository: String,
    branch: String,
    install_dir: PathBuf,
    timeout_secs: u64,
}

impl ApplicationCheckoutStep {
    pub fn new(
        repository: impl Into<String>,
        branch: impl Into<String>,
        install_dir: impl Into<PathBuf>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            repository: repository.into(),
            branch: branch.into(),
            install_dir: install_dir.into(),
            timeout_secs,
        }
    }

    fn clone_command(&self) -> CommandSpec {
        CommandSpec::new(
            "git",
            [
                "clone".to_string(),
                "--branch".to_string(),
                self.branch.clone(),
                "--depth".to_string(),
                "1".to_string(),
                self.repository.clone(),
                self.install_dir.to_string_lossy().to_string(),
            ],
        )
        .timeout(self.timeout_secs)
    }
}

#[async_trait]
impl ProvisionStep for ApplicationCheckoutStep {
    fn name(&self) -> &str {
        names::CHECKOUT_APPLICATION
    }

    fn describe(&self) -> Vec<String> {
        vec![self.clone_command().display()]
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        if self.install_dir.join(".git").exists() {
            warn!(
                dir = %self.install_dir.display(),
                "Application already checked out, leaving it untouched"
            );
            return Ok(StepOutcome::AlreadyPresent(format!(
                "{} already checked out",
                self.install_dir.display()
            )));
        }

        run_checked(ctx.executor.as_ref(), &self.clone_command()).await?;

        info!(branch = %self.branch, dir = %self.install_dir.display(), "Application checked out");
        Ok(StepOutcome::Applied(format!(
            "cloned {}@{} into {}",
            self.repository,
            self.branch,
            self.install_dir.display()
        )))
    }
}
