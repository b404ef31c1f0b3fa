//! Operating-system package installation.

use crate::command::{run_checked, CommandSpec};
use crate::error::StepError;
use crate::step::{names, ProvisionStep, StepContext, StepOutcome};
use async_trait::async_trait;
use tracing::info;

/// Installs OS packages with apt.
#[derive(Debug, Clone)]
pub struct SystemPackagesStep {
    packages: Vec<String>,
    timeout_secs: u64,
}

impl SystemPackagesStep {
    pub fn new(packages: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            packages,
            timeout_secs,
        }
    }

    fn commands(&self) -> Vec<CommandSpec> {
        let update = CommandSpec::new("apt-get", ["update"])
            .env("DEBIAN_FRONTEND", "noninteractive")
            .timeout(self.timeout_secs);

        let install = CommandSpec::new(
            "apt-get",
            ["install", "-y", "--no-install-recommends"]
                .into_iter()
                .map(String::from)
                .chain(self.packages.iter().cloned()),
        )
        .env("DEBIAN_FRONTEND", "noninteractive")
        .timeout(self.timeout_secs);

        vec![update, install]
    }
}

#[async_trait]
impl ProvisionStep for SystemPackagesStep {
    fn name(&self) -> &str {
        names::INSTALL_SYSTEM_PACKAGES
    }

    fn describe(&self) -> Vec<String> {
        if self.packages.is_empty() {
            return vec!["(no packages requested)".to_string()];
        }
        self.commands().iter().map(CommandSpec::display).collect()
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        if self.packages.is_empty() {
            return Ok(StepOutcome::AlreadyPresent(
                "no packages requested".to_string(),
            ));
        }

        // apt-get install is a no-op for packages that are already present.
        for command in self.commands() {
            run_checked(ctx.executor.as_ref(), &command).await?;
        }

        info!(count = self.packages.len(), "System packages installed");
        Ok(StepOutcome::Applied(format!(
            "installed {}",
            self.packages.join(" ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::RecordingExecutor;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_update_then_install() {
        let executor = Arc::new(RecordingExecutor::new());
        let ctx = StepContext::new(executor.clone());
        let step = SystemPackagesStep::new(vec!["vim".to_string(), "python3-dev".to_string()], 60);

        let outcome = step.run(&ctx).await.expect("step failed");
        assert!(matches!(outcome, StepOutcome::Applied(_)));

        let lines = executor.command_lines();
        assert_eq!(
            lines,
            vec![
                "DEBIAN_FRONTEND=noninteractive apt-get update",
                "DEBIAN_FRONTEND=noninteractive apt-get install -y --no-install-recommends vim python3-dev",
            ]
        );
    }

    #[tokio::test]
    async fn test_unresolvable_package_fails() {
        let executor = Arc::new(RecordingExecutor::new().fail_when(
            |spec| spec.args.first().map(String::as_str) == Some("install"),
            100,
            "E: Unable to locate package no-such-package",
        ));
        let ctx = StepContext::new(executor.clone());
        let step = SystemPackagesStep::new(vec!["no-such-package".to_string()], 60);

        let err = step.run(&ctx).await.unwrap_err();
        match err {
            StepError::CommandFailed {
                exit_code, output, ..
            } => {
                assert_eq!(exit_code, 100);
                assert!(output.contains("Unable to locate package"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_list_is_noop() {
        let executor = Arc::new(RecordingExecutor::new());
        let ctx = StepContext::new(executor.clone());
        let step = SystemPackagesStep::new(vec![], 60);

        let outcome = step.run(&ctx).await.unwrap();
        assert!(matches!(outcome, StepOutcome::AlreadyPresent(_)));
        assert!(executor.calls().is_empty());
    }
}
