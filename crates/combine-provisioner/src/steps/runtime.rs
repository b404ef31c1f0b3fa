//! Language-runtime dependency installation from the staged manifest.

use crate::command::{run_checked, CommandSpec};
use crate::config::ManifestKind;
use crate::error::StepError;
use crate::step::{names, ProvisionStep, StepContext, StepOutcome};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::info;

/// Installs dependencies with a resolver that solves the full graph.
///
/// A resolution conflict makes the resolver exit non-zero, which fails the
/// step.
#[derive(Debug, Clone)]
pub struct RuntimeDependenciesStep {
    manifest: PathBuf,
    kind: ManifestKind,
    pip: String,
    timeout_secs: u64,
}

impl RuntimeDependenciesStep {
    pub fn new(
        manifest: impl Into<PathBuf>,
        kind: ManifestKind,
        pip: impl Into<String>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            manifest: manifest.into(),
            kind,
            pip: pip.into(),
            timeout_secs,
        }
    }

    fn command(&self) -> CommandSpec {
        let spec = match self.kind {
            ManifestKind::Requirements => CommandSpec::new(
                self.pip.clone(),
                [
                    "install".to_string(),
                    "--no-cache-dir".to_string(),
                    "-r".to_string(),
                    self.manifest.to_string_lossy().to_string(),
                ],
            ),
            ManifestKind::Pipfile => {
                let spec = CommandSpec::new("pipenv", ["install", "--system", "--deploy"]);
                match self.manifest.parent() {
                    Some(dir) if !dir.as_os_str().is_empty() => spec.current_dir(dir),
                    _ => spec,
                }
            }
        };
        spec.timeout(self.timeout_secs)
    }
}

#[async_trait]
impl ProvisionStep for RuntimeDependenciesStep {
    fn name(&self) -> &str {
        names::INSTALL_RUNTIME_DEPENDENCIES
    }

    fn describe(&self) -> Vec<String> {
        vec![self.command().display()]
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        if !self.manifest.is_file() {
            return Err(StepError::MissingManifest(self.manifest.clone()));
        }

        run_checked(ctx.executor.as_ref(), &self.command()).await?;

        info!(manifest = %self.manifest.display(), "Runtime dependencies installed");
        Ok(StepOutcome::Applied(format!(
            "resolved {}",
            self.manifest.display()
        )))
    }
}
