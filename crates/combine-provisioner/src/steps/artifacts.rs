//! Staging of descriptor and config files at fixed paths.
//!
//! Later steps read from these exact locations, so every source and
//! destination is checked before anything is written.

use crate::error::StepError;
use crate::step::{names, ProvisionStep, StepContext, StepOutcome};
use async_trait::async_trait;
use combine_db_bootstrap::{render_script, DatabaseCredentials};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A file to place at an absolute destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedFile {
    pub source: PathBuf,
    pub destination: PathBuf,
}

/// Copies descriptor files and renders the bootstrap SQL script.
#[derive(Debug, Clone)]
pub struct StageArtifactsStep {
    files: Vec<StagedFile>,
    sql_script: PathBuf,
    credentials: DatabaseCredentials,
}

impl StageArtifactsStep {
    pub fn new(
        files: Vec<StagedFile>,
        sql_script: impl Into<PathBuf>,
        credentials: DatabaseCredentials,
    ) -> Self {
        Self {
            files,
            sql_script: sql_script.into(),
            credentials,
        }
    }

    fn preflight(&self) -> Result<(), StepError> {
        for file in &self.files {
            if !file.source.is_file() {
                return Err(StepError::MissingArtifact(file.source.clone()));
            }
            if !file.destination.is_absolute() {
                return Err(StepError::io(
                    &file.destination,
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "destination must be absolute",
                    ),
                ));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProvisionStep for StageArtifactsStep {
    fn name(&self) -> &str {
        names::STAGE_CONFIG_ARTIFACTS
    }

    fn describe(&self) -> Vec<String> {
        let mut lines: Vec<String> = self
            .files
            .iter()
            .map(|f| format!("copy {} -> {}", f.source.display(), f.destination.display()))
            .collect();
        lines.push(format!("render bootstrap SQL -> {}", self.sql_script.display()));
        lines
    }

    async fn run(&self, _ctx: &StepContext) -> Result<StepOutcome, StepError> {
        self.preflight()?;

        let mut changed = 0usize;
        for file in &self.files {
            let content = tokio::fs::read(&file.source)
                .await
                .map_err(|e| StepError::io(&file.source, e))?;
            let mode = if is_script(&file.destination) { 0o755 } else { 0o644 };
            if write_if_changed(&file.destination, &content, mode).await? {
                changed += 1;
            }
        }

        let script = render_script(&self.credentials);
        if write_if_changed(&self.sql_script, script.as_bytes(), 0o600).await? {
            changed += 1;
        }

        let total = self.files.len() + 1;
        info!(total, changed, "Config artifacts staged");
        if changed == 0 {
            Ok(StepOutcome::AlreadyPresent(format!(
                "{} files already staged",
                total
            )))
        } else {
            Ok(StepOutcome::Applied(format!(
                "staged {} of {} files",
                changed, total
            )))
        }
    }
}

fn is_script(path: &Path) -> bool {
    path.extension().map(|e| e == "sh").unwrap_or(false)
}

/// Write `content` to `path` unless it already holds exactly that content.
/// Returns whether anything was written.
pub(crate) async fn write_if_changed(
    path: &Path,
    content: &[u8],
    mode: u32,
) -> Result<bool, StepError> {
    if let Ok(existing) = tokio::fs::read(path).await {
        if existing == content {
            debug!(path = %path.display(), "Unchanged");
            set_mode(path, mode).await?;
            return Ok(false);
        }
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StepError::io(parent, e))?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|e| StepError::io(path, e))?;
    set_mode(path, mode).await?;
    debug!(path = %path.display(), "Written");
    Ok(true)
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<(), StepError> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
        .await
        .map_err(|e| StepError::io(path, e))
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> Result<(), StepError> {
    Ok(())
}
