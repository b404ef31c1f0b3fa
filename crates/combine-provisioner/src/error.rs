//! Error types for combine-provisioner

use crate::pipeline::ProvisionReport;
use combine_db_bootstrap::BootstrapError;
use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single provisioning step
#[derive(Error, Debug)]
pub enum StepError {
    /// Step was built with an empty command line
    #[error("Empty command")]
    EmptyCommand,

    /// Executable could not be started
    #[error("Failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Command ran past its timeout and was killed
    #[error("`{command}` timed out after {timeout_secs} seconds")]
    Timeout { command: String, timeout_secs: u64 },

    /// Command exited non-zero
    #[error("`{command}` exited with code {exit_code}\n{output}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        output: String,
    },

    /// Staged artifact source does not exist
    #[error("Artifact source not found: {0}")]
    MissingArtifact(PathBuf),

    /// Dependency manifest does not exist at its staged path
    #[error("Dependency manifest not found: {0}")]
    MissingManifest(PathBuf),

    /// Filesystem error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive download failed
    #[error("Download of {url} failed: {message}")]
    Download { url: String, message: String },

    /// Downloaded archive does not match its pinned digest
    #[error("Checksum mismatch for {url}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    /// Database bootstrap failed
    #[error(transparent)]
    Database(#[from] BootstrapError),
}

impl StepError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StepError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Invalid provisioning configuration, detected before any step runs
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML for `ProvisionConfig`
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A build parameter was empty or whitespace
    #[error("Build parameter `{0}` must not be empty")]
    EmptyBuildParameter(&'static str),

    /// A fixed destination path was relative
    #[error("{field} must be an absolute path, got {path}")]
    RelativePath { field: String, path: PathBuf },

    /// The admin option file is the service-account credentials file
    #[error("database.admin_defaults_file must not be the credentials file ({0})")]
    AdminOptionFileConflict(PathBuf),

    /// Client-mode bootstrap cannot be invoked as configured
    #[error("Invalid database client: {0}")]
    InvalidDatabaseClient(String),

    /// Two tools share a name, or a tool has no name
    #[error("Invalid tool list: {0}")]
    InvalidTool(String),

    /// `--skip` named a step that is not in the plan
    #[error("Unknown step `{0}`")]
    UnknownStep(String),

    /// Credential record rejected
    #[error(transparent)]
    Credentials(#[from] BootstrapError),
}

/// Provisioning run failure
#[derive(Error, Debug)]
pub enum ProvisionError {
    /// Configuration rejected before the run started
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A step failed; no later step was executed
    #[error("Step `{step}` failed: {source}")]
    StepFailed {
        step: String,
        report: Box<ProvisionReport>,
        #[source]
        source: StepError,
    },
}

impl ProvisionError {
    /// Report of the aborted run, if the run got that far
    pub fn report(&self) -> Option<&ProvisionReport> {
        match self {
            ProvisionError::StepFailed { report, .. } => Some(report),
            ProvisionError::Config(_) => None,
        }
    }
}
