//! External command execution.
//!
//! Package managers, resolvers and installers are never reimplemented; every
//! step drives them through a `CommandExecutor`.

use crate::error::StepError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

/// Lines of output kept in a failure message.
const OUTPUT_TAIL_LINES: usize = 20;

/// A command line plus the environment it runs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,

    /// Arguments.
    pub args: Vec<String>,

    /// Extra environment variables.
    pub env: Vec<(String, String)>,

    /// Working directory.
    pub current_dir: Option<PathBuf>,

    /// File fed to stdin.
    pub stdin_file: Option<PathBuf>,

    /// Timeout in seconds (0 = none).
    pub timeout_secs: u64,
}

impl CommandSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            env: Vec::new(),
            current_dir: None,
            stdin_file: None,
            timeout_secs: 0,
        }
    }

    /// Build from an argv vector (first element is the executable).
    pub fn from_argv(argv: &[String]) -> Result<Self, StepError> {
        let (program, args) = argv.split_first().ok_or(StepError::EmptyCommand)?;
        Ok(Self::new(program.clone(), args.iter().cloned()))
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    pub fn stdin_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdin_file = Some(path.into());
        self
    }

    pub fn timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Shell-like rendering for logs and plans.
    pub fn display(&self) -> String {
        let mut line = String::new();
        for (key, value) in &self.env {
            line.push_str(&format!("{}={} ", key, value));
        }
        line.push_str(&self.program);
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push_str(&format!("'{}'", arg));
            } else {
                line.push_str(arg);
            }
        }
        if let Some(stdin) = &self.stdin_file {
            line.push_str(&format!(" < {}", stdin.display()));
        }
        line
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display())
    }
}

/// Result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit code (0 = success, -1 = killed by signal).
    pub exit_code: i32,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Last lines of stderr, or of stdout when stderr is empty.
    pub fn tail(&self) -> String {
        let source = if self.stderr.trim().is_empty() {
            &self.stdout
        } else {
            &self.stderr
        };
        let lines: Vec<&str> = source.lines().collect();
        let start = lines.len().saturating_sub(OUTPUT_TAIL_LINES);
        lines[start..].join("\n")
    }
}

/// Runs external commands.
///
/// Implementations return `Ok` for any command that ran to completion,
/// whatever its exit code; `Err` means it could not be started or was
/// killed on timeout.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, command: &CommandSpec) -> Result<CommandOutput, StepError>;
}

/// Execute and turn a non-zero exit into `StepError::CommandFailed`.
pub async fn run_checked(
    executor: &dyn CommandExecutor,
    command: &CommandSpec,
) -> Result<CommandOutput, StepError> {
    let output = executor.execute(command).await?;
    if !output.success() {
        return Err(StepError::CommandFailed {
            command: command.display(),
            exit_code: output.exit_code,
            output: output.tail(),
        });
    }
    Ok(output)
}

/// Executes commands as child processes of this one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn execute(&self, spec: &CommandSpec) -> Result<CommandOutput, StepError> {
        let start = Instant::now();
        debug!(command = %spec, "Spawning");

        let stdin = match &spec.stdin_file {
            Some(path) => Stdio::from(
                std::fs::File::open(path).map_err(|e| StepError::io(path.clone(), e))?,
            ),
            None => Stdio::null(),
        };

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &spec.current_dir {
            command.current_dir(dir);
        }

        let child = command.spawn().map_err(|source| StepError::Spawn {
            command: spec.display(),
            source,
        })?;

        let waited = if spec.timeout_secs > 0 {
            tokio::time::timeout(
                Duration::from_secs(spec.timeout_secs),
                child.wait_with_output(),
            )
            .await
            .map_err(|_| StepError::Timeout {
                command: spec.display(),
                timeout_secs: spec.timeout_secs,
            })?
        } else {
            child.wait_with_output().await
        };
        let output = waited.map_err(|source| StepError::Spawn {
            command: spec.display(),
            source,
        })?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}
