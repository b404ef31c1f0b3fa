//! Provisioning step contract.

use crate::command::CommandExecutor;
use crate::error::StepError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Well-known step names, in execution order.
pub mod names {
    pub const INSTALL_SYSTEM_PACKAGES: &str = "install_system_packages";
    pub const CHECKOUT_APPLICATION: &str = "checkout_application";
    pub const STAGE_CONFIG_ARTIFACTS: &str = "stage_config_artifacts";
    pub const INSTALL_RUNTIME_DEPENDENCIES: &str = "install_runtime_dependencies";
    pub const BOOTSTRAP_DATABASE: &str = "bootstrap_database";
    pub const PLACE_CREDENTIALS_FILE: &str = "place_credentials_file";

    /// Name of the step installing `tool`.
    pub fn install_tool(tool: &str) -> String {
        format!("install_tool:{}", tool)
    }
}

/// Shared resources handed to every step.
#[derive(Clone)]
pub struct StepContext {
    /// Runs external commands.
    pub executor: Arc<dyn CommandExecutor>,

    /// HTTP client for archive downloads.
    pub http: reqwest::Client,
}

impl StepContext {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self {
            executor,
            http: reqwest::Client::new(),
        }
    }
}

/// What a successful step did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The step changed the environment.
    Applied(String),

    /// Everything was already in place; nothing changed.
    AlreadyPresent(String),
}

impl StepOutcome {
    pub fn detail(&self) -> &str {
        match self {
            StepOutcome::Applied(d) | StepOutcome::AlreadyPresent(d) => d,
        }
    }
}

/// One named, all-or-nothing provisioning action.
#[async_trait]
pub trait ProvisionStep: Send + Sync {
    /// Stable name used in logs, reports and `--skip`.
    fn name(&self) -> &str;

    /// Human-readable description of what `run` will do, one line per
    /// action. Must not touch the environment.
    fn describe(&self) -> Vec<String>;

    /// Perform the step.
    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError>;
}
