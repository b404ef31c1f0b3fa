//! Provisioning plan: the ordered list of steps and its identity.

use crate::config::ProvisionConfig;
use crate::error::ConfigError;
use crate::step::ProvisionStep;
use crate::steps::{
    ApplicationCheckoutStep, CredentialsFileStep, DatabaseBootstrapStep, DatabaseTarget,
    NamedToolStep, RuntimeDependenciesStep, StageArtifactsStep, StagedFile, SystemPackagesStep,
};
use combine_db_bootstrap::DatabaseServer;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;

/// Ordered steps plus the names the operator asked to skip.
pub struct ProvisionPlan {
    steps: Vec<Box<dyn ProvisionStep>>,
    skipped: HashSet<String>,
}

impl ProvisionPlan {
    /// Plan from explicit steps, executed in the given order.
    pub fn new(steps: Vec<Box<dyn ProvisionStep>>) -> Self {
        Self {
            steps,
            skipped: HashSet::new(),
        }
    }

    /// Build the standard plan from validated configuration.
    ///
    /// Order: OS packages, application checkout, config staging, runtime
    /// dependencies, each tool, database bootstrap, credentials file.
    pub fn from_config(config: &ProvisionConfig) -> Result<Self, ConfigError> {
        Self::build(config, None)
    }

    /// Same as `from_config`, but bootstrap against an existing server
    /// handle instead of the configured URL or client.
    pub fn with_database_server(
        config: &ProvisionConfig,
        server: Arc<dyn DatabaseServer>,
    ) -> Result<Self, ConfigError> {
        Self::build(config, Some(server))
    }

    fn build(
        config: &ProvisionConfig,
        server: Option<Arc<dyn DatabaseServer>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let timeout = config.command_timeout_secs;
        let db = &config.database;

        let mut steps: Vec<Box<dyn ProvisionStep>> = Vec::new();

        steps.push(Box::new(SystemPackagesStep::new(
            config.system.packages.clone(),
            timeout,
        )));

        if config.application.enabled {
            steps.push(Box::new(ApplicationCheckoutStep::new(
                config.application.repository.clone(),
                config.build.branch.clone(),
                config.application.install_dir.clone(),
                timeout,
            )));
        }

        let files = config
            .artifacts
            .iter()
            .map(|a| StagedFile {
                source: config.resolve_source(&a.source),
                destination: a.destination.clone(),
            })
            .collect();
        steps.push(Box::new(StageArtifactsStep::new(
            files,
            db.sql_script.clone(),
            db.credentials.clone(),
        )));

        steps.push(Box::new(RuntimeDependenciesStep::new(
            config.runtime.manifest.clone(),
            config.runtime.kind,
            config.runtime.pip.clone(),
            timeout,
        )));

        for tool in &config.tools {
            steps.push(Box::new(NamedToolStep::new(
                tool.resolved(&config.build),
                config.runtime.pip.clone(),
                config.work_dir.clone(),
                timeout,
            )));
        }

        let target = match (server, &db.admin_url) {
            (Some(server), _) => DatabaseTarget::Server(server),
            (None, Some(url)) => DatabaseTarget::AdminUrl(url.clone()),
            (None, None) => DatabaseTarget::Client(db.client_argv()),
        };
        steps.push(Box::new(DatabaseBootstrapStep::new(
            target,
            db.credentials.clone(),
            db.sql_script.clone(),
            timeout,
        )));

        steps.push(Box::new(CredentialsFileStep::new(
            db.credentials_file.clone(),
            db.credentials.clone(),
            db.host.clone(),
        )));

        Ok(Self::new(steps))
    }

    /// Mark steps as skipped by name. Unknown names are rejected.
    pub fn skip<I, S>(mut self, names: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            if !self.steps.iter().any(|s| s.name() == name) {
                return Err(ConfigError::UnknownStep(name));
            }
            self.skipped.insert(name);
        }
        Ok(self)
    }

    /// Whether `name` is skipped.
    pub fn is_skipped(&self, name: &str) -> bool {
        self.skipped.contains(name)
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.name().to_string()).collect()
    }

    /// Steps in execution order.
    pub fn steps(&self) -> &[Box<dyn ProvisionStep>] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Deterministic, order-sensitive digest of the step names.
    pub fn digest(&self) -> String {
        compute_plan_digest(&self.step_names())
    }
}

fn compute_plan_digest(names: &[String]) -> String {
    let mut hasher = Sha256::new();
    for name in names {
        hasher.update(name.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}
