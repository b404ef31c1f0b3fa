//! Database schema and service-account bootstrap.

use crate::command::{run_checked, CommandSpec};
use crate::error::StepError;
use crate::step::{names, ProvisionStep, StepContext, StepOutcome};
use async_trait::async_trait;
use combine_db_bootstrap::{bootstrap, DatabaseCredentials, DatabaseServer, MySqlServer};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// How the bootstrap reaches the server.
#[derive(Clone)]
pub enum DatabaseTarget {
    /// Direct connection through an administrative URL.
    AdminUrl(String),

    /// Feed the staged script to the installed database client.
    Client(Vec<String>),

    /// Already-connected server (embedding, tests).
    Server(Arc<dyn DatabaseServer>),
}

impl std::fmt::Debug for DatabaseTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // The URL usually embeds the admin password.
            DatabaseTarget::AdminUrl(_) => write!(f, "AdminUrl(<redacted>)"),
            DatabaseTarget::Client(argv) => write!(f, "Client({:?})", argv),
            DatabaseTarget::Server(_) => write!(f, "Server(..)"),
        }
    }
}

/// Creates the schema, account and grants.
#[derive(Debug, Clone)]
pub struct DatabaseBootstrapStep {
    target: DatabaseTarget,
    credentials: DatabaseCredentials,
    sql_script: PathBuf,
    timeout_secs: u64,
}

impl DatabaseBootstrapStep {
    pub fn new(
        target: DatabaseTarget,
        credentials: DatabaseCredentials,
        sql_script: impl Into<PathBuf>,
        timeout_secs: u64,
    ) -> Self {
        Self {
            target,
            credentials,
            sql_script: sql_script.into(),
            timeout_secs,
        }
    }

    fn client_command(&self, argv: &[String]) -> Result<CommandSpec, StepError> {
        Ok(CommandSpec::from_argv(argv)?
            .stdin_file(&self.sql_script)
            .timeout(self.timeout_secs))
    }

    async fn reconcile(&self, server: &dyn DatabaseServer) -> Result<StepOutcome, StepError> {
        let report = bootstrap(server, &self.credentials).await?;
        let detail = format!(
            "{} ensured for {}{}",
            report.database_name,
            report.account,
            if report.charset_repaired {
                " (charset repaired)"
            } else {
                ""
            }
        );
        Ok(StepOutcome::Applied(detail))
    }
}

#[async_trait]
impl ProvisionStep for DatabaseBootstrapStep {
    fn name(&self) -> &str {
        names::BOOTSTRAP_DATABASE
    }

    fn describe(&self) -> Vec<String> {
        match &self.target {
            DatabaseTarget::AdminUrl(_) => vec![format!(
                "apply {} via admin connection and reconcile charset",
                self.sql_script.display()
            )],
            DatabaseTarget::Client(argv) => match self.client_command(argv) {
                Ok(spec) => vec![spec.display()],
                Err(e) => vec![format!("invalid client command: {}", e)],
            },
            DatabaseTarget::Server(_) => vec!["apply bootstrap statements".to_string()],
        }
    }

    async fn run(&self, ctx: &StepContext) -> Result<StepOutcome, StepError> {
        self.credentials.validate()?;

        let outcome = match &self.target {
            DatabaseTarget::AdminUrl(url) => {
                let server = MySqlServer::connect(url).await?;
                self.reconcile(&server).await?
            }
            DatabaseTarget::Server(server) => self.reconcile(server.as_ref()).await?,
            DatabaseTarget::Client(argv) => {
                if !self.sql_script.is_file() {
                    return Err(StepError::MissingArtifact(self.sql_script.clone()));
                }
                run_checked(ctx.executor.as_ref(), &self.client_command(argv)?).await?;
                StepOutcome::Applied(format!(
                    "applied {} with {}",
                    self.sql_script.display(),
                    argv.first().map(String::as_str).unwrap_or("client")
                ))
            }
        };

        info!(database = %self.credentials.database_name, "Database bootstrapped");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::RecordingExecutor;
    use combine_db_bootstrap::fakes::MemoryServer;
    use combine_db_bootstrap::{render_script, BootstrapError};

    #[tokio::test]
    async fn test_server_target_reconciles() {
        let server = Arc::new(MemoryServer::new());
        let ctx = StepContext::new(Arc::new(RecordingExecutor::new()));
        let step = DatabaseBootstrapStep::new(
            DatabaseTarget::Server(server.clone()),
            DatabaseCredentials::default(),
            "/tmp/combine.sql",
            60,
        );

        let outcome = step.run(&ctx).await.unwrap();
        assert_eq!(
            outcome,
            StepOutcome::Applied("combine ensured for 'combine'@'%'".to_string())
        );
        assert!(server.has_all_privileges("combine", "%", "*.*"));
    }

    #[tokio::test]
    async fn test_client_target_feeds_script() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("combine.sql");
        std::fs::write(&script, render_script(&DatabaseCredentials::default())).unwrap();

        let executor = Arc::new(RecordingExecutor::new());
        let ctx = StepContext::new(executor.clone());
        let step = DatabaseBootstrapStep::new(
            DatabaseTarget::Client(vec!["mysql".to_string(), "-u".to_string(), "root".to_string()]),
            DatabaseCredentials::default(),
            &script,
            60,
        );

        step.run(&ctx).await.unwrap();
        let calls = executor.calls();
        assert_eq!(calls[0].program, "mysql");
        assert_eq!(calls[0].stdin_file.as_deref(), Some(script.as_path()));
    }

    #[tokio::test]
    async fn test_client_target_requires_staged_script() {
        let executor = Arc::new(RecordingExecutor::new());
        let ctx = StepContext::new(executor.clone());
        let step = DatabaseBootstrapStep::new(
            DatabaseTarget::Client(vec!["mysql".to_string()]),
            DatabaseCredentials::default(),
            "/nonexistent/combine.sql",
            60,
        );

        let err = step.run(&ctx).await.unwrap_err();
        assert!(matches!(err, StepError::MissingArtifact(_)));
        assert!(executor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_fatal() {
        let ctx = StepContext::new(Arc::new(RecordingExecutor::new()));
        let step = DatabaseBootstrapStep::new(
            DatabaseTarget::Server(Arc::new(MemoryServer::unreachable())),
            DatabaseCredentials::default(),
            "/tmp/combine.sql",
            60,
        );

        let err = step.run(&ctx).await.unwrap_err();
        assert!(matches!(
            err,
            StepError::Database(BootstrapError::Connection(_))
        ));
    }

    #[test]
    fn test_debug_redacts_admin_url() {
        let target = DatabaseTarget::AdminUrl("mysql://root:hunter2@db".to_string());
        assert!(!format!("{:?}", target).contains("hunter2"));
    }
}
