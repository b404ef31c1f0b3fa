//! Database client credentials file.

use crate::error::StepError;
use crate::step::{names, ProvisionStep, StepContext, StepOutcome};
use crate::steps::artifacts::write_if_changed;
use async_trait::async_trait;
use combine_db_bootstrap::DatabaseCredentials;
use std::path::PathBuf;
use tracing::info;

/// Writes a `[client]` option file so database clients authenticate
/// without prompting.
#[derive(Debug, Clone)]
pub struct CredentialsFileStep {
    path: PathBuf,
    credentials: DatabaseCredentials,
    host: String,
}

impl CredentialsFileStep {
    pub fn new(
        path: impl Into<PathBuf>,
        credentials: DatabaseCredentials,
        host: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            credentials,
            host: host.into(),
        }
    }

    /// Option-file contents.
    ///
    /// `[client]` is read by every client program (`mysqldump`,
    /// `mysqladmin`, ...), so it carries only options they all accept. The
    /// default schema goes in `[mysql]`, read by the interactive client only.
    pub fn render(&self) -> String {
        format!(
            "[client]\nuser={}\npassword=\"{}\"\nhost={}\n\n[mysql]\ndatabase={}\n",
            self.credentials.username,
            self.credentials
                .password
                .replace('\\', "\\\\")
                .replace('"', "\\\""),
            self.host,
            self.credentials.database_name
        )
    }
}

#[async_trait]
impl ProvisionStep for CredentialsFileStep {
    fn name(&self) -> &str {
        names::PLACE_CREDENTIALS_FILE
    }

    fn describe(&self) -> Vec<String> {
        vec![format!("write {} (mode 600)", self.path.display())]
    }

    async fn run(&self, _ctx: &StepContext) -> Result<StepOutcome, StepError> {
        let written = write_if_changed(&self.path, self.render().as_bytes(), 0o600).await?;
        if !written {
            return Ok(StepOutcome::AlreadyPresent(format!(
                "{} up to date",
                self.path.display()
            )));
        }
        info!(path = %self.path.display(), "Credentials file placed");
        Ok(StepOutcome::Applied(format!("wrote {}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::RecordingExecutor;
    use std::sync::Arc;

    #[test]
    fn test_render_default() {
        let step = CredentialsFileStep::new("/root/.my.cnf", DatabaseCredentials::default(), "mysql");
        assert_eq!(
            step.render(),
            "[client]\nuser=combine\npassword=\"combine\"\nhost=mysql\n\n[mysql]\ndatabase=combine\n"
        );
    }

    #[test]
    fn test_client_group_holds_only_shared_options() {
        let step = CredentialsFileStep::new("/root/.my.cnf", DatabaseCredentials::default(), "db");
        let rendered = step.render();

        let mut group = "";
        let mut client_keys = Vec::new();
        for line in rendered.lines().filter(|l| !l.is_empty()) {
            if line.starts_with('[') {
                group = line;
                continue;
            }
            if group == "[client]" {
                client_keys.push(line.split('=').next().unwrap_or_default().to_string());
            }
        }

        assert_eq!(client_keys, vec!["user", "password", "host"]);
        assert!(rendered.contains("[mysql]\ndatabase=combine\n"));
    }

    #[test]
    fn test_render_escapes_quotes() {
        let creds = DatabaseCredentials::new("combine", "combine", r#"a"b"#);
        let step = CredentialsFileStep::new("/root/.my.cnf", creds, "localhost");
        assert!(step.render().contains(r#"password="a\"b""#));
    }

    #[tokio::test]
    async fn test_write_then_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("home/.my.cnf");
        let ctx = StepContext::new(Arc::new(RecordingExecutor::new()));
        let step = CredentialsFileStep::new(&path, DatabaseCredentials::default(), "localhost");

        assert!(matches!(step.run(&ctx).await.unwrap(), StepOutcome::Applied(_)));
        assert!(matches!(
            step.run(&ctx).await.unwrap(),
            StepOutcome::AlreadyPresent(_)
        ));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
