//! Idempotent database bootstrap
//!
//! Applies the bootstrap statements and then reconciles the observed state
//! against the desired one. Every statement is safe to repeat, so running
//! the bootstrap any number of times converges to the same schema, account
//! and grants.

use crate::credentials::DatabaseCredentials;
use crate::error::BootstrapError;
use crate::script::{bootstrap_statements, charset_repair_statement, CHARACTER_SET, COLLATION};
use crate::server::DatabaseServer;
use crate::Result;
use tracing::{info, instrument, warn};

/// What a bootstrap run did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Database the account was provisioned for
    pub database_name: String,
    /// Account that holds the grants, as `'user'@'host'`
    pub account: String,
    /// Statements sent to the server, in order
    pub statements: Vec<String>,
    /// Whether an existing schema had to be moved to the expected charset
    pub charset_repaired: bool,
}

/// Ensure schema, account and grants exist as described by `creds`.
#[instrument(skip_all, fields(database = %creds.database_name, user = %creds.username))]
pub async fn bootstrap(
    server: &dyn DatabaseServer,
    creds: &DatabaseCredentials,
) -> Result<BootstrapReport> {
    creds.validate()?;

    if creds.uses_development_defaults() {
        warn!("Bootstrapping with development default credentials");
    }

    let mut statements = bootstrap_statements(creds);
    for statement in &statements {
        server.execute(statement).await?;
    }

    let charset_repaired = reconcile_charset(server, &creds.database_name, &mut statements).await?;

    if !server
        .user_exists(&creds.username, &creds.host_wildcard)
        .await?
    {
        return Err(BootstrapError::UserMissing {
            user: creds.username.clone(),
            host: creds.host_wildcard.clone(),
        });
    }

    info!(
        statements = statements.len(),
        charset_repaired, "Database bootstrap complete"
    );

    Ok(BootstrapReport {
        database_name: creds.database_name.clone(),
        account: crate::script::account(creds),
        statements,
        charset_repaired,
    })
}

/// `CREATE DATABASE IF NOT EXISTS` leaves a pre-existing schema untouched,
/// so its charset is checked and repaired here.
async fn reconcile_charset(
    server: &dyn DatabaseServer,
    database: &str,
    statements: &mut Vec<String>,
) -> Result<bool> {
    let current = server
        .schema_charset(database)
        .await?
        .ok_or_else(|| BootstrapError::SchemaMissing(database.to_string()))?;

    if current.matches(CHARACTER_SET, COLLATION) {
        return Ok(false);
    }

    warn!(
        %database,
        actual = %current,
        "Schema charset drifted, altering to {}/{}",
        CHARACTER_SET,
        COLLATION
    );
    let repair = charset_repair_statement(database);
    server.execute(&repair).await?;
    statements.push(repair);

    let repaired = server
        .schema_charset(database)
        .await?
        .ok_or_else(|| BootstrapError::SchemaMissing(database.to_string()))?;

    if !repaired.matches(CHARACTER_SET, COLLATION) {
        return Err(BootstrapError::CharsetDrift {
            database: database.to_string(),
            expected: format!("{}/{}", CHARACTER_SET, COLLATION),
            actual: repaired.to_string(),
        });
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryServer;

    #[tokio::test]
    async fn test_bootstrap_fresh_server() {
        let server = MemoryServer::new();
        let report = bootstrap(&server, &DatabaseCredentials::default())
            .await
            .expect("bootstrap failed");

        assert_eq!(report.database_name, "combine");
        assert_eq!(report.account, "'combine'@'%'");
        assert_eq!(report.statements.len(), 4);
        assert!(!report.charset_repaired);
    }

    #[tokio::test]
    async fn test_invalid_credentials_send_nothing() {
        let server = MemoryServer::new();
        let creds = DatabaseCredentials::new("bad name", "combine", "combine");

        let err = bootstrap(&server, &creds).await.unwrap_err();
        assert!(matches!(err, BootstrapError::InvalidCredentials { .. }));
        assert!(server.executed().is_empty());
    }
}
