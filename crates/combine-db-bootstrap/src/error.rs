//! Error types for combine-db-bootstrap

use thiserror::Error;

/// Errors that can occur while bootstrapping the Combine database
#[derive(Error, Debug)]
pub enum BootstrapError {
    /// Could not reach or authenticate against the server
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// A bootstrap or inspection statement was rejected
    #[error("Database query failed: {0}")]
    Query(String),

    /// Credential field that cannot be rendered into the bootstrap script
    #[error("Invalid {field}: {reason}")]
    InvalidCredentials { field: &'static str, reason: String },

    /// Schema still absent after CREATE DATABASE
    #[error("Database `{0}` does not exist after bootstrap")]
    SchemaMissing(String),

    /// Service account still absent after CREATE USER
    #[error("User '{user}'@'{host}' does not exist after bootstrap")]
    UserMissing { user: String, host: String },

    /// Schema charset did not converge after ALTER DATABASE
    #[error("Database `{database}` has charset {actual}, expected {expected}")]
    CharsetDrift {
        database: String,
        expected: String,
        actual: String,
    },
}

impl From<sqlx::Error> for BootstrapError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::Configuration(_) => BootstrapError::Connection(err.to_string()),
            other => BootstrapError::Query(other.to_string()),
        }
    }
}
