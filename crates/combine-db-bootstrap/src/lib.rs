//! Combine DB Bootstrap: schema and service-account provisioning
//!
//! Creates the Combine schema, its service account, and the account's
//! grants on a MySQL-compatible server. The bootstrap is a reconciliation:
//! it can be applied any number of times and always converges to the same
//! state.
//!
//! ## Key Components
//!
//! - `DatabaseCredentials`: the credential record (schema, user, password,
//!   host wildcard, privilege scope)
//! - `render_script`: the bit-exact bootstrap SQL script
//! - `bootstrap`: apply and reconcile against a `DatabaseServer`
//! - `MySqlServer`: `sqlx` backed server connection

pub mod bootstrap;
pub mod credentials;
mod error;
pub mod fakes;
pub mod script;
pub mod server;

pub use bootstrap::{bootstrap, BootstrapReport};
pub use credentials::DatabaseCredentials;
pub use error::BootstrapError;
pub use script::{bootstrap_statements, render_script, CHARACTER_SET, COLLATION};
pub use server::{DatabaseServer, MySqlServer, SchemaCharset};

/// Result type for combine-db-bootstrap operations
pub type Result<T> = std::result::Result<T, BootstrapError>;
