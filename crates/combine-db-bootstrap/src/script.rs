//! Bootstrap SQL rendering
//!
//! The four statements below are the compatibility surface of the bootstrap
//! script and must stay byte-for-byte identical for the default credentials.

use crate::credentials::DatabaseCredentials;

/// Character set every Combine schema is created with
pub const CHARACTER_SET: &str = "utf8";

/// Collation every Combine schema is created with
pub const COLLATION: &str = "utf8_general_ci";

/// Ordered bootstrap statements, without trailing semicolons
pub fn bootstrap_statements(creds: &DatabaseCredentials) -> Vec<String> {
    let account = account(creds);
    vec![
        format!(
            "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET {} COLLATE {}",
            creds.database_name, CHARACTER_SET, COLLATION
        ),
        format!(
            "CREATE USER IF NOT EXISTS {} IDENTIFIED BY '{}'",
            account,
            creds.escaped_password()
        ),
        format!(
            "GRANT ALL PRIVILEGES ON {} TO {}",
            creds.privilege_scope, account
        ),
        "FLUSH PRIVILEGES".to_string(),
    ]
}

/// Render the bootstrap script, one statement per line
pub fn render_script(creds: &DatabaseCredentials) -> String {
    let mut script = String::new();
    for statement in bootstrap_statements(creds) {
        script.push_str(&statement);
        script.push_str(";\n");
    }
    script
}

/// Statement that brings an existing schema back to the expected charset
pub fn charset_repair_statement(database_name: &str) -> String {
    format!(
        "ALTER DATABASE {} CHARACTER SET {} COLLATE {}",
        database_name, CHARACTER_SET, COLLATION
    )
}

/// `'user'@'host'` account reference
pub fn account(creds: &DatabaseCredentials) -> String {
    format!("'{}'@'{}'", creds.username, creds.host_wildcard)
}
