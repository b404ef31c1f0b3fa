//! In-memory fake of a MySQL server (testing only)
//!
//! `MemoryServer` understands exactly the statements the bootstrap emits and
//! models the resulting schemas, accounts and grants, so idempotence can be
//! checked without a running server.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, OnceLock};

use async_trait::async_trait;
use regex::Regex;

use crate::error::BootstrapError;
use crate::server::{DatabaseServer, SchemaCharset};
use crate::Result;

/// Observable server state after a sequence of statements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerState {
    /// Schema name -> charset
    pub databases: BTreeMap<String, SchemaCharset>,
    /// (user, host) -> password
    pub users: BTreeMap<(String, String), String>,
    /// (user, host, scope) triples holding ALL PRIVILEGES
    pub grants: BTreeSet<(String, String, String)>,
}

#[derive(Debug, Default)]
struct Inner {
    state: ServerState,
    executed: Vec<String>,
    flushes: usize,
}

/// In-memory server
#[derive(Debug, Default)]
pub struct MemoryServer {
    inner: Mutex<Inner>,
    unreachable: bool,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// A server that rejects every request with a connection error
    pub fn unreachable() -> Self {
        Self {
            inner: Mutex::default(),
            unreachable: true,
        }
    }

    /// Pre-create a schema, e.g. one left behind with a different charset
    pub fn with_database(self, name: &str, character_set: &str, collation: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .state
            .databases
            .insert(name.to_string(), SchemaCharset::new(character_set, collation));
        self
    }

    /// Snapshot of the current state
    pub fn state(&self) -> ServerState {
        self.inner.lock().unwrap().state.clone()
    }

    /// Every statement executed so far
    pub fn executed(&self) -> Vec<String> {
        self.inner.lock().unwrap().executed.clone()
    }

    /// Number of FLUSH PRIVILEGES statements received
    pub fn flush_count(&self) -> usize {
        self.inner.lock().unwrap().flushes
    }

    /// Whether `user@host` can log in with `password`
    pub fn authenticate(&self, user: &str, host: &str, password: &str) -> bool {
        self.inner
            .lock()
            .unwrap()
            .state
            .users
            .get(&(user.to_string(), host.to_string()))
            .map(|stored| stored == password)
            .unwrap_or(false)
    }

    /// Whether `user@host` holds all privileges on `scope`
    pub fn has_all_privileges(&self, user: &str, host: &str, scope: &str) -> bool {
        self.inner.lock().unwrap().state.grants.contains(&(
            user.to_string(),
            host.to_string(),
            scope.to_string(),
        ))
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable {
            return Err(BootstrapError::Connection(
                "Can't connect to MySQL server (fake)".to_string(),
            ));
        }
        Ok(())
    }

    fn apply(inner: &mut Inner, statement: &str) -> Result<()> {
        let statement = statement.trim().trim_end_matches(';').trim();

        if let Some(c) = create_database_re().captures(statement) {
            inner
                .state
                .databases
                .entry(c[1].to_string())
                .or_insert_with(|| SchemaCharset::new(&c[2], &c[3]));
            return Ok(());
        }

        if let Some(c) = create_user_re().captures(statement) {
            inner
                .state
                .users
                .entry((unescape(&c[1]), c[2].to_string()))
                .or_insert_with(|| unescape(&c[3]));
            return Ok(());
        }

        if let Some(c) = grant_re().captures(statement) {
            let key = (unescape(&c[2]), c[3].to_string());
            if !inner.state.users.contains_key(&key) {
                return Err(BootstrapError::Query(format!(
                    "You are not allowed to create a user with GRANT ('{}'@'{}')",
                    key.0, key.1
                )));
            }
            inner
                .state
                .grants
                .insert((key.0, key.1, c[1].to_string()));
            return Ok(());
        }

        if statement.eq_ignore_ascii_case("FLUSH PRIVILEGES") {
            inner.flushes += 1;
            return Ok(());
        }

        if let Some(c) = alter_database_re().captures(statement) {
            let charset = inner
                .state
                .databases
                .get_mut(&c[1])
                .ok_or_else(|| BootstrapError::Query(format!("Unknown database '{}'", &c[1])))?;
            *charset = SchemaCharset::new(&c[2], &c[3]);
            return Ok(());
        }

        Err(BootstrapError::Query(format!(
            "You have an error in your SQL syntax near '{}'",
            statement
        )))
    }
}

#[async_trait]
impl DatabaseServer for MemoryServer {
    async fn execute(&self, statement: &str) -> Result<()> {
        self.check_reachable()?;
        let mut inner = self.inner.lock().unwrap();
        inner.executed.push(statement.to_string());
        Self::apply(&mut inner, statement)
    }

    async fn schema_charset(&self, database: &str) -> Result<Option<SchemaCharset>> {
        self.check_reachable()?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .state
            .databases
            .get(database)
            .cloned())
    }

    async fn user_exists(&self, user: &str, host: &str) -> Result<bool> {
        self.check_reachable()?;
        Ok(self
            .inner
            .lock()
            .unwrap()
            .state
            .users
            .contains_key(&(user.to_string(), host.to_string())))
    }
}

const QUOTED: &str = r"((?:[^'\\]|''|\\.)*)";

fn create_database_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^CREATE DATABASE IF NOT EXISTS (\S+) CHARACTER SET (\S+) COLLATE (\S+)$")
            .unwrap()
    })
}

fn create_user_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"^CREATE USER IF NOT EXISTS '{q}'@'([^']*)' IDENTIFIED BY '{q}'$",
            q = QUOTED
        ))
        .unwrap()
    })
}

fn grant_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(&format!(
            r"^GRANT ALL PRIVILEGES ON (\S+) TO '{q}'@'([^']*)'$",
            q = QUOTED
        ))
        .unwrap()
    })
}

fn alter_database_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^ALTER DATABASE (\S+) CHARACTER SET (\S+) COLLATE (\S+)$").unwrap()
    })
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\'' if chars.peek() == Some(&'\'') => {
                chars.next();
                out.push('\'');
            }
            '\\' => {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_grant_requires_existing_user() {
        let server = MemoryServer::new();
        let err = server
            .execute("GRANT ALL PRIVILEGES ON *.* TO 'ghost'@'%'")
            .await
            .unwrap_err();
        assert!(matches!(err, BootstrapError::Query(_)));
    }

    #[tokio::test]
    async fn test_unknown_statement_rejected() {
        let server = MemoryServer::new();
        assert!(server.execute("DROP DATABASE combine").await.is_err());
    }

    #[tokio::test]
    async fn test_create_user_unescapes_password() {
        let server = MemoryServer::new();
        server
            .execute(r"CREATE USER IF NOT EXISTS 'svc'@'%' IDENTIFIED BY 'o''ne\\il'")
            .await
            .unwrap();
        assert!(server.authenticate("svc", "%", r"o'ne\il"));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let server = MemoryServer::unreachable();
        let err = server.execute("FLUSH PRIVILEGES").await.unwrap_err();
        assert!(matches!(err, BootstrapError::Connection(_)));
    }
}
