//! Database credential record
//!
//! The service account Combine authenticates with. Defaults match the
//! development literals (`combine`/`combine`/`combine`); every field can be
//! overridden from configuration or the environment.

use crate::error::BootstrapError;
use crate::Result;
use serde::{Deserialize, Serialize};

/// Default schema, user and password for a development environment
pub const DEFAULT_IDENTITY: &str = "combine";

/// Host wildcard matching any client host
pub const ANY_HOST: &str = "%";

/// Privilege scope covering every schema and table
pub const ALL_SCHEMAS: &str = "*.*";

/// Credential record created once at bootstrap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseCredentials {
    /// Schema to create
    pub database_name: String,
    /// Service account name
    pub username: String,
    /// Service account password
    pub password: String,
    /// Host part of the account (`%` for any host)
    pub host_wildcard: String,
    /// Grant target, e.g. `*.*`
    pub privilege_scope: String,
}

impl Default for DatabaseCredentials {
    fn default() -> Self {
        Self {
            database_name: DEFAULT_IDENTITY.to_string(),
            username: DEFAULT_IDENTITY.to_string(),
            password: DEFAULT_IDENTITY.to_string(),
            host_wildcard: ANY_HOST.to_string(),
            privilege_scope: ALL_SCHEMAS.to_string(),
        }
    }
}

impl DatabaseCredentials {
    /// Create credentials with the default host wildcard and privilege scope
    pub fn new(
        database_name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            database_name: database_name.into(),
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    /// Apply environment overrides
    ///
    /// Reads (all optional):
    /// - COMBINE_DB_NAME
    /// - COMBINE_DB_USER
    /// - COMBINE_DB_PASSWORD
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(name) = std::env::var("COMBINE_DB_NAME") {
            self.database_name = name;
        }
        if let Ok(user) = std::env::var("COMBINE_DB_USER") {
            self.username = user;
        }
        if let Ok(password) = std::env::var("COMBINE_DB_PASSWORD") {
            self.password = password;
        }
        self
    }

    /// Whether the checked-in development literals are still in use
    pub fn uses_development_defaults(&self) -> bool {
        self.username == DEFAULT_IDENTITY && self.password == DEFAULT_IDENTITY
    }

    /// Check that every field can be rendered into the bootstrap script
    /// without quoting surprises.
    pub fn validate(&self) -> Result<()> {
        validate_identifier("database_name", &self.database_name)?;
        validate_bare_name("database_name", &self.database_name)?;
        validate_identifier("username", &self.username)?;

        if self.password.is_empty() {
            return Err(BootstrapError::InvalidCredentials {
                field: "password",
                reason: "must not be empty".to_string(),
            });
        }

        if self.host_wildcard.is_empty()
            || self
                .host_wildcard
                .chars()
                .any(|c| c == '\'' || c == '\\' || c.is_whitespace())
        {
            return Err(BootstrapError::InvalidCredentials {
                field: "host_wildcard",
                reason: format!("`{}` is not a valid host pattern", self.host_wildcard),
            });
        }

        if !is_valid_scope(&self.privilege_scope) {
            return Err(BootstrapError::InvalidCredentials {
                field: "privilege_scope",
                reason: format!("`{}` is not of the form db.table", self.privilege_scope),
            });
        }
        if let Some((db, table)) = self.privilege_scope.split_once('.') {
            for part in [db, table].into_iter().filter(|p| *p != "*") {
                validate_bare_name("privilege_scope", part)?;
            }
        }

        Ok(())
    }

    /// Password as a single-quoted SQL string body
    pub fn escaped_password(&self) -> String {
        escape_literal(&self.password)
    }
}

/// Escape a value for use inside a single-quoted MySQL literal
pub fn escape_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "''")
}

fn validate_identifier(field: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(BootstrapError::InvalidCredentials {
            field,
            reason: "must not be empty".to_string(),
        });
    }
    if value.len() > 64 {
        return Err(BootstrapError::InvalidCredentials {
            field,
            reason: "longer than 64 characters".to_string(),
        });
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    {
        return Err(BootstrapError::InvalidCredentials {
            field,
            reason: format!("`{}` may only contain [A-Za-z0-9_$]", value),
        });
    }
    Ok(())
}

/// Keywords MySQL refuses as unquoted identifiers (sorted).
const RESERVED_WORDS: &[&str] = &[
    "ACCESSIBLE", "ADD", "ALL", "ALTER", "ANALYZE", "AND", "AS", "ASC", "ASENSITIVE", "BEFORE",
    "BETWEEN", "BIGINT", "BINARY", "BLOB", "BOTH", "BY", "CALL", "CASCADE", "CASE", "CHANGE",
    "CHAR", "CHARACTER", "CHECK", "COLLATE", "COLUMN", "CONDITION", "CONSTRAINT", "CONTINUE",
    "CONVERT", "CREATE", "CROSS", "CUBE", "CUME_DIST", "CURRENT_DATE", "CURRENT_TIME",
    "CURRENT_TIMESTAMP", "CURRENT_USER", "CURSOR", "DATABASE", "DATABASES", "DAY_HOUR",
    "DAY_MICROSECOND", "DAY_MINUTE", "DAY_SECOND", "DEC", "DECIMAL", "DECLARE", "DEFAULT",
    "DELAYED", "DELETE", "DENSE_RANK", "DESC", "DESCRIBE", "DETERMINISTIC", "DISTINCT",
    "DISTINCTROW", "DIV", "DOUBLE", "DROP", "DUAL", "EACH", "ELSE", "ELSEIF", "EMPTY", "ENCLOSED",
    "ESCAPED", "EXCEPT", "EXISTS", "EXIT", "EXPLAIN", "FALSE", "FETCH", "FIRST_VALUE", "FLOAT",
    "FLOAT4", "FLOAT8", "FOR", "FORCE", "FOREIGN", "FROM", "FULLTEXT", "FUNCTION", "GENERATED",
    "GET", "GRANT", "GROUP", "GROUPING", "GROUPS", "HAVING", "HIGH_PRIORITY", "HOUR_MICROSECOND",
    "HOUR_MINUTE", "HOUR_SECOND", "IF", "IGNORE", "IN", "INDEX", "INFILE", "INNER", "INOUT",
    "INSENSITIVE", "INSERT", "INT", "INT1", "INT2", "INT3", "INT4", "INT8", "INTEGER",
    "INTERSECT", "INTERVAL", "INTO", "IO_AFTER_GTIDS", "IO_BEFORE_GTIDS", "IS", "ITERATE", "JOIN",
    "JSON_TABLE", "KEY", "KEYS", "KILL", "LAG", "LAST_VALUE", "LATERAL", "LEAD", "LEADING",
    "LEAVE", "LEFT", "LIKE", "LIMIT", "LINEAR", "LINES", "LOAD", "LOCALTIME", "LOCALTIMESTAMP",
    "LOCK", "LONG", "LONGBLOB", "LONGTEXT", "LOOP", "LOW_PRIORITY", "MASTER_BIND",
    "MASTER_SSL_VERIFY_SERVER_CERT", "MATCH", "MAXVALUE", "MEDIUMBLOB", "MEDIUMINT", "MEDIUMTEXT",
    "MIDDLEINT", "MINUTE_MICROSECOND", "MINUTE_SECOND", "MOD", "MODIFIES", "NATURAL", "NOT",
    "NO_WRITE_TO_BINLOG", "NTH_VALUE", "NTILE", "NULL", "NUMERIC", "OF", "ON", "OPTIMIZE",
    "OPTIMIZER_COSTS", "OPTION", "OPTIONALLY", "OR", "ORDER", "OUT", "OUTER", "OUTFILE", "OVER",
    "PARTITION", "PERCENT_RANK", "PRECISION", "PRIMARY", "PROCEDURE", "PURGE", "RANGE", "RANK",
    "READ", "READS", "READ_WRITE", "REAL", "RECURSIVE", "REFERENCES", "REGEXP", "RELEASE",
    "RENAME", "REPEAT", "REPLACE", "REQUIRE", "RESIGNAL", "RESTRICT", "RETURN", "REVOKE", "RIGHT",
    "RLIKE", "ROW", "ROWS", "ROW_NUMBER", "SCHEMA", "SCHEMAS", "SECOND_MICROSECOND", "SELECT",
    "SENSITIVE", "SEPARATOR", "SET", "SHOW", "SIGNAL", "SMALLINT", "SPATIAL", "SPECIFIC", "SQL",
    "SQLEXCEPTION", "SQLSTATE", "SQLWARNING", "SQL_BIG_RESULT", "SQL_CALC_FOUND_ROWS",
    "SQL_SMALL_RESULT", "SSL", "STARTING", "STORED", "STRAIGHT_JOIN", "SYSTEM", "TABLE",
    "TERMINATED", "THEN", "TINYBLOB", "TINYINT", "TINYTEXT", "TO", "TRAILING", "TRIGGER", "TRUE",
    "UNDO", "UNION", "UNIQUE", "UNLOCK", "UNSIGNED", "UPDATE", "USAGE", "USE", "USING",
    "UTC_DATE", "UTC_TIME", "UTC_TIMESTAMP", "VALUES", "VARBINARY", "VARCHAR", "VARCHARACTER",
    "VARYING", "VIRTUAL", "WHEN", "WHERE", "WHILE", "WINDOW", "WITH", "WRITE", "XOR",
    "YEAR_MONTH", "ZEROFILL",
];

/// Names are rendered unquoted into the script, so they must also be
/// legal as bare identifiers.
fn validate_bare_name(field: &'static str, value: &str) -> Result<()> {
    if value.chars().all(|c| c.is_ascii_digit()) {
        return Err(BootstrapError::InvalidCredentials {
            field,
            reason: format!("`{}` consists only of digits", value),
        });
    }
    if RESERVED_WORDS
        .binary_search(&value.to_ascii_uppercase().as_str())
        .is_ok()
    {
        return Err(BootstrapError::InvalidCredentials {
            field,
            reason: format!("`{}` is a reserved word", value),
        });
    }
    Ok(())
}

fn is_valid_scope(scope: &str) -> bool {
    let Some((db, table)) = scope.split_once('.') else {
        return false;
    };
    let part_ok = |p: &str| {
        p == "*"
            || (!p.is_empty()
                && p
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$'))
    };
    part_ok(db) && part_ok(table)
}
