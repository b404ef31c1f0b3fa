//! Bootstrap convergence against the in-memory server.

use combine_db_bootstrap::fakes::MemoryServer;
use combine_db_bootstrap::{bootstrap, BootstrapError, DatabaseCredentials, SchemaCharset};

/// Test: default credentials produce the documented schema, account and grant
#[tokio::test]
async fn test_default_bootstrap_state() {
    let server = MemoryServer::new();
    bootstrap(&server, &DatabaseCredentials::default())
        .await
        .expect("bootstrap failed");

    let state = server.state();
    assert_eq!(
        state.databases.get("combine"),
        Some(&SchemaCharset::new("utf8", "utf8_general_ci"))
    );
    assert!(server.authenticate("combine", "%", "combine"));
    assert!(!server.authenticate("combine", "%", "wrong"));
    assert!(server.has_all_privileges("combine", "%", "*.*"));
    assert_eq!(server.flush_count(), 1);
}

/// Test: a second run leaves the state unchanged
#[tokio::test]
async fn test_bootstrap_twice_is_idempotent() {
    let server = MemoryServer::new();
    let creds = DatabaseCredentials::default();

    bootstrap(&server, &creds).await.expect("first run failed");
    let after_first = server.state();

    let second = bootstrap(&server, &creds).await.expect("second run failed");
    let after_second = server.state();

    assert_eq!(after_first, after_second);
    assert_eq!(after_second.users.len(), 1, "No duplicate users");
    assert_eq!(after_second.grants.len(), 1, "No duplicate grants");
    assert!(!second.charset_repaired);
    assert_eq!(server.executed().len(), 8, "Same four statements each run");
}

/// Test: an existing schema with another charset is brought back in line
#[tokio::test]
async fn test_charset_drift_repaired() {
    let server = MemoryServer::new().with_database("combine", "latin1", "latin1_swedish_ci");

    let report = bootstrap(&server, &DatabaseCredentials::default())
        .await
        .expect("bootstrap failed");

    assert!(report.charset_repaired);
    assert_eq!(report.statements.len(), 5);
    assert!(report.statements[4].starts_with("ALTER DATABASE combine"));
    assert_eq!(
        server.state().databases.get("combine"),
        Some(&SchemaCharset::new("utf8", "utf8_general_ci"))
    );
}

/// Test: changing the password in config does not rotate an existing account
#[tokio::test]
async fn test_existing_account_not_mutated() {
    let server = MemoryServer::new();
    bootstrap(&server, &DatabaseCredentials::new("combine", "combine", "first"))
        .await
        .unwrap();
    bootstrap(&server, &DatabaseCredentials::new("combine", "combine", "second"))
        .await
        .unwrap();

    assert!(server.authenticate("combine", "%", "first"));
    assert!(!server.authenticate("combine", "%", "second"));
}

/// Test: connection failure surfaces as a connection error
#[tokio::test]
async fn test_unreachable_server_fails() {
    let server = MemoryServer::unreachable();
    let err = bootstrap(&server, &DatabaseCredentials::default())
        .await
        .unwrap_err();
    assert!(matches!(err, BootstrapError::Connection(_)));
}
