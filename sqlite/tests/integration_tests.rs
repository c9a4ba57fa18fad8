//! Integration tests for the schema-ledger-sqlite crate.

use schema_ledger_core::{Connection, FnMigration, MigrationUnit, SqlValue};
use schema_ledger_sqlite::SqliteConnection;
use tempfile::TempDir;

fn create_users() -> FnMigration {
    FnMigration::new()
        .on_up(|conn| {
            conn.execute_batch(
                "CREATE TABLE users (id INTEGER PRIMARY KEY, email TEXT NOT NULL);
                 CREATE INDEX idx_users_email ON users (email);",
            )
            .map_err(|e| e.to_string())?;
            conn.commit().map_err(|e| e.to_string())?;
            Ok("created users".to_string())
        })
        .on_down(|conn| {
            conn.execute("DROP TABLE users", &[]).map_err(|e| e.to_string())?;
            conn.commit().map_err(|e| e.to_string())?;
            Ok("dropped users".to_string())
        })
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_committed_changes_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.db");

    {
        let mut conn = SqliteConnection::open(&path).unwrap();
        create_users().up(&mut conn).unwrap();
        conn.execute(
            "INSERT INTO users (email) VALUES (?1)",
            &[SqlValue::from("ada@example.com")],
        )
        .unwrap();
        conn.commit().unwrap();
    }

    let mut conn = SqliteConnection::open(&path).unwrap();
    assert!(conn.table_exists("users").unwrap());
    let rows = conn.execute("SELECT email FROM users", &[]).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_str("email"), Some("ada@example.com"));
}

#[test]
fn test_uncommitted_changes_are_discarded_on_drop() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.db");

    {
        let mut conn = SqliteConnection::open(&path).unwrap();
        conn.execute("CREATE TABLE scratch (id INTEGER)", &[]).unwrap();
        assert!(conn.in_transaction());
    }

    let mut conn = SqliteConnection::open(&path).unwrap();
    assert!(!conn.table_exists("scratch").unwrap());
}

// =============================================================================
// Migration units against SQLite
// =============================================================================

#[test]
fn test_unit_up_then_down() {
    let mut conn = SqliteConnection::open_in_memory().unwrap();
    let unit = create_users();

    assert_eq!(unit.up(&mut conn).unwrap(), "created users");
    assert!(conn.table_exists("users").unwrap());

    assert_eq!(unit.down(&mut conn).unwrap(), "dropped users");
    assert!(!conn.table_exists("users").unwrap());
}

#[test]
fn test_failed_batch_leaves_nothing_behind_after_rollback() {
    let mut conn = SqliteConnection::open_in_memory().unwrap();

    let err = conn
        .execute_batch(
            "CREATE TABLE posts (id INTEGER PRIMARY KEY);
             INSERT INTO no_such_table VALUES (1);",
        )
        .unwrap_err();
    assert!(err.to_string().contains("no_such_table"), "got: {err}");

    conn.rollback().unwrap();
    assert!(!conn.table_exists("posts").unwrap());
}

#[test]
fn test_wraps_existing_rusqlite_connection() {
    let raw = rusqlite::Connection::open_in_memory().unwrap();
    raw.execute_batch("CREATE TABLE existing (id INTEGER)").unwrap();

    let mut conn = SqliteConnection::from(raw);
    assert!(conn.table_exists("existing").unwrap());
    assert!(!conn.table_exists("missing").unwrap());

    let raw = conn.into_inner();
    assert!(raw.is_autocommit());
}
