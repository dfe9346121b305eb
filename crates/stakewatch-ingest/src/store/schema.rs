//! SQLite schema for the ledger and entity registry.

use rusqlite::{Connection, Result};

/// Current schema version. Increment when making breaking changes.
pub const SCHEMA_VERSION: i32 = 2;

/// Initialize the database schema.
///
/// Creates all tables on a fresh database and runs pending migrations on an
/// older one. A database written by a newer version is refused.
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        create_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        migrate(conn, current_version, SCHEMA_VERSION)?;
    } else if current_version > SCHEMA_VERSION {
        return Err(rusqlite::Error::InvalidParameterName(format!(
            "database schema version {} is newer than supported version {}",
            current_version, SCHEMA_VERSION
        )));
    }

    Ok(())
}

/// Get the current schema version (0 if not initialized).
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        )",
        [],
    )?;

    let version: Option<i32> = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .ok();

    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

fn create_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Tracked accounts
        CREATE TABLE IF NOT EXISTS entities (
            address TEXT PRIMARY KEY,
            display_name TEXT NOT NULL,
            initial_balance INTEGER NOT NULL,
            bootstrap_transaction_id TEXT,
            registered_at INTEGER NOT NULL
        );

        -- Append-only ledger, one row per (transaction, entity)
        CREATE TABLE IF NOT EXISTS ledger_transactions (
            transaction_id TEXT NOT NULL,
            entity_address TEXT NOT NULL,
            kind TEXT NOT NULL,
            sender TEXT NOT NULL,
            receiver TEXT,
            amount INTEGER NOT NULL,
            fee INTEGER NOT NULL,
            confirmed_round INTEGER NOT NULL,
            occurred_at INTEGER NOT NULL,
            note TEXT,
            PRIMARY KEY (transaction_id, entity_address)
        );

        CREATE INDEX IF NOT EXISTS idx_ledger_entity_round
            ON ledger_transactions(entity_address, confirmed_round);
        CREATE INDEX IF NOT EXISTS idx_ledger_entity_time
            ON ledger_transactions(entity_address, occurred_at);
        "#,
    )?;

    create_sync_leases(conn)
}

fn migrate(conn: &Connection, from: i32, to: i32) -> Result<()> {
    for version in from..to {
        if version == 1 {
            create_sync_leases(conn)?;
        }
    }
    set_schema_version(conn, to)?;
    Ok(())
}

/// v2: one row per entity currently being synchronized, shared by every
/// process that opens the database.
fn create_sync_leases(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS sync_leases (
            entity_address TEXT PRIMARY KEY,
            holder TEXT NOT NULL,
            acquired_at INTEGER NOT NULL
        );
        "#,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_fresh() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_init_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();

        let version = get_schema_version(&conn).unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_tables_exist() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect();

        assert!(tables.contains(&"entities".to_string()));
        assert!(tables.contains(&"ledger_transactions".to_string()));
        assert!(tables.contains(&"schema_version".to_string()));
        assert!(tables.contains(&"sync_leases".to_string()));
    }

    #[test]
    fn test_migrate_v1_adds_sync_leases() {
        let conn = Connection::open_in_memory().unwrap();
        get_schema_version(&conn).unwrap();
        set_schema_version(&conn, 1).unwrap();
        conn.execute_batch(
            "CREATE TABLE entities (address TEXT PRIMARY KEY);
             CREATE TABLE ledger_transactions (transaction_id TEXT);",
        )
        .unwrap();

        init_schema(&conn).unwrap();

        assert_eq!(get_schema_version(&conn).unwrap(), SCHEMA_VERSION);
        let leases: i64 = conn
            .query_row("SELECT COUNT(*) FROM sync_leases", [], |row| row.get(0))
            .unwrap();
        assert_eq!(leases, 0);
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        set_schema_version(&conn, SCHEMA_VERSION + 1).unwrap();

        assert!(init_schema(&conn).is_err());
    }
}
