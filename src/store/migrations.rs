//! Versioned schema migrations
//!
//! Applied in ascending version order; each one runs at most once and is
//! recorded in `schema_migrations` in the same transaction that applied
//! it.

use std::collections::HashSet;

use rusqlite::{params, Connection};

pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Append-only: never edit or reorder an entry that has shipped.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_records_table",
        sql: r#"
            CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, key)
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_records_collection_index",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection);
        "#,
    },
];

fn applied_versions(conn: &Connection) -> rusqlite::Result<HashSet<i64>> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL
        )",
        [],
    )?;
    let mut stmt = conn.prepare("SELECT version FROM schema_migrations")?;
    let versions = stmt.query_map([], |row| row.get(0))?.collect();
    versions
}

/// Bring the schema up to date. Safe to call on every open.
pub fn run_migrations(conn: &mut Connection) -> rusqlite::Result<()> {
    let applied = applied_versions(conn)?;

    for migration in MIGRATIONS {
        if applied.contains(&migration.version) {
            continue;
        }
        let tx = conn.transaction()?;
        tx.execute_batch(migration.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
            params![
                migration.version,
                migration.name,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;
        tracing::info!(
            version = migration.version,
            name = migration.name,
            "migration applied"
        );
    }

    Ok(())
}
