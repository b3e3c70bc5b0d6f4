use std::collections::HashSet;
use std::path::Path;

use rusqlite::Connection;

use crate::error::AppError;

const MIGRATION_0001: (&str, &str) = (
    "0001_init.sql",
    include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../migrations/0001_init.sql"
    )),
);

const MIGRATION_0002: (&str, &str) = (
    "0002_add_message_refs.sql",
    include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../migrations/0002_add_message_refs.sql"
    )),
);

const MIGRATION_0003: (&str, &str) = (
    "0003_add_event_id.sql",
    include_str!(concat!(
        env!("CARGO_MANIFEST_DIR"),
        "/../../migrations/0003_add_event_id.sql"
    )),
);

fn migrations() -> Vec<(&'static str, &'static str)> {
    vec![MIGRATION_0001, MIGRATION_0002, MIGRATION_0003]
}

pub fn open(path: &Path) -> Result<Connection, AppError> {
    Connection::open(path)
        .map_err(|e| AppError::wrap("DB_OPEN_FAILED", "Failed to open SQLite database", e))
}

pub fn open_in_memory() -> Result<Connection, AppError> {
    Connection::open_in_memory().map_err(|e| {
        AppError::wrap("DB_OPEN_FAILED", "Failed to open in-memory SQLite database", e)
    })
}

pub fn migrate(conn: &mut Connection) -> Result<(), AppError> {
    // Track migrations by name, applying each exactly once, in deterministic order.
    conn.execute_batch(
        r#"
      PRAGMA foreign_keys = ON;
      CREATE TABLE IF NOT EXISTS _migrations (
        name TEXT PRIMARY KEY NOT NULL,
        applied_at TEXT NOT NULL
      );
    "#,
    )
    .map_err(|e| {
        AppError::wrap(
            "DB_MIGRATIONS_TABLE_FAILED",
            "Failed to ensure migrations table exists",
            e,
        )
    })?;

    let applied: HashSet<String> = {
        let mut stmt = conn.prepare("SELECT name FROM _migrations").map_err(|e| {
            AppError::wrap(
                "DB_MIGRATIONS_QUERY_FAILED",
                "Failed to query applied migrations",
                e,
            )
        })?;

        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(|e| {
                AppError::wrap(
                    "DB_MIGRATIONS_QUERY_FAILED",
                    "Failed to read applied migrations",
                    e,
                )
            })?;

        let mut set = HashSet::new();
        for r in rows {
            let name = r.map_err(|e| {
                AppError::wrap(
                    "DB_MIGRATIONS_QUERY_FAILED",
                    "Failed to read applied migration row",
                    e,
                )
            })?;
            set.insert(name);
        }
        set
    };

    for (name, sql) in migrations() {
        if applied.contains(name) {
            continue;
        }

        let tx = conn.transaction().map_err(|e| {
            AppError::wrap("DB_TX_FAILED", "Failed to start migration transaction", e)
        })?;

        tx.execute_batch(sql).map_err(|e| {
            AppError::wrap("DB_MIGRATION_FAILED", format!("Migration {name} failed"), e)
        })?;

        // Use SQLite to record the timestamp; this is operational metadata only.
        tx.execute(
            "INSERT INTO _migrations(name, applied_at) VALUES (?1, strftime('%Y-%m-%dT%H:%M:%fZ','now'))",
            [name],
        )
        .map_err(|e| {
            AppError::wrap(
                "DB_MIGRATION_FAILED",
                format!("Failed to record migration {name}"),
                e,
            )
        })?;

        tx.commit().map_err(|e| {
            AppError::wrap("DB_TX_FAILED", "Failed to commit migration transaction", e)
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::OptionalExtension;

    #[test]
    fn migrations_create_expected_tables() {
        let mut conn = open_in_memory().expect("open");
        migrate(&mut conn).expect("migrate");

        for table in ["incidents", "incident_comments"] {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")
                .unwrap();
            let name: Option<String> = stmt.query_row([table], |row| row.get(0)).optional().unwrap();
            assert_eq!(name.as_deref(), Some(table));
        }
    }

    #[test]
    fn migrate_is_idempotent() {
        let mut conn = open_in_memory().expect("open");
        migrate(&mut conn).expect("first run");
        migrate(&mut conn).expect("second run");

        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM _migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 3);
    }
}
