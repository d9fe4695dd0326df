use rusqlite::{params, Connection};

use crate::error::{Error, Result};

/// Version written by this build. Bump together with a step in `migrate`.
pub const SCHEMA_VERSION: i64 = 1;

pub fn initialize(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS config (
            key   TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS collections (
            name      TEXT PRIMARY KEY,
            saved_at  INTEGER NOT NULL,
            data      BLOB NOT NULL
        );

        CREATE TABLE IF NOT EXISTS dat_library (
            id           TEXT PRIMARY KEY,
            path         TEXT NOT NULL,
            name         TEXT NOT NULL,
            version      TEXT NOT NULL,
            system       TEXT NOT NULL,
            entry_count  INTEGER NOT NULL,
            imported_at  INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_dat_library_path ON dat_library(path);
        ",
    )?;
    Ok(())
}

fn stored_version(conn: &Connection) -> Option<i64> {
    conn.query_row(
        "SELECT value FROM config WHERE key = 'schema_version'",
        [],
        |row| row.get::<_, String>(0),
    )
    .ok()
    .and_then(|v| v.parse().ok())
}

/// Stamp the schema version, refusing databases written by a newer build.
pub fn migrate(conn: &Connection) -> Result<()> {
    match stored_version(conn) {
        Some(found) if found > SCHEMA_VERSION => Err(Error::UnsupportedSchema {
            found,
            supported: SCHEMA_VERSION,
        }),
        Some(found) if found == SCHEMA_VERSION => Ok(()),
        _ => {
            conn.execute(
                "INSERT INTO config (key, value) VALUES ('schema_version', ?1)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![SCHEMA_VERSION.to_string()],
            )?;
            Ok(())
        }
    }
}
