pub mod schema;

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::collection::CollectionState;
use crate::domain::CatalogDocument;
use crate::error::{Error, Result};

/// One row of the DAT library: a catalog file the user imported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryDat {
    pub id: String,
    pub path: PathBuf,
    pub name: String,
    pub version: String,
    pub system: String,
    pub entry_count: usize,
    pub imported_at: DateTime<Utc>,
}

/// Saved collection listing (without the snapshot bytes).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedCollection {
    pub name: String,
    pub saved_at: DateTime<Utc>,
    pub size: usize,
}

fn from_timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// SQLite-backed store for settings, saved collections and the DAT library.
/// The core never requires it; frontends use it to persist between runs.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open or create a store at the given path with WAL mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        tracing::debug!(path = %path.display(), "opened store");
        Ok(Self { conn })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    // ── Config ───────────────────────────────────────────────────────

    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM config WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .ok();
        Ok(value)
    }

    pub fn remove_config(&self, key: &str) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM config WHERE key = ?1", params![key])?;
        Ok(n > 0)
    }

    // ── Collections ──────────────────────────────────────────────────

    pub fn save_collection(&self, name: &str, state: &CollectionState) -> Result<()> {
        let data = state.to_bytes()?;
        self.conn.execute(
            "INSERT INTO collections (name, saved_at, data) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET saved_at = excluded.saved_at, data = excluded.data",
            params![name, Utc::now().timestamp(), data],
        )?;
        tracing::debug!(collection = name, "saved collection");
        Ok(())
    }

    pub fn load_collection(&self, name: &str) -> Result<CollectionState> {
        let data: Vec<u8> = self
            .conn
            .query_row(
                "SELECT data FROM collections WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .map_err(|_| Error::CollectionNotFound(name.to_string()))?;
        CollectionState::from_bytes(&data)
    }

    /// Newest first.
    pub fn list_collections(&self) -> Result<Vec<SavedCollection>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, saved_at, length(data) FROM collections ORDER BY saved_at DESC, name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SavedCollection {
                    name: row.get(0)?,
                    saved_at: from_timestamp(row.get(1)?),
                    size: row.get::<_, i64>(2)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete_collection(&self, name: &str) -> Result<()> {
        let n = self
            .conn
            .execute("DELETE FROM collections WHERE name = ?1", params![name])?;
        if n == 0 {
            return Err(Error::CollectionNotFound(name.to_string()));
        }
        Ok(())
    }

    // ── DAT library ──────────────────────────────────────────────────

    /// Record (or refresh) an imported catalog file.
    pub fn record_dat(&self, doc: &CatalogDocument, path: &Path) -> Result<LibraryDat> {
        let dat = LibraryDat {
            id: doc.id.clone(),
            path: path.to_path_buf(),
            name: doc.header.name.clone(),
            version: doc.header.version.clone(),
            system: doc.system_name().to_string(),
            entry_count: doc.entries.len(),
            imported_at: Utc::now(),
        };
        self.conn.execute(
            "INSERT INTO dat_library (id, path, name, version, system, entry_count, imported_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                path = excluded.path,
                name = excluded.name,
                version = excluded.version,
                system = excluded.system,
                entry_count = excluded.entry_count,
                imported_at = excluded.imported_at",
            params![
                dat.id,
                dat.path.to_string_lossy().as_ref(),
                dat.name,
                dat.version,
                dat.system,
                dat.entry_count as i64,
                dat.imported_at.timestamp(),
            ],
        )?;
        Ok(dat)
    }

    /// In import order.
    pub fn list_dats(&self) -> Result<Vec<LibraryDat>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, path, name, version, system, entry_count, imported_at
             FROM dat_library ORDER BY imported_at, id",
        )?;
        let dats = stmt
            .query_map([], |row| {
                Ok(LibraryDat {
                    id: row.get(0)?,
                    path: PathBuf::from(row.get::<_, String>(1)?),
                    name: row.get(2)?,
                    version: row.get(3)?,
                    system: row.get(4)?,
                    entry_count: row.get::<_, i64>(5)? as usize,
                    imported_at: from_timestamp(row.get(6)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(dats)
    }

    pub fn remove_dat(&self, id: &str) -> Result<()> {
        let n = self
            .conn
            .execute("DELETE FROM dat_library WHERE id = ?1", params![id])?;
        if n == 0 {
            return Err(Error::CatalogNotLoaded(id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CatalogFormat, CatalogHeader};

    fn make_doc(id: &str) -> CatalogDocument {
        CatalogDocument {
            id: id.to_string(),
            format: CatalogFormat::Logiqx,
            header: CatalogHeader {
                name: "Nintendo - NES".to_string(),
                version: "20240101".to_string(),
                ..CatalogHeader::default()
            },
            entries: Vec::new(),
            load_order: 0,
            source_path: None,
            warnings: Vec::new(),
            loaded_at: Utc::now(),
        }
    }

    // ── Config ──────────────────────────────────────────────────

    #[test]
    fn test_set_and_get_config() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.get_config("region_priority").unwrap(), None);

        store.set_config("region_priority", "USA,Europe").unwrap();
        store.set_config("region_priority", "Japan").unwrap();
        assert_eq!(
            store.get_config("region_priority").unwrap(),
            Some("Japan".to_string())
        );
        assert!(store.remove_config("region_priority").unwrap());
        assert!(!store.remove_config("region_priority").unwrap());
    }

    // ── Collections ─────────────────────────────────────────────

    #[test]
    fn test_save_and_load_collection() {
        let store = Store::open_in_memory().unwrap();
        let mut state = CollectionState::new();
        state.register_catalog(make_doc("NES"));

        store.save_collection("main", &state).unwrap();
        assert_eq!(store.load_collection("main").unwrap(), state);

        state.register_catalog(make_doc("SNES"));
        store.save_collection("main", &state).unwrap();
        assert_eq!(store.load_collection("main").unwrap().catalogs.len(), 2);
        assert_eq!(store.list_collections().unwrap().len(), 1);
    }

    #[test]
    fn test_missing_collection() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(
            store.load_collection("nope"),
            Err(Error::CollectionNotFound(_))
        ));
        assert!(store.delete_collection("nope").is_err());

        store.save_collection("x", &CollectionState::new()).unwrap();
        store.delete_collection("x").unwrap();
        assert!(store.list_collections().unwrap().is_empty());
    }

    // ── DAT library ─────────────────────────────────────────────

    #[test]
    fn test_record_and_remove_dat() {
        let store = Store::open_in_memory().unwrap();
        let dat = store
            .record_dat(&make_doc("NES"), Path::new("/dats/nes.dat"))
            .unwrap();
        assert_eq!(dat.system, "Nintendo - NES");

        store
            .record_dat(&make_doc("NES"), Path::new("/dats/nes-new.dat"))
            .unwrap();
        let dats = store.list_dats().unwrap();
        assert_eq!(dats.len(), 1);
        assert_eq!(dats[0].path, PathBuf::from("/dats/nes-new.dat"));

        store.remove_dat("NES").unwrap();
        assert!(store.list_dats().unwrap().is_empty());
        assert!(matches!(store.remove_dat("NES"), Err(Error::CatalogNotLoaded(_))));
    }

    // ── Schema version tracking ─────────────────────────────────

    #[test]
    fn test_schema_version_persists_across_reopen() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested/library.db");
        {
            let store = Store::open(&db_path).unwrap();
            assert_eq!(store.get_config("schema_version").unwrap(), Some("1".to_string()));
        }
        let store = Store::open(&db_path).unwrap();
        assert_eq!(store.get_config("schema_version").unwrap(), Some("1".to_string()));
    }

    #[test]
    fn test_open_uses_wal_and_plain_tables() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Store::open(&tmp.path().join("library.db")).unwrap();
        let mode: String = store
            .conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");

        for table in ["config", "collections", "dat_library"] {
            let links: i64 = store
                .conn
                .query_row(
                    "SELECT COUNT(*) FROM pragma_foreign_key_list(?1)",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(links, 0, "{table} declares a foreign key");
        }
    }

    #[test]
    fn test_reject_future_schema_version() {
        let conn = Connection::open_in_memory().unwrap();
        schema::initialize(&conn).unwrap();
        conn.execute(
            "INSERT INTO config (key, value) VALUES ('schema_version', '999')",
            [],
        )
        .unwrap();

        let err = schema::migrate(&conn).unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedSchema { found: 999, supported: 1 }
        ));
    }
}
