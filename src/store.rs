//! SQLite storage for captured image records
//!
//! One table keyed by URL. The schema carries a version via
//! `PRAGMA user_version`; any stored version other than the current one is
//! handled by dropping and recreating the table (destructive migration, by
//! design - no data is carried across versions).

use crate::record::{CapturedImage, ImageMetadata};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Current schema version, bumped whenever the table layout changes
const SCHEMA_VERSION: i64 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error during {op}: {source}")]
    Sqlite {
        op: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    fn sqlite(op: &'static str) -> impl FnOnce(rusqlite::Error) -> StoreError {
        move |source| StoreError::Sqlite { op, source }
    }
}

/// SQLite-backed image store
pub struct ImageStore {
    conn: Connection,
}

impl ImageStore {
    /// Open or create the database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path).map_err(StoreError::sqlite("open"))?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(StoreError::sqlite("open"))?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    /// Initialize the schema, destructively recreating it when the stored
    /// version does not match the current one
    fn migrate(&self) -> Result<(), StoreError> {
        let stored: i64 = self
            .conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .map_err(StoreError::sqlite("migrate"))?;

        if stored != 0 && stored != SCHEMA_VERSION {
            warn!(
                stored,
                current = SCHEMA_VERSION,
                "schema version mismatch, dropping captured_images"
            );
            self.conn
                .execute_batch("DROP TABLE IF EXISTS captured_images;")
                .map_err(StoreError::sqlite("migrate"))?;
        }

        self.conn
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS captured_images (
                    url TEXT PRIMARY KEY,
                    tab_id INTEGER NOT NULL,
                    timestamp INTEGER NOT NULL,
                    full_data BLOB,
                    thumbnail_data TEXT,
                    width INTEGER,
                    height INTEGER,
                    file_size INTEGER
                );
                "#,
            )
            .map_err(StoreError::sqlite("migrate"))?;

        if stored != SCHEMA_VERSION {
            self.conn
                .execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))
                .map_err(StoreError::sqlite("migrate"))?;
            info!(version = SCHEMA_VERSION, "captured_images schema ready");
        }

        Ok(())
    }

    /// Upsert a record keyed by URL; an existing record with the same URL is
    /// overwritten
    pub fn put(&self, record: &CapturedImage) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO captured_images
                     (url, tab_id, timestamp, full_data, thumbnail_data, width, height, file_size)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(url) DO UPDATE SET
                     tab_id = excluded.tab_id,
                     timestamp = excluded.timestamp,
                     full_data = excluded.full_data,
                     thumbnail_data = excluded.thumbnail_data,
                     width = excluded.width,
                     height = excluded.height,
                     file_size = excluded.file_size",
                params![
                    record.url,
                    record.tab_id,
                    record.timestamp,
                    record.full_data,
                    record.thumbnail_data,
                    record.width,
                    record.height,
                    record.file_size,
                ],
            )
            .map_err(StoreError::sqlite("put"))?;
        Ok(())
    }

    /// Fetch a single record by URL
    pub fn get(&self, url: &str) -> Result<Option<CapturedImage>, StoreError> {
        self.conn
            .query_row(
                "SELECT url, tab_id, timestamp, full_data, thumbnail_data, width, height, file_size
                 FROM captured_images WHERE url = ?1",
                params![url],
                row_to_record,
            )
            .optional()
            .map_err(StoreError::sqlite("get"))
    }

    /// All records including blobs, in insertion order
    pub fn get_all(&self) -> Result<Vec<CapturedImage>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT url, tab_id, timestamp, full_data, thumbnail_data, width, height, file_size
                 FROM captured_images ORDER BY rowid",
            )
            .map_err(StoreError::sqlite("get_all"))?;

        let rows = stmt
            .query_map([], row_to_record)
            .map_err(StoreError::sqlite("get_all"))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(StoreError::sqlite("get_all"))?);
        }
        Ok(records)
    }

    /// All records without blobs, for list views
    pub fn get_all_metadata(&self) -> Result<Vec<ImageMetadata>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT url, tab_id, timestamp, thumbnail_data, width, height, file_size
                 FROM captured_images ORDER BY rowid",
            )
            .map_err(StoreError::sqlite("get_all_metadata"))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(ImageMetadata {
                    url: row.get(0)?,
                    tab_id: row.get(1)?,
                    timestamp: row.get(2)?,
                    thumbnail_data: row.get(3)?,
                    width: row.get(4)?,
                    height: row.get(5)?,
                    file_size: row.get(6)?,
                })
            })
            .map_err(StoreError::sqlite("get_all_metadata"))?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(StoreError::sqlite("get_all_metadata"))?);
        }
        Ok(records)
    }

    /// Attach a derived thumbnail to an existing record without rewriting
    /// the blob
    pub fn set_thumbnail(&self, url: &str, data_uri: &str) -> Result<(), StoreError> {
        self.conn
            .execute(
                "UPDATE captured_images SET thumbnail_data = ?2 WHERE url = ?1",
                params![url, data_uri],
            )
            .map_err(StoreError::sqlite("set_thumbnail"))?;
        Ok(())
    }

    /// Delete one record; returns whether a record existed
    pub fn delete(&self, url: &str) -> Result<bool, StoreError> {
        let changed = self
            .conn
            .execute("DELETE FROM captured_images WHERE url = ?1", params![url])
            .map_err(StoreError::sqlite("delete"))?;
        Ok(changed > 0)
    }

    /// Delete all records
    pub fn clear(&self) -> Result<(), StoreError> {
        self.conn
            .execute("DELETE FROM captured_images", [])
            .map_err(StoreError::sqlite("clear"))?;
        Ok(())
    }

    /// Number of stored records
    pub fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM captured_images", [], |row| row.get(0))
            .map_err(StoreError::sqlite("count"))?;
        Ok(count as u64)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<CapturedImage> {
    Ok(CapturedImage {
        url: row.get(0)?,
        tab_id: row.get(1)?,
        timestamp: row.get(2)?,
        full_data: row.get(3)?,
        thumbnail_data: row.get(4)?,
        width: row.get(5)?,
        height: row.get(6)?,
        file_size: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_record(url: &str) -> CapturedImage {
        CapturedImage::new(
            url.to_string(),
            7,
            1_700_000_000_000,
            vec![0xFF, 0xD8, 0xFF, 0xD9],
            "data:image/jpeg;base64,abcd".to_string(),
        )
    }

    #[test]
    fn test_put_and_get() {
        let store = ImageStore::open_in_memory().unwrap();
        store.put(&make_record("https://x/a.png")).unwrap();

        let found = store.get("https://x/a.png").unwrap().unwrap();
        assert_eq!(found.tab_id, 7);
        assert_eq!(found.full_data.as_deref(), Some(&[0xFF, 0xD8, 0xFF, 0xD9][..]));
        assert_eq!(found.file_size, Some(4));

        assert!(store.get("https://x/missing.png").unwrap().is_none());
    }

    #[test]
    fn test_put_is_upsert() {
        let store = ImageStore::open_in_memory().unwrap();
        let record = make_record("https://x/a.png");
        store.put(&record).unwrap();
        store.put(&record).unwrap();
        assert_eq!(store.count().unwrap(), 1);

        let mut updated = make_record("https://x/a.png");
        updated.tab_id = 9;
        store.put(&updated).unwrap();
        assert_eq!(store.count().unwrap(), 1);
        assert_eq!(store.get("https://x/a.png").unwrap().unwrap().tab_id, 9);
    }

    #[test]
    fn test_get_all_insertion_order() {
        let store = ImageStore::open_in_memory().unwrap();
        store.put(&make_record("https://x/b.png")).unwrap();
        store.put(&make_record("https://x/a.png")).unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].url, "https://x/b.png");
        assert_eq!(all[1].url, "https://x/a.png");
    }

    #[test]
    fn test_metadata_omits_blob() {
        let store = ImageStore::open_in_memory().unwrap();
        store.put(&make_record("https://x/a.png")).unwrap();

        let meta = store.get_all_metadata().unwrap();
        assert_eq!(meta.len(), 1);
        assert_eq!(meta[0].file_size, Some(4));
        assert!(meta[0].thumbnail_data.is_some());
    }

    #[test]
    fn test_set_thumbnail() {
        let store = ImageStore::open_in_memory().unwrap();
        let mut record = make_record("https://x/a.png");
        record.thumbnail_data = None;
        store.put(&record).unwrap();

        store
            .set_thumbnail("https://x/a.png", "data:image/jpeg;base64,efgh")
            .unwrap();
        let found = store.get("https://x/a.png").unwrap().unwrap();
        assert_eq!(found.thumbnail_data.as_deref(), Some("data:image/jpeg;base64,efgh"));
        // Blob untouched
        assert_eq!(found.file_size, Some(4));
    }

    #[test]
    fn test_delete_and_clear() {
        let store = ImageStore::open_in_memory().unwrap();
        store.put(&make_record("https://x/a.png")).unwrap();
        store.put(&make_record("https://x/b.png")).unwrap();

        assert!(store.delete("https://x/a.png").unwrap());
        assert!(!store.delete("https://x/a.png").unwrap());
        assert_eq!(store.count().unwrap(), 1);

        store.clear().unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_version_mismatch_drops_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("images.db");

        {
            let store = ImageStore::open(&path).unwrap();
            store.put(&make_record("https://x/a.png")).unwrap();
            assert_eq!(store.count().unwrap(), 1);
        }

        // Simulate an old on-disk schema version
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("PRAGMA user_version = 99;").unwrap();
        }

        let store = ImageStore::open(&path).unwrap();
        assert_eq!(store.count().unwrap(), 0);
    }
}
