//! Durable per-domain key store on SQLite.
//!
//! Each domain owns one single-file database under the configured `db_path`,
//! holding one table mapping key to `(value, version)`. The worker opens the
//! connection when it starts and closes it when it retires; batch applies and
//! replay snapshots run inside one transaction.

use crate::error::Result;
use crate::types::DomainName;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;

/// A stored entry: key, value, version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Entry {
    pub key: String,
    pub value: String,
    pub version: String,
}

/// Handle to one domain's durable store.
pub(crate) struct DomainDb {
    conn: Connection,
}

impl DomainDb {
    /// Open (or create) the store file for a domain.
    pub(crate) fn open(dir: &Path, domain: &DomainName) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let conn = Connection::open(dir.join(format!("{domain}.sqlite")))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                version TEXT NOT NULL
            )",
            [],
        )?;
        Ok(Self { conn })
    }

    /// Begin a transaction covering one batch of mutations.
    pub(crate) fn begin(&mut self) -> Result<DomainTx<'_>> {
        Ok(DomainTx {
            tx: self.conn.transaction()?,
        })
    }

    /// Every persistent entry, ordered by key. A single statement, so the
    /// snapshot is atomic with respect to other connections.
    pub(crate) fn entries(&self) -> Result<Vec<Entry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value, version FROM entries ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok(Entry {
                key: row.get(0)?,
                value: row.get(1)?,
                version: row.get(2)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

/// An open batch transaction against one domain's store.
pub(crate) struct DomainTx<'a> {
    tx: Transaction<'a>,
}

impl DomainTx<'_> {
    /// Look up `(value, version)` for a key, observing earlier writes in
    /// this same batch.
    pub(crate) fn get(&self, key: &str) -> Result<Option<(String, String)>> {
        let found = self
            .tx
            .query_row(
                "SELECT value, version FROM entries WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(found)
    }

    /// Insert or overwrite a key.
    pub(crate) fn put(&self, key: &str, value: &str, version: &str) -> Result<()> {
        self.tx.execute(
            "INSERT INTO entries (key, value, version) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = ?2, version = ?3",
            params![key, value, version],
        )?;
        Ok(())
    }

    /// Remove a key.
    pub(crate) fn delete(&self, key: &str) -> Result<()> {
        self.tx
            .execute("DELETE FROM entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    /// Commit the batch.
    pub(crate) fn commit(self) -> Result<()> {
        self.tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp() -> (tempfile::TempDir, DomainDb) {
        let dir = tempfile::tempdir().unwrap();
        let db = DomainDb::open(dir.path(), &DomainName::new("d1").unwrap()).unwrap();
        (dir, db)
    }

    #[test]
    fn test_put_get_delete() {
        let (_dir, mut db) = open_temp();

        let tx = db.begin().unwrap();
        tx.put("k1", "v1", "ver1").unwrap();
        tx.commit().unwrap();

        let tx = db.begin().unwrap();
        assert_eq!(
            tx.get("k1").unwrap(),
            Some(("v1".to_string(), "ver1".to_string()))
        );
        tx.delete("k1").unwrap();
        assert_eq!(tx.get("k1").unwrap(), None);
        tx.commit().unwrap();
    }

    #[test]
    fn test_batch_sees_its_own_writes() {
        let (_dir, mut db) = open_temp();

        let tx = db.begin().unwrap();
        tx.put("k1", "v1", "ver1").unwrap();
        tx.put("k1", "v2", "ver2").unwrap();
        assert_eq!(
            tx.get("k1").unwrap(),
            Some(("v2".to_string(), "ver2".to_string()))
        );
        tx.commit().unwrap();
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let (_dir, mut db) = open_temp();

        {
            let tx = db.begin().unwrap();
            tx.put("k1", "v1", "ver1").unwrap();
            // dropped without commit
        }
        assert!(db.entries().unwrap().is_empty());
    }

    #[test]
    fn test_entries_ordered_by_key() {
        let (_dir, mut db) = open_temp();

        let tx = db.begin().unwrap();
        tx.put("b", "2", "v").unwrap();
        tx.put("a", "1", "v").unwrap();
        tx.put("c", "3", "v").unwrap();
        tx.commit().unwrap();

        let keys: Vec<_> = db.entries().unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_reopen_persists() {
        let dir = tempfile::tempdir().unwrap();
        let domain = DomainName::new("d1").unwrap();
        {
            let mut db = DomainDb::open(dir.path(), &domain).unwrap();
            let tx = db.begin().unwrap();
            tx.put("k1", "v1", "ver1").unwrap();
            tx.commit().unwrap();
        }

        let db = DomainDb::open(dir.path(), &domain).unwrap();
        assert_eq!(db.entries().unwrap().len(), 1);
    }
}
