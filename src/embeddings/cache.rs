// cache.rs — Content-addressed snapshot caches.
//
// Lookups are keyed on `SnapshotKey` (hash of model + threshold + fragments), never on
// call site or wall-clock time. Only complete snapshots are ever stored.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use zerocopy::IntoBytes;

use crate::config;
use crate::embeddings::snapshot::{Snapshot, SnapshotKey};
use crate::error::{KbError, Result};

pub trait SnapshotCache {
    fn get(&self, key: &SnapshotKey) -> Result<Option<Arc<Snapshot>>>;

    fn put(&mut self, snapshot: Arc<Snapshot>) -> Result<()>;

    /// Returns true if an entry was removed.
    fn invalidate(&mut self, key: &SnapshotKey) -> Result<bool>;

    fn clear(&mut self) -> Result<()>;
}

/// Process-lifetime cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: HashMap<SnapshotKey, Arc<Snapshot>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl SnapshotCache for MemoryCache {
    fn get(&self, key: &SnapshotKey) -> Result<Option<Arc<Snapshot>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, snapshot: Arc<Snapshot>) -> Result<()> {
        self.entries.insert(snapshot.key().clone(), snapshot);
        Ok(())
    }

    fn invalidate(&mut self, key: &SnapshotKey) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        Ok(())
    }
}

/// On-disk cache so repeated runs over an unchanged corpus skip the provider.
///
/// Vectors are stored as native-endian `f32` blobs; absent embeddings as `NULL`.
pub struct SqliteCache {
    conn: Connection,
}

impl SqliteCache {
    pub fn open(path: &Path) -> Result<Self> {
        log::info!("Opening snapshot cache at {}", path.display());
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    KbError::Cache(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn snapshot_count(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM snapshots", [], |r| r.get(0))?)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(&format!(
        "PRAGMA busy_timeout = {busy_timeout};",
        busy_timeout = config::sqlite::PRAGMA_BUSY_TIMEOUT_MS,
    ))?;

    let version: i64 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    if version != i64::from(config::CACHE_SCHEMA_VERSION) {
        if version != 0 {
            log::info!(
                "Snapshot cache schema v{} is outdated (want v{}), dropping cached snapshots",
                version,
                config::CACHE_SCHEMA_VERSION
            );
        }
        conn.execute_batch(&format!(
            r#"
            DROP TABLE IF EXISTS snapshot_fragments;
            DROP TABLE IF EXISTS snapshots;
            PRAGMA user_version = {version};
            "#,
            version = config::CACHE_SCHEMA_VERSION
        ))?;
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS snapshots (
            key TEXT PRIMARY KEY,
            model TEXT NOT NULL,
            builtAtMs INTEGER NOT NULL,
            fragmentCount INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS snapshot_fragments (
            key TEXT NOT NULL,
            position INTEGER NOT NULL,
            content TEXT NOT NULL,
            embedding BLOB,
            PRIMARY KEY (key, position)
        );
        "#,
    )?;
    Ok(())
}

impl SnapshotCache for SqliteCache {
    fn get(&self, key: &SnapshotKey) -> Result<Option<Arc<Snapshot>>> {
        let header: Option<(String, i64, i64)> = self
            .conn
            .query_row(
                "SELECT model, builtAtMs, fragmentCount FROM snapshots WHERE key = ?1",
                params![key.as_str()],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .optional()?;
        let Some((model, built_at_ms, fragment_count)) = header else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT content, embedding FROM snapshot_fragments WHERE key = ?1 ORDER BY position ASC",
        )?;
        let rows = stmt.query_map(params![key.as_str()], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, Option<Vec<u8>>>(1)?))
        })?;

        let mut fragments = Vec::new();
        let mut embeddings = Vec::new();
        for row in rows {
            let (content, blob) = row?;
            fragments.push(content);
            embeddings.push(blob.map(|b| decode_vector(&b)).transpose()?);
        }

        if fragments.len() as i64 != fragment_count {
            return Err(KbError::Cache(format!(
                "snapshot {} is incomplete: {} of {} fragments stored",
                key.short(),
                fragments.len(),
                fragment_count
            )));
        }

        let built_at = Utc
            .timestamp_millis_opt(built_at_ms)
            .single()
            .unwrap_or_else(Utc::now);
        let snapshot = Snapshot::new(key.clone(), model, fragments, embeddings, built_at)?;
        Ok(Some(Arc::new(snapshot)))
    }

    fn put(&mut self, snapshot: Arc<Snapshot>) -> Result<()> {
        let key = snapshot.key().as_str();
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute("DELETE FROM snapshot_fragments WHERE key = ?1", params![key])?;
        tx.execute(
            r#"
            INSERT OR REPLACE INTO snapshots (key, model, builtAtMs, fragmentCount)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                key,
                snapshot.model(),
                snapshot.built_at().timestamp_millis(),
                snapshot.len() as i64
            ],
        )?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO snapshot_fragments (key, position, content, embedding) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for (position, content, embedding) in snapshot.entries() {
                let blob: Option<&[u8]> = embedding.map(|v| v.as_bytes());
                insert.execute(params![key, position as i64, content, blob])?;
            }
        }
        tx.commit()?;

        log::info!(
            "Cached snapshot {} ({} fragments, model {})",
            snapshot.key().short(),
            snapshot.len(),
            snapshot.model()
        );
        Ok(())
    }

    fn invalidate(&mut self, key: &SnapshotKey) -> Result<bool> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute("DELETE FROM snapshot_fragments WHERE key = ?1", params![key.as_str()])?;
        let removed = tx.execute("DELETE FROM snapshots WHERE key = ?1", params![key.as_str()])?;
        tx.commit()?;
        Ok(removed > 0)
    }

    fn clear(&mut self) -> Result<()> {
        self.conn
            .execute_batch("DELETE FROM snapshot_fragments; DELETE FROM snapshots;")?;
        log::info!("Snapshot cache cleared");
        Ok(())
    }
}

fn decode_vector(blob: &[u8]) -> Result<Vec<f32>> {
    let width = std::mem::size_of::<f32>();
    if blob.len() % width != 0 {
        return Err(KbError::Cache(format!(
            "embedding blob of {} bytes is not a whole number of f32 values",
            blob.len()
        )));
    }
    let mut out = vec![0.0f32; blob.len() / width];
    out.as_mut_bytes().copy_from_slice(blob);
    Ok(out)
}
