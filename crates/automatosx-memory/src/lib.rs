//! Memory Store: a SQLite + FTS5-backed append-mostly log
//! of agent-visible facts, with bounded size and simple text search,
//! built on a thin `Database` wrapper and a `PRAGMA user_version`
//! schema.

mod db;
mod schema;

use automatosx_types::{
    Error, GetAllFilter, MemoryEntry, MemoryExport, MemoryMetadata, MemoryStats, Result, SearchFilter,
};
use chrono::Utc;
use db::Database;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Current on-disk export schema version.
pub const EXPORT_VERSION: u32 = 1;

/// Default ceiling enforced by [`MemoryStore::cleanup`]; callers that
/// want a different bound should call `cleanup` with an explicit
/// argument rather than relying on this default alone.
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Number of oldest entries evicted per `cleanup` pass once the ceiling
/// is crossed: 10% of `DEFAULT_MAX_ENTRIES`.
pub const DEFAULT_CLEANUP_BATCH: u64 = 1_000;

pub struct MemoryStore {
    db: Mutex<Database>,
    max_entries: u64,
    cleanup_batch: u64,
}

impl MemoryStore {
    pub fn open(path: &Path, max_entries: u64, cleanup_batch: u64) -> Result<Self> {
        let db = Database::open(path)?;
        Ok(Self {
            db: Mutex::new(db),
            max_entries,
            cleanup_batch,
        })
    }

    pub fn open_in_memory(max_entries: u64, cleanup_batch: u64) -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Mutex::new(db),
            max_entries,
            cleanup_batch,
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Database> {
        self.db.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Adds an entry, returning its id. When the store is already at
    /// `max_entries`, evicts the oldest `cleanup_batch` entries before
    /// inserting, so that afterward `total == max_entries -
    /// cleanup_batch + 1`.
    pub fn add(&self, content: &str, metadata: MemoryMetadata) -> Result<i64> {
        if content.trim().is_empty() {
            return Err(Error::invalid_params("memory entry content must not be empty"));
        }
        let mut db = self.lock();
        let count = db.count()?;
        if count >= self.max_entries {
            let evictable = db.ids_beyond_limit(count.saturating_sub(self.cleanup_batch))?;
            let (evicted, id) = db.evict_and_insert(&evictable, content, &metadata, Utc::now())?;
            if evicted > 0 {
                info!(evicted, "memory store evicted oldest entries to make room");
            }
            return Ok(id);
        }
        db.insert(content, &metadata, Utc::now())
    }

    /// Fetches an entry by id, bumping its access count.
    pub fn get(&self, id: i64) -> Result<Option<MemoryEntry>> {
        let db = self.lock();
        let Some(entry) = db.get(id)? else {
            return Ok(None);
        };
        db.touch(id, Utc::now())?;
        Ok(Some(entry))
    }

    pub fn get_all(&self, filter: &GetAllFilter) -> Result<Vec<MemoryEntry>> {
        self.lock().get_all(filter)
    }

    /// Full-text search, bumping the access count of every match.
    pub fn search(&self, filter: &SearchFilter) -> Result<Vec<MemoryEntry>> {
        let db = self.lock();
        let results = db.search(filter)?;
        let now = Utc::now();
        for entry in &results {
            db.touch(entry.id, now)?;
        }
        Ok(results)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        self.lock().delete(id)
    }

    pub fn clear(&self) -> Result<u64> {
        self.lock().clear()
    }

    /// Evicts entries older than `older_than_days`, returning the count
    /// removed.
    pub fn cleanup(&self, older_than_days: f64) -> Result<u64> {
        let db = self.lock();
        let cutoff = Utc::now() - chrono::Duration::seconds((older_than_days * 86_400.0) as i64);
        let evictable = db.ids_older_than(cutoff)?;
        let evicted = db.delete_many(&evictable)?;
        if evicted > 0 {
            info!(evicted, older_than_days, "memory store cleanup evicted aged entries");
        }
        Ok(evicted)
    }

    pub fn get_stats(&self) -> Result<MemoryStats> {
        let db = self.lock();
        let total = db.count()?;
        let db_size = db.db_size_bytes()?;
        Ok(MemoryStats {
            total_entries: total,
            db_size_bytes: db_size,
            index_size_bytes: db_size, // FTS5 content is stored in the same file
            memory_usage_bytes: total * 512, // rough per-row estimate, not a precise figure
        })
    }

    pub fn export_to_json(&self) -> Result<MemoryExport> {
        let entries = self.lock().all_entries()?;
        Ok(MemoryExport {
            entries,
            version: EXPORT_VERSION,
            exported_at: Utc::now(),
        })
    }

    /// Imports entries from a previous export, skipping any whose
    /// content hash already exists. Returns `(imported, skipped)`.
    pub fn import_from_json(&self, export: &MemoryExport) -> Result<(u64, u64)> {
        if export.version > EXPORT_VERSION {
            return Err(Error::memory_import_error(format!(
                "export version {} is newer than supported version {EXPORT_VERSION}",
                export.version
            )));
        }
        let db = self.lock();
        let mut imported = 0u64;
        let mut skipped = 0u64;
        for entry in &export.entries {
            match db.insert_verbatim(entry)? {
                Some(_) => imported += 1,
                None => skipped += 1,
            }
        }
        Ok((imported, skipped))
    }
}
