//! Row-level SQLite access: a thin struct around a single
//! `rusqlite::Connection` with one method per query shape.

use automatosx_types::{
    Error, GetAllFilter, MemoryEntry, MemoryEntryType, MemoryMetadata, OrderBy, Result, SearchFilter,
    SortOrder,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use sha2::{Digest, Sha256};
use std::path::Path;

pub struct Database {
    conn: Connection,
}

fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn row_to_entry(row: &Row) -> rusqlite::Result<MemoryEntry> {
    let tags_json: String = row.get("tags")?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();
    let entry_type: Option<String> = row.get("entry_type")?;
    let embedding_blob: Option<Vec<u8>> = row.get("embedding")?;
    let embedding = embedding_blob.map(|bytes| {
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect::<Vec<f32>>()
    });

    Ok(MemoryEntry {
        id: row.get("id")?,
        content: row.get("content")?,
        embedding,
        metadata: MemoryMetadata {
            r#type: entry_type.and_then(|t| parse_entry_type(&t)),
            source: row.get("source")?,
            agent_id: row.get("agent_id")?,
            tags,
            provider: row.get("provider")?,
            timestamp: row
                .get::<_, Option<String>>("metadata_timestamp")?
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        },
        created_at: parse_timestamp(row.get::<_, String>("created_at")?),
        access_count: row.get::<_, i64>("access_count")? as u64,
        last_accessed_at: parse_timestamp(row.get::<_, String>("last_accessed_at")?),
    })
}

fn parse_timestamp(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_entry_type(s: &str) -> Option<MemoryEntryType> {
    match s {
        "conversation" => Some(MemoryEntryType::Conversation),
        "code" => Some(MemoryEntryType::Code),
        "document" => Some(MemoryEntryType::Document),
        "task" => Some(MemoryEntryType::Task),
        "other" => Some(MemoryEntryType::Other),
        _ => None,
    }
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn insert_row(conn: &Connection, content: &str, metadata: &MemoryMetadata, now: DateTime<Utc>) -> Result<i64> {
    let hash = content_hash(content);
    let tags_json = serde_json::to_string(&metadata.tags).unwrap_or_else(|_| "[]".to_string());
    // Entries never carry an embedding at insert time; vector search
    // is unimplemented.
    let embedding_blob: Option<Vec<u8>> = None;

    conn.execute(
        r#"
        INSERT INTO entries (
            content, content_hash, embedding, entry_type, source, agent_id,
            tags, provider, metadata_timestamp, created_at, access_count, last_accessed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 0, ?10)
        "#,
        params![
            content,
            hash,
            embedding_blob,
            metadata.r#type.map(|t| t.as_str()),
            metadata.source,
            metadata.agent_id,
            tags_json,
            metadata.provider,
            metadata.timestamp.map(|t| t.to_rfc3339()),
            now.to_rfc3339(),
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(ref se, _) if se.code == rusqlite::ErrorCode::ConstraintViolation => {
            Error::memory_import_error("duplicate content")
        }
        other => Error::memory_database_error(other),
    })?;

    Ok(conn.last_insert_rowid())
}

impl Database {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(Error::memory_database_error)?;
        let db = Self { conn };
        crate::schema::init_schema(&db.conn)?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(Error::memory_database_error)?;
        let db = Self { conn };
        crate::schema::init_schema(&db.conn)?;
        Ok(db)
    }

    /// Inserts a new entry, returning its assigned id. Duplicate
    /// content (by SHA-256 hash) is rejected with `MemoryImportError`
    /// so callers can decide whether to treat it as a no-op.
    pub fn insert(&self, content: &str, metadata: &MemoryMetadata, now: DateTime<Utc>) -> Result<i64> {
        insert_row(&self.conn, content, metadata, now)
    }

    /// Evicts `evict_ids` and inserts the new entry as a single
    /// transaction: either both sides happen or neither does.
    pub fn evict_and_insert(
        &mut self,
        evict_ids: &[i64],
        content: &str,
        metadata: &MemoryMetadata,
        now: DateTime<Utc>,
    ) -> Result<(u64, i64)> {
        let tx = self.conn.transaction().map_err(Error::memory_database_error)?;
        let mut evicted = 0u64;
        for id in evict_ids {
            evicted += tx
                .execute("DELETE FROM entries WHERE id = ?1", params![id])
                .map_err(Error::memory_database_error)? as u64;
        }
        let id = insert_row(&tx, content, metadata, now)?;
        tx.commit().map_err(Error::memory_database_error)?;
        Ok((evicted, id))
    }

    /// Restores an entry verbatim during import, preserving its
    /// original id/timestamps when no conflicting id exists.
    pub fn insert_verbatim(&self, entry: &MemoryEntry) -> Result<Option<i64>> {
        let hash = content_hash(&entry.content);
        let exists: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM entries WHERE content_hash = ?1",
                [&hash],
                |row| row.get(0),
            )
            .optional()
            .map_err(Error::memory_database_error)?;
        if exists.is_some() {
            return Ok(None);
        }

        let tags_json = serde_json::to_string(&entry.metadata.tags).unwrap_or_else(|_| "[]".to_string());
        let embedding_blob = entry.embedding.as_deref().map(encode_embedding);

        self.conn
            .execute(
                r#"
                INSERT INTO entries (
                    content, content_hash, embedding, entry_type, source, agent_id,
                    tags, provider, metadata_timestamp, created_at, access_count, last_accessed_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                "#,
                params![
                    entry.content,
                    hash,
                    embedding_blob,
                    entry.metadata.r#type.map(|t| t.as_str()),
                    entry.metadata.source,
                    entry.metadata.agent_id,
                    tags_json,
                    entry.metadata.provider,
                    entry.metadata.timestamp.map(|t| t.to_rfc3339()),
                    entry.created_at.to_rfc3339(),
                    entry.access_count as i64,
                    entry.last_accessed_at.to_rfc3339(),
                ],
            )
            .map_err(Error::memory_database_error)?;

        Ok(Some(self.conn.last_insert_rowid()))
    }

    pub fn get(&self, id: i64) -> Result<Option<MemoryEntry>> {
        self.conn
            .query_row("SELECT * FROM entries WHERE id = ?1", [id], row_to_entry)
            .optional()
            .map_err(Error::memory_database_error)
    }

    /// Records a hit, incrementing `access_count` and bumping
    /// `last_accessed_at`.
    pub fn touch(&self, id: i64, now: DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "UPDATE entries SET access_count = access_count + 1, last_accessed_at = ?2 WHERE id = ?1",
                params![id, now.to_rfc3339()],
            )
            .map_err(Error::memory_database_error)?;
        Ok(())
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM entries WHERE id = ?1", [id])
            .map_err(Error::memory_database_error)?;
        Ok(affected > 0)
    }

    pub fn clear(&self) -> Result<u64> {
        let affected = self
            .conn
            .execute("DELETE FROM entries", [])
            .map_err(Error::memory_database_error)?;
        Ok(affected as u64)
    }

    pub fn count(&self) -> Result<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
            .map_err(Error::memory_database_error)
    }

    pub fn get_all(&self, filter: &GetAllFilter) -> Result<Vec<MemoryEntry>> {
        let mut sql = String::from("SELECT * FROM entries WHERE 1=1");
        if let Some(t) = filter.r#type {
            sql.push_str(&format!(" AND entry_type = '{}'", t.as_str()));
        }
        for tag in &filter.tags {
            let escaped = tag.replace('\'', "''");
            sql.push_str(&format!(" AND tags LIKE '%\"{escaped}\"%'"));
        }

        let (column, default_order) = match filter.order_by.unwrap_or(OrderBy::Created) {
            OrderBy::Created => ("created_at", SortOrder::Desc),
            OrderBy::Accessed => ("last_accessed_at", SortOrder::Desc),
            OrderBy::Count => ("access_count", SortOrder::Desc),
        };
        let order = filter.order.unwrap_or(default_order);
        let direction = match order {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        };
        sql.push_str(&format!(" ORDER BY {column} {direction}"));

        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = filter.offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        let mut stmt = self.conn.prepare(&sql).map_err(Error::memory_query_error)?;
        let rows = stmt
            .query_map([], row_to_entry)
            .map_err(Error::memory_query_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::memory_query_error)?;
        Ok(rows)
    }

    /// Full-text search over `entries_fts`, ranked by SQLite's `bm25`.
    /// `filter.vector` is accepted but ignored — no vector index is
    /// implemented.
    pub fn search(&self, filter: &SearchFilter) -> Result<Vec<MemoryEntry>> {
        let Some(text) = filter.text.as_deref().filter(|t| !t.trim().is_empty()) else {
            return Ok(Vec::new());
        };

        let mut sql = String::from(
            "SELECT entries.* FROM entries_fts \
             JOIN entries ON entries.id = entries_fts.rowid \
             WHERE entries_fts MATCH ?1",
        );
        if let Some(t) = filter.r#type {
            sql.push_str(&format!(" AND entries.entry_type = '{}'", t.as_str()));
        }
        for tag in &filter.tags {
            let escaped = tag.replace('\'', "''");
            sql.push_str(&format!(" AND entries.tags LIKE '%\"{escaped}\"%'"));
        }
        sql.push_str(" ORDER BY bm25(entries_fts)");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = self.conn.prepare(&sql).map_err(Error::memory_query_error)?;
        let rows = stmt
            .query_map(params![fts_query(text)], row_to_entry)
            .map_err(Error::memory_query_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::memory_query_error)?;
        Ok(rows)
    }

    /// Least-recently-accessed ids beyond `keep`, for overflow eviction.
    pub fn ids_beyond_limit(&self, keep: u64) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM entries ORDER BY last_accessed_at ASC")
            .map_err(Error::memory_query_error)?;
        let all_ids: Vec<i64> = stmt
            .query_map([], |row| row.get(0))
            .map_err(Error::memory_query_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::memory_query_error)?;
        let total = all_ids.len() as u64;
        if total <= keep {
            return Ok(Vec::new());
        }
        let evict = (total - keep) as usize;
        Ok(all_ids.into_iter().take(evict).collect())
    }

    pub fn ids_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM entries WHERE created_at < ?1")
            .map_err(Error::memory_query_error)?;
        let ids = stmt
            .query_map([cutoff.to_rfc3339()], |row| row.get(0))
            .map_err(Error::memory_query_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(Error::memory_query_error)?;
        Ok(ids)
    }

    pub fn delete_many(&self, ids: &[i64]) -> Result<u64> {
        let mut deleted = 0u64;
        for id in ids {
            if self.delete(*id)? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    pub fn all_entries(&self) -> Result<Vec<MemoryEntry>> {
        self.get_all(&GetAllFilter::default())
    }

    pub fn db_size_bytes(&self) -> Result<u64> {
        self.conn
            .query_row(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n as u64)
            .map_err(Error::memory_database_error)
    }
}

/// FTS5 MATCH expects bare query terms; quote each token so content
/// with punctuation or FTS operator characters doesn't raise a syntax
/// error.
fn fts_query(text: &str) -> String {
    text.split_whitespace()
        .map(|tok| format!("\"{}\"", tok.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(" ")
}
